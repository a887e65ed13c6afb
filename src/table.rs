use std::fs::File;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::LabelerError;

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Missing,
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Number,
    Boolean,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<Value>,
}

impl Column {
    /// Builds a typed column from raw cells, picking the narrowest kind every
    /// non-missing cell fits.
    pub fn from_cells(name: impl Into<String>, cells: Vec<String>) -> Self {
        let present = cells
            .iter()
            .map(|cell| cell.trim())
            .filter(|cell| !is_missing_cell(cell))
            .collect::<Vec<_>>();

        let kind = if present.is_empty() {
            ColumnKind::Text
        } else if present.iter().all(|cell| cell.parse::<i64>().is_ok()) {
            ColumnKind::Integer
        } else if present.iter().all(|cell| parse_number(cell).is_some()) {
            ColumnKind::Number
        } else if present.iter().all(|cell| parse_bool(cell).is_some()) {
            ColumnKind::Boolean
        } else {
            ColumnKind::Text
        };

        let values = cells
            .into_iter()
            .map(|cell| coerce(cell, kind))
            .collect::<Vec<_>>();

        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn all_missing(&self) -> bool {
        self.values.iter().all(Value::is_missing)
    }

    /// Turns a column read as boolean back into its one-letter text form.
    /// Returns false when the column was not boolean.
    pub fn revert_boolean(&mut self) -> bool {
        if self.kind != ColumnKind::Boolean {
            return false;
        }
        for value in &mut self.values {
            if let Value::Boolean(flag) = value {
                *value = Value::Text(if *flag { "T" } else { "F" }.to_string());
            }
        }
        self.kind = ColumnKind::Text;
        true
    }
}

/// A CSV extract with canonical (lower-case) column names.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub columns: Vec<Column>,
    pub row_count: usize,
}

impl RawTable {
    pub fn read_csv(path: &Utf8Path) -> Result<Self, LabelerError> {
        let file = File::open(path.as_std_path()).map_err(|err| LabelerError::Csv {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        Self::from_reader(file).map_err(|err| match err {
            LabelerError::Csv { message, .. } => LabelerError::Csv {
                path: path.to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, LabelerError> {
        let csv_err = |err: csv::Error| LabelerError::Csv {
            path: "<reader>".to_string(),
            message: err.to_string(),
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .byte_headers()
            .map_err(csv_err)?
            .iter()
            .map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim_start_matches(BOM)
                    .trim()
                    .to_ascii_lowercase()
            })
            .collect::<Vec<_>>();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        let mut row_count = 0;
        for record in reader.byte_records() {
            let record = record.map_err(csv_err)?;
            for (idx, column) in cells.iter_mut().enumerate() {
                let cell = record
                    .get(idx)
                    .map(|raw| String::from_utf8_lossy(raw).into_owned())
                    .unwrap_or_default();
                column.push(cell);
            }
            row_count += 1;
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, cells)| Column::from_cells(name, cells))
            .collect();

        Ok(Self { columns, row_count })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

fn is_missing_cell(cell: &str) -> bool {
    cell.is_empty() || cell == "NA"
}

/// Finite numbers only; `nan` and `inf` stay text so they survive JSON.
fn parse_number(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_uppercase().as_str() {
        "T" | "TRUE" => Some(true),
        "F" | "FALSE" => Some(false),
        _ => None,
    }
}

fn coerce(cell: String, kind: ColumnKind) -> Value {
    let trimmed = cell.trim();
    if is_missing_cell(trimmed) {
        return Value::Missing;
    }
    match kind {
        ColumnKind::Integer => trimmed.parse().map(Value::Integer).unwrap_or(Value::Missing),
        ColumnKind::Number => parse_number(trimmed).map(Value::Number).unwrap_or(Value::Missing),
        ColumnKind::Boolean => parse_bool(trimmed).map(Value::Boolean).unwrap_or(Value::Missing),
        ColumnKind::Text => Value::Text(trimmed.to_string()),
    }
}
