use std::fmt;
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::DatasetId;
use crate::error::LabelerError;
use crate::labels::{FieldLabels, ValueLabel};
use crate::store::Workspace;
use crate::table::{Column, ColumnKind, RawTable, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationOutcome {
    Full,
    DescriptionOnly,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityCondition {
    BooleanCoerced,
    AllMissing,
    DuplicateLabels,
    NonNumericLabelKeys,
}

impl fmt::Display for AnnotationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            AnnotationOutcome::Full => "full",
            AnnotationOutcome::DescriptionOnly => "description_only",
            AnnotationOutcome::None => "none",
        })
    }
}

impl fmt::Display for DataQualityCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            DataQualityCondition::BooleanCoerced => "boolean_coerced",
            DataQualityCondition::AllMissing => "all_missing",
            DataQualityCondition::DuplicateLabels => "duplicate_labels",
            DataQualityCondition::NonNumericLabelKeys => "non_numeric_label_keys",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub identifier: String,
    pub field: String,
    pub condition: DataQualityCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedColumn {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_labels: Vec<ValueLabel>,
    pub annotation: AnnotationOutcome,
    pub values: Vec<Value>,
}

/// The persisted, self-describing table for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub identifier: String,
    pub source_file: String,
    pub row_count: usize,
    pub columns: Vec<AnnotatedColumn>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl Artifact {
    pub fn column(&self, name: &str) -> Option<&AnnotatedColumn> {
        let name = name.to_ascii_lowercase();
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn outcome_count(&self, outcome: AnnotationOutcome) -> usize {
        self.columns
            .iter()
            .filter(|column| column.annotation == outcome)
            .count()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, LabelerError> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), LabelerError> {
        Workspace::write_bytes_atomic(path, &self.to_json()?)
    }

    pub fn read(path: &Utf8Path) -> Result<Self, LabelerError> {
        if !path.as_std_path().exists() {
            return Err(LabelerError::ArtifactNotFound(path.to_string()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| LabelerError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| LabelerError::ArtifactParse {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

/// Decides what metadata one column receives.
pub fn annotate_column(
    id: &DatasetId,
    mut column: Column,
    field: FieldLabels,
    diagnostics: &mut Vec<Diagnostic>,
) -> AnnotatedColumn {
    let name = column.name.clone();
    let mut record = |condition: DataQualityCondition, detail: Option<String>| {
        tracing::warn!(
            identifier = %id,
            field = %name,
            %condition,
            detail = detail.as_deref().unwrap_or(""),
            "data quality condition"
        );
        diagnostics.push(Diagnostic {
            identifier: id.to_string(),
            field: name.clone(),
            condition,
            detail,
        });
    };

    if column.kind == ColumnKind::Boolean {
        record(DataQualityCondition::BooleanCoerced, None);
    }
    column.revert_boolean();

    let description_only = |column: Column, description: Option<String>| AnnotatedColumn {
        annotation: if description.is_some() {
            AnnotationOutcome::DescriptionOnly
        } else {
            AnnotationOutcome::None
        },
        name: column.name,
        kind: column.kind,
        description,
        value_labels: Vec::new(),
        values: column.values,
    };

    if column.all_missing() {
        if !field.value_labels.is_empty() {
            record(DataQualityCondition::AllMissing, None);
        }
        return description_only(column, field.description);
    }

    if field.value_labels.is_empty() {
        return description_only(column, field.description);
    }

    if !field.has_numeric_keys() {
        record(DataQualityCondition::NonNumericLabelKeys, None);
        return description_only(column, field.description);
    }

    if let Some(label) = field.duplicate_label() {
        record(
            DataQualityCondition::DuplicateLabels,
            Some(format!("label {label:?} declared more than once")),
        );
        return description_only(column, field.description);
    }

    AnnotatedColumn {
        name: column.name,
        kind: column.kind,
        description: field.description,
        value_labels: field.value_labels,
        annotation: AnnotationOutcome::Full,
        values: column.values,
    }
}

/// Applies per-field `labels` to every column of `table`. Columns missing from
/// `labels` get no metadata.
pub fn annotate(
    id: &DatasetId,
    source_file: &str,
    table: RawTable,
    labels: &[(String, FieldLabels)],
) -> Artifact {
    let mut diagnostics = Vec::new();
    let columns = table
        .columns
        .into_iter()
        .map(|column| {
            let field = labels
                .iter()
                .find(|(name, _)| *name == column.name)
                .map(|(_, field)| field.clone())
                .unwrap_or_default();
            annotate_column(id, column, field, &mut diagnostics)
        })
        .collect();
    Artifact {
        identifier: id.to_string(),
        source_file: source_file.to_string(),
        row_count: table.row_count,
        columns,
        diagnostics,
    }
}
