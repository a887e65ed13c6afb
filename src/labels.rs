//! Line-oriented parser for Stata label-definition files.
//!
//! Two declaration kinds matter:
//!
//! ```text
//! label variable iclevel "Level of institution"
//! label define label_iclevel 1 "Four or more years", add
//! ```
//!
//! Every other line is boilerplate and skipped.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static VARIABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*label\s+var(?:iable)?\s+(\w+)\s+"(.*)"\s*$"#).unwrap()
});

static DEFINE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*label\s+def(?:ine)?\s+label_(\w+)\s+("[^"]*"|\S+)\s+"(.*)"(?:\s*,\s*(?:add|modify|replace))?\s*$"#,
    )
    .unwrap()
});

const ESCAPED_APOSTROPHE: &str = "\\'";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Integer(i64),
    Text(String),
}

impl RawValue {
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        let unquoted = token
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .unwrap_or(token);
        match unquoted.parse::<i64>() {
            Ok(value) => RawValue::Integer(value),
            Err(_) => RawValue::Text(unquoted.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, RawValue::Integer(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueLabel {
    pub value: RawValue,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLabels {
    pub description: Option<String>,
    pub value_labels: Vec<ValueLabel>,
}

impl FieldLabels {
    pub fn has_numeric_keys(&self) -> bool {
        !self.value_labels.is_empty() && self.value_labels.iter().all(|vl| vl.value.is_numeric())
    }

    /// First display label shared by two entries. Collisions are keyed on the
    /// label text, not on the raw value.
    pub fn duplicate_label(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.value_labels
            .iter()
            .find(|vl| !seen.insert(vl.label.as_str()))
            .map(|vl| vl.label.as_str())
    }
}

/// All declarations of one definitions file, keyed by lower-case field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelTable {
    fields: BTreeMap<String, FieldLabels>,
}

impl LabelTable {
    pub fn parse(text: &str) -> Self {
        let mut fields: BTreeMap<String, FieldLabels> = BTreeMap::new();
        for line in text.lines() {
            if let Some(caps) = VARIABLE_LINE.captures(line) {
                let field = caps[1].to_ascii_lowercase();
                // later declarations override earlier ones
                fields.entry(field).or_default().description = Some(unescape(&caps[2]));
            } else if let Some(caps) = DEFINE_LINE.captures(line) {
                let field = caps[1].to_ascii_lowercase();
                fields.entry(field).or_default().value_labels.push(ValueLabel {
                    value: RawValue::parse(&caps[2]),
                    label: unescape(&caps[3]),
                });
            }
        }
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&FieldLabels> {
        self.fields.get(&field.to_ascii_lowercase())
    }

    /// Labels for each requested field, in request order. Fields without any
    /// declaration come back empty.
    pub fn for_fields<S: AsRef<str>>(&self, fields: &[S]) -> Vec<(String, FieldLabels)> {
        fields
            .iter()
            .map(|name| {
                let name = name.as_ref().to_ascii_lowercase();
                let labels = self.fields.get(&name).cloned().unwrap_or_default();
                (name, labels)
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parses `text` and returns one entry per name in `fields`.
pub fn parse_labels<S: AsRef<str>>(text: &str, fields: &[S]) -> Vec<(String, FieldLabels)> {
    LabelTable::parse(text).for_fields(fields)
}

fn unescape(text: &str) -> String {
    text.replace(ESCAPED_APOSTROPHE, "'")
}
