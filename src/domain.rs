use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LabelerError;

/// One survey extract, e.g. `HD2019` or `EF2019A`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem used inside the archives, which ship lower-case names.
    pub fn file_stem(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = LabelerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        let is_valid = !normalized.is_empty()
            && normalized.len() <= 64
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !is_valid {
            return Err(LabelerError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for DatasetId {
    type Error = LabelerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveClass {
    Data,
    Labels,
    Dictionary,
}

impl ArchiveClass {
    pub const ALL: [ArchiveClass; 3] = [
        ArchiveClass::Data,
        ArchiveClass::Labels,
        ArchiveClass::Dictionary,
    ];

    /// Appended to the identifier to form both the URL and the staging file name.
    pub fn suffix(self) -> &'static str {
        match self {
            ArchiveClass::Data => ".zip",
            ArchiveClass::Labels => "_Stata.zip",
            ArchiveClass::Dictionary => "_Dict.zip",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            ArchiveClass::Data => "data",
            ArchiveClass::Labels => "labels",
            ArchiveClass::Dictionary => "dictionary",
        }
    }

    pub fn archive_name(self, id: &DatasetId) -> String {
        format!("{}{}", id.as_str(), self.suffix())
    }
}

impl fmt::Display for ArchiveClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}
