use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::{ArchiveClass, DatasetId};
use crate::error::LabelerError;

/// Directory layout of one working directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: Utf8PathBuf,
}

/// Everything the pipeline needs to know about where one identifier lives.
#[derive(Debug, Clone)]
pub struct ResolvedDataset {
    pub id: DatasetId,
    pub artifact_path: Utf8PathBuf,
    pub archives: Vec<ArchiveTarget>,
}

#[derive(Debug, Clone)]
pub struct ArchiveTarget {
    pub class: ArchiveClass,
    pub url: String,
    pub staging_path: Utf8PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn staging_dir(&self, class: ArchiveClass) -> Utf8PathBuf {
        self.root.join("zip").join(class.dir_name())
    }

    pub fn extract_dir(&self, class: ArchiveClass) -> Utf8PathBuf {
        self.root.join("extract").join(class.dir_name())
    }

    pub fn artifact_dir(&self) -> Utf8PathBuf {
        self.root.join("data")
    }

    pub fn dictionary_dir(&self) -> Utf8PathBuf {
        self.root.join("dictionary")
    }

    pub fn artifact_path(&self, id: &DatasetId) -> Utf8PathBuf {
        self.artifact_dir().join(format!("{id}.json"))
    }

    pub fn resolve(&self, id: &DatasetId, base_url: &str) -> ResolvedDataset {
        let archives = ArchiveClass::ALL
            .iter()
            .map(|&class| {
                let name = class.archive_name(id);
                ArchiveTarget {
                    class,
                    url: format!("{base_url}{name}"),
                    staging_path: self.staging_dir(class).join(name),
                }
            })
            .collect();
        ResolvedDataset {
            id: id.clone(),
            artifact_path: self.artifact_path(id),
            archives,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), LabelerError> {
        let mut dirs = vec![self.artifact_dir(), self.dictionary_dir()];
        for class in ArchiveClass::ALL {
            dirs.push(self.staging_dir(class));
            dirs.push(self.extract_dir(class));
        }
        for dir in dirs {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| LabelerError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    /// Removes every staging and extraction directory. Artifacts and
    /// dictionaries are left alone; absent directories are fine.
    pub fn clean_staging(&self) -> Result<(), LabelerError> {
        for top in ["zip", "extract"] {
            let dir = self.root.join(top);
            if dir.as_std_path().exists() {
                fs::remove_dir_all(dir.as_std_path())
                    .map_err(|err| LabelerError::Filesystem(format!("remove {dir}: {err}")))?;
            }
        }
        Ok(())
    }

    pub fn list_artifacts(&self) -> Result<Vec<Utf8PathBuf>, LabelerError> {
        let dir = self.artifact_dir();
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in dir
            .read_dir_utf8()
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?
        {
            let entry = entry.map_err(|err| LabelerError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_file() && path.extension() == Some("json") {
                paths.push(path.to_path_buf());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Writes through a temp file in the destination directory, then renames,
    /// so readers only ever see a complete file.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), LabelerError> {
        let parent = path
            .parent()
            .ok_or_else(|| LabelerError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".ipeds-labeler")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
