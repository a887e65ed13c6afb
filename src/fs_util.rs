use std::fs;
use std::io;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use zip::ZipArchive;

use crate::error::LabelerError;

static REVISED_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)_rv").unwrap());

/// Unpacks `zip_path` into `target_dir` and returns the files written.
pub fn extract_zip(
    zip_path: &Utf8Path,
    target_dir: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>, LabelerError> {
    let file = fs::File::open(zip_path.as_std_path())
        .map_err(|err| LabelerError::Archive(format!("open zip {zip_path}: {err}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| LabelerError::Archive(format!("read zip {zip_path}: {err}")))?;

    let mut written = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| LabelerError::Archive(err.to_string()))?;
        let enclosed = entry
            .enclosed_name()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok());
        let entry_path = match enclosed {
            Some(path) => target_dir.join(path),
            None => {
                return Err(LabelerError::Archive(format!(
                    "unsafe or non-UTF-8 entry name in {zip_path}"
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| LabelerError::Archive(err.to_string()))?;
        written.push(entry_path);
    }
    Ok(written)
}

/// Canonical name of a revised file (`hd2019_rv.csv` -> `hd2019.csv`), or
/// `None` when the name carries no revision marker.
pub fn unrevised_name(name: &str) -> Option<String> {
    let found = REVISED_MARKER.find(name)?;
    let mut canonical = String::with_capacity(name.len());
    canonical.push_str(&name[..found.start()]);
    canonical.push_str(&name[found.end()..]);
    Some(canonical)
}

/// Replaces every original data file of `stem` in `dir` that has a revised
/// counterpart with the revision, under the original name. Stems and
/// originals are matched case-insensitively. Returns the canonical names
/// touched.
pub fn reconcile_revisions(dir: &Utf8Path, stem: &str) -> Result<Vec<String>, LabelerError> {
    let mut names = Vec::new();
    let mut revised = Vec::new();
    for entry in dir
        .read_dir_utf8()
        .map_err(|err| LabelerError::Filesystem(format!("read {dir}: {err}")))?
    {
        let entry = entry.map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        let name = entry.file_name().to_string();
        if entry.path().is_file() {
            let canonical = unrevised_name(&name).filter(|canonical| has_stem(canonical, stem));
            if let Some(canonical) = canonical {
                revised.push((name.clone(), canonical));
            }
        }
        names.push(name);
    }
    revised.sort();

    let mut touched = Vec::new();
    for (name, canonical) in revised {
        // originals may differ from the revision in case alone
        let originals = names
            .iter()
            .filter(|existing| existing.eq_ignore_ascii_case(&canonical));
        for existing in originals {
            let original = dir.join(existing);
            if original.as_std_path().exists() {
                fs::remove_file(original.as_std_path()).map_err(|err| {
                    LabelerError::Filesystem(format!("remove {original}: {err}"))
                })?;
            }
        }
        fs::rename(dir.join(&name).as_std_path(), dir.join(&canonical).as_std_path())
            .map_err(|err| LabelerError::Filesystem(format!("rename {name}: {err}")))?;
        tracing::debug!(revised = %name, canonical = %canonical, "revised file replaces original");
        touched.push(canonical);
    }
    Ok(touched)
}

/// Copies `files`, all below `source`, into `dest` at the same relative
/// paths, overwriting older copies.
pub fn copy_files(
    source: &Utf8Path,
    files: &[Utf8PathBuf],
    dest: &Utf8Path,
) -> Result<usize, LabelerError> {
    fs::create_dir_all(dest.as_std_path())
        .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
    let mut copied = 0;
    for entry in files {
        let relative = entry
            .strip_prefix(source)
            .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| LabelerError::Filesystem(err.to_string()))?;
        }
        fs::copy(entry.as_std_path(), target.as_std_path())
            .map_err(|err| LabelerError::Filesystem(format!("copy {entry}: {err}")))?;
        copied += 1;
    }
    Ok(copied)
}

/// Finds `<stem>.<extension>` anywhere below `dir`, comparing names
/// case-insensitively.
pub fn find_file(
    dir: &Utf8Path,
    stem: &str,
    extension: &str,
) -> Result<Option<Utf8PathBuf>, LabelerError> {
    if !dir.as_std_path().exists() {
        return Ok(None);
    }
    let wanted = format!("{stem}.{extension}").to_ascii_lowercase();
    let mut matches = walk_files(dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_ascii_lowercase() == wanted)
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    matches.sort();
    Ok(matches.into_iter().next())
}

fn has_stem(name: &str, stem: &str) -> bool {
    Utf8Path::new(name)
        .file_stem()
        .is_some_and(|found| found.eq_ignore_ascii_case(stem))
}

fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, LabelerError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = path
            .read_dir_utf8()
            .map_err(|err| LabelerError::Filesystem(format!("read {path}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| LabelerError::Filesystem(err.to_string()))?;
            let path = entry.path().to_path_buf();
            if path.is_dir() {
                stack.push(path);
            } else {
                items.push(path);
            }
        }
    }
    Ok(items)
}
