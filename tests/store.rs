use camino::Utf8PathBuf;

use ipeds_labeler::domain::{ArchiveClass, DatasetId};
use ipeds_labeler::store::Workspace;

fn workspace() -> (tempfile::TempDir, Workspace) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, Workspace::new(root))
}

#[test]
fn resolve_builds_urls_and_paths() {
    let (_temp, ws) = workspace();
    let id: DatasetId = "HD2019".parse().unwrap();
    let resolved = ws.resolve(&id, "https://nces.ed.gov/ipeds/datacenter/data/");

    assert_eq!(resolved.artifact_path, ws.root().join("data").join("HD2019.json"));
    let urls = resolved
        .archives
        .iter()
        .map(|target| target.url.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        urls,
        vec![
            "https://nces.ed.gov/ipeds/datacenter/data/HD2019.zip",
            "https://nces.ed.gov/ipeds/datacenter/data/HD2019_Stata.zip",
            "https://nces.ed.gov/ipeds/datacenter/data/HD2019_Dict.zip",
        ]
    );
    assert_eq!(
        resolved.archives[0].staging_path,
        ws.staging_dir(ArchiveClass::Data).join("HD2019.zip")
    );
}

#[test]
fn ensure_dirs_is_idempotent() {
    let (_temp, ws) = workspace();
    ws.ensure_dirs().unwrap();
    ws.ensure_dirs().unwrap();
    for class in ArchiveClass::ALL {
        assert!(ws.staging_dir(class).is_dir());
        assert!(ws.extract_dir(class).is_dir());
    }
    assert!(ws.artifact_dir().is_dir());
    assert!(ws.dictionary_dir().is_dir());
}

#[test]
fn clean_staging_keeps_artifacts_and_dictionaries() {
    let (_temp, ws) = workspace();
    ws.ensure_dirs().unwrap();
    std::fs::write(ws.staging_dir(ArchiveClass::Data).join("HD2019.zip"), b"zip").unwrap();
    std::fs::write(ws.dictionary_dir().join("hd2019.xlsx"), b"dict").unwrap();
    std::fs::write(ws.artifact_dir().join("HD2019.json"), b"{}").unwrap();

    ws.clean_staging().unwrap();
    assert!(!ws.root().join("zip").exists());
    assert!(!ws.root().join("extract").exists());
    assert!(ws.dictionary_dir().join("hd2019.xlsx").exists());
    assert!(ws.artifact_dir().join("HD2019.json").exists());

    ws.clean_staging().unwrap();
}

#[test]
fn atomic_write_replaces_without_leftovers() {
    let (_temp, ws) = workspace();
    let path = ws.artifact_dir().join("HD2019.json");
    Workspace::write_bytes_atomic(&path, b"first").unwrap();
    Workspace::write_bytes_atomic(&path, b"second").unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"second");
    let entries = std::fs::read_dir(ws.artifact_dir()).unwrap().count();
    assert_eq!(entries, 1);
    assert_eq!(ws.list_artifacts().unwrap(), vec![path]);
}
