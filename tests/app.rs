use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use zip::write::SimpleFileOptions;

use ipeds_labeler::annotate::{AnnotationOutcome, Artifact};
use ipeds_labeler::app::{App, ItemAction, ProgressEvent, ProgressSink, RunOptions, Stage};
use ipeds_labeler::domain::{ArchiveClass, DatasetId};
use ipeds_labeler::error::LabelerError;
use ipeds_labeler::fetch::ArchiveClient;
use ipeds_labeler::store::Workspace;
use ipeds_labeler::table::Value;

const BASE_URL: &str = "http://mock.test/data/";

const A_DEFINITIONS: &str = r#"insheet using "a2023_data_stata.csv", comma clear
label data "A2023"
label variable unitid "Unique identification number"
label variable level "Level of institution"
label define label_level 1 "Four or more years"
label define label_level 2 "At least 2 but less than 4 years", add
label variable name "Institution name"
label variable closed "Closed flag"
label variable empty "Always blank"
label define label_empty 1 "Yes"
label values level label_level
"#;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Clone, Default)]
struct MockClient {
    files: Arc<HashMap<String, Vec<u8>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockClient {
    fn with_files(files: HashMap<String, Vec<u8>>) -> Self {
        Self {
            files: Arc::new(files),
            calls: Arc::default(),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ArchiveClient for MockClient {
    fn download(&self, url: &str, destination: &Path) -> Result<(), LabelerError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.files.get(url) {
            Some(bytes) => std::fs::write(destination, bytes)
                .map_err(|err| LabelerError::Filesystem(err.to_string())),
            None => Err(LabelerError::HttpStatus {
                status: 404,
                message: "not found".to_string(),
            }),
        }
    }
}

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn a2023_files() -> HashMap<String, Vec<u8>> {
    let mut files = HashMap::new();
    files.insert(
        format!("{BASE_URL}A2023.zip"),
        zip_bytes(&[
            ("a2023.csv", "UNITID,LEVEL\n1,9\n"),
            (
                "a2023_rv.csv",
                "UNITID,LEVEL,NAME,CLOSED,EMPTY\n100,1,Alpha College,F,\n200,2,Beta Institute,,\n",
            ),
        ]),
    );
    files.insert(
        format!("{BASE_URL}A2023_Stata.zip"),
        zip_bytes(&[("a2023.do", A_DEFINITIONS)]),
    );
    files.insert(
        format!("{BASE_URL}A2023_Dict.zip"),
        zip_bytes(&[("a2023.xlsx", "dictionary")]),
    );
    files
}

fn ids(values: &[&str]) -> Vec<DatasetId> {
    values.iter().map(|value| value.parse().unwrap()).collect()
}

fn setup(client: MockClient) -> (tempfile::TempDir, App<MockClient>) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("work")).unwrap();
    let app = App::new(Workspace::new(root), client, BASE_URL, Duration::ZERO);
    (temp, app)
}

#[test]
fn end_to_end_with_one_failed_identifier() {
    let client = MockClient::with_files(a2023_files());
    let (_temp, app) = setup(client.clone());

    let report = app
        .run(&ids(&["A2023", "B2023"]), RunOptions::default(), &NoopSink)
        .unwrap();

    assert_eq!(report.failed(), vec!["B2023"]);
    let b = report.item("B2023").unwrap();
    assert_eq!(b.stage, Some(Stage::Fetch));
    assert!(b.error.as_deref().unwrap().contains("404"));

    let a = report.item("A2023").unwrap();
    assert_eq!(a.action, ItemAction::Annotated);
    assert_eq!(
        a.fetched,
        vec![ArchiveClass::Data, ArchiveClass::Labels, ArchiveClass::Dictionary]
    );

    let ws = app.workspace();
    let artifact = Artifact::read(&ws.artifact_path(&"A2023".parse().unwrap())).unwrap();
    assert!(!ws.artifact_path(&"B2023".parse().unwrap()).exists());

    assert_eq!(artifact.source_file, "a2023.csv");
    assert_eq!(artifact.row_count, 2);
    let unitid = artifact.column("unitid").unwrap();
    assert_eq!(unitid.values, vec![Value::Integer(100), Value::Integer(200)]);
    let level = artifact.column("level").unwrap();
    assert_eq!(level.annotation, AnnotationOutcome::Full);
    assert_eq!(level.value_labels.len(), 2);
    assert_eq!(
        artifact.column("empty").unwrap().annotation,
        AnnotationOutcome::DescriptionOnly
    );
    assert_eq!(artifact.diagnostics.len(), 2);

    assert!(report.cleaned);
    assert!(!ws.root().join("zip").exists());
    assert!(!ws.root().join("extract").exists());
    assert!(ws.dictionary_dir().join("a2023.xlsx").exists());

    // B2023 stops at its first failed archive
    let calls = client.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3], format!("{BASE_URL}B2023.zip"));
}

#[test]
fn second_run_skips_without_network() {
    let client = MockClient::with_files(a2023_files());
    let (_temp, app) = setup(client.clone());
    let ids = ids(&["A2023"]);

    app.run(&ids, RunOptions::default(), &NoopSink).unwrap();
    let path = app.workspace().artifact_path(&ids[0]);
    let first = std::fs::read(&path).unwrap();
    let calls_after_first = client.calls().len();

    let report = app.run(&ids, RunOptions::default(), &NoopSink).unwrap();
    assert_eq!(report.items[0].action, ItemAction::Skipped);
    assert_eq!(client.calls().len(), calls_after_first);
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test]
fn staged_archives_are_not_fetched_again() {
    let files = a2023_files();
    let data_zip = files[&format!("{BASE_URL}A2023.zip")].clone();
    let client = MockClient::with_files(files);
    let (_temp, app) = setup(client.clone());

    let ws = app.workspace();
    ws.ensure_dirs().unwrap();
    std::fs::write(ws.staging_dir(ArchiveClass::Data).join("A2023.zip"), data_zip).unwrap();

    let report = app
        .run(&ids(&["A2023"]), RunOptions::default(), &NoopSink)
        .unwrap();
    assert_eq!(report.items[0].action, ItemAction::Annotated);
    assert_eq!(
        report.items[0].fetched,
        vec![ArchiveClass::Labels, ArchiveClass::Dictionary]
    );
    assert_eq!(
        client.calls(),
        vec![
            format!("{BASE_URL}A2023_Stata.zip"),
            format!("{BASE_URL}A2023_Dict.zip")
        ]
    );
}

#[test]
fn keep_staging_leaves_archives_in_place() {
    let client = MockClient::with_files(a2023_files());
    let (_temp, app) = setup(client);
    let options = RunOptions {
        keep_staging: true,
        dry_run: false,
    };

    let report = app.run(&ids(&["A2023"]), options, &NoopSink).unwrap();
    assert!(!report.cleaned);
    let ws = app.workspace();
    assert!(ws.staging_dir(ArchiveClass::Labels).join("A2023_Stata.zip").exists());
    assert!(ws.extract_dir(ArchiveClass::Data).join("a2023.csv").exists());
    assert!(!ws.extract_dir(ArchiveClass::Data).join("a2023_rv.csv").exists());

    app.clean(&NoopSink).unwrap();
    assert!(!ws.root().join("zip").exists());
}

#[test]
fn dry_run_touches_nothing() {
    let client = MockClient::with_files(a2023_files());
    let (_temp, app) = setup(client.clone());
    let options = RunOptions {
        keep_staging: false,
        dry_run: true,
    };

    let report = app.run(&ids(&["A2023"]), options, &NoopSink).unwrap();
    assert_eq!(report.items[0].action, ItemAction::Planned);
    assert_eq!(report.items[0].fetched.len(), 3);
    assert!(client.calls().is_empty());
    assert!(!app.workspace().root().exists());
}

#[test]
fn missing_definitions_fail_at_annotation() {
    let mut files = a2023_files();
    files.insert(
        format!("{BASE_URL}A2023_Stata.zip"),
        zip_bytes(&[("readme.txt", "no do file here")]),
    );
    let client = MockClient::with_files(files);
    let (_temp, app) = setup(client);

    let report = app
        .run(&ids(&["A2023"]), RunOptions::default(), &NoopSink)
        .unwrap();
    let item = &report.items[0];
    assert_eq!(item.action, ItemAction::Failed);
    assert_eq!(item.stage, Some(Stage::Annotate));
    assert!(!app.workspace().artifact_path(&ids(&["A2023"])[0]).exists());
}

#[test]
fn list_and_info_read_back_artifacts() {
    let client = MockClient::with_files(a2023_files());
    let (_temp, app) = setup(client);
    app.run(&ids(&["A2023"]), RunOptions::default(), &NoopSink)
        .unwrap();

    let list = app.list(&NoopSink).unwrap();
    assert_eq!(list.artifacts.len(), 1);
    assert_eq!(list.artifacts[0].identifier, "A2023");
    assert_eq!(list.artifacts[0].rows, 2);
    assert_eq!(list.artifacts[0].columns, 5);
    assert_eq!(list.artifacts[0].labelled_columns, 1);

    let info = app.info(&ids(&["A2023"])[0], &NoopSink).unwrap();
    let level = info.columns.iter().find(|c| c.name == "level").unwrap();
    assert_eq!(level.value_labels, 2);

    let err = app.info(&ids(&["Z2023"])[0], &NoopSink).unwrap_err();
    assert!(matches!(err, LabelerError::ArtifactNotFound(_)));
}

#[test]
fn broken_extraction_fails_only_its_identifier() {
    let mut files = a2023_files();
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .add_directory("c2023.csv/", SimpleFileOptions::default())
        .unwrap();
    writer
        .start_file("c2023_rv.csv", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"UNITID\n1\n").unwrap();
    files.insert(
        format!("{BASE_URL}C2023.zip"),
        writer.finish().unwrap().into_inner(),
    );
    files.insert(
        format!("{BASE_URL}C2023_Stata.zip"),
        zip_bytes(&[("c2023.do", "label variable unitid \"Unit\"\n")]),
    );
    files.insert(
        format!("{BASE_URL}C2023_Dict.zip"),
        zip_bytes(&[("c2023.xlsx", "dictionary")]),
    );
    let client = MockClient::with_files(files);
    let (_temp, app) = setup(client);

    let report = app
        .run(&ids(&["C2023", "A2023"]), RunOptions::default(), &NoopSink)
        .unwrap();

    let c = report.item("C2023").unwrap();
    assert_eq!(c.action, ItemAction::Failed);
    assert_eq!(c.stage, Some(Stage::Extract));
    assert_eq!(
        report.item("A2023").unwrap().action,
        ItemAction::Annotated
    );

    let ws = app.workspace();
    assert!(ws.artifact_path(&ids(&["A2023"])[0]).exists());
    assert!(!ws.artifact_path(&ids(&["C2023"])[0]).exists());
    assert!(report.cleaned);
    assert!(!ws.root().join("zip").exists());
    assert!(!ws.root().join("extract").exists());
}
