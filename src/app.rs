use std::collections::BTreeMap;
use std::fs;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::annotate::{self, AnnotationOutcome, Artifact, Diagnostic};
use crate::domain::{ArchiveClass, DatasetId};
use crate::error::LabelerError;
use crate::fetch::{ArchiveClient, RequestPacer};
use crate::fs_util;
use crate::labels::parse_labels;
use crate::store::{ResolvedDataset, Workspace};
use crate::table::{ColumnKind, RawTable};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub keep_staging: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    Skipped,
    Annotated,
    Failed,
    Planned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Extract,
    Annotate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub identifier: String,
    pub action: ItemAction,
    pub artifact_path: Option<String>,
    pub stage: Option<Stage>,
    pub error: Option<String>,
    pub fetched: Vec<ArchiveClass>,
    pub diagnostics: Vec<Diagnostic>,
    pub outcomes: BTreeMap<String, usize>,
}

impl ItemAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemAction::Skipped => "skipped",
            ItemAction::Annotated => "annotated",
            ItemAction::Failed => "failed",
            ItemAction::Planned => "planned",
        }
    }
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Annotate => "annotate",
        }
    }
}

impl ItemReport {
    fn new(identifier: &DatasetId, action: ItemAction) -> Self {
        Self {
            identifier: identifier.to_string(),
            action,
            artifact_path: None,
            stage: None,
            error: None,
            fetched: Vec::new(),
            diagnostics: Vec::new(),
            outcomes: BTreeMap::new(),
        }
    }

    fn fail(&mut self, stage: Stage, err: &LabelerError) {
        self.action = ItemAction::Failed;
        self.stage = Some(stage);
        self.error = Some(err.to_string());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub items: Vec<ItemReport>,
    pub cleaned: bool,
}

impl RunReport {
    pub fn failed(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| item.action == ItemAction::Failed)
            .map(|item| item.identifier.as_str())
            .collect()
    }

    pub fn item(&self, identifier: &str) -> Option<&ItemReport> {
        self.items.iter().find(|item| item.identifier == identifier)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub artifacts: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub identifier: String,
    pub path: String,
    pub rows: usize,
    pub columns: usize,
    pub labelled_columns: usize,
    pub diagnostics: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub identifier: String,
    pub path: String,
    pub source_file: String,
    pub rows: usize,
    pub columns: Vec<InfoColumn>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoColumn {
    pub name: String,
    pub kind: ColumnKind,
    pub annotation: AnnotationOutcome,
    pub description: Option<String>,
    pub value_labels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanResult {
    pub cleaned: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

#[derive(Clone)]
pub struct App<C: ArchiveClient> {
    workspace: Workspace,
    client: C,
    base_url: String,
    request_pause: Duration,
}

impl<C: ArchiveClient> App<C> {
    pub fn new(
        workspace: Workspace,
        client: C,
        base_url: impl Into<String>,
        request_pause: Duration,
    ) -> Self {
        Self {
            workspace,
            client,
            base_url: base_url.into(),
            request_pause,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Runs the whole pipeline for `ids`: fetch, extract, annotate, clean.
    /// Only setup and cleanup failures abort; anything else fails just the
    /// identifier it belongs to.
    pub fn run(
        &self,
        ids: &[DatasetId],
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, LabelerError> {
        let datasets = ids
            .iter()
            .map(|id| self.workspace.resolve(id, &self.base_url))
            .collect::<Vec<_>>();

        if options.dry_run {
            return Ok(self.plan(&datasets, sink));
        }

        emit(sink, format!("phase=Resolve; {} datasets", datasets.len()));
        self.workspace.ensure_dirs()?;

        let mut reports = Vec::with_capacity(datasets.len());
        let mut pacer = RequestPacer::new(self.request_pause);
        tracing::debug!(pause_ms = pacer.pause().as_millis() as u64, "request pacing");
        for dataset in &datasets {
            reports.push(self.fetch_dataset(dataset, &mut pacer, sink));
        }

        emit(sink, "phase=Extract; unpacking archives".to_string());
        self.extract_all(&datasets, &mut reports);

        for (dataset, report) in datasets.iter().zip(reports.iter_mut()) {
            if report.action != ItemAction::Planned {
                continue;
            }
            emit(sink, format!("phase=Annotate; {}", dataset.id));
            let start = Instant::now();
            match self.annotate_dataset(dataset) {
                Ok(artifact) => {
                    report.action = ItemAction::Annotated;
                    report.artifact_path = Some(dataset.artifact_path.to_string());
                    report.outcomes = outcome_counts(&artifact);
                    report.diagnostics = artifact.diagnostics;
                    sink.event(ProgressEvent {
                        message: format!("annotated {}", dataset.id),
                        elapsed: Some(start.elapsed()),
                    });
                }
                Err(err) => {
                    tracing::error!(identifier = %dataset.id, error = %err, "annotation failed");
                    report.fail(Stage::Annotate, &err);
                }
            }
        }

        let cleaned = !options.keep_staging;
        if cleaned {
            emit(sink, "phase=Clean; removing staging directories".to_string());
            self.workspace.clean_staging()?;
        }

        Ok(RunReport {
            items: reports,
            cleaned,
        })
    }

    pub fn clean(&self, sink: &dyn ProgressSink) -> Result<CleanResult, LabelerError> {
        emit(sink, "phase=Clean; removing staging directories".to_string());
        self.workspace.clean_staging()?;
        Ok(CleanResult { cleaned: true })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, LabelerError> {
        emit(sink, "phase=Resolve; scanning artifacts".to_string());
        let mut artifacts = Vec::new();
        for path in self.workspace.list_artifacts()? {
            let artifact = Artifact::read(&path)?;
            artifacts.push(ListEntry {
                identifier: artifact.identifier.clone(),
                path: path.to_string(),
                rows: artifact.row_count,
                columns: artifact.columns.len(),
                labelled_columns: artifact.outcome_count(AnnotationOutcome::Full),
                diagnostics: artifact.diagnostics.len(),
            });
        }
        Ok(ListResult { artifacts })
    }

    pub fn info(&self, id: &DatasetId, sink: &dyn ProgressSink) -> Result<InfoResult, LabelerError> {
        emit(sink, format!("phase=Resolve; looking up {id}"));
        let path = self.workspace.artifact_path(id);
        let artifact = Artifact::read(&path)?;
        Ok(InfoResult {
            identifier: artifact.identifier,
            path: path.to_string(),
            source_file: artifact.source_file,
            rows: artifact.row_count,
            columns: artifact
                .columns
                .into_iter()
                .map(|column| InfoColumn {
                    name: column.name,
                    kind: column.kind,
                    annotation: column.annotation,
                    description: column.description,
                    value_labels: column.value_labels.len(),
                })
                .collect(),
            diagnostics: artifact.diagnostics,
        })
    }

    fn plan(&self, datasets: &[ResolvedDataset], sink: &dyn ProgressSink) -> RunReport {
        let items = datasets
            .iter()
            .map(|dataset| {
                if self.workspace.exists(&dataset.artifact_path) {
                    let mut item = ItemReport::new(&dataset.id, ItemAction::Skipped);
                    item.artifact_path = Some(dataset.artifact_path.to_string());
                    return item;
                }
                let mut item = ItemReport::new(&dataset.id, ItemAction::Planned);
                for target in &dataset.archives {
                    if !self.workspace.exists(&target.staging_path) {
                        emit(sink, format!("would fetch {}", target.url));
                        item.fetched.push(target.class);
                    }
                }
                item.artifact_path = Some(dataset.artifact_path.to_string());
                item
            })
            .collect();
        RunReport {
            items,
            cleaned: false,
        }
    }

    fn fetch_dataset(
        &self,
        dataset: &ResolvedDataset,
        pacer: &mut RequestPacer,
        sink: &dyn ProgressSink,
    ) -> ItemReport {
        emit(sink, format!("phase=Fetch; {}", dataset.id));
        if self.workspace.exists(&dataset.artifact_path) {
            emit(sink, format!("{} already annotated", dataset.id));
            let mut item = ItemReport::new(&dataset.id, ItemAction::Skipped);
            item.artifact_path = Some(dataset.artifact_path.to_string());
            return item;
        }

        let mut item = ItemReport::new(&dataset.id, ItemAction::Planned);
        for target in &dataset.archives {
            if self.workspace.exists(&target.staging_path) {
                tracing::debug!(identifier = %dataset.id, class = %target.class, "archive already staged");
                continue;
            }
            let start = Instant::now();
            let result = pacer.run(|| {
                self.client
                    .download(&target.url, target.staging_path.as_std_path())
            });
            match result {
                Ok(()) => {
                    sink.event(ProgressEvent {
                        message: format!("fetched {}", target.url),
                        elapsed: Some(start.elapsed()),
                    });
                    item.fetched.push(target.class);
                }
                Err(err) => {
                    tracing::error!(
                        identifier = %dataset.id,
                        class = %target.class,
                        url = %target.url,
                        error = %err,
                        "fetch failed"
                    );
                    item.fail(Stage::Fetch, &err);
                    break;
                }
            }
        }
        item
    }

    fn extract_all(&self, datasets: &[ResolvedDataset], reports: &mut [ItemReport]) {
        for (dataset, report) in datasets.iter().zip(reports.iter_mut()) {
            if report.action != ItemAction::Planned {
                continue;
            }
            if let Err(err) = self.extract_dataset(dataset) {
                tracing::error!(identifier = %dataset.id, error = %err, "extraction failed");
                report.fail(Stage::Extract, &err);
            }
        }
    }

    /// Unpacks one identifier's archives, promotes its revised data files and
    /// copies its dictionary files out of staging.
    fn extract_dataset(&self, dataset: &ResolvedDataset) -> Result<(), LabelerError> {
        for target in &dataset.archives {
            let dest = self.workspace.extract_dir(target.class);
            let files = fs_util::extract_zip(&target.staging_path, &dest)?;
            if target.class == ArchiveClass::Dictionary {
                let dictionary_dir = self.workspace.dictionary_dir();
                let copied = fs_util::copy_files(&dest, &files, &dictionary_dir)?;
                tracing::debug!(identifier = %dataset.id, copied, "dictionary files copied");
            }
        }

        let data_dir = self.workspace.extract_dir(ArchiveClass::Data);
        for canonical in fs_util::reconcile_revisions(&data_dir, &dataset.id.file_stem())? {
            tracing::info!(identifier = %dataset.id, file = %canonical, "using revised data file");
        }
        Ok(())
    }

    fn annotate_dataset(&self, dataset: &ResolvedDataset) -> Result<Artifact, LabelerError> {
        let stem = dataset.id.file_stem();
        let data_dir = self.workspace.extract_dir(ArchiveClass::Data);
        let labels_dir = self.workspace.extract_dir(ArchiveClass::Labels);

        let data_path = fs_util::find_file(&data_dir, &stem, "csv")?.ok_or_else(|| {
            LabelerError::MissingExtracted {
                kind: "data".to_string(),
                identifier: dataset.id.to_string(),
                dir: data_dir.to_string(),
            }
        })?;
        let labels_path = fs_util::find_file(&labels_dir, &stem, "do")?.ok_or_else(|| {
            LabelerError::MissingExtracted {
                kind: "label definitions".to_string(),
                identifier: dataset.id.to_string(),
                dir: labels_dir.to_string(),
            }
        })?;

        let raw = fs::read(labels_path.as_std_path())
            .map_err(|err| LabelerError::Filesystem(format!("read {labels_path}: {err}")))?;
        let table = RawTable::read_csv(&data_path)?;
        let labels = parse_labels(&String::from_utf8_lossy(&raw), &table.column_names());
        tracing::debug!(
            identifier = %dataset.id,
            rows = table.row_count,
            columns = table.columns.len(),
            declared_fields = labels
                .iter()
                .filter(|(_, field)| field.description.is_some() || !field.value_labels.is_empty())
                .count(),
            "loaded raw table"
        );

        let source_file = data_path.file_name().unwrap_or(data_path.as_str());
        let artifact = annotate::annotate(&dataset.id, source_file, table, &labels);
        artifact.write(&dataset.artifact_path)?;
        Ok(artifact)
    }
}

fn outcome_counts(artifact: &Artifact) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for column in &artifact.columns {
        *counts.entry(column.annotation.to_string()).or_insert(0) += 1;
    }
    counts
}
