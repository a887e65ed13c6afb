use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ipeds_labeler::app::{App, ProgressSink, RunOptions};
use ipeds_labeler::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use ipeds_labeler::domain::DatasetId;
use ipeds_labeler::error::LabelerError;
use ipeds_labeler::fetch::{ArchiveClient, HttpArchiveClient};
use ipeds_labeler::labels::LabelTable;
use ipeds_labeler::output::{JsonOutput, LogSink, OutputMode, TextOutput};
use ipeds_labeler::store::Workspace;

#[derive(Parser)]
#[command(name = "ipeds-labeler")]
#[command(about = "Download IPEDS survey files and attach their variable and value labels")]
#[command(version)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ./ipeds-labeler.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Working directory holding staging, artifacts and dictionaries
    #[arg(long, global = true)]
    workdir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, label and write artifacts for the given datasets
    #[command(alias = "run")]
    Fetch(FetchArgs),
    /// List written artifacts
    List,
    /// Show the columns and labels of one artifact
    Info(InfoArgs),
    /// Parse a label-definitions file and print what was found
    Labels(LabelsArgs),
    /// Remove staging and extraction directories
    Clean,
}

#[derive(Args)]
struct FetchArgs {
    /// Dataset identifiers, e.g. HD2019 EFFY2019 (replaces the config list)
    ids: Vec<String>,

    #[arg(long)]
    base_url: Option<String>,

    /// Pause between downloads in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,

    /// Leave zip and extract directories in place
    #[arg(long)]
    keep_staging: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct InfoArgs {
    id: String,
}

#[derive(Args)]
struct LabelsArgs {
    file: String,
}

/// Placeholder client for commands that never touch the network.
struct OfflineClient;

impl ArchiveClient for OfflineClient {
    fn download(&self, url: &str, _destination: &Path) -> Result<(), LabelerError> {
        Err(LabelerError::Http(format!("offline command cannot fetch {url}")))
    }
}

enum Outcome {
    Done,
    FailedIdentifiers,
}

fn main() -> ExitCode {
    match run() {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::FailedIdentifiers) => ExitCode::from(3),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<LabelerError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &LabelerError) -> u8 {
    match error {
        LabelerError::MissingConfig | LabelerError::ArtifactNotFound(_) => 2,
        err if err.is_network() => 3,
        _ => 1,
    }
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run() -> miette::Result<Outcome> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let sink: &dyn ProgressSink = &LogSink;

    match cli.command {
        Commands::Fetch(args) => {
            let overrides = ConfigOverrides {
                datasets: args.ids,
                base_url: args.base_url,
                workdir: cli.workdir,
                request_pause_ms: args.pause_ms,
            };
            let config = ConfigLoader::resolve_with_overrides(cli.config.as_deref(), overrides)?;
            if config.datasets.is_empty() {
                return Err(LabelerError::MissingConfig.into());
            }
            let client = HttpArchiveClient::new()?;
            let app = build_app(&config, client);
            let options = RunOptions {
                keep_staging: args.keep_staging,
                dry_run: args.dry_run,
            };
            let report = app.run(&config.datasets, options, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_run(&report).into_diagnostic()?,
            }
            if report.failed().is_empty() {
                Ok(Outcome::Done)
            } else {
                Ok(Outcome::FailedIdentifiers)
            }
        }
        Commands::List => {
            let config = offline_config(cli.config.as_deref(), cli.workdir)?;
            let result = build_app(&config, OfflineClient).list(sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_list(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_list(&result).into_diagnostic()?,
            }
            Ok(Outcome::Done)
        }
        Commands::Info(args) => {
            let config = offline_config(cli.config.as_deref(), cli.workdir)?;
            let id: DatasetId = args.id.parse()?;
            let result = build_app(&config, OfflineClient).info(&id, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_info(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_info(&result).into_diagnostic()?,
            }
            Ok(Outcome::Done)
        }
        Commands::Labels(args) => {
            let raw = fs::read(&args.file)
                .map_err(|err| LabelerError::Filesystem(format!("read {}: {err}", args.file)))?;
            let table = LabelTable::parse(&String::from_utf8_lossy(&raw));
            JsonOutput::print_json(&table).into_diagnostic()?;
            Ok(Outcome::Done)
        }
        Commands::Clean => {
            let config = offline_config(cli.config.as_deref(), cli.workdir)?;
            let result = build_app(&config, OfflineClient).clean(sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_clean(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_clean(&result).into_diagnostic()?,
            }
            Ok(Outcome::Done)
        }
    }
}

fn offline_config(path: Option<&str>, workdir: Option<String>) -> Result<ResolvedConfig, LabelerError> {
    ConfigLoader::resolve_with_overrides(
        path,
        ConfigOverrides {
            workdir,
            ..ConfigOverrides::default()
        },
    )
}

fn build_app<C: ArchiveClient>(config: &ResolvedConfig, client: C) -> App<C> {
    App::new(
        Workspace::new(config.workdir.clone()),
        client,
        config.base_url.clone(),
        config.request_pause,
    )
}
