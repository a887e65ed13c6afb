use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    CleanResult, InfoResult, ItemAction, ListResult, ProgressEvent, ProgressSink, RunReport,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clean(result: &CleanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain-text summaries for a terminal.
pub struct TextOutput;

impl TextOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        let mut stdout = io::stdout();
        for item in &result.items {
            match item.action {
                ItemAction::Failed => writeln!(
                    stdout,
                    "{:<16} failed    {}: {}",
                    item.identifier,
                    item.stage.map(|stage| stage.as_str()).unwrap_or("-"),
                    item.error.as_deref().unwrap_or("unknown error")
                )?,
                action => writeln!(
                    stdout,
                    "{:<16} {:<9} {} ({} diagnostics)",
                    item.identifier,
                    action.as_str(),
                    item.artifact_path.as_deref().unwrap_or("-"),
                    item.diagnostics.len()
                )?,
            }
        }
        let failed = result.failed();
        if !failed.is_empty() {
            writeln!(stdout, "failed: {}", failed.join(", "))?;
        }
        Ok(())
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        for entry in &result.artifacts {
            writeln!(
                stdout,
                "{:<16} rows={:<8} columns={:<5} labelled={:<5} diagnostics={}",
                entry.identifier, entry.rows, entry.columns, entry.labelled_columns, entry.diagnostics
            )?;
        }
        Ok(())
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(
            stdout,
            "{} ({}, {} rows) {}",
            result.identifier, result.source_file, result.rows, result.path
        )?;
        for column in &result.columns {
            writeln!(
                stdout,
                "  {:<20} {:<16} labels={:<4} {}",
                column.name,
                column.annotation,
                column.value_labels,
                column.description.as_deref().unwrap_or("")
            )?;
        }
        for diagnostic in &result.diagnostics {
            writeln!(stdout, "  ! {} {}", diagnostic.field, diagnostic.condition)?;
        }
        Ok(())
    }

    pub fn print_clean(result: &CleanResult) -> io::Result<()> {
        writeln!(io::stdout(), "cleaned: {}", result.cleaned)
    }
}

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}
