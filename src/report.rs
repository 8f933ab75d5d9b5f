//! Per-file outcomes collected by every stage and rendered once at the end.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{error::PipelineError, table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scrub,
    Profile,
    Normalize,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Scrub => "scrub",
            Stage::Profile => "profile",
            Stage::Normalize => "normalize",
            Stage::Load => "load",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded { rows: u64, note: Option<String> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: OutcomeStatus,
}

impl FileOutcome {
    pub fn succeeded(path: &Path, rows: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            status: OutcomeStatus::Succeeded { rows, note: None },
        }
    }

    pub fn with_note(mut self, text: impl Into<String>) -> Self {
        if let OutcomeStatus::Succeeded { note, .. } = &mut self.status {
            *note = Some(text.into());
        }
        self
    }

    /// Records the full context chain of `error` against `path`.
    pub fn failed(path: &Path, error: &anyhow::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            status: OutcomeStatus::Failed {
                error: format!("{error:#}"),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded { .. })
    }

    pub fn rows(&self) -> u64 {
        match self.status {
            OutcomeStatus::Succeeded { rows, .. } => rows,
            OutcomeStatus::Failed { .. } => 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed { error } => Some(error),
            OutcomeStatus::Succeeded { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stage: Stage,
    pub outcomes: Vec<FileOutcome>,
}

impl RunReport {
    pub fn new(stage: Stage, outcomes: Vec<FileOutcome>) -> Self {
        Self { stage, outcomes }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn total_rows(&self) -> u64 {
        self.outcomes.iter().map(FileOutcome::rows).sum()
    }

    /// Paths of the files that made it through this stage, in report order.
    pub fn succeeded_paths(&self) -> Vec<PathBuf> {
        self.succeeded().map(|outcome| outcome.path.clone()).collect()
    }

    pub fn render(&self) -> String {
        let headers = vec![
            "file".to_string(),
            "status".to_string(),
            "rows".to_string(),
            "detail".to_string(),
        ];
        let rows = self
            .outcomes
            .iter()
            .map(|outcome| {
                let name = outcome
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| outcome.path.display().to_string());
                match &outcome.status {
                    OutcomeStatus::Succeeded { rows, note } => vec![
                        name,
                        "ok".to_string(),
                        rows.to_string(),
                        note.clone().unwrap_or_default(),
                    ],
                    OutcomeStatus::Failed { error } => {
                        vec![name, "FAILED".to_string(), "-".to_string(), error.clone()]
                    }
                }
            })
            .collect::<Vec<_>>();
        table::render_table(&headers, &rows)
    }

    /// Logs the verdict and turns a failing report into a run-level error.
    pub fn verdict(&self) -> Result<(), PipelineError> {
        for outcome in self.failed() {
            warn!(
                "{} failed for {:?}: {}",
                self.stage,
                outcome.path,
                outcome.error().unwrap_or_default()
            );
        }
        if self.is_success() {
            info!(
                "{} succeeded for {} file(s), {} row(s)",
                self.stage,
                self.total(),
                self.total_rows()
            );
            Ok(())
        } else {
            Err(PipelineError::StageFailed {
                stage: self.stage,
                failed: self.failed_count(),
                total: self.total(),
            })
        }
    }
}
