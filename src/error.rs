//! Run-level failures.
//!
//! File-level problems never surface here: they are captured as
//! [`crate::report::OutcomeStatus::Failed`] entries and the stage moves on.
//! The variants below are the conditions that stop a whole run.

use std::path::PathBuf;

use thiserror::Error;

use crate::report::Stage;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A header could not be read, so the canonical schema cannot be trusted.
    #[error("Schema discovery failed for {path:?}: {message}")]
    Discovery { path: PathBuf, message: String },

    /// The input directory holds no CSV files.
    #[error("No CSV files found in {0:?}")]
    EmptyCorpus(PathBuf),

    /// An existing table does not match the shape derived from the normalized files.
    #[error(
        "Table '{table}' exists with columns [{existing}] but the normalized files carry [{expected}]; rerun with --drop-existing to recreate it"
    )]
    TableShape {
        table: String,
        existing: String,
        expected: String,
    },

    /// One or more files failed during a stage.
    #[error("{stage} finished with {failed} of {total} file(s) failing")]
    StageFailed {
        stage: Stage,
        failed: usize,
        total: usize,
    },
}

impl PipelineError {
    pub fn discovery(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PipelineError::Discovery {
            path: path.into(),
            message: message.into(),
        }
    }
}
