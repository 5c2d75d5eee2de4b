use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the publisher and importer stages.
///
/// Per-line problems in the training file are never errors; they are passed
/// through. The variants here are the conditions that abort a run.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The flat turns list was empty, so nothing can be published or aligned.
    #[error("flat turns list is empty; cannot align edits to the training file")]
    EmptyTurns,

    /// Both the direct export and the export-job fallback failed.
    #[error("no export could be retrieved for project {project_id}")]
    ExportUnavailable { project_id: u64 },

    /// A training line does not carry the user prompt of the turn it is aligned with.
    #[error("training line {line} does not match flat turn {turn_id} (user prompt differs)")]
    Misaligned { line: usize, turn_id: u64 },

    /// The corrected copy would replace the training file it is read from.
    #[error("output {} is the training input; the original file is never overwritten", path.display())]
    InPlaceOutput { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("annotation service returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl BridgeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BridgeError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
