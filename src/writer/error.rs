use std::error::Error as _;
use std::path::PathBuf;
use thiserror::Error;

/// Per-item failures raised while building a document.
///
/// The engine turns these into error documents instead of failing the pass.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Document {path} rejected: {reason}")]
    Rejected { path: PathBuf, reason: String },

    #[error("Invalid writer configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl WriterError {
    /// Short tag stored as the record's error kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Parse { .. } => "parse",
            Self::Rejected { .. } => "rejected",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }

    /// The error and its source chain, one cause per line.
    pub fn detail(&self) -> String {
        let mut detail = format!("{self:?}");
        let mut source = self.source();
        while let Some(cause) = source {
            detail.push_str(&format!("\ncaused by: {cause}"));
            source = cause.source();
        }
        detail
    }
}

pub type WriterResult<T> = Result<T, WriterError>;
