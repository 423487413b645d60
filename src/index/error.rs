use tantivy::TantivyError;
use tantivy::directory::error::OpenDirectoryError;
use tantivy::query::QueryParserError;
use thiserror::Error;

/// Errors raised by an index backend or the gateway in front of it.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Transient index failure: {0}")]
    Transient(String),

    #[error("Malformed query '{query}': {reason}")]
    MalformedQuery { query: String, reason: String },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Corrupt record {path}: {reason}")]
    CorruptRecord { path: String, reason: String },

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] TantivyError),

    #[error("Directory error: {0}")]
    Directory(#[from] OpenDirectoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by a stream visitor to abandon the stream.
    #[error("{0}")]
    Visitor(String),
}

impl BackendError {
    pub fn malformed(query: &str, err: QueryParserError) -> Self {
        Self::MalformedQuery {
            query: query.to_string(),
            reason: err.to_string(),
        }
    }

    /// Whether retrying the same read could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::MalformedQuery { .. } | Self::UnknownField(_) | Self::Visitor(_)
        )
    }
}

/// Result type for index operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(BackendError::Transient("busy".into()).is_retryable());
        assert!(BackendError::Io(std::io::Error::other("disk")).is_retryable());
        assert!(!BackendError::UnknownField("nope".into()).is_retryable());
        assert!(
            !BackendError::MalformedQuery {
                query: "a:(".into(),
                reason: "syntax".into()
            }
            .is_retryable()
        );
    }
}
