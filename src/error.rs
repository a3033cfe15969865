use thiserror::Error;

/// Fatal failures of an ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error for '{path}': {message}")]
    Source { path: String, message: String },

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Commit failed after {committed} of {total} chunks: {source}")]
    Commit {
        committed: usize,
        total: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    pub fn source_error(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        IngestError::Source {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Process exit code reported by the CLI for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestError::Config(_) => 2,
            IngestError::Source { .. } => 3,
            IngestError::Store(_) | IngestError::Commit { .. } => 4,
        }
    }
}

/// Reasons a single source row is skipped. Never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("no location in any of the name columns")]
    MissingLocation,

    #[error("mean value '{0}' is not a finite number")]
    InvalidScore(String),

    #[error("malformed record: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_non_zero_and_distinct() {
        let config = IngestError::Config("AQ_S3_BUCKET must be set".to_string());
        let source = IngestError::source_error("missing.csv", "No such file");
        let commit = IngestError::Commit {
            committed: 0,
            total: 1,
            source: anyhow::anyhow!("rejected"),
        };

        assert_eq!(config.exit_code(), 2);
        assert_eq!(source.exit_code(), 3);
        assert_eq!(commit.exit_code(), 4);
    }

    #[test]
    fn test_source_error_message_names_path() {
        let err = IngestError::source_error("data/x.csv", "No such file");
        assert_eq!(err.to_string(), "Source error for 'data/x.csv': No such file");
    }
}
