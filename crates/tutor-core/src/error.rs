use thiserror::Error;

/// Top-level error type for the tutor retrieval engine.
///
/// Extraction errors are recovered per file by the loader and only logged
/// (as a skip reason); configuration errors are fatal at construction; embedding
/// errors at query time are surfaced to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TutorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction failed for {source_id}: {reason}")]
    Extraction { source_id: String, reason: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TutorError {
    /// Shorthand for an extraction failure on one corpus file.
    pub fn extraction(source_id: impl Into<String>, reason: impl ToString) -> Self {
        TutorError::Extraction {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for TutorError {
    fn from(err: toml::de::Error) -> Self {
        TutorError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TutorError {
    fn from(err: toml::ser::Error) -> Self {
        TutorError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TutorError {
    fn from(err: serde_json::Error) -> Self {
        TutorError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for tutor operations.
pub type Result<T> = std::result::Result<T, TutorError>;
