use thiserror::Error;

/// Top-level error type for the Scholar system.
///
/// The first three variants are the retrieval engine's public failure modes:
/// a store that cannot be trusted, a call made before any store is ready,
/// and caller input that cannot be served. Everything else is plumbing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScholarError {
    #[error("Corrupt vector store: {0}")]
    CorruptStore(String),

    #[error("Vector store is not loaded")]
    StoreNotLoaded,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Engine state error: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ScholarError {
    /// True for errors caused by caller input rather than server state.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScholarError::InvalidQuery(_))
    }
}

impl From<toml::de::Error> for ScholarError {
    fn from(err: toml::de::Error) -> Self {
        ScholarError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScholarError {
    fn from(err: toml::ser::Error) -> Self {
        ScholarError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScholarError {
    fn from(err: serde_json::Error) -> Self {
        ScholarError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Scholar operations.
pub type Result<T> = std::result::Result<T, ScholarError>;
