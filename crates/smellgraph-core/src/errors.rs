//! Error types for the smellgraph core library.

/// Top-level error enum for the smellgraph core library.
#[derive(Debug, thiserror::Error)]
pub enum SmellError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Graph write error: {0}")]
    GraphWrite(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SmellError {
    /// Wrap a store failure raised while mutating the graph.
    pub fn graph_write(err: impl std::fmt::Display) -> Self {
        SmellError::GraphWrite(err.to_string())
    }

    /// Wrap a store failure raised while reading the graph.
    pub fn query(err: impl std::fmt::Display) -> Self {
        SmellError::Query(err.to_string())
    }
}

pub type SmellResult<T> = Result<T, SmellError>;
