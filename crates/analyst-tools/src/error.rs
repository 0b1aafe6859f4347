use analyst_models::ToolKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not registered: {0}")]
    NotRegistered(ToolKind),

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: ToolKind, seconds: u64 },

    #[error("{tool} rejected query: {reason}")]
    InvalidQuery { tool: ToolKind, reason: String },

    #[error("{tool} has no data for {query}")]
    NoData { tool: ToolKind, query: String },

    #[error("{tool} failed: {message}")]
    Failed { tool: ToolKind, message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool not available: {0}")]
    Unavailable(String),
}

impl ToolError {
    /// Whether a second attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ToolError::Timeout { .. }
                | ToolError::Failed { .. }
                | ToolError::Io(_)
                | ToolError::Unavailable(_)
        )
    }
}
