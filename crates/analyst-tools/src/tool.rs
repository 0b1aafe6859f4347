use analyst_models::ToolKind;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// An external capability an expert can gather evidence from.
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// Idempotent calls may be retried once and cached.
    fn idempotent(&self) -> bool {
        true
    }

    async fn invoke(&self, query: &Value) -> Result<Value, ToolError>;
}

/// Read a required string field out of a query object.
pub fn query_str<'a>(kind: &ToolKind, query: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    query
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidQuery {
            tool: kind.clone(),
            reason: format!("missing string field '{field}'"),
        })
}
