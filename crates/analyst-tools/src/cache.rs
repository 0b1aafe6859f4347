use std::time::Duration;

use analyst_models::ToolKind;
use moka::future::Cache;
use serde_json::Value;

/// Results of idempotent tool calls, keyed by tool and canonical query text.
///
/// `serde_json` keeps object keys sorted, so queries that differ only in
/// field order share an entry. Entries expire after the TTL.
pub struct ResultCache {
    entries: Cache<(ToolKind, String), Value>,
}

impl ResultCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn lookup(&self, tool: &ToolKind, query: &Value) -> Option<Value> {
        self.entries.get(&(tool.clone(), query.to_string())).await
    }

    pub async fn remember(&self, tool: &ToolKind, query: &Value, result: Value) {
        self.entries
            .insert((tool.clone(), query.to_string()), result)
            .await;
    }
}
