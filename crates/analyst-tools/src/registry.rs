use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use analyst_models::{ToolKind, ToolsConfig};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::error::ToolError;
use crate::tool::Tool;

/// Uniform entry point to every registered tool.
///
/// Each call is bounded by the call timeout. Idempotent tools get at most one
/// retry on a transient failure, and their successful results are cached.
pub struct ToolRegistry {
    tools: BTreeMap<ToolKind, Arc<dyn Tool>>,
    cache: ResultCache,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(call_timeout: Duration, cache_capacity: u64, cache_ttl: Duration) -> Self {
        Self {
            tools: BTreeMap::new(),
            cache: ResultCache::new(cache_capacity, cache_ttl),
            call_timeout,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            Duration::from_secs(config.call_timeout_seconds),
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_seconds),
        )
    }

    /// Register a tool under its kind, replacing any earlier registration.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let kind = tool.kind();
        if self.tools.insert(kind.clone(), tool).is_some() {
            debug!(tool = %kind, "Replaced tool registration");
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn contains(&self, kind: &ToolKind) -> bool {
        self.tools.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<ToolKind> {
        self.tools.keys().cloned().collect()
    }

    /// Invoke `kind` with `query`, returning its result or a typed error.
    pub async fn invoke(&self, kind: &ToolKind, query: &Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(kind)
            .ok_or_else(|| ToolError::NotRegistered(kind.clone()))?;
        let idempotent = tool.idempotent();
        if idempotent {
            if let Some(hit) = self.cache.lookup(kind, query).await {
                debug!(tool = %kind, "Tool cache hit");
                return Ok(hit);
            }
        }

        let start = Instant::now();
        let result = match self.attempt(tool.as_ref(), kind, query).await {
            Err(e) if idempotent && e.is_transient() => {
                warn!(tool = %kind, error = %e, "Tool call failed, retrying once");
                self.attempt(tool.as_ref(), kind, query).await
            }
            other => other,
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                debug!(tool = %kind, elapsed_ms, "Tool call succeeded");
                if idempotent {
                    self.cache.remember(kind, query, value.clone()).await;
                }
                Ok(value)
            }
            Err(e) => {
                warn!(tool = %kind, elapsed_ms, error = %e, "Tool call failed");
                Err(e)
            }
        }
    }

    async fn attempt(&self, tool: &dyn Tool, kind: &ToolKind, query: &Value) -> Result<Value, ToolError> {
        tokio::time::timeout(self.call_timeout, tool.invoke(query))
            .await
            .map_err(|_| ToolError::Timeout {
                tool: kind.clone(),
                seconds: self.call_timeout.as_secs(),
            })?
    }
}
