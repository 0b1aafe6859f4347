use std::sync::Mutex;

use analyst_models::ToolKind;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::tool::{query_str, Tool};

/// Schema of the market-data cache written by an external data pipeline.
pub const MARKET_DATA_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// One unexpired row of the market-data cache.
#[derive(Debug, Clone)]
pub struct MarketDataRow {
    pub key: String,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub updated_at: String,
}

/// Read-only accessor for the market-data cache.
pub struct MarketDataReader {
    conn: Connection,
}

impl MarketDataReader {
    pub fn open(path: &str) -> Result<Self, ToolError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Writable in-memory database with the schema applied, for seeding in tests.
    pub fn open_in_memory() -> Result<Self, ToolError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MARKET_DATA_DDL)?;
        Ok(Self { conn })
    }

    /// Every unexpired entry for `symbol`, ordered by key.
    pub fn entries_for_symbol(&self, symbol: &str) -> Result<Vec<MarketDataRow>, ToolError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT key, category, value_json, source, updated_at \
             FROM cache_entries WHERE symbol = ?1 AND expires_at > ?2 ORDER BY key",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![symbol, now], |row| {
                Ok(MarketDataRow {
                    key: row.get(0)?,
                    category: row.get(1)?,
                    value_json: row.get(2)?,
                    source: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// `market_data` tool: looks a ticker up in the shared SQLite cache.
///
/// Query: `{"symbol": "ACME"}`. The result lists every unexpired entry for the
/// symbol with its decoded value.
pub struct MarketDataTool {
    reader: Mutex<MarketDataReader>,
}

impl MarketDataTool {
    pub fn new(reader: MarketDataReader) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }

    pub fn open(path: &str) -> Result<Self, ToolError> {
        Ok(Self::new(MarketDataReader::open(path)?))
    }
}

#[async_trait]
impl Tool for MarketDataTool {
    fn kind(&self) -> ToolKind {
        ToolKind::MarketData
    }

    async fn invoke(&self, query: &Value) -> Result<Value, ToolError> {
        let symbol = query_str(&ToolKind::MarketData, query, "symbol")?.to_uppercase();

        let rows = {
            let reader = self
                .reader
                .lock()
                .map_err(|e| ToolError::Unavailable(format!("market data mutex poisoned: {e}")))?;
            reader.entries_for_symbol(&symbol)?
        };

        if rows.is_empty() {
            return Err(ToolError::NoData {
                tool: ToolKind::MarketData,
                query: symbol,
            });
        }
        debug!(symbol = %symbol, entries = rows.len(), "Market data found");

        let entries = rows
            .into_iter()
            .map(|row| {
                Ok(json!({
                    "key": row.key,
                    "category": row.category,
                    "source": row.source,
                    "updated_at": row.updated_at,
                    "value": serde_json::from_str::<Value>(&row.value_json)?,
                }))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        Ok(json!({ "symbol": symbol, "entries": entries }))
    }
}
