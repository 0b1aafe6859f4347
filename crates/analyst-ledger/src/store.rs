use std::str::FromStr;

use analyst_models::{
    ChangeReason, Claim, ClaimId, ClaimStatus, EvidenceId, EvidenceRecord, LedgerSnapshot,
    Question, SessionSnapshot, SessionStatus, StatusChange, ToolKind,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::ledger::validate_snapshot;

/// SQL DDL for the session store.
pub const SESSION_STORE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id          TEXT PRIMARY KEY NOT NULL,
    question    TEXT NOT NULL,
    status      TEXT NOT NULL,
    round       INTEGER NOT NULL,
    max_rounds  INTEGER NOT NULL,
    experts     TEXT NOT NULL,
    history     TEXT NOT NULL,
    saved_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS claims (
    session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    id          INTEGER NOT NULL,
    expert      TEXT NOT NULL,
    round       INTEGER NOT NULL,
    text        TEXT NOT NULL,
    confidence  TEXT NOT NULL,
    topic       TEXT,
    evidence    TEXT NOT NULL,
    supersedes  INTEGER,
    status      TEXT NOT NULL,
    PRIMARY KEY (session_id, id)
);

CREATE TABLE IF NOT EXISTS evidence (
    session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    id          INTEGER NOT NULL,
    tool        TEXT NOT NULL,
    expert      TEXT NOT NULL,
    round       INTEGER NOT NULL,
    query       TEXT NOT NULL,
    content     TEXT NOT NULL,
    PRIMARY KEY (session_id, id)
);

CREATE TABLE IF NOT EXISTS status_changes (
    session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    seq         INTEGER NOT NULL,
    claim       INTEGER NOT NULL,
    from_status TEXT NOT NULL,
    to_status   TEXT NOT NULL,
    round       INTEGER NOT NULL,
    reason      TEXT NOT NULL,
    PRIMARY KEY (session_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_sessions_saved_at ON sessions(saved_at);
"#;

/// One line of the session listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub question: String,
    pub status: SessionStatus,
    pub round: u32,
    pub max_rounds: u32,
    pub saved_at: DateTime<Utc>,
}

/// SQLite persistence for terminal sessions.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the store at `path`. Enables WAL mode.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SESSION_STORE_DDL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SESSION_STORE_DDL)?;
        Ok(Self { conn })
    }

    /// Persist a session, replacing any earlier save of the same id.
    pub fn save(&mut self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let id = snapshot.session_id.to_string();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO sessions \
             (id, question, status, round, max_rounds, experts, history, saved_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                serde_json::to_string(&snapshot.question)?,
                snapshot.status.as_str(),
                snapshot.round,
                snapshot.max_rounds,
                serde_json::to_string(&snapshot.experts)?,
                serde_json::to_string(&snapshot.history)?,
                snapshot.saved_at.to_rfc3339(),
            ],
        )?;
        write_ledger(&tx, &id, &snapshot.ledger)?;
        tx.commit()?;

        debug!(
            session_id = %snapshot.session_id,
            claims = snapshot.ledger.claims.len(),
            "Session saved"
        );
        Ok(())
    }

    /// Load a saved session. The ledger is re-validated before it is returned.
    pub fn load(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>, StoreError> {
        let id = session_id.to_string();
        let header = self
            .conn
            .query_row(
                "SELECT question, status, round, max_rounds, experts, history, saved_at \
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((question, status, round, max_rounds, experts, history, saved_at)) = header else {
            return Ok(None);
        };

        let question: Question = serde_json::from_str(&question)?;
        let status = SessionStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown session status '{status}'")))?;
        let ledger = LedgerSnapshot {
            session_id,
            current_round: round,
            claims: self.read_claims(&id)?,
            evidence: self.read_evidence(&id)?,
            transitions: self.read_transitions(&id)?,
        };
        validate_snapshot(&ledger)?;

        Ok(Some(SessionSnapshot {
            session_id,
            question,
            status,
            round,
            max_rounds,
            experts: serde_json::from_str(&experts)?,
            ledger,
            history: serde_json::from_str(&history)?,
            saved_at: parse_time(&saved_at)?,
        }))
    }

    /// All saved sessions, most recent first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, question, status, round, max_rounds, saved_at \
             FROM sessions ORDER BY saved_at DESC, id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, question, status, round, max_rounds, saved_at)| {
                let question: Question = serde_json::from_str(&question)?;
                Ok(SessionSummary {
                    session_id: parse_uuid(&id)?,
                    question: question.text,
                    status: SessionStatus::parse(&status)
                        .ok_or_else(|| StoreError::Corrupt(format!("unknown session status '{status}'")))?,
                    round,
                    max_rounds,
                    saved_at: parse_time(&saved_at)?,
                })
            })
            .collect()
    }

    /// Remove a session and its ledger. Returns whether anything was deleted.
    pub fn delete(&mut self, session_id: Uuid) -> Result<bool, StoreError> {
        let id = session_id.to_string();
        let tx = self.conn.transaction()?;
        clear_ledger(&tx, &id)?;
        let deleted = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn read_claims(&self, id: &str) -> Result<Vec<Claim>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, expert, round, text, confidence, topic, evidence, supersedes, status \
             FROM claims WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(cid, expert, round, text, confidence, topic, evidence, supersedes, status)| {
                Ok(Claim {
                    id: ClaimId(to_id(cid)?),
                    expert,
                    round,
                    text,
                    confidence: Decimal::from_str(&confidence)
                        .map_err(|e| StoreError::Corrupt(format!("confidence '{confidence}': {e}")))?,
                    topic,
                    evidence: serde_json::from_str(&evidence)?,
                    supersedes: supersedes.map(to_id).transpose()?.map(ClaimId),
                    status: parse_status(&status)?,
                })
            })
            .collect()
    }

    fn read_evidence(&self, id: &str) -> Result<Vec<EvidenceRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, tool, expert, round, query, content \
             FROM evidence WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(eid, tool, expert, round, query, content)| {
                Ok(EvidenceRecord {
                    id: EvidenceId(to_id(eid)?),
                    tool: ToolKind::from_str(&tool)
                        .map_err(|e| StoreError::Corrupt(format!("tool '{tool}': {e}")))?,
                    expert,
                    round,
                    query: serde_json::from_str(&query)?,
                    content: serde_json::from_str(&content)?,
                })
            })
            .collect()
    }

    fn read_transitions(&self, id: &str) -> Result<Vec<StatusChange>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT claim, from_status, to_status, round, reason \
             FROM status_changes WHERE session_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(claim, from, to, round, reason)| {
                Ok(StatusChange {
                    claim: ClaimId(to_id(claim)?),
                    from: parse_status(&from)?,
                    to: parse_status(&to)?,
                    round,
                    reason: ChangeReason::parse(&reason)
                        .ok_or_else(|| StoreError::Corrupt(format!("unknown reason '{reason}'")))?,
                })
            })
            .collect()
    }
}

fn clear_ledger(tx: &Transaction<'_>, id: &str) -> Result<(), StoreError> {
    tx.execute("DELETE FROM claims WHERE session_id = ?1", params![id])?;
    tx.execute("DELETE FROM evidence WHERE session_id = ?1", params![id])?;
    tx.execute("DELETE FROM status_changes WHERE session_id = ?1", params![id])?;
    Ok(())
}

fn write_ledger(tx: &Transaction<'_>, id: &str, ledger: &LedgerSnapshot) -> Result<(), StoreError> {
    clear_ledger(tx, id)?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO evidence (session_id, id, tool, expert, round, query, content) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for record in &ledger.evidence {
            stmt.execute(params![
                id,
                from_id(record.id.0)?,
                record.tool.to_string(),
                record.expert,
                record.round,
                serde_json::to_string(&record.query)?,
                serde_json::to_string(&record.content)?,
            ])?;
        }
    }
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO claims \
             (session_id, id, expert, round, text, confidence, topic, evidence, supersedes, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for claim in &ledger.claims {
            stmt.execute(params![
                id,
                from_id(claim.id.0)?,
                claim.expert,
                claim.round,
                claim.text,
                claim.confidence.to_string(),
                claim.topic,
                serde_json::to_string(&claim.evidence)?,
                claim.supersedes.map(|c| from_id(c.0)).transpose()?,
                claim.status.as_str(),
            ])?;
        }
    }
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO status_changes \
             (session_id, seq, claim, from_status, to_status, round, reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (seq, change) in ledger.transitions.iter().enumerate() {
            stmt.execute(params![
                id,
                seq as i64,
                from_id(change.claim.0)?,
                change.from.as_str(),
                change.to.as_str(),
                change.round,
                change.reason.as_str(),
            ])?;
        }
    }
    Ok(())
}

fn from_id(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Corrupt(format!("id {id} out of range")))
}

fn to_id(id: i64) -> Result<u64, StoreError> {
    u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative id {id}")))
}

fn parse_status(s: &str) -> Result<ClaimStatus, StoreError> {
    ClaimStatus::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown claim status '{s}'")))
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("session id '{s}': {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{s}': {e}")))
}
