use analyst_ledger::{LedgerError, StoreError};
use analyst_models::{DegradedNote, ErrorKind, LedgerSnapshot, Question, SessionStatus};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("No prompt for domain '{0}'")]
    UnknownDomain(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Partial results of a session that ended `failed`.
#[derive(Debug, Clone, Serialize)]
pub struct FailedSession {
    pub session_id: Uuid,
    pub question: Question,
    pub rounds: u32,
    pub kind: ErrorKind,
    /// Last consistent ledger state. Empty when no expert ever produced a claim.
    pub ledger: LedgerSnapshot,
    pub degraded: Vec<DegradedNote>,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Unknown expert: {0}")]
    UnknownExpert(String),

    #[error("Session {} failed after {} round(s): every expert degraded", .0.session_id, .0.rounds)]
    Failed(Box<FailedSession>),

    #[error("Only exhausted sessions can be resumed (session is {0})")]
    NotResumable(SessionStatus),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Normalized kind for reporting.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SessionError::Failed(failed) => Some(failed.kind),
            _ => None,
        }
    }

    pub fn failed_session(&self) -> Option<&FailedSession> {
        match self {
            SessionError::Failed(failed) => Some(failed),
            _ => None,
        }
    }
}
