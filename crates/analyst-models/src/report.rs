use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claim::{ClaimId, EvidenceRef};
use crate::conflict::Conflict;
use crate::question::Question;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Lifecycle state of a session. `Running` is the only non-terminal state
/// visible outside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Converged,
    Exhausted,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Converged => "converged",
            SessionStatus::Exhausted => "exhausted",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "converged" => Some(SessionStatus::Converged),
            "exhausted" => Some(SessionStatus::Exhausted),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized failure categories. Only `SessionFailed` is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExpertDegraded,
    ToolError,
    ConflictUnresolved,
    SessionFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ExpertDegraded => "expert_degraded",
            ErrorKind::ToolError => "tool_error",
            ErrorKind::ConflictUnresolved => "conflict_unresolved",
            ErrorKind::SessionFailed => "session_failed",
        };
        f.write_str(s)
    }
}

/// A contained failure surfaced in the report rather than raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DegradedNote {
    pub expert: String,
    pub round: u32,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportClaim {
    pub id: ClaimId,
    pub round: u32,
    pub text: String,
    pub confidence: Decimal,
    pub evidence: Vec<EvidenceRef>,
}

/// Active claims of one expert, highest confidence first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpertGroup {
    pub expert: String,
    pub claims: Vec<ReportClaim>,
}

/// One row of the structured claims table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimRow {
    pub id: ClaimId,
    pub expert: String,
    pub round: u32,
    pub confidence: Decimal,
    pub evidence_count: usize,
    pub text: String,
}

/// The converged (or exhausted) answer of a session.
///
/// Read-only once built; this is the only artifact export plugins see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalReport {
    pub schema_version: u32,
    pub session_id: Uuid,
    pub question: Question,
    pub status: SessionStatus,
    pub converged: bool,
    pub rounds: u32,
    pub narrative: String,
    pub groups: Vec<ExpertGroup>,
    pub table: Vec<ClaimRow>,
    /// Contradictions still open among the active claims (empty when converged).
    pub unresolved_conflicts: Vec<Conflict>,
    /// Contradictions settled during the session, in the order they were settled.
    pub resolved_conflicts: Vec<Conflict>,
    pub degraded: Vec<DegradedNote>,
    pub generated_at: DateTime<Utc>,
}

impl FinalReport {
    pub fn claim_count(&self) -> usize {
        self.table.len()
    }

    pub fn group(&self, expert: &str) -> Option<&ExpertGroup> {
        self.groups.iter().find(|g| g.expert == expert)
    }
}
