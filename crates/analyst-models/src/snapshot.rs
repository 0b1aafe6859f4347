use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claim::{Claim, ClaimId, ClaimStatus, EvidenceRecord};
use crate::conflict::Conflict;
use crate::question::Question;
use crate::report::{DegradedNote, SessionStatus};

/// Why a claim left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// The author wrote a correcting claim.
    Correction,
    /// Lost a conflict to a side with more independent evidence.
    Evidence,
    /// Lost a conflict to a majority of experts.
    Majority,
    /// Lost a conflict ruled on by the arbiter.
    Escalation,
    /// Withdrawn without replacement.
    Retraction,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::Correction => "correction",
            ChangeReason::Evidence => "evidence",
            ChangeReason::Majority => "majority",
            ChangeReason::Escalation => "escalation",
            ChangeReason::Retraction => "retraction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "correction" => Some(ChangeReason::Correction),
            "evidence" => Some(ChangeReason::Evidence),
            "majority" => Some(ChangeReason::Majority),
            "escalation" => Some(ChangeReason::Escalation),
            "retraction" => Some(ChangeReason::Retraction),
            _ => None,
        }
    }
}

/// A logged status transition of a claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub claim: ClaimId,
    pub from: ClaimStatus,
    pub to: ClaimStatus,
    pub round: u32,
    pub reason: ChangeReason,
}

/// Verbatim serializable form of a claim ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSnapshot {
    pub session_id: Uuid,
    pub current_round: u32,
    pub claims: Vec<Claim>,
    pub evidence: Vec<EvidenceRecord>,
    pub transitions: Vec<StatusChange>,
}

impl LedgerSnapshot {
    pub fn empty(session_id: Uuid) -> Self {
        Self {
            session_id,
            current_round: 0,
            claims: Vec::new(),
            evidence: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn active_claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter().filter(|c| c.status.is_active())
    }
}

/// What happened in one completed round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundRecord {
    pub round: u32,
    pub degraded: Vec<DegradedNote>,
    /// Every conflict found during the round, in the order detection saw them.
    pub conflicts: Vec<Conflict>,
}

/// A session frozen at a terminal state, sufficient to resume it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub question: Question,
    pub status: SessionStatus,
    pub round: u32,
    pub max_rounds: u32,
    pub experts: Vec<String>,
    pub ledger: LedgerSnapshot,
    pub history: Vec<RoundRecord>,
    pub saved_at: DateTime<Utc>,
}
