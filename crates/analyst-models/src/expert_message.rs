use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claim::{Claim, ClaimDraft};
use crate::conflict::Conflict;
use crate::tool::ToolKind;

/// Outcome of one tool call made while an expert gathered evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { content: serde_json::Value },
    Failed { error: String },
}

/// A tool call result held by an opinion until the ledger records it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolEvidence {
    pub tool: ToolKind,
    pub query: serde_json::Value,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolEvidence {
    pub fn ok(tool: ToolKind, query: serde_json::Value, content: serde_json::Value) -> Self {
        Self {
            tool,
            query,
            outcome: ToolOutcome::Ok { content },
        }
    }

    pub fn failed(tool: ToolKind, query: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            tool,
            query,
            outcome: ToolOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn content(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            ToolOutcome::Ok { content } => Some(content),
            ToolOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OpinionStatus {
    Ok,
    Degraded { reason: String },
}

/// The per-round output of one expert.
///
/// Appended to the claim ledger and then dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpertOpinion {
    pub expert: String,
    pub round: u32,
    /// Self-reported overall confidence for this round.
    pub confidence: Decimal,
    #[serde(default)]
    pub reasoning: String,
    pub claims: Vec<ClaimDraft>,
    /// Tool results gathered this round, addressed by `DraftEvidence::Gathered`.
    #[serde(default)]
    pub evidence: Vec<ToolEvidence>,
    pub status: OpinionStatus,
}

impl ExpertOpinion {
    pub fn new(expert: impl Into<String>, round: u32, confidence: Decimal) -> Self {
        Self {
            expert: expert.into(),
            round,
            confidence,
            reasoning: String::new(),
            claims: Vec::new(),
            evidence: Vec::new(),
            status: OpinionStatus::Ok,
        }
    }

    /// An empty, zero-confidence opinion standing in for a failed expert.
    pub fn degraded(expert: impl Into<String>, round: u32, reason: impl Into<String>) -> Self {
        Self {
            status: OpinionStatus::Degraded {
                reason: reason.into(),
            },
            ..Self::new(expert, round, Decimal::ZERO)
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, OpinionStatus::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match &self.status {
            OpinionStatus::Degraded { reason } => Some(reason),
            OpinionStatus::Ok => None,
        }
    }

    pub fn with_claim(mut self, claim: ClaimDraft) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn with_evidence(mut self, evidence: ToolEvidence) -> Self {
        self.evidence.push(evidence);
        self
    }
}

/// A gathered evidence item as shown to the model, labelled `E1..En`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    pub label: String,
    pub tool: ToolKind,
    pub query: serde_json::Value,
    /// `None` when the tool call failed; the item must not be cited.
    pub content: Option<serde_json::Value>,
}

/// Request handed to an expert's language model (serialized as the user prompt).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpertRequest {
    pub request_id: Uuid,
    pub session_id: Uuid,
    pub round: u32,
    pub question: String,
    pub expert: String,
    pub domain: String,
    /// Active claims visible to every expert so far.
    pub shared_context: Vec<Claim>,
    /// Unresolved contradictions the expert should address.
    pub prior_conflicts: Vec<Conflict>,
    pub evidence: Vec<EvidenceItem>,
}

/// One claim as proposed in the model's JSON reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimProposal {
    pub text: String,
    pub confidence: Decimal,
    #[serde(default)]
    pub topic: Option<String>,
    /// Labels such as `E1` (gathered evidence) or `C4` (an earlier claim).
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Id of the author's own earlier claim this one corrects.
    #[serde(default)]
    pub supersedes: Option<u64>,
}

/// The structured reply parsed from an expert's model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpertResponse {
    pub confidence: Decimal,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub claims: Vec<ClaimProposal>,
}
