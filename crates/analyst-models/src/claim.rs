use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tool::ToolKind;

/// Position of a claim in the session's append-only claim sequence (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub u64);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Position of a tool result in the session's append-only evidence sequence (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(pub u64);

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Superseded,
    Retracted,
}

impl ClaimStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ClaimStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Active => "active",
            ClaimStatus::Superseded => "superseded",
            ClaimStatus::Retracted => "retracted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ClaimStatus::Active),
            "superseded" => Some(ClaimStatus::Superseded),
            "retracted" => Some(ClaimStatus::Retracted),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provenance link from a claim to something that existed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EvidenceRef {
    Tool(EvidenceId),
    Claim(ClaimId),
}

impl fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceRef::Tool(id) => fmt::Display::fmt(id, f),
            EvidenceRef::Claim(id) => fmt::Display::fmt(id, f),
        }
    }
}

/// A single atomic assertion recorded in the claim ledger.
///
/// Claims are never edited in place. The only mutable field is `status`, and
/// it only ever moves away from `Active`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub id: ClaimId,
    pub expert: String,
    pub round: u32,
    pub text: String,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    /// Subject hint supplied by the expert, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub evidence: Vec<EvidenceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<ClaimId>,
    pub status: ClaimStatus,
}

/// A tool result recorded as evidence backing a claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceRecord {
    pub id: EvidenceId,
    pub tool: ToolKind,
    pub expert: String,
    pub round: u32,
    pub query: serde_json::Value,
    pub content: serde_json::Value,
}

/// Evidence cited by a claim that has not been written to the ledger yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DraftEvidence {
    /// Index into the owning opinion's gathered tool evidence.
    Gathered(usize),
    /// A claim already in the ledger.
    Claim(ClaimId),
}

/// A claim as produced by an expert, before the ledger assigns its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimDraft {
    pub text: String,
    pub confidence: Decimal,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub evidence: Vec<DraftEvidence>,
    #[serde(default)]
    pub supersedes: Option<ClaimId>,
}

impl ClaimDraft {
    pub fn new(text: impl Into<String>, confidence: Decimal) -> Self {
        Self {
            text: text.into(),
            confidence,
            topic: None,
            evidence: Vec::new(),
            supersedes: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_evidence(mut self, evidence: DraftEvidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn superseding(mut self, id: ClaimId) -> Self {
        self.supersedes = Some(id);
        self
    }
}
