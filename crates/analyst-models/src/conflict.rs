use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::claim::ClaimId;

/// How a conflict was settled, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    Unresolved,
    ResolvedByEvidence,
    ResolvedByMajority,
    ResolvedByEscalation,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resolution::Unresolved => "unresolved",
            Resolution::ResolvedByEvidence => "resolved-by-evidence",
            Resolution::ResolvedByMajority => "resolved-by-majority",
            Resolution::ResolvedByEscalation => "resolved-by-escalation",
        };
        f.write_str(s)
    }
}

/// What makes the sides of a conflict mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Opposite directions, e.g. buy vs sell.
    Direction,
    /// Numeric ranges that do not overlap within the tolerance band.
    Value,
}

/// One mutually exclusive position taken on a subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictSide {
    /// Human-readable position, e.g. `bullish` or `10..15 %`.
    pub position: String,
    pub claims: Vec<ClaimId>,
    /// Distinct authoring experts, sorted.
    pub experts: Vec<String>,
    /// Distinct evidence references across the side's claims, excluding
    /// references between claims of the same side.
    pub evidence_count: usize,
    /// Sum of the side's claim confidences.
    pub confidence: Decimal,
}

/// A contradiction found among active claims.
///
/// Conflicts are recomputed from the live active set every time detection
/// runs; they are never stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub subject: String,
    pub kind: ConflictKind,
    pub sides: Vec<ConflictSide>,
    /// Combined confidence of every claim involved.
    pub severity: Decimal,
    /// Most recent round among the involved claims.
    pub round: u32,
    pub resolution: Resolution,
    /// Index into `sides` of the winning side once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<usize>,
}

impl Conflict {
    /// Every claim involved, in side order.
    pub fn claim_ids(&self) -> Vec<ClaimId> {
        self.sides
            .iter()
            .flat_map(|side| side.claims.iter().copied())
            .collect()
    }

    /// Claims on the losing sides. Empty while unresolved.
    pub fn losing_claims(&self) -> Vec<ClaimId> {
        match (self.resolution.is_resolved(), self.winner) {
            (true, Some(winner)) => self
                .sides
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != winner)
                .flat_map(|(_, side)| side.claims.iter().copied())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn involves_expert(&self, expert: &str) -> bool {
        self.sides
            .iter()
            .any(|side| side.experts.iter().any(|e| e == expert))
    }

    /// Mark the conflict settled in favour of `winner`.
    pub fn resolve(&mut self, winner: usize, resolution: Resolution) {
        self.winner = Some(winner);
        self.resolution = resolution;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn side(position: &str, claims: &[u64], experts: &[&str]) -> ConflictSide {
        ConflictSide {
            position: position.to_string(),
            claims: claims.iter().map(|c| ClaimId(*c)).collect(),
            experts: experts.iter().map(|e| e.to_string()).collect(),
            evidence_count: 1,
            confidence: dec!(0.7),
        }
    }

    fn conflict() -> Conflict {
        Conflict {
            subject: "acme".to_string(),
            kind: ConflictKind::Direction,
            sides: vec![
                side("bullish", &[1, 3], &["finance", "industry"]),
                side("bearish", &[2], &["risk"]),
            ],
            severity: dec!(2.1),
            round: 1,
            resolution: Resolution::Unresolved,
            winner: None,
        }
    }

    #[test]
    fn unresolved_has_no_losers() {
        let c = conflict();
        assert_eq!(c.claim_ids(), vec![ClaimId(1), ClaimId(3), ClaimId(2)]);
        assert!(c.losing_claims().is_empty());
    }

    #[test]
    fn resolved_losers_are_other_sides() {
        let mut c = conflict();
        c.resolve(0, Resolution::ResolvedByMajority);
        assert_eq!(c.losing_claims(), vec![ClaimId(2)]);
        assert!(c.involves_expert("risk"));
        assert!(!c.involves_expert("policy"));
    }

    #[test]
    fn resolution_names_are_kebab_case() {
        let json = serde_json::to_string(&Resolution::ResolvedByEvidence).unwrap();
        assert_eq!(json, "\"resolved-by-evidence\"");
        assert_eq!(Resolution::ResolvedByEscalation.to_string(), "resolved-by-escalation");
    }
}
