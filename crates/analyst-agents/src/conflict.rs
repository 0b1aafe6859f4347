use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use analyst_models::{
    Claim, ClaimId, Conflict, ConflictKind, ConflictSide, DetectorConfig, EvidenceRef, Resolution,
};
use rust_decimal::Decimal;

use crate::topic::{
    stance, value_range, KeywordNormalizer, Stance, SubjectNormalizer, Unit, ValueRange,
};

/// Finds contradictions among active claims and applies the automatic
/// resolution policy (evidence dominance, then majority).
///
/// Pure: the same claims always produce the same conflicts in the same order.
#[derive(Clone)]
pub struct ConflictDetector {
    normalizer: Arc<dyn SubjectNormalizer>,
    tolerance: Decimal,
}

impl ConflictDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            normalizer: Arc::new(KeywordNormalizer::new(config.subject_max_tokens)),
            tolerance: config.numeric_tolerance.max(Decimal::ZERO),
        }
    }

    /// Swap the subject normalization strategy.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn SubjectNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Conflicts among the active claims, all `unresolved`, most severe first.
    pub fn find_conflicts(&self, claims: &[Claim]) -> Vec<Conflict> {
        let mut by_subject: BTreeMap<String, Vec<&Claim>> = BTreeMap::new();
        for claim in claims.iter().filter(|c| c.status.is_active()) {
            if let Some(subject) = self.normalizer.subject(claim) {
                by_subject.entry(subject).or_default().push(claim);
            }
        }

        let mut conflicts = Vec::new();
        for (subject, mut group) in by_subject {
            group.sort_by_key(|c| c.id);
            if let Some(conflict) = direction_conflict(&subject, &group) {
                conflicts.push(conflict);
            } else {
                conflicts.extend(self.value_conflicts(&subject, &group));
            }
        }

        conflicts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.round.cmp(&a.round))
                .then_with(|| a.subject.cmp(&b.subject))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        conflicts
    }

    /// Apply evidence dominance, then majority. Leaves the conflict unresolved
    /// when neither decides it.
    pub fn resolve(&self, conflict: &mut Conflict) {
        if conflict.resolution.is_resolved() {
            return;
        }
        if let Some(winner) = evidence_winner(&conflict.sides) {
            conflict.resolve(winner, Resolution::ResolvedByEvidence);
        } else if let Some(winner) = majority_winner(&conflict.sides) {
            conflict.resolve(winner, Resolution::ResolvedByMajority);
        }
    }

    /// Detect and resolve in one pass.
    pub fn analyze(&self, claims: &[Claim]) -> Vec<Conflict> {
        let mut conflicts = self.find_conflicts(claims);
        for conflict in &mut conflicts {
            self.resolve(conflict);
        }
        conflicts
    }

    fn value_conflicts(&self, subject: &str, group: &[&Claim]) -> Vec<Conflict> {
        let mut by_unit: BTreeMap<Unit, Vec<(&Claim, Decimal, Decimal)>> = BTreeMap::new();
        for claim in group {
            if let Some(range) = value_range(&claim.text) {
                by_unit
                    .entry(range.unit)
                    .or_default()
                    .push((*claim, range.low, range.high));
            }
        }

        let mut conflicts = Vec::new();
        for (unit, mut ranges) in by_unit {
            ranges.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));

            let mut clusters: Vec<(Decimal, Vec<(&Claim, Decimal, Decimal)>)> = Vec::new();
            for (claim, low, high) in ranges {
                // Saturating: claim text and tolerance are both unbounded input.
                let band_low = low.saturating_sub(self.tolerance.saturating_mul(low.abs()));
                let band_high = high.saturating_add(self.tolerance.saturating_mul(high.abs()));
                match clusters.last_mut() {
                    Some((reach, members)) if band_low <= *reach => {
                        *reach = (*reach).max(band_high);
                        members.push((claim, low, high));
                    }
                    _ => clusters.push((band_high, vec![(claim, low, high)])),
                }
            }
            if clusters.len() < 2 {
                continue;
            }

            let sides: Vec<ConflictSide> = clusters
                .iter()
                .map(|(_, members)| {
                    let low = members.iter().map(|m| m.1).min().unwrap_or_default();
                    let high = members.iter().map(|m| m.2).max().unwrap_or_default();
                    let position = ValueRange { low, high, unit }.to_string();
                    let claims: Vec<&Claim> = members.iter().map(|m| m.0).collect();
                    build_side(position, &claims)
                })
                .collect();
            let round = clusters
                .iter()
                .flat_map(|(_, members)| members.iter().map(|m| m.0.round))
                .max()
                .unwrap_or_default();
            if let Some(conflict) = build_conflict(subject, ConflictKind::Value, sides, round) {
                conflicts.push(conflict);
            }
        }
        conflicts
    }
}

fn direction_conflict(subject: &str, group: &[&Claim]) -> Option<Conflict> {
    let mut bullish = Vec::new();
    let mut bearish = Vec::new();
    for claim in group {
        match stance(&claim.text) {
            Some(Stance::Bullish) => bullish.push(*claim),
            Some(Stance::Bearish) => bearish.push(*claim),
            _ => {}
        }
    }
    if bullish.is_empty() || bearish.is_empty() {
        return None;
    }
    let round = bullish
        .iter()
        .chain(&bearish)
        .map(|c| c.round)
        .max()
        .unwrap_or_default();
    let sides = vec![
        build_side(Stance::Bullish.to_string(), &bullish),
        build_side(Stance::Bearish.to_string(), &bearish),
    ];
    build_conflict(subject, ConflictKind::Direction, sides, round)
}

fn build_side(position: String, claims: &[&Claim]) -> ConflictSide {
    let ids: BTreeSet<ClaimId> = claims.iter().map(|c| c.id).collect();
    let experts: BTreeSet<&str> = claims.iter().map(|c| c.expert.as_str()).collect();
    let evidence: BTreeSet<EvidenceRef> = claims
        .iter()
        .flat_map(|c| c.evidence.iter().copied())
        .filter(|r| !matches!(r, EvidenceRef::Claim(id) if ids.contains(id)))
        .collect();

    ConflictSide {
        position,
        claims: ids.into_iter().collect(),
        experts: experts.into_iter().map(str::to_string).collect(),
        evidence_count: evidence.len(),
        confidence: claims.iter().map(|c| c.confidence).sum(),
    }
}

/// `None` when every claim comes from one expert: an expert never conflicts with itself.
fn build_conflict(
    subject: &str,
    kind: ConflictKind,
    sides: Vec<ConflictSide>,
    round: u32,
) -> Option<Conflict> {
    let experts: BTreeSet<&str> = sides
        .iter()
        .flat_map(|s| s.experts.iter().map(String::as_str))
        .collect();
    if experts.len() < 2 {
        return None;
    }
    Some(Conflict {
        subject: subject.to_string(),
        kind,
        severity: sides.iter().map(|s| s.confidence).sum(),
        round,
        resolution: Resolution::Unresolved,
        winner: None,
        sides,
    })
}

/// The side with strictly more independent evidence than every other side.
fn evidence_winner(sides: &[ConflictSide]) -> Option<usize> {
    let best = sides.iter().map(|s| s.evidence_count).max()?;
    let mut leaders = sides
        .iter()
        .enumerate()
        .filter(|(_, s)| s.evidence_count == best);
    match (leaders.next(), leaders.next()) {
        (Some((i, _)), None) => Some(i),
        _ => None,
    }
}

/// A side backed by at least two experts and by more experts than all other sides combined.
fn majority_winner(sides: &[ConflictSide]) -> Option<usize> {
    let total: usize = sides.iter().map(|s| s.experts.len()).sum();
    sides.iter().enumerate().find_map(|(i, side)| {
        let count = side.experts.len();
        (count >= 2 && count > total - count).then_some(i)
    })
}
