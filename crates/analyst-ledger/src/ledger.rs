use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use analyst_models::{
    ChangeReason, Claim, ClaimDraft, ClaimId, ClaimStatus, DraftEvidence, EvidenceId,
    EvidenceRecord, EvidenceRef, ExpertOpinion, LedgerSnapshot, StatusChange,
};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerError;

/// A draft that failed validation and was not written.
#[derive(Debug)]
pub struct RejectedDraft {
    /// Position of the draft in the opinion's claim list.
    pub index: usize,
    pub error: LedgerError,
}

/// Result of appending one opinion.
#[derive(Debug, Default)]
pub struct AppendOutcome {
    pub appended: Vec<ClaimId>,
    pub evidence: Vec<EvidenceId>,
    pub rejected: Vec<RejectedDraft>,
}

#[derive(Debug)]
struct LedgerState {
    session_id: Uuid,
    current_round: u32,
    claims: Vec<Claim>,
    evidence: Vec<EvidenceRecord>,
    transitions: Vec<StatusChange>,
}

/// Append-only store of every claim written during a session.
///
/// All writes go through one lock, so ids are assigned sequentially and never
/// collide. A claim's id is its 1-based position in the claim sequence, and an
/// evidence id its position in the evidence sequence.
#[derive(Debug)]
pub struct ClaimLedger {
    state: Mutex<LedgerState>,
}

impl ClaimLedger {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                session_id,
                current_round: 0,
                claims: Vec::new(),
                evidence: Vec::new(),
                transitions: Vec::new(),
            }),
        }
    }

    /// Rebuild a ledger from its serialized form, re-checking every provenance invariant.
    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Result<Self, LedgerError> {
        validate_snapshot(snapshot)?;
        Ok(Self {
            state: Mutex::new(LedgerState {
                session_id: snapshot.session_id,
                current_round: snapshot.current_round,
                claims: snapshot.claims.clone(),
                evidence: snapshot.evidence.clone(),
                transitions: snapshot.transitions.clone(),
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state
            .lock()
            .map_err(|e| LedgerError::Unavailable(format!("ledger mutex poisoned: {e}")))
    }

    pub fn session_id(&self) -> Result<Uuid, LedgerError> {
        Ok(self.lock()?.session_id)
    }

    pub fn current_round(&self) -> Result<u32, LedgerError> {
        Ok(self.lock()?.current_round)
    }

    /// Open a round for writing. Rounds never move backwards.
    pub fn begin_round(&self, round: u32) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        if round < state.current_round {
            return Err(LedgerError::RoundRegression {
                current: state.current_round,
                requested: round,
            });
        }
        state.current_round = round;
        Ok(())
    }

    /// Write the claims of one opinion.
    ///
    /// Each draft is validated on its own; invalid drafts are reported in the
    /// outcome and the rest are still written. Cited tool results are recorded
    /// as evidence immediately before the claim that cites them.
    pub fn append_opinion(&self, opinion: &ExpertOpinion) -> Result<AppendOutcome, LedgerError> {
        let mut state = self.lock()?;
        if opinion.round > state.current_round {
            return Err(LedgerError::FutureRound {
                round: opinion.round,
                current: state.current_round,
            });
        }

        let mut outcome = AppendOutcome::default();
        if opinion.is_degraded() {
            return Ok(outcome);
        }

        let mut used: HashSet<usize> = HashSet::new();
        for (index, draft) in opinion.claims.iter().enumerate() {
            if let Err(error) = state.validate_draft(opinion, draft, &used) {
                debug!(expert = %opinion.expert, index, error = %error, "Draft rejected");
                outcome.rejected.push(RejectedDraft { index, error });
                continue;
            }

            let mut refs = Vec::with_capacity(draft.evidence.len());
            for evidence in &draft.evidence {
                match *evidence {
                    DraftEvidence::Gathered(i) => {
                        used.insert(i);
                        let gathered = &opinion.evidence[i];
                        let id = EvidenceId(state.evidence.len() as u64 + 1);
                        state.evidence.push(EvidenceRecord {
                            id,
                            tool: gathered.tool.clone(),
                            expert: opinion.expert.clone(),
                            round: opinion.round,
                            query: gathered.query.clone(),
                            content: gathered.content().cloned().unwrap_or_default(),
                        });
                        outcome.evidence.push(id);
                        refs.push(EvidenceRef::Tool(id));
                    }
                    DraftEvidence::Claim(id) => refs.push(EvidenceRef::Claim(id)),
                }
            }

            let id = ClaimId(state.claims.len() as u64 + 1);
            state.claims.push(Claim {
                id,
                expert: opinion.expert.clone(),
                round: opinion.round,
                text: draft.text.trim().to_string(),
                confidence: draft.confidence,
                topic: draft.topic.clone(),
                evidence: refs,
                supersedes: draft.supersedes,
                status: ClaimStatus::Active,
            });
            outcome.appended.push(id);

            if let Some(old) = draft.supersedes {
                // A correction of a claim that already lost a conflict keeps the
                // reference but has no status left to change.
                if state.claim(old).is_some_and(|c| c.status.is_active()) {
                    state.transition(old, ClaimStatus::Superseded, opinion.round, ChangeReason::Correction)?;
                }
            }
        }

        Ok(outcome)
    }

    pub fn supersede(&self, id: ClaimId, round: u32, reason: ChangeReason) -> Result<(), LedgerError> {
        self.lock()?
            .transition(id, ClaimStatus::Superseded, round, reason)
    }

    pub fn retract(&self, id: ClaimId, round: u32) -> Result<(), LedgerError> {
        self.lock()?
            .transition(id, ClaimStatus::Retracted, round, ChangeReason::Retraction)
    }

    pub fn claim(&self, id: ClaimId) -> Result<Option<Claim>, LedgerError> {
        Ok(self.lock()?.claim(id).cloned())
    }

    /// Every claim, in id order.
    pub fn claims(&self) -> Result<Vec<Claim>, LedgerError> {
        Ok(self.lock()?.claims.clone())
    }

    /// Claims still `active`, in id order.
    pub fn active_claims(&self) -> Result<Vec<Claim>, LedgerError> {
        Ok(self
            .lock()?
            .claims
            .iter()
            .filter(|c| c.status.is_active())
            .cloned()
            .collect())
    }

    pub fn evidence(&self, id: EvidenceId) -> Result<Option<EvidenceRecord>, LedgerError> {
        let state = self.lock()?;
        Ok(index_of(id.0, state.evidence.len()).map(|i| state.evidence[i].clone()))
    }

    pub fn transitions(&self) -> Result<Vec<StatusChange>, LedgerError> {
        Ok(self.lock()?.transitions.clone())
    }

    pub fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.claims.len())
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        let state = self.lock()?;
        Ok(LedgerSnapshot {
            session_id: state.session_id,
            current_round: state.current_round,
            claims: state.claims.clone(),
            evidence: state.evidence.clone(),
            transitions: state.transitions.clone(),
        })
    }
}

impl LedgerState {
    fn claim(&self, id: ClaimId) -> Option<&Claim> {
        index_of(id.0, self.claims.len()).map(|i| &self.claims[i])
    }

    fn validate_draft(
        &self,
        opinion: &ExpertOpinion,
        draft: &ClaimDraft,
        used: &HashSet<usize>,
    ) -> Result<(), LedgerError> {
        if draft.text.trim().is_empty() {
            return Err(LedgerError::EmptyText);
        }
        if draft.confidence < Decimal::ZERO || draft.confidence > Decimal::ONE {
            return Err(LedgerError::InvalidConfidence(draft.confidence));
        }

        let mut local: HashSet<usize> = HashSet::new();
        for evidence in &draft.evidence {
            match *evidence {
                DraftEvidence::Gathered(i) => {
                    let gathered = opinion
                        .evidence
                        .get(i)
                        .ok_or(LedgerError::UnknownEvidence(i))?;
                    if gathered.is_failed() {
                        return Err(LedgerError::FailedEvidence(i));
                    }
                    if used.contains(&i) || !local.insert(i) {
                        return Err(LedgerError::EvidenceReused(i));
                    }
                }
                DraftEvidence::Claim(id) => {
                    self.earlier_claim(id, opinion.round)?;
                }
            }
        }

        if let Some(old) = draft.supersedes {
            let target = self.earlier_claim(old, opinion.round)?;
            if target.expert != opinion.expert {
                return Err(LedgerError::ForeignSupersede {
                    claim: old,
                    owner: target.expert.clone(),
                    expert: opinion.expert.clone(),
                });
            }
        }

        Ok(())
    }

    /// Resolve a claim reference that must come from a strictly earlier round.
    fn earlier_claim(&self, id: ClaimId, round: u32) -> Result<&Claim, LedgerError> {
        let claim = self.claim(id).ok_or(LedgerError::UnknownClaim(id))?;
        if claim.round >= round {
            return Err(LedgerError::ForwardReference {
                claim: id,
                claim_round: claim.round,
                round,
            });
        }
        Ok(claim)
    }

    fn transition(
        &mut self,
        id: ClaimId,
        to: ClaimStatus,
        round: u32,
        reason: ChangeReason,
    ) -> Result<(), LedgerError> {
        let i = index_of(id.0, self.claims.len()).ok_or(LedgerError::UnknownClaim(id))?;
        let from = self.claims[i].status;
        if !from.is_active() {
            return Err(LedgerError::InvalidTransition { claim: id, from });
        }
        self.claims[i].status = to;
        self.transitions.push(StatusChange {
            claim: id,
            from,
            to,
            round,
            reason,
        });
        Ok(())
    }
}

/// Map a 1-based id onto an index of a sequence of `len` entries.
fn index_of(id: u64, len: usize) -> Option<usize> {
    let i = usize::try_from(id).ok()?.checked_sub(1)?;
    (i < len).then_some(i)
}

/// Check every provenance invariant of a serialized ledger.
pub fn validate_snapshot(snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
    let bad = |msg: String| Err(LedgerError::Snapshot(msg));

    for (i, record) in snapshot.evidence.iter().enumerate() {
        if record.id.0 != i as u64 + 1 {
            return bad(format!("evidence #{i} has id {}", record.id));
        }
        if record.round > snapshot.current_round {
            return bad(format!("{} recorded in future round {}", record.id, record.round));
        }
    }

    let mut evidence_owner: HashMap<EvidenceId, ClaimId> = HashMap::new();
    let mut last_round = 0;
    for (i, claim) in snapshot.claims.iter().enumerate() {
        if claim.id.0 != i as u64 + 1 {
            return bad(format!("claim #{i} has id {}", claim.id));
        }
        if claim.round > snapshot.current_round {
            return bad(format!("{} written in future round {}", claim.id, claim.round));
        }
        if claim.round < last_round {
            return bad(format!("{} breaks round ordering", claim.id));
        }
        last_round = claim.round;
        if claim.confidence < Decimal::ZERO || claim.confidence > Decimal::ONE {
            return bad(format!("{} has confidence {}", claim.id, claim.confidence));
        }

        for evidence in &claim.evidence {
            match *evidence {
                EvidenceRef::Tool(eid) => {
                    let Some(record) = index_of(eid.0, snapshot.evidence.len())
                        .map(|j| &snapshot.evidence[j])
                    else {
                        return bad(format!("{} cites missing {eid}", claim.id));
                    };
                    if record.round > claim.round {
                        return bad(format!("{} cites later {eid}", claim.id));
                    }
                    if let Some(owner) = evidence_owner.insert(eid, claim.id) {
                        return bad(format!("{eid} backs both {owner} and {}", claim.id));
                    }
                }
                EvidenceRef::Claim(cid) => {
                    check_earlier(snapshot, claim, cid)?;
                }
            }
        }

        if let Some(old) = claim.supersedes {
            let target = check_earlier(snapshot, claim, old)?;
            if target.expert != claim.expert {
                return bad(format!("{} supersedes foreign {old}", claim.id));
            }
        }
    }

    let mut changed: HashSet<ClaimId> = HashSet::new();
    for change in &snapshot.transitions {
        let Some(claim) = index_of(change.claim.0, snapshot.claims.len())
            .map(|j| &snapshot.claims[j])
        else {
            return bad(format!("transition for missing {}", change.claim));
        };
        if change.from != ClaimStatus::Active || change.to == ClaimStatus::Active {
            return bad(format!("illegal transition {} -> {}", change.from, change.to));
        }
        if claim.status != change.to || !changed.insert(change.claim) {
            return bad(format!("transition history of {} disagrees with its status", change.claim));
        }
    }
    for claim in &snapshot.claims {
        if !claim.status.is_active() && !changed.contains(&claim.id) {
            return bad(format!("{} is {} without a transition", claim.id, claim.status));
        }
    }

    Ok(())
}

fn check_earlier<'a>(
    snapshot: &'a LedgerSnapshot,
    claim: &Claim,
    target: ClaimId,
) -> Result<&'a Claim, LedgerError> {
    let Some(referenced) =
        index_of(target.0, snapshot.claims.len()).map(|j| &snapshot.claims[j])
    else {
        return Err(LedgerError::Snapshot(format!("{} cites missing {target}", claim.id)));
    };
    if referenced.round >= claim.round {
        return Err(LedgerError::Snapshot(format!(
            "{} cites {target} from round {} (not earlier than {})",
            claim.id, referenced.round, claim.round
        )));
    }
    Ok(referenced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_models::{ToolEvidence, ToolKind};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn search_hit(n: u32) -> ToolEvidence {
        ToolEvidence::ok(
            ToolKind::Search,
            serde_json::json!({"query": format!("q{n}")}),
            serde_json::json!([{"title": format!("hit {n}")}]),
        )
    }

    fn ledger_in_round(round: u32) -> ClaimLedger {
        let ledger = ClaimLedger::new(Uuid::new_v4());
        ledger.begin_round(round).unwrap();
        ledger
    }

    #[test]
    fn ids_are_sequential_across_opinions() {
        let ledger = ledger_in_round(1);
        let a = ExpertOpinion::new("finance", 1, dec!(0.7))
            .with_claim(ClaimDraft::new("ACME is undervalued", dec!(0.8)))
            .with_claim(ClaimDraft::new("Margins expand", dec!(0.6)));
        let b = ExpertOpinion::new("risk", 1, dec!(0.5))
            .with_claim(ClaimDraft::new("Leverage is high", dec!(0.5)));

        let first = ledger.append_opinion(&a).unwrap();
        let second = ledger.append_opinion(&b).unwrap();

        assert_eq!(first.appended, vec![ClaimId(1), ClaimId(2)]);
        assert_eq!(second.appended, vec![ClaimId(3)]);
        assert_eq!(ledger.len().unwrap(), 3);
        assert_eq!(ledger.claim(ClaimId(3)).unwrap().unwrap().expert, "risk");
    }

    #[test]
    fn concurrent_appends_never_share_ids() {
        let ledger = Arc::new(ledger_in_round(1));
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut opinion = ExpertOpinion::new(format!("expert{n}"), 1, dec!(0.5));
                    for i in 0..25 {
                        opinion = opinion.with_claim(ClaimDraft::new(format!("claim {i}"), dec!(0.5)));
                    }
                    ledger.append_opinion(&opinion).unwrap().appended
                })
            })
            .collect();

        let mut ids: Vec<ClaimId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(ids.first(), Some(&ClaimId(1)));
        assert_eq!(ids.last(), Some(&ClaimId(200)));
    }

    #[test]
    fn future_round_and_regression_rejected() {
        let ledger = ledger_in_round(2);
        let opinion = ExpertOpinion::new("finance", 3, dec!(0.5))
            .with_claim(ClaimDraft::new("too early", dec!(0.5)));
        assert!(matches!(
            ledger.append_opinion(&opinion),
            Err(LedgerError::FutureRound { round: 3, current: 2 })
        ));
        assert!(matches!(
            ledger.begin_round(1),
            Err(LedgerError::RoundRegression { .. })
        ));
    }

    #[test]
    fn degraded_opinion_writes_nothing() {
        let ledger = ledger_in_round(1);
        let outcome = ledger
            .append_opinion(&ExpertOpinion::degraded("policy", 1, "parse failure"))
            .unwrap();
        assert!(outcome.appended.is_empty());
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn gathered_evidence_recorded_before_claim() {
        let ledger = ledger_in_round(1);
        let opinion = ExpertOpinion::new("finance", 1, dec!(0.7))
            .with_evidence(search_hit(1))
            .with_evidence(search_hit(2))
            .with_claim(
                ClaimDraft::new("ACME is undervalued", dec!(0.8))
                    .with_evidence(DraftEvidence::Gathered(1)),
            );

        let outcome = ledger.append_opinion(&opinion).unwrap();
        assert_eq!(outcome.evidence, vec![EvidenceId(1)]);

        let claim = ledger.claim(ClaimId(1)).unwrap().unwrap();
        assert_eq!(claim.evidence, vec![EvidenceRef::Tool(EvidenceId(1))]);
        let record = ledger.evidence(EvidenceId(1)).unwrap().unwrap();
        assert_eq!(record.query["query"], "q2");
        assert_eq!(record.expert, "finance");
    }

    #[test]
    fn evidence_backs_at_most_one_claim() {
        let ledger = ledger_in_round(1);
        let opinion = ExpertOpinion::new("finance", 1, dec!(0.7))
            .with_evidence(search_hit(1))
            .with_claim(ClaimDraft::new("first", dec!(0.8)).with_evidence(DraftEvidence::Gathered(0)))
            .with_claim(ClaimDraft::new("second", dec!(0.8)).with_evidence(DraftEvidence::Gathered(0)));

        let outcome = ledger.append_opinion(&opinion).unwrap();
        assert_eq!(outcome.appended, vec![ClaimId(1)]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].index, 1);
        assert!(matches!(outcome.rejected[0].error, LedgerError::EvidenceReused(0)));
    }

    #[test]
    fn failed_and_missing_evidence_rejected() {
        let ledger = ledger_in_round(1);
        let opinion = ExpertOpinion::new("finance", 1, dec!(0.7))
            .with_evidence(ToolEvidence::failed(ToolKind::MarketData, serde_json::json!({}), "timeout"))
            .with_claim(ClaimDraft::new("cites failure", dec!(0.8)).with_evidence(DraftEvidence::Gathered(0)))
            .with_claim(ClaimDraft::new("cites nothing real", dec!(0.8)).with_evidence(DraftEvidence::Gathered(5)))
            .with_claim(ClaimDraft::new("fine", dec!(0.8)));

        let outcome = ledger.append_opinion(&opinion).unwrap();
        assert_eq!(outcome.appended, vec![ClaimId(1)]);
        assert!(matches!(outcome.rejected[0].error, LedgerError::FailedEvidence(0)));
        assert!(matches!(outcome.rejected[1].error, LedgerError::UnknownEvidence(5)));
        assert_eq!(ledger.claim(ClaimId(1)).unwrap().unwrap().text, "fine");
    }

    #[test]
    fn claim_references_must_be_strictly_earlier() {
        let ledger = ledger_in_round(1);
        ledger
            .append_opinion(
                &ExpertOpinion::new("finance", 1, dec!(0.7))
                    .with_claim(ClaimDraft::new("round one", dec!(0.7))),
            )
            .unwrap();

        let same_round = ExpertOpinion::new("risk", 1, dec!(0.5)).with_claim(
            ClaimDraft::new("agrees", dec!(0.5)).with_evidence(DraftEvidence::Claim(ClaimId(1))),
        );
        let outcome = ledger.append_opinion(&same_round).unwrap();
        assert!(matches!(
            outcome.rejected[0].error,
            LedgerError::ForwardReference { .. }
        ));

        ledger.begin_round(2).unwrap();
        let later = ExpertOpinion::new("risk", 2, dec!(0.5)).with_claim(
            ClaimDraft::new("agrees", dec!(0.5)).with_evidence(DraftEvidence::Claim(ClaimId(1))),
        );
        let outcome = ledger.append_opinion(&later).unwrap();
        assert_eq!(outcome.appended, vec![ClaimId(2)]);
    }

    #[test]
    fn correction_supersedes_own_claim_only() {
        let ledger = ledger_in_round(1);
        ledger
            .append_opinion(
                &ExpertOpinion::new("finance", 1, dec!(0.7))
                    .with_claim(ClaimDraft::new("ACME is overvalued", dec!(0.6))),
            )
            .unwrap();
        ledger.begin_round(2).unwrap();

        let foreign = ExpertOpinion::new("risk", 2, dec!(0.5))
            .with_claim(ClaimDraft::new("hijack", dec!(0.5)).superseding(ClaimId(1)));
        let outcome = ledger.append_opinion(&foreign).unwrap();
        assert!(matches!(
            outcome.rejected[0].error,
            LedgerError::ForeignSupersede { .. }
        ));

        let own = ExpertOpinion::new("finance", 2, dec!(0.7))
            .with_claim(ClaimDraft::new("ACME is undervalued", dec!(0.8)).superseding(ClaimId(1)));
        let outcome = ledger.append_opinion(&own).unwrap();
        assert_eq!(outcome.appended, vec![ClaimId(2)]);

        let old = ledger.claim(ClaimId(1)).unwrap().unwrap();
        assert_eq!(old.status, ClaimStatus::Superseded);
        let active: Vec<ClaimId> = ledger.active_claims().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(active, vec![ClaimId(2)]);

        let transitions = ledger.transitions().unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].reason, ChangeReason::Correction);
    }

    #[test]
    fn status_only_leaves_active_once() {
        let ledger = ledger_in_round(1);
        ledger
            .append_opinion(
                &ExpertOpinion::new("finance", 1, dec!(0.7))
                    .with_claim(ClaimDraft::new("a", dec!(0.7)))
                    .with_claim(ClaimDraft::new("b", dec!(0.7))),
            )
            .unwrap();

        ledger.supersede(ClaimId(1), 1, ChangeReason::Evidence).unwrap();
        ledger.retract(ClaimId(2), 1).unwrap();
        assert!(matches!(
            ledger.supersede(ClaimId(1), 1, ChangeReason::Majority),
            Err(LedgerError::InvalidTransition { .. })
        ));
        assert!(matches!(
            ledger.retract(ClaimId(9), 1),
            Err(LedgerError::UnknownClaim(ClaimId(9)))
        ));
        assert!(ledger.active_claims().unwrap().is_empty());
    }

    #[test]
    fn out_of_range_confidence_and_blank_text_rejected() {
        let ledger = ledger_in_round(1);
        let opinion = ExpertOpinion::new("finance", 1, dec!(0.7))
            .with_claim(ClaimDraft::new("too sure", dec!(1.2)))
            .with_claim(ClaimDraft::new("  ", dec!(0.5)));
        let outcome = ledger.append_opinion(&opinion).unwrap();
        assert!(outcome.appended.is_empty());
        assert!(matches!(outcome.rejected[0].error, LedgerError::InvalidConfidence(_)));
        assert!(matches!(outcome.rejected[1].error, LedgerError::EmptyText));
    }

    #[test]
    fn snapshot_roundtrip_preserves_provenance() {
        let ledger = ledger_in_round(1);
        ledger
            .append_opinion(
                &ExpertOpinion::new("finance", 1, dec!(0.7))
                    .with_evidence(search_hit(1))
                    .with_claim(
                        ClaimDraft::new("ACME is overvalued", dec!(0.6))
                            .with_evidence(DraftEvidence::Gathered(0)),
                    ),
            )
            .unwrap();
        ledger.begin_round(2).unwrap();
        ledger
            .append_opinion(
                &ExpertOpinion::new("finance", 2, dec!(0.7)).with_claim(
                    ClaimDraft::new("ACME is undervalued", dec!(0.8))
                        .superseding(ClaimId(1))
                        .with_evidence(DraftEvidence::Claim(ClaimId(1))),
                ),
            )
            .unwrap();

        let snapshot = ledger.snapshot().unwrap();
        let restored = ClaimLedger::from_snapshot(&snapshot).unwrap();
        assert_eq!(restored.snapshot().unwrap(), snapshot);
        assert_eq!(restored.current_round().unwrap(), 2);
    }

    #[test]
    fn snapshot_with_forward_reference_rejected() {
        let ledger = ledger_in_round(1);
        ledger
            .append_opinion(
                &ExpertOpinion::new("finance", 1, dec!(0.7))
                    .with_claim(ClaimDraft::new("a", dec!(0.7)))
                    .with_claim(ClaimDraft::new("b", dec!(0.7))),
            )
            .unwrap();

        let mut snapshot = ledger.snapshot().unwrap();
        snapshot.claims[0].evidence.push(EvidenceRef::Claim(ClaimId(2)));
        assert!(matches!(
            ClaimLedger::from_snapshot(&snapshot),
            Err(LedgerError::Snapshot(_))
        ));
    }

    #[test]
    fn snapshot_status_without_transition_rejected() {
        let ledger = ledger_in_round(1);
        ledger
            .append_opinion(
                &ExpertOpinion::new("finance", 1, dec!(0.7))
                    .with_claim(ClaimDraft::new("a", dec!(0.7))),
            )
            .unwrap();

        let mut snapshot = ledger.snapshot().unwrap();
        snapshot.claims[0].status = ClaimStatus::Retracted;
        assert!(validate_snapshot(&snapshot).is_err());
    }
}
