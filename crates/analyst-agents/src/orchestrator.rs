use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analyst_ledger::{ClaimLedger, SessionStore};
use analyst_models::{
    ChangeReason, Claim, ClaimId, Conflict, DegradedNote, DetectorConfig, ErrorKind,
    ExpertOpinion, FinalReport, OrchestratorConfig, Question, Resolution, RoundRecord,
    SessionSnapshot, SessionStatus, ToolOutcome,
};
use chrono::Utc;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::arbiter::Arbiter;
use crate::conflict::ConflictDetector;
use crate::error::{FailedSession, SessionError};
use crate::expert::{Expert, ExpertContext};
use crate::synthesizer::{synthesize, SynthesisInput};

/// A finished session: the report plus the state it was built from.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub report: FinalReport,
    pub snapshot: SessionSnapshot,
}

/// Drives a session through `INIT -> RUNNING -> CONVERGED | EXHAUSTED | FAILED`.
pub struct Orchestrator {
    experts: Vec<Arc<dyn Expert>>,
    detector: ConflictDetector,
    config: OrchestratorConfig,
    arbiter: Option<Arc<dyn Arbiter>>,
    store: Option<Arc<Mutex<SessionStore>>>,
    cancel: CancellationToken,
}

/// Mutable state of one session, owned by the running orchestrator call.
struct Session {
    id: Uuid,
    question: Question,
    experts: Vec<Arc<dyn Expert>>,
    round: u32,
    max_rounds: u32,
    ledger: ClaimLedger,
    history: Vec<RoundRecord>,
    /// Unresolved conflicts among the active claims after the last round.
    unresolved: Vec<Conflict>,
}

impl Session {
    fn expert_names(&self) -> Vec<String> {
        self.experts.iter().map(|e| e.name().to_string()).collect()
    }
}

struct RoundResult {
    record: RoundRecord,
    all_degraded: bool,
    unresolved: Vec<Conflict>,
}

enum Waited {
    Joined(Result<ExpertOpinion, JoinError>),
    Cancelled,
    TimedOut,
}

/// The state after a round, given what the round produced.
///
/// A round where every expert degraded fails the session even when it was
/// cancelled or was the last one allowed.
pub fn next_status(
    all_degraded: bool,
    has_unresolved: bool,
    cancelled: bool,
    round: u32,
    max_rounds: u32,
) -> SessionStatus {
    if all_degraded {
        SessionStatus::Failed
    } else if !has_unresolved {
        SessionStatus::Converged
    } else if cancelled || round >= max_rounds {
        SessionStatus::Exhausted
    } else {
        SessionStatus::Running
    }
}

impl Orchestrator {
    pub fn new(experts: Vec<Arc<dyn Expert>>, config: OrchestratorConfig) -> Self {
        Self {
            experts,
            detector: ConflictDetector::new(&DetectorConfig::default()),
            config,
            arbiter: None,
            store: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Used only when `escalation` is enabled in the config.
    pub fn with_arbiter(mut self, arbiter: Arc<dyn Arbiter>) -> Self {
        self.arbiter = Some(arbiter);
        self
    }

    pub fn with_store(mut self, store: Arc<Mutex<SessionStore>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn expert_names(&self) -> Vec<&str> {
        self.experts.iter().map(|e| e.name()).collect()
    }

    /// Session entry point for collaborators: the report, or an error for a
    /// session that could not run or failed outright.
    pub async fn run_session(&self, question: Question) -> Result<FinalReport, SessionError> {
        Ok(self.run(question).await?.report)
    }

    pub async fn run(&self, question: Question) -> Result<SessionOutcome, SessionError> {
        question.validate().map_err(SessionError::InvalidQuestion)?;
        let experts = self.select_experts(&question)?;
        let max_rounds = question.max_rounds.unwrap_or(self.config.max_rounds).max(1);
        let id = Uuid::new_v4();

        let session = Session {
            id,
            question,
            experts,
            round: 0,
            max_rounds,
            ledger: ClaimLedger::new(id),
            history: Vec::new(),
            unresolved: Vec::new(),
        };
        self.drive(session).await
    }

    /// Continue an exhausted session for up to `extra_rounds` more rounds.
    pub async fn resume(
        &self,
        snapshot: SessionSnapshot,
        extra_rounds: u32,
    ) -> Result<SessionOutcome, SessionError> {
        if snapshot.status != SessionStatus::Exhausted {
            return Err(SessionError::NotResumable(snapshot.status));
        }
        let ledger = ClaimLedger::from_snapshot(&snapshot.ledger)?;
        let experts = snapshot
            .experts
            .iter()
            .map(|name| {
                self.expert(name)
                    .ok_or_else(|| SessionError::UnknownExpert(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let unresolved = self.detector.find_conflicts(&ledger.active_claims()?);

        info!(
            session = %snapshot.session_id,
            round = snapshot.round,
            extra_rounds,
            "Resuming session"
        );
        let session = Session {
            id: snapshot.session_id,
            question: snapshot.question,
            experts,
            round: snapshot.round,
            max_rounds: snapshot.round.saturating_add(extra_rounds.max(1)),
            ledger,
            history: snapshot.history,
            unresolved,
        };
        self.drive(session).await
    }

    fn expert(&self, name: &str) -> Option<Arc<dyn Expert>> {
        self.experts.iter().find(|e| e.name() == name).cloned()
    }

    fn select_experts(&self, question: &Question) -> Result<Vec<Arc<dyn Expert>>, SessionError> {
        let selected = match &question.experts {
            Some(names) => names
                .iter()
                .map(|name| {
                    self.expert(name)
                        .ok_or_else(|| SessionError::UnknownExpert(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None if self.config.default_experts.is_empty() => self.experts.clone(),
            None => self
                .config
                .default_experts
                .iter()
                .filter_map(|name| {
                    let expert = self.expert(name);
                    if expert.is_none() {
                        warn!(expert = %name, "Default expert not configured, skipping");
                    }
                    expert
                })
                .collect(),
        };

        if selected.is_empty() {
            return Err(SessionError::InvalidQuestion(
                "no experts available for this session".to_string(),
            ));
        }
        Ok(selected)
    }

    async fn drive(&self, mut session: Session) -> Result<SessionOutcome, SessionError> {
        info!(
            session = %session.id,
            experts = ?session.expert_names(),
            max_rounds = session.max_rounds,
            "Session running"
        );

        let status = loop {
            let round = session.round + 1;
            let result = self.run_round(&session, round).await?;
            session.round = round;
            session.history.push(result.record);
            let status = next_status(
                result.all_degraded,
                !result.unresolved.is_empty(),
                self.cancel.is_cancelled(),
                round,
                session.max_rounds,
            );
            session.unresolved = result.unresolved;
            if status.is_terminal() {
                break status;
            }
        };

        info!(
            session = %session.id,
            status = %status,
            rounds = session.round,
            unresolved = session.unresolved.len(),
            "Session finished"
        );
        self.finish(session, status)
    }

    async fn run_round(&self, session: &Session, round: u32) -> Result<RoundResult, SessionError> {
        let start = Instant::now();
        info!(session = %session.id, round, "Round started");
        session.ledger.begin_round(round)?;

        let context = ExpertContext {
            session_id: session.id,
            round,
            question: session.question.text.clone(),
            shared_context: session.ledger.claims()?,
            prior_conflicts: session.unresolved.clone(),
        };
        let opinions = self.collect_opinions(&session.experts, context).await;

        let mut degraded = Vec::new();
        let mut degraded_experts: BTreeSet<String> = BTreeSet::new();
        for opinion in &opinions {
            if let Some(reason) = opinion.degraded_reason() {
                degraded_experts.insert(opinion.expert.clone());
                degraded.push(DegradedNote {
                    expert: opinion.expert.clone(),
                    round,
                    kind: ErrorKind::ExpertDegraded,
                    reason: reason.to_string(),
                });
            }
            for evidence in &opinion.evidence {
                if let ToolOutcome::Failed { error } = &evidence.outcome {
                    degraded.push(DegradedNote {
                        expert: opinion.expert.clone(),
                        round,
                        kind: ErrorKind::ToolError,
                        reason: format!("{}: {error}", evidence.tool),
                    });
                }
            }

            let outcome = session.ledger.append_opinion(opinion)?;
            for rejected in &outcome.rejected {
                warn!(
                    session = %session.id,
                    round,
                    expert = %opinion.expert,
                    index = rejected.index,
                    error = %rejected.error,
                    "Claim draft rejected"
                );
            }
        }
        let all_degraded = opinions.iter().all(ExpertOpinion::is_degraded);

        let conflicts = if all_degraded {
            Vec::new()
        } else {
            self.resolve_until_stable(session, round, &degraded_experts)
                .await?
        };
        let unresolved = self
            .detector
            .find_conflicts(&session.ledger.active_claims()?);

        info!(
            session = %session.id,
            round,
            degraded = degraded_experts.len(),
            conflicts = conflicts.len(),
            unresolved = unresolved.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Round complete"
        );
        Ok(RoundResult {
            record: RoundRecord {
                round,
                degraded,
                conflicts,
            },
            all_degraded,
            unresolved,
        })
    }

    /// Spawn every expert, then wait for each in roster order. Experts still
    /// running at the round deadline or on cancellation come back degraded.
    async fn collect_opinions(
        &self,
        experts: &[Arc<dyn Expert>],
        context: ExpertContext,
    ) -> Vec<ExpertOpinion> {
        let round = context.round;
        let context = Arc::new(context);
        let deadline = (self.config.round_timeout_seconds > 0)
            .then(|| Instant::now() + Duration::from_secs(self.config.round_timeout_seconds));

        let handles: Vec<_> = experts
            .iter()
            .map(|expert| {
                let expert = Arc::clone(expert);
                let context = Arc::clone(&context);
                let name = expert.name().to_string();
                let handle = tokio::spawn(async move { expert.produce_opinion(&context).await });
                (name, handle)
            })
            .collect();

        let mut opinions = Vec::with_capacity(handles.len());
        for (name, mut handle) in handles {
            let waited = tokio::select! {
                biased;
                joined = &mut handle => Waited::Joined(joined),
                _ = self.cancel.cancelled() => Waited::Cancelled,
                _ = until(deadline) => Waited::TimedOut,
            };

            let mut opinion = match waited {
                Waited::Joined(Ok(opinion)) => opinion,
                Waited::Joined(Err(e)) => {
                    error!(expert = %name, round, error = %e, "Expert task panicked");
                    ExpertOpinion::degraded(&name, round, format!("expert task failed: {e}"))
                }
                Waited::Cancelled => {
                    handle.abort();
                    warn!(expert = %name, round, "Expert cancelled");
                    ExpertOpinion::degraded(&name, round, "session cancelled")
                }
                Waited::TimedOut => {
                    handle.abort();
                    warn!(expert = %name, round, "Expert missed the round deadline");
                    ExpertOpinion::degraded(
                        &name,
                        round,
                        format!(
                            "round deadline of {}s exceeded",
                            self.config.round_timeout_seconds
                        ),
                    )
                }
            };
            // An expert cannot speak for another expert or another round.
            opinion.expert = name;
            opinion.round = round;
            opinions.push(opinion);
        }
        opinions
    }

    /// Detect and resolve until a pass settles nothing. Claims of experts that
    /// degraded this round sit out. Returns every distinct conflict seen.
    async fn resolve_until_stable(
        &self,
        session: &Session,
        round: u32,
        degraded_experts: &BTreeSet<String>,
    ) -> Result<Vec<Conflict>, SessionError> {
        let mut seen: Vec<Conflict> = Vec::new();
        let mut declined: Vec<Vec<ClaimId>> = Vec::new();

        loop {
            let eligible: Vec<Claim> = session
                .ledger
                .active_claims()?
                .into_iter()
                .filter(|c| !degraded_experts.contains(&c.expert))
                .collect();
            let mut conflicts = self.detector.analyze(&eligible);

            for conflict in conflicts.iter_mut().filter(|c| !c.resolution.is_resolved()) {
                let ids = conflict.claim_ids();
                if declined.contains(&ids) {
                    continue;
                }
                if !self.escalate(&session.question.text, conflict, &eligible).await {
                    declined.push(ids);
                }
            }

            let mut settled = false;
            for conflict in &conflicts {
                let reason = match conflict.resolution {
                    Resolution::Unresolved => continue,
                    Resolution::ResolvedByEvidence => ChangeReason::Evidence,
                    Resolution::ResolvedByMajority => ChangeReason::Majority,
                    Resolution::ResolvedByEscalation => ChangeReason::Escalation,
                };
                for id in conflict.losing_claims() {
                    if session.ledger.claim(id)?.is_some_and(|c| c.status.is_active()) {
                        session.ledger.supersede(id, round, reason)?;
                        settled = true;
                    }
                }
                info!(
                    session = %session.id,
                    round,
                    subject = %conflict.subject,
                    resolution = %conflict.resolution,
                    "Conflict resolved"
                );
            }

            for conflict in conflicts {
                if !seen.contains(&conflict) {
                    seen.push(conflict);
                }
            }
            if !settled {
                return Ok(seen);
            }
        }
    }

    /// Ask the arbiter, if escalation is on. Returns whether it ruled.
    async fn escalate(&self, question: &str, conflict: &mut Conflict, claims: &[Claim]) -> bool {
        let Some(arbiter) = self.arbiter.as_ref().filter(|_| self.config.escalation) else {
            return false;
        };
        match arbiter.rule(question, conflict, claims).await {
            Ok(Some(winner)) => {
                conflict.resolve(winner, Resolution::ResolvedByEscalation);
                true
            }
            Ok(None) => {
                debug!(subject = %conflict.subject, "Arbiter declined to rule");
                false
            }
            Err(e) => {
                warn!(subject = %conflict.subject, error = %e, "Escalation failed");
                false
            }
        }
    }

    fn finish(
        &self,
        session: Session,
        status: SessionStatus,
    ) -> Result<SessionOutcome, SessionError> {
        let experts = session.expert_names();
        let snapshot = SessionSnapshot {
            session_id: session.id,
            question: session.question,
            status,
            round: session.round,
            max_rounds: session.max_rounds,
            experts,
            ledger: session.ledger.snapshot()?,
            history: session.history,
            saved_at: Utc::now(),
        };
        self.save(&snapshot);

        if status == SessionStatus::Failed {
            return Err(SessionError::Failed(Box::new(FailedSession {
                session_id: snapshot.session_id,
                question: snapshot.question.clone(),
                rounds: snapshot.round,
                kind: ErrorKind::SessionFailed,
                ledger: snapshot.ledger.clone(),
                degraded: snapshot
                    .history
                    .iter()
                    .flat_map(|r| r.degraded.iter().cloned())
                    .collect(),
            })));
        }

        let report = synthesize(&SynthesisInput {
            session_id: snapshot.session_id,
            question: &snapshot.question,
            status,
            rounds: snapshot.round,
            experts: &snapshot.experts,
            ledger: &snapshot.ledger,
            history: &snapshot.history,
            unresolved: &session.unresolved,
            generated_at: snapshot.saved_at,
        });
        Ok(SessionOutcome { report, snapshot })
    }

    /// Persist a terminal session. Store problems are logged, never fatal.
    fn save(&self, snapshot: &SessionSnapshot) {
        let Some(store) = &self.store else {
            return;
        };
        let result = match store.lock() {
            Ok(mut store) => store.save(snapshot),
            Err(_) => {
                warn!(session = %snapshot.session_id, "Session store lock poisoned, not saved");
                return;
            }
        };
        match result {
            Ok(()) => debug!(
                session = %snapshot.session_id,
                status = %snapshot.status,
                "Session saved"
            ),
            Err(e) => warn!(
                session = %snapshot.session_id,
                error = %e,
                "Failed to save session"
            ),
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExpert, ScriptedOpinion, StaticArbiter};
    use analyst_models::{ClaimDraft, ClaimStatus, DraftEvidence};
    use rust_decimal_macros::dec;

    fn config(max_rounds: u32) -> OrchestratorConfig {
        OrchestratorConfig {
            max_rounds,
            round_timeout_seconds: 5,
            default_experts: vec![],
            escalation: false,
        }
    }

    fn claim(text: &str) -> ClaimDraft {
        ClaimDraft::new(text, dec!(0.7)).with_evidence(DraftEvidence::Gathered(0))
    }

    fn bull() -> Arc<ScriptedExpert> {
        Arc::new(
            ScriptedExpert::new("finance")
                .on_round(1, ScriptedOpinion::with_evidence([claim("ACME is undervalued")], 1)),
        )
    }

    fn bear() -> Arc<ScriptedExpert> {
        Arc::new(
            ScriptedExpert::new("risk")
                .on_round(1, ScriptedOpinion::with_evidence([claim("ACME is overvalued")], 1)),
        )
    }

    #[test]
    fn status_transitions() {
        use SessionStatus::*;
        assert_eq!(next_status(true, true, false, 1, 3), Failed);
        assert_eq!(next_status(true, false, true, 3, 3), Failed);
        assert_eq!(next_status(false, false, false, 1, 3), Converged);
        assert_eq!(next_status(false, false, true, 3, 3), Converged);
        assert_eq!(next_status(false, true, false, 3, 3), Exhausted);
        assert_eq!(next_status(false, true, true, 1, 3), Exhausted);
        assert_eq!(next_status(false, true, false, 1, 3), Running);
    }

    #[tokio::test]
    async fn rejects_invalid_questions_and_unknown_experts() {
        let orchestrator = Orchestrator::new(vec![bull() as Arc<dyn Expert>], config(3));

        let blank = orchestrator.run(Question::new(" ")).await;
        assert!(matches!(blank, Err(SessionError::InvalidQuestion(_))));

        let unknown = orchestrator
            .run(Question::new("Is ACME undervalued?").with_experts(["astrology"]))
            .await;
        assert!(matches!(unknown, Err(SessionError::UnknownExpert(name)) if name == "astrology"));
    }

    #[tokio::test]
    async fn missing_default_experts_are_skipped() {
        let mut cfg = config(3);
        cfg.default_experts = vec!["finance".into(), "policy".into()];
        let orchestrator = Orchestrator::new(vec![bull() as Arc<dyn Expert>], cfg);

        let outcome = orchestrator.run(Question::new("Is ACME undervalued?")).await.unwrap();
        assert_eq!(outcome.snapshot.experts, vec!["finance"]);
    }

    #[tokio::test]
    async fn question_override_limits_rounds() {
        let orchestrator = Orchestrator::new(
            vec![bull() as Arc<dyn Expert>, bear() as Arc<dyn Expert>],
            config(3),
        );
        let outcome = orchestrator
            .run(Question::new("Is ACME undervalued?").with_max_rounds(2))
            .await
            .unwrap();
        assert_eq!(outcome.report.status, SessionStatus::Exhausted);
        assert_eq!(outcome.report.rounds, 2);
        assert_eq!(outcome.snapshot.history.len(), 2);
    }

    #[tokio::test]
    async fn slow_expert_degrades_at_deadline() {
        let slow = Arc::new(ScriptedExpert::new("risk").hanging_on(1));
        let mut cfg = config(1);
        cfg.round_timeout_seconds = 1;
        let orchestrator =
            Orchestrator::new(vec![bull() as Arc<dyn Expert>, slow as Arc<dyn Expert>], cfg);

        let outcome = orchestrator.run(Question::new("Is ACME undervalued?")).await.unwrap();
        assert_eq!(outcome.report.status, SessionStatus::Converged);
        assert_eq!(outcome.report.degraded.len(), 1);
        assert_eq!(outcome.report.degraded[0].expert, "risk");
        assert_eq!(outcome.report.degraded[0].kind, ErrorKind::ExpertDegraded);
        assert_eq!(outcome.snapshot.ledger.claims.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_fails() {
        let token = CancellationToken::new();
        token.cancel();
        let slow = Arc::new(ScriptedExpert::new("finance").hanging_on(1));
        let orchestrator = Orchestrator::new(vec![slow as Arc<dyn Expert>], config(3))
            .with_cancellation(token);

        let err = orchestrator
            .run(Question::new("Is ACME undervalued?"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::SessionFailed));
    }

    #[tokio::test]
    async fn escalation_settles_deadlock() {
        let mut cfg = config(3);
        cfg.escalation = true;
        let orchestrator = Orchestrator::new(
            vec![bull() as Arc<dyn Expert>, bear() as Arc<dyn Expert>],
            cfg,
        )
        .with_arbiter(Arc::new(StaticArbiter::new(Some(1))));

        let outcome = orchestrator.run(Question::new("Is ACME undervalued?")).await.unwrap();
        assert_eq!(outcome.report.status, SessionStatus::Converged);
        assert_eq!(outcome.report.rounds, 1);
        assert_eq!(
            outcome.report.resolved_conflicts[0].resolution,
            Resolution::ResolvedByEscalation
        );
        let c1 = &outcome.snapshot.ledger.claims[0];
        assert_eq!(c1.status, ClaimStatus::Superseded);
        assert_eq!(outcome.snapshot.ledger.transitions[0].reason, ChangeReason::Escalation);
    }

    #[tokio::test]
    async fn arbiter_ignored_without_escalation() {
        let orchestrator = Orchestrator::new(
            vec![bull() as Arc<dyn Expert>, bear() as Arc<dyn Expert>],
            config(1),
        )
        .with_arbiter(Arc::new(StaticArbiter::new(Some(0))));

        let outcome = orchestrator.run(Question::new("Is ACME undervalued?")).await.unwrap();
        assert_eq!(outcome.report.status, SessionStatus::Exhausted);
        assert_eq!(outcome.report.unresolved_conflicts.len(), 1);
    }

    #[tokio::test]
    async fn saves_and_resumes_exhausted_session() {
        let store = Arc::new(Mutex::new(SessionStore::open_in_memory().unwrap()));
        let finance = Arc::new(
            ScriptedExpert::new("finance")
                .on_round(1, ScriptedOpinion::with_evidence([claim("ACME is undervalued")], 1))
                .on_round(
                    2,
                    ScriptedOpinion::with_evidence(
                        [ClaimDraft::new("ACME is undervalued on cash flow", dec!(0.8))
                            .with_evidence(DraftEvidence::Gathered(0))
                            .with_evidence(DraftEvidence::Gathered(1))
                            .superseding(ClaimId(1))],
                        2,
                    ),
                ),
        );
        let orchestrator = Orchestrator::new(
            vec![finance as Arc<dyn Expert>, bear() as Arc<dyn Expert>],
            config(1),
        )
        .with_store(store.clone());

        let first = orchestrator.run(Question::new("Is ACME undervalued?")).await.unwrap();
        assert_eq!(first.report.status, SessionStatus::Exhausted);

        let saved = store
            .lock()
            .unwrap()
            .load(first.snapshot.session_id)
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, SessionStatus::Exhausted);

        let resumed = orchestrator.resume(saved, 1).await.unwrap();
        assert_eq!(resumed.report.status, SessionStatus::Converged);
        assert_eq!(resumed.report.rounds, 2);
        assert_eq!(resumed.report.session_id, first.snapshot.session_id);

        let again = orchestrator.resume(resumed.snapshot, 1).await;
        assert!(matches!(
            again,
            Err(SessionError::NotResumable(SessionStatus::Converged))
        ));
    }
}
