use std::fmt::Write as _;

use analyst_models::{
    Claim, ClaimRow, Conflict, DegradedNote, ExpertGroup, FinalReport, LedgerSnapshot, Question,
    ReportClaim, RoundRecord, SessionStatus, REPORT_SCHEMA_VERSION,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Everything the report is built from. Borrowed; nothing is modified.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub session_id: Uuid,
    pub question: &'a Question,
    pub status: SessionStatus,
    pub rounds: u32,
    /// Session roster, in the order groups should appear.
    pub experts: &'a [String],
    pub ledger: &'a LedgerSnapshot,
    pub history: &'a [RoundRecord],
    /// Conflicts still open among the final active claims.
    pub unresolved: &'a [Conflict],
    pub generated_at: DateTime<Utc>,
}

/// Build the final report from the active claims of the ledger.
pub fn synthesize(input: &SynthesisInput<'_>) -> FinalReport {
    let active: Vec<&Claim> = input.ledger.active_claims().collect();

    let mut order: Vec<&str> = input.experts.iter().map(String::as_str).collect();
    for claim in &active {
        if !order.contains(&claim.expert.as_str()) {
            order.push(claim.expert.as_str());
        }
    }

    let groups: Vec<ExpertGroup> = order
        .into_iter()
        .filter_map(|expert| {
            let mut claims: Vec<&Claim> =
                active.iter().copied().filter(|c| c.expert == expert).collect();
            if claims.is_empty() {
                return None;
            }
            claims.sort_by(|a, b| b.confidence.cmp(&a.confidence).then_with(|| a.id.cmp(&b.id)));
            Some(ExpertGroup {
                expert: expert.to_string(),
                claims: claims
                    .into_iter()
                    .map(|c| ReportClaim {
                        id: c.id,
                        round: c.round,
                        text: c.text.clone(),
                        confidence: c.confidence,
                        evidence: c.evidence.clone(),
                    })
                    .collect(),
            })
        })
        .collect();

    let table: Vec<ClaimRow> = active
        .iter()
        .map(|c| ClaimRow {
            id: c.id,
            expert: c.expert.clone(),
            round: c.round,
            confidence: c.confidence,
            evidence_count: c.evidence.len(),
            text: c.text.clone(),
        })
        .collect();

    let resolved_conflicts: Vec<Conflict> = input
        .history
        .iter()
        .flat_map(|record| record.conflicts.iter())
        .filter(|c| c.resolution.is_resolved())
        .cloned()
        .collect();
    let degraded: Vec<DegradedNote> = input
        .history
        .iter()
        .flat_map(|record| record.degraded.iter())
        .cloned()
        .collect();

    let narrative = narrative(input, &groups, &resolved_conflicts, &degraded);

    FinalReport {
        schema_version: REPORT_SCHEMA_VERSION,
        session_id: input.session_id,
        question: input.question.clone(),
        status: input.status,
        converged: input.status == SessionStatus::Converged,
        rounds: input.rounds,
        narrative,
        groups,
        table,
        unresolved_conflicts: input.unresolved.to_vec(),
        resolved_conflicts,
        degraded,
        generated_at: input.generated_at,
    }
}

fn narrative(
    input: &SynthesisInput<'_>,
    groups: &[ExpertGroup],
    resolved: &[Conflict],
    degraded: &[DegradedNote],
) -> String {
    let mut text = String::new();
    let outcome = if input.status == SessionStatus::Converged {
        "the panel converged".to_string()
    } else {
        format!("the panel did not converge (status: {})", input.status)
    };
    let _ = write!(
        text,
        "{} expert(s) contributed over {} round(s); {}.",
        groups.len(),
        input.rounds,
        outcome
    );

    for group in groups {
        if let Some(lead) = group.claims.first() {
            let _ = write!(
                text,
                "\n\n{}: {} (confidence {}, {}).",
                group.expert,
                lead.text.trim_end_matches('.'),
                lead.confidence,
                lead.id
            );
            if group.claims.len() > 1 {
                let _ = write!(text, " {} further claim(s).", group.claims.len() - 1);
            }
        }
    }

    if !resolved.is_empty() {
        let settled: Vec<String> = resolved
            .iter()
            .map(|c| format!("{} ({})", c.subject, c.resolution))
            .collect();
        let _ = write!(text, "\n\nSettled during the session: {}.", settled.join(", "));
    }
    if !input.unresolved.is_empty() {
        let open: Vec<&str> = input.unresolved.iter().map(|c| c.subject.as_str()).collect();
        let _ = write!(text, "\n\nStill disputed: {}.", open.join(", "));
    }
    if !degraded.is_empty() {
        let _ = write!(
            text,
            "\n\n{} contribution(s) were degraded and may be missing.",
            degraded.len()
        );
    }
    text
}
