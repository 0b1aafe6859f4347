use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use analyst_models::{
    Claim, ClaimDraft, ClaimId, Conflict, DraftEvidence, EvidenceItem, ExpertOpinion,
    ExpertRequest, ExpertResponse, ToolEvidence,
};
use analyst_tools::ToolRegistry;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::LlmBackend;
use crate::error::AgentError;
use crate::evidence::plan_queries;
use crate::parser::{parse_citation, parse_expert_response, Citation};
use crate::persona::Persona;
use crate::prompts::expert_user_prompt;

/// Everything an expert sees when asked for its opinion.
#[derive(Debug, Clone)]
pub struct ExpertContext {
    pub session_id: Uuid,
    pub round: u32,
    pub question: String,
    /// Ledger contents as of the end of the previous round.
    pub shared_context: Vec<Claim>,
    /// Conflicts left unresolved by the previous round.
    pub prior_conflicts: Vec<Conflict>,
}

/// A domain expert. Mockable for testing.
#[async_trait]
pub trait Expert: Send + Sync {
    fn name(&self) -> &str;
    fn domain(&self) -> &str;

    /// Always returns an opinion. Failures come back degraded.
    async fn produce_opinion(&self, context: &ExpertContext) -> ExpertOpinion;
}

/// An expert driven by a persona prompt and the model backend, gathering its
/// evidence through the tool registry.
pub struct PersonaExpert {
    persona: Persona,
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    search_max_results: usize,
}

impl PersonaExpert {
    pub fn new(persona: Persona, backend: Arc<dyn LlmBackend>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            persona,
            backend,
            tools,
            search_max_results: 5,
        }
    }

    pub fn with_search_max_results(mut self, max_results: usize) -> Self {
        self.search_max_results = max_results.max(1);
        self
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Run the planned tool calls one at a time. Unregistered tools are skipped;
    /// failed calls are kept so the model knows they are unavailable.
    async fn gather(&self, context: &ExpertContext) -> Vec<ToolEvidence> {
        let planned = plan_queries(
            &self.persona,
            &context.question,
            &context.prior_conflicts,
            self.search_max_results,
        );

        let mut gathered = Vec::with_capacity(planned.len());
        for query in planned {
            if !self.tools.contains(&query.tool) {
                debug!(
                    expert = %self.persona.name,
                    tool = %query.tool,
                    "Tool not registered, skipping"
                );
                continue;
            }
            match self.tools.invoke(&query.tool, &query.query).await {
                Ok(content) => gathered.push(ToolEvidence::ok(query.tool, query.query, content)),
                Err(e) => {
                    warn!(
                        expert = %self.persona.name,
                        tool = %query.tool,
                        error = %e,
                        "Tool call failed"
                    );
                    gathered.push(ToolEvidence::failed(query.tool, query.query, e.to_string()));
                }
            }
        }
        gathered
    }

    async fn consult(
        &self,
        context: &ExpertContext,
        evidence: &[ToolEvidence],
    ) -> Result<ExpertResponse, AgentError> {
        let request = ExpertRequest {
            request_id: Uuid::new_v4(),
            session_id: context.session_id,
            round: context.round,
            question: context.question.clone(),
            expert: self.persona.name.clone(),
            domain: self.persona.domain.clone(),
            shared_context: context.shared_context.clone(),
            prior_conflicts: context.prior_conflicts.clone(),
            evidence: evidence_items(evidence),
        };

        let prompt = expert_user_prompt(&request)?;
        let raw = self
            .backend
            .generate(&self.persona.system_prompt, &prompt, self.persona.model.as_deref())
            .await?;
        parse_expert_response(&raw)
    }
}

#[async_trait]
impl Expert for PersonaExpert {
    fn name(&self) -> &str {
        &self.persona.name
    }

    fn domain(&self) -> &str {
        &self.persona.domain
    }

    async fn produce_opinion(&self, context: &ExpertContext) -> ExpertOpinion {
        let start = Instant::now();
        let evidence = self.gather(context).await;

        let opinion = match self.consult(context, &evidence).await {
            Ok(response) => build_opinion(&self.persona.name, context.round, response, evidence),
            Err(e) => {
                let mut opinion =
                    ExpertOpinion::degraded(&self.persona.name, context.round, e.to_string());
                opinion.evidence = evidence;
                opinion
            }
        };

        match opinion.degraded_reason() {
            None => info!(
                expert = %self.persona.name,
                round = context.round,
                claims = opinion.claims.len(),
                confidence = %opinion.confidence,
                elapsed_ms = start.elapsed().as_millis(),
                "Expert answered"
            ),
            Some(reason) => warn!(
                expert = %self.persona.name,
                round = context.round,
                reason = %reason,
                elapsed_ms = start.elapsed().as_millis(),
                "Expert degraded"
            ),
        }
        opinion
    }
}

/// Evidence as shown to the model, labelled `E1..En`. Failed calls carry no content.
pub fn evidence_items(evidence: &[ToolEvidence]) -> Vec<EvidenceItem> {
    evidence
        .iter()
        .enumerate()
        .map(|(i, e)| EvidenceItem {
            label: format!("E{}", i + 1),
            tool: e.tool.clone(),
            query: e.query.clone(),
            content: e.content().cloned(),
        })
        .collect()
}

/// Turn a parsed model response into claim drafts.
///
/// Unknown citation labels are ignored. An evidence label cited by an earlier
/// claim is dropped from later ones. A claim citing a failed tool call is
/// dropped; if that leaves nothing, the opinion is degraded.
pub fn build_opinion(
    expert: &str,
    round: u32,
    response: ExpertResponse,
    evidence: Vec<ToolEvidence>,
) -> ExpertOpinion {
    let mut opinion = ExpertOpinion::new(expert, round, response.confidence);
    opinion.reasoning = response.reasoning;

    let mut used: BTreeSet<usize> = BTreeSet::new();
    let mut unsupported = 0usize;

    for proposal in response.claims {
        let text = proposal.text.trim();
        if text.is_empty() {
            continue;
        }

        let mut gathered: Vec<usize> = Vec::new();
        let mut cited_claims: Vec<ClaimId> = Vec::new();
        let mut cites_failed = false;
        for label in &proposal.evidence {
            match parse_citation(label) {
                Some(Citation::Evidence(n)) => match evidence.get(n - 1) {
                    Some(item) if item.is_failed() => cites_failed = true,
                    Some(_) if used.contains(&(n - 1)) || gathered.contains(&(n - 1)) => {
                        debug!(expert, label = %label, "Evidence already cited, dropping citation");
                    }
                    Some(_) => gathered.push(n - 1),
                    None => debug!(expert, label = %label, "Unknown evidence label"),
                },
                Some(Citation::Claim(id)) => {
                    if !cited_claims.contains(&id) {
                        cited_claims.push(id);
                    }
                }
                None => debug!(expert, label = %label, "Unparseable citation"),
            }
        }

        if cites_failed {
            warn!(expert, claim = %text, "Claim cites unavailable evidence, dropping");
            unsupported += 1;
            continue;
        }

        used.extend(gathered.iter().copied());
        let mut draft = ClaimDraft::new(text, proposal.confidence);
        draft.topic = proposal.topic.filter(|t| !t.trim().is_empty());
        draft.evidence = gathered
            .into_iter()
            .map(DraftEvidence::Gathered)
            .chain(cited_claims.into_iter().map(DraftEvidence::Claim))
            .collect();
        draft.supersedes = proposal.supersedes.filter(|n| *n > 0).map(ClaimId);
        opinion.claims.push(draft);
    }

    opinion.evidence = evidence;
    if opinion.claims.is_empty() && unsupported > 0 {
        let mut degraded = ExpertOpinion::degraded(
            expert,
            round,
            format!("all {unsupported} claim(s) cited unavailable evidence"),
        );
        degraded.evidence = opinion.evidence;
        return degraded;
    }
    opinion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedBackend, StaticTool};
    use analyst_models::{ClaimProposal, PersonaConfig, ToolKind};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn proposal(text: &str, evidence: &[&str]) -> ClaimProposal {
        ClaimProposal {
            text: text.into(),
            confidence: dec!(0.7),
            topic: None,
            evidence: evidence.iter().map(|e| e.to_string()).collect(),
            supersedes: None,
        }
    }

    fn response(claims: Vec<ClaimProposal>) -> ExpertResponse {
        ExpertResponse {
            confidence: dec!(0.6),
            reasoning: "because".into(),
            claims,
        }
    }

    fn gathered() -> Vec<ToolEvidence> {
        vec![
            ToolEvidence::ok(ToolKind::Search, json!({"query": "q"}), json!(["hit"])),
            ToolEvidence::failed(ToolKind::MarketData, json!({"symbol": "ACME"}), "no data"),
            ToolEvidence::ok(ToolKind::Search, json!({"query": "q2"}), json!(["hit2"])),
        ]
    }

    fn context() -> ExpertContext {
        ExpertContext {
            session_id: Uuid::nil(),
            round: 1,
            question: "Is ACME undervalued?".into(),
            shared_context: vec![],
            prior_conflicts: vec![],
        }
    }

    #[test]
    fn labels_map_to_gathered_indices() {
        let opinion = build_opinion(
            "finance",
            2,
            response(vec![proposal("ACME is undervalued", &["E1", "C4", "E3", "X9"])]),
            gathered(),
        );
        assert!(!opinion.is_degraded());
        assert_eq!(opinion.round, 2);
        assert_eq!(
            opinion.claims[0].evidence,
            vec![
                DraftEvidence::Gathered(0),
                DraftEvidence::Gathered(2),
                DraftEvidence::Claim(ClaimId(4)),
            ]
        );
        assert_eq!(opinion.evidence.len(), 3);
    }

    #[test]
    fn reused_evidence_dropped_from_later_claims() {
        let opinion = build_opinion(
            "finance",
            1,
            response(vec![
                proposal("ACME is undervalued", &["E1"]),
                proposal("ACME margins improve", &["E1", "E3"]),
            ]),
            gathered(),
        );
        assert_eq!(opinion.claims[1].evidence, vec![DraftEvidence::Gathered(2)]);
    }

    #[test]
    fn claims_on_failed_evidence_dropped() {
        let opinion = build_opinion(
            "finance",
            1,
            response(vec![
                proposal("ACME is undervalued", &["E2"]),
                proposal("ACME margins improve", &["E1"]),
                proposal("   ", &[]),
            ]),
            gathered(),
        );
        assert_eq!(opinion.claims.len(), 1);
        assert_eq!(opinion.claims[0].text, "ACME margins improve");
    }

    #[test]
    fn nothing_left_is_degraded() {
        let opinion = build_opinion(
            "finance",
            1,
            response(vec![proposal("ACME is undervalued", &["E2"])]),
            gathered(),
        );
        assert!(opinion.is_degraded());
        assert_eq!(opinion.evidence.len(), 3);
    }

    #[test]
    fn supersedes_zero_ignored() {
        let mut p = proposal("ACME is undervalued", &[]);
        p.supersedes = Some(0);
        let opinion = build_opinion("finance", 1, response(vec![p]), vec![]);
        assert_eq!(opinion.claims[0].supersedes, None);
    }

    fn finance() -> Persona {
        Persona::from_config(&PersonaConfig::new(
            "finance",
            "finance",
            vec![ToolKind::Search, ToolKind::MarketData],
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn persona_expert_gathers_and_parses() {
        let mut registry = ToolRegistry::new(Duration::from_secs(5), 100, Duration::from_secs(60));
        registry.register(Arc::new(StaticTool::new(
            ToolKind::Search,
            json!({"results": ["cheap"]}),
        )));
        let backend = Arc::new(ScriptedBackend::new([r#"{
            "confidence": 0.7,
            "reasoning": "Trades below peers",
            "claims": [{"text": "ACME is undervalued", "confidence": 0.8, "evidence": ["E1"]}]
        }"#]));

        let expert = PersonaExpert::new(finance(), backend.clone(), Arc::new(registry));
        let opinion = expert.produce_opinion(&context()).await;

        assert!(!opinion.is_degraded());
        // Market data is not registered, so only the search ran.
        assert_eq!(opinion.evidence.len(), 1);
        assert_eq!(opinion.claims[0].evidence, vec![DraftEvidence::Gathered(0)]);
        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("\"label\": \"E1\""));
        assert!(prompt.contains("cheap"));
    }

    #[tokio::test]
    async fn backend_failure_degrades() {
        let registry = ToolRegistry::new(Duration::from_secs(5), 100, Duration::from_secs(60));
        let backend = Arc::new(ScriptedBackend::new(["no json here"]));
        let expert = PersonaExpert::new(finance(), backend, Arc::new(registry));

        let opinion = expert.produce_opinion(&context()).await;
        assert!(opinion.is_degraded());
        assert!(opinion.claims.is_empty());
        assert_eq!(opinion.expert, "finance");
    }
}
