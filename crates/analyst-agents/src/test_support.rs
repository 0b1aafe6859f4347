//! Deterministic stand-ins for experts, the model backend, tools and the
//! arbiter, so sessions can be driven end to end without a model CLI.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use analyst_models::{
    Claim, ClaimDraft, Conflict, ExpertOpinion, OpinionStatus, ToolEvidence, ToolKind,
};
use analyst_tools::{Tool, ToolError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::arbiter::Arbiter;
use crate::backend::LlmBackend;
use crate::error::AgentError;
use crate::expert::{Expert, ExpertContext};

/// What a scripted expert answers in one round.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedOpinion {
    pub confidence: Decimal,
    pub claims: Vec<ClaimDraft>,
    pub evidence: Vec<ToolEvidence>,
}

impl ScriptedOpinion {
    pub fn claims(claims: impl IntoIterator<Item = ClaimDraft>) -> Self {
        Self {
            confidence: Decimal::new(7, 1),
            claims: claims.into_iter().collect(),
            evidence: Vec::new(),
        }
    }

    /// Claims backed by `count` successful search results the drafts can cite
    /// as `Gathered(0..count)`.
    pub fn with_evidence(claims: impl IntoIterator<Item = ClaimDraft>, count: usize) -> Self {
        let mut opinion = Self::claims(claims);
        opinion.evidence = (0..count)
            .map(|i| {
                ToolEvidence::ok(
                    ToolKind::Search,
                    json!({"query": format!("scripted evidence {}", i + 1)}),
                    json!({"results": [format!("finding {}", i + 1)]}),
                )
            })
            .collect();
        opinion
    }

    pub fn confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence;
        self
    }
}

#[derive(Debug, Clone)]
enum Step {
    Answer(ScriptedOpinion),
    Degrade(String),
    Hang,
}

/// An expert that replays per-round scripted opinions. Unscripted rounds get
/// an empty, non-degraded opinion.
pub struct ScriptedExpert {
    name: String,
    domain: String,
    steps: BTreeMap<u32, Step>,
    delay: Duration,
    seen: Mutex<Vec<ExpertContext>>,
}

impl ScriptedExpert {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: name.to_string(),
            steps: BTreeMap::new(),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    pub fn on_round(mut self, round: u32, opinion: ScriptedOpinion) -> Self {
        self.steps.insert(round, Step::Answer(opinion));
        self
    }

    /// Degrade in `round`, as a failed generation or parse would.
    pub fn failing_on(mut self, round: u32, reason: &str) -> Self {
        self.steps.insert(round, Step::Degrade(reason.to_string()));
        self
    }

    /// Never answer in `round`.
    pub fn hanging_on(mut self, round: u32) -> Self {
        self.steps.insert(round, Step::Hang);
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Contexts this expert was called with, in call order.
    pub fn contexts(&self) -> Vec<ExpertContext> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Expert for ScriptedExpert {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn produce_opinion(&self, context: &ExpertContext) -> ExpertOpinion {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(context.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.steps.get(&context.round) {
            Some(Step::Answer(scripted)) => ExpertOpinion {
                expert: self.name.clone(),
                round: context.round,
                confidence: scripted.confidence,
                reasoning: format!("scripted {} round {}", self.name, context.round),
                claims: scripted.claims.clone(),
                evidence: scripted.evidence.clone(),
                status: OpinionStatus::Ok,
            },
            Some(Step::Degrade(reason)) => {
                ExpertOpinion::degraded(&self.name, context.round, reason.clone())
            }
            Some(Step::Hang) => std::future::pending().await,
            None => ExpertOpinion::new(&self.name, context.round, Decimal::ZERO),
        }
    }
}

/// A model backend with canned replies.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// Replies handed out in order; once they run out, calls fail.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// The same reply for every call.
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            repeat: Some(reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(
        &self,
        _system: &str,
        prompt: &str,
        _model: Option<&str>,
    ) -> Result<String, AgentError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| AgentError::Backend("scripted backend poisoned".to_string()))?
            .pop_front();
        next.or_else(|| self.repeat.clone())
            .ok_or_else(|| AgentError::Backend("no scripted reply left".to_string()))
    }
}

/// A tool returning a fixed value, or always failing.
pub struct StaticTool {
    kind: ToolKind,
    result: Result<Value, String>,
    calls: AtomicUsize,
}

impl StaticTool {
    pub fn new(kind: ToolKind, value: Value) -> Self {
        Self {
            kind,
            result: Ok(value),
            calls: AtomicUsize::new(0),
        }
    }

    /// A tool whose every call fails, as during an outage.
    pub fn failing(kind: ToolKind, message: &str) -> Self {
        Self {
            kind,
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn kind(&self) -> ToolKind {
        self.kind.clone()
    }

    async fn invoke(&self, _query: &Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(|message| ToolError::Failed {
            tool: self.kind.clone(),
            message,
        })
    }
}

/// An arbiter that always gives the same ruling.
pub struct StaticArbiter {
    winner: Option<usize>,
    calls: AtomicUsize,
}

impl StaticArbiter {
    pub fn new(winner: Option<usize>) -> Self {
        Self {
            winner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Arbiter for StaticArbiter {
    async fn rule(
        &self,
        _question: &str,
        conflict: &Conflict,
        _claims: &[Claim],
    ) -> Result<Option<usize>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.winner.filter(|w| *w < conflict.sides.len()))
    }
}
