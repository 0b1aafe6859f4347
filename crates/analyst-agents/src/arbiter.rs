use std::sync::Arc;

use analyst_models::{Claim, Conflict};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::backend::LlmBackend;
use crate::error::AgentError;
use crate::parser::extract_json;
use crate::prompts::arbiter_system_prompt;

/// Settles conflicts that neither evidence nor majority could decide.
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// Index of the winning side, or `None` to leave the conflict unresolved.
    async fn rule(
        &self,
        question: &str,
        conflict: &Conflict,
        claims: &[Claim],
    ) -> Result<Option<usize>, AgentError>;
}

#[derive(Deserialize)]
struct Ruling {
    winner: Option<usize>,
    #[serde(default)]
    reasoning: String,
}

/// Arbiter that asks the model backend for a ruling.
pub struct LlmArbiter {
    backend: Arc<dyn LlmBackend>,
    model: Option<String>,
}

impl LlmArbiter {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl Arbiter for LlmArbiter {
    async fn rule(
        &self,
        question: &str,
        conflict: &Conflict,
        claims: &[Claim],
    ) -> Result<Option<usize>, AgentError> {
        let involved = conflict.claim_ids();
        let cited: Vec<&Claim> = claims.iter().filter(|c| involved.contains(&c.id)).collect();
        let prompt = serde_json::to_string_pretty(&serde_json::json!({
            "question": question,
            "conflict": conflict,
            "claims": cited,
        }))?;

        let raw = self
            .backend
            .generate(&arbiter_system_prompt(), &prompt, self.model.as_deref())
            .await?;
        let ruling: Ruling = serde_json::from_str(&extract_json(&raw)?)
            .map_err(|e| AgentError::Parse(format!("Arbiter ruling: {e}")))?;

        match ruling.winner {
            Some(side) if side >= conflict.sides.len() => Err(AgentError::Parse(format!(
                "Arbiter picked side {side} of {}",
                conflict.sides.len()
            ))),
            winner => {
                debug!(
                    subject = %conflict.subject,
                    ?winner,
                    reasoning = %ruling.reasoning,
                    "Arbiter ruled"
                );
                Ok(winner)
            }
        }
    }
}
