use std::time::Duration;

use analyst_models::LlmConfig;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// The abstract "generate" capability behind every expert.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Produce a completion for `prompt` under `system`. `model` overrides the
    /// backend's default model when set.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String, AgentError>;
}

/// A backend that shells out to a model CLI such as `claude`.
///
/// Arguments may contain `{prompt}`, `{system}` and `{model}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    pub command: String,
    pub args: Vec<String>,
    pub model: String,
    pub timeout: Duration,
}

impl CommandBackend {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn render_args(&self, system: &str, prompt: &str, model: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{system}", system)
                    .replace("{model}", model)
                    .replace("{prompt}", prompt)
            })
            .collect()
    }
}

#[async_trait]
impl LlmBackend for CommandBackend {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String, AgentError> {
        let model = model.unwrap_or(&self.model);
        debug!(command = %self.command, model = %model, "Invoking model CLI");

        let result = tokio::time::timeout(self.timeout, async {
            Command::new(&self.command)
                .args(self.render_args(system, prompt, model))
                .kill_on_drop(true)
                .output()
                .await
        })
        .await
        .map_err(|_| AgentError::Timeout(self.timeout.as_secs()))?
        .map_err(|e| AgentError::Backend(format!("Failed to spawn {}: {e}", self.command)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(status = %result.status, stderr = %stderr, "Model CLI failed");
            return Err(AgentError::Backend(format!(
                "{} exited {}: {}",
                self.command, result.status, stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&result.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(AgentError::Backend("Model returned empty response".to_string()));
        }

        Ok(stdout)
    }
}

/// Check if `command` is on the PATH and answers `--version`.
pub async fn check_cli_available(command: &str) -> bool {
    match Command::new(command).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
