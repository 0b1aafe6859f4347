use std::process::Stdio;

use analyst_models::{PluginConfig, ToolKind};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::tool::Tool;

/// How a plugin's stdout is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOutput {
    /// A single JSON document.
    Json,
    /// Free text, returned as a JSON string. Used by export plugins.
    Text,
}

/// A tool implemented by an external executable.
///
/// The query is written to the process's stdin as JSON and the result is read
/// from stdout. A non-zero exit status is a failure.
pub struct CommandTool {
    kind: ToolKind,
    command: String,
    args: Vec<String>,
    idempotent: bool,
    output: PluginOutput,
}

impl CommandTool {
    pub fn new(kind: ToolKind, command: impl Into<String>, args: Vec<String>) -> Self {
        let output = if kind.is_export() {
            PluginOutput::Text
        } else {
            PluginOutput::Json
        };
        Self {
            kind,
            command: command.into(),
            args,
            idempotent: true,
            output,
        }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            idempotent: config.idempotent,
            ..Self::new(config.name.clone(), config.command.clone(), config.args.clone())
        }
    }

    fn failed(&self, message: String) -> ToolError {
        ToolError::Failed {
            tool: self.kind.clone(),
            message,
        }
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn kind(&self) -> ToolKind {
        self.kind.clone()
    }

    fn idempotent(&self) -> bool {
        self.idempotent
    }

    async fn invoke(&self, query: &Value) -> Result<Value, ToolError> {
        debug!(tool = %self.kind, command = %self.command, "Invoking plugin command");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Unavailable(format!("failed to spawn {}: {e}", self.command)))?;

        let payload = serde_json::to_vec(query)?;
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };

        // Stdin is fed while stdout drains.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if let Err(e) = fed {
            // A plugin may exit without reading its input; its exit status decides.
            debug!(tool = %self.kind, error = %e, "Plugin did not consume its input");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(tool = %self.kind, status = %output.status, stderr = %stderr, "Plugin command failed");
            return Err(self.failed(format!("exited {}: {}", output.status, stderr.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(self.failed("empty output".to_string()));
        }

        match self.output {
            PluginOutput::Json => serde_json::from_str(stdout.trim())
                .map_err(|e| self.failed(format!("invalid JSON output: {e}"))),
            PluginOutput::Text => Ok(Value::String(stdout.into_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_plugins_produce_text() {
        let tool = CommandTool::new(ToolKind::export("news"), "news-export", vec![]);
        assert_eq!(tool.output, PluginOutput::Text);
        let tool = CommandTool::new(ToolKind::Search, "ddg", vec![]);
        assert_eq!(tool.output, PluginOutput::Json);
    }

    #[test]
    fn from_config_keeps_idempotence() {
        let config = PluginConfig {
            name: ToolKind::Search,
            command: "ddg".into(),
            args: vec!["--json".into()],
            idempotent: false,
        };
        let tool = CommandTool::from_config(&config);
        assert!(!tool.idempotent());
        assert_eq!(tool.args, vec!["--json".to_string()]);
    }

    #[tokio::test]
    async fn echoes_query_through_cat() {
        let tool = CommandTool::new(ToolKind::Search, "cat", vec![]);
        let query = json!({"query": "acme", "max_results": 3});
        assert_eq!(tool.invoke(&query).await.unwrap(), query);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let tool = CommandTool::new(
            ToolKind::Search,
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
        );
        let err = tool.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let tool = CommandTool::new(ToolKind::Search, "definitely-not-a-real-plugin-binary", vec![]);
        let err = tool.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }

    #[tokio::test]
    async fn text_output_wrapped_as_string() {
        let tool = CommandTool::new(
            ToolKind::export("plain"),
            "sh",
            vec!["-c".into(), "cat >/dev/null; printf 'hello'".into()],
        );
        assert_eq!(tool.invoke(&json!({"x": 1})).await.unwrap(), json!("hello"));
    }
}
