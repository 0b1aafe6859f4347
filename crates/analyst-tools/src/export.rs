use std::fmt::Write as _;
use std::sync::Arc;

use analyst_models::{Conflict, EvidenceRef, FinalReport, ToolKind};
use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tool::Tool;

/// Formats a finished report for one publishing target.
pub trait ExportPlugin: Send + Sync {
    fn target(&self) -> &str;

    fn render(&self, report: &FinalReport) -> Result<String, ToolError>;
}

/// Markdown document: question, conclusion, per-expert sections, open conflicts, references.
pub struct MarkdownExporter;

impl ExportPlugin for MarkdownExporter {
    fn target(&self) -> &str {
        "markdown"
    }

    fn render(&self, report: &FinalReport) -> Result<String, ToolError> {
        Ok(render_markdown(report))
    }
}

/// The report itself as JSON.
pub struct JsonExporter {
    pub pretty: bool,
}

impl ExportPlugin for JsonExporter {
    fn target(&self) -> &str {
        "json"
    }

    fn render(&self, report: &FinalReport) -> Result<String, ToolError> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        })
    }
}

/// Exposes an in-process exporter through the tool adapter as `export_<target>`.
///
/// The query is the serialized report; the result is the document as a JSON string.
pub struct ExportTool {
    plugin: Arc<dyn ExportPlugin>,
}

impl ExportTool {
    pub fn new(plugin: Arc<dyn ExportPlugin>) -> Self {
        Self { plugin }
    }
}

#[async_trait]
impl Tool for ExportTool {
    fn kind(&self) -> ToolKind {
        ToolKind::export(self.plugin.target())
    }

    async fn invoke(&self, query: &Value) -> Result<Value, ToolError> {
        let report: FinalReport =
            serde_json::from_value(query.clone()).map_err(|e| ToolError::InvalidQuery {
                tool: self.kind(),
                reason: format!("not a report: {e}"),
            })?;
        Ok(Value::String(self.plugin.render(&report)?))
    }
}

/// Register the built-in `markdown` and `json` exporters.
pub fn register_builtin_exporters(registry: &mut ToolRegistry, pretty_json: bool) {
    registry.register(Arc::new(ExportTool::new(Arc::new(MarkdownExporter))));
    registry.register(Arc::new(ExportTool::new(Arc::new(JsonExporter {
        pretty: pretty_json,
    }))));
}

/// Hand `report` to the `export_<target>` tool and return the formatted document.
pub async fn export_report(
    registry: &ToolRegistry,
    target: &str,
    report: &FinalReport,
) -> Result<String, ToolError> {
    let kind = ToolKind::export(target);
    let value = registry.invoke(&kind, &serde_json::to_value(report)?).await?;
    match value {
        Value::String(document) => Ok(document),
        other => Ok(serde_json::to_string_pretty(&other)?),
    }
}

fn render_markdown(report: &FinalReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", report.question.text);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "_Session {} · {} after {} round(s) · {} active claim(s)_",
        report.session_id,
        report.status,
        report.rounds,
        report.claim_count()
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Conclusion");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.narrative);
    let _ = writeln!(out);

    if !report.groups.is_empty() {
        let _ = writeln!(out, "## Expert analysis");
        for group in &report.groups {
            let _ = writeln!(out);
            let _ = writeln!(out, "### {}", group.expert);
            let _ = writeln!(out);
            for claim in &group.claims {
                let _ = write!(out, "- **{}** {} (confidence {})", claim.id, claim.text, claim.confidence);
                if !claim.evidence.is_empty() {
                    let _ = write!(out, " [{}]", refs(&claim.evidence));
                }
                let _ = writeln!(out);
            }
        }
        let _ = writeln!(out);
    }

    if !report.unresolved_conflicts.is_empty() {
        let _ = writeln!(out, "## Unresolved conflicts");
        let _ = writeln!(out);
        for conflict in &report.unresolved_conflicts {
            let _ = writeln!(out, "- {}", describe(conflict));
        }
        let _ = writeln!(out);
    }

    if !report.resolved_conflicts.is_empty() {
        let _ = writeln!(out, "## Resolved conflicts");
        let _ = writeln!(out);
        for conflict in &report.resolved_conflicts {
            let _ = writeln!(out, "- {} ({})", describe(conflict), conflict.resolution);
        }
        let _ = writeln!(out);
    }

    if !report.degraded.is_empty() {
        let _ = writeln!(out, "## Degraded experts");
        let _ = writeln!(out);
        for note in &report.degraded {
            let _ = writeln!(out, "- {} (round {}): {}", note.expert, note.round, note.reason);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Claims");
    let _ = writeln!(out);
    let _ = writeln!(out, "| id | expert | round | confidence | evidence | claim |");
    let _ = writeln!(out, "|----|--------|-------|------------|----------|-------|");
    for row in &report.table {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            row.id,
            row.expert,
            row.round,
            row.confidence,
            row.evidence_count,
            row.text.replace('|', "\\|")
        );
    }

    out
}

fn refs(evidence: &[EvidenceRef]) -> String {
    evidence
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe(conflict: &Conflict) -> String {
    let sides = conflict
        .sides
        .iter()
        .map(|side| {
            let claims = side
                .claims
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} ({}: {})", side.position, side.experts.join(", "), claims)
        })
        .collect::<Vec<_>>()
        .join(" vs ");
    format!("**{}**: {}", conflict.subject, sides)
}
