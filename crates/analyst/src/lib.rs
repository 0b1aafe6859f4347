//! Analyst - a panel of domain experts answering one question with
//! self-verifying, evidence-backed claims.
//!
//! Experts (finance, policy, industry, risk by default) gather evidence
//! through pluggable tools, append claims to a shared ledger, and revise
//! them over bounded rounds until the conflict detector finds nothing left
//! to dispute.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use analyst::models::{AnalystConfig, Question};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = AnalystConfig::default();
//! let tools = analyst::build_tools(&config, false)?;
//! let orchestrator = analyst::build_orchestrator(&config, tools, None)?;
//! let report = orchestrator
//!     .run_session(Question::new("Is ACME undervalued?"))
//!     .await?;
//! println!("{}", report.narrative);
//! # Ok(())
//! # }
//! ```

pub use analyst_agents as agents;
pub use analyst_ledger as ledger;
pub use analyst_models as models;
pub use analyst_tools as tools;

use std::sync::{Arc, Mutex};

use analyst_agents::{
    AgentError, CommandBackend, ConflictDetector, Expert, LlmArbiter, LlmBackend, Orchestrator,
    Persona, PersonaExpert, SessionError,
};
use analyst_ledger::SessionStore;
use analyst_models::{AnalystConfig, FinalReport, Question};
use analyst_tools::{build_registry, ToolRegistry};
use anyhow::Context;
use tracing::info;

/// Shared handle to the session store.
pub type SharedStore = Arc<Mutex<SessionStore>>;

/// Read and parse a configuration file.
pub fn load_config(path: &str) -> Result<AnalystConfig, anyhow::Error> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    parse_config(&text).with_context(|| format!("Failed to parse config: {path}"))
}

pub fn parse_config(text: &str) -> Result<AnalystConfig, toml::de::Error> {
    toml::from_str(text)
}

/// Tool registry with every configured plugin plus the built-in exporters.
pub fn build_tools(
    config: &AnalystConfig,
    pretty_json: bool,
) -> Result<Arc<ToolRegistry>, anyhow::Error> {
    let registry = build_registry(&config.tools, pretty_json).context("Failed to build tools")?;
    info!(tools = ?registry.kinds(), "Tool registry ready");
    Ok(Arc::new(registry))
}

/// Open the session store, if one is configured.
pub fn open_store(config: &AnalystConfig) -> Result<Option<SharedStore>, anyhow::Error> {
    match &config.store.sqlite_path {
        Some(path) => {
            let store = SessionStore::open(path)
                .with_context(|| format!("Failed to open session store: {path}"))?;
            Ok(Some(Arc::new(Mutex::new(store))))
        }
        None => Ok(None),
    }
}

/// Build an Orchestrator from configuration: one expert per enabled persona,
/// all sharing the model backend and the tool registry.
pub fn build_orchestrator(
    config: &AnalystConfig,
    tools: Arc<ToolRegistry>,
    store: Option<SharedStore>,
) -> Result<Orchestrator, anyhow::Error> {
    let backend: Arc<dyn LlmBackend> = Arc::new(CommandBackend::from_config(&config.llm));

    let experts = config
        .personas()
        .iter()
        .filter(|p| p.enabled)
        .map(|p| {
            let persona = Persona::from_config(p)?;
            Ok(Arc::new(
                PersonaExpert::new(persona, backend.clone(), tools.clone())
                    .with_search_max_results(config.tools.search_max_results),
            ) as Arc<dyn Expert>)
        })
        .collect::<Result<Vec<_>, AgentError>>()
        .context("Failed to build experts")?;

    let mut orchestrator = Orchestrator::new(experts, config.orchestrator.clone())
        .with_detector(ConflictDetector::new(&config.detector));
    if config.orchestrator.escalation {
        orchestrator = orchestrator.with_arbiter(Arc::new(
            LlmArbiter::new(backend).with_model(config.llm.model.clone()),
        ));
    }
    if let Some(store) = store {
        orchestrator = orchestrator.with_store(store);
    }
    Ok(orchestrator)
}

/// Answer a question with the given orchestrator.
///
/// `experts` and `max_rounds` override the configured defaults.
pub async fn run_session(
    orchestrator: &Orchestrator,
    question: &str,
    experts: Option<Vec<String>>,
    max_rounds: Option<u32>,
) -> Result<FinalReport, SessionError> {
    let mut question = Question::new(question);
    if let Some(experts) = experts {
        question = question.with_experts(experts);
    }
    if let Some(max_rounds) = max_rounds {
        question = question.with_max_rounds(max_rounds);
    }
    orchestrator.run_session(question).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_models::ToolKind;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, AnalystConfig::default());
        assert_eq!(config.personas().len(), 4);
    }

    #[test]
    fn config_sections_parse() {
        let config = parse_config(
            r#"
            [orchestrator]
            max_rounds = 5
            escalation = true

            [detector]
            numeric_tolerance = "0.1"

            [[experts]]
            name = "credit"
            domain = "credit"
            allowed_tools = ["search"]
            system_prompt = "You assess credit risk."

            [[tools.plugins]]
            name = "search"
            command = "search-plugin"
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_rounds, 5);
        assert!(config.orchestrator.escalation);
        assert_eq!(config.personas().len(), 1);
        assert_eq!(config.tools.plugins[0].name, ToolKind::Search);
    }

    #[test]
    fn builds_enabled_experts_only() {
        let mut config = AnalystConfig::default();
        let mut personas = analyst_models::PersonaConfig::defaults();
        personas[1].enabled = false;
        config.experts = personas;

        let tools = build_tools(&config, false).unwrap();
        let orchestrator = build_orchestrator(&config, tools, None).unwrap();
        assert_eq!(orchestrator.expert_names(), vec!["finance", "industry", "risk"]);
    }

    #[test]
    fn unknown_domain_without_prompt_is_rejected() {
        let mut config = AnalystConfig::default();
        config.experts = vec![analyst_models::PersonaConfig::new(
            "astrology",
            "astrology",
            vec![],
        )];
        let tools = build_tools(&config, false).unwrap();
        assert!(build_orchestrator(&config, tools, None).is_err());
    }

    #[test]
    fn store_opens_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AnalystConfig::default();
        assert!(open_store(&config).unwrap().is_none());

        config.store.sqlite_path = Some(dir.path().join("sessions.db").display().to_string());
        let store = open_store(&config).unwrap().unwrap();
        assert!(store.lock().unwrap().list().unwrap().is_empty());
    }

    #[test]
    fn exporters_are_always_registered() {
        let tools = build_tools(&AnalystConfig::default(), false).unwrap();
        assert!(tools.contains(&ToolKind::export("markdown")));
        assert!(tools.contains(&ToolKind::export("json")));
    }
}
