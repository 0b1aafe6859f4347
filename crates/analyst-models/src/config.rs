use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tool::ToolKind;

/// Top-level configuration. Every section has defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AnalystConfig {
    pub orchestrator: OrchestratorConfig,
    pub detector: DetectorConfig,
    pub llm: LlmConfig,
    pub experts: Vec<PersonaConfig>,
    pub tools: ToolsConfig,
    pub store: StoreConfig,
}

impl AnalystConfig {
    /// Personas to build. Falls back to the four built-in personas when none are configured.
    pub fn personas(&self) -> Vec<PersonaConfig> {
        if self.experts.is_empty() {
            PersonaConfig::defaults()
        } else {
            self.experts.clone()
        }
    }
}

/// Configuration for the round loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Round limit when the question does not override it.
    pub max_rounds: u32,
    /// Wall-clock budget per round in seconds. 0 disables the budget.
    pub round_timeout_seconds: u64,
    /// Expert names used when the question carries no override.
    pub default_experts: Vec<String>,
    /// Send conflicts that survive evidence and majority checks to the arbiter.
    pub escalation: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            round_timeout_seconds: 180,
            default_experts: DEFAULT_EXPERTS.iter().map(|s| s.to_string()).collect(),
            escalation: false,
        }
    }
}

pub const DEFAULT_EXPERTS: [&str; 4] = ["finance", "policy", "industry", "risk"];

/// Configuration for conflict detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Fraction of a range's magnitude two numeric ranges may be apart and still agree.
    pub numeric_tolerance: Decimal,
    /// Longest subject key, in tokens, derived from claim text.
    pub subject_max_tokens: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            numeric_tolerance: Decimal::new(5, 2),
            subject_max_tokens: 4,
        }
    }
}

/// The language model backend, run as an external command.
///
/// `args` may contain the placeholders `{model}`, `{system}` and `{prompt}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub command: String,
    pub args: Vec<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: [
                "-p",
                "{prompt}",
                "--system-prompt",
                "{system}",
                "--model",
                "{model}",
                "--output-format",
                "text",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            model: "claude-3-5-haiku-latest".to_string(),
            timeout_seconds: 90,
        }
    }
}

/// A persona record interpreted by the single generic expert implementation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaConfig {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub emoji: String,
    /// Tools this persona may request evidence from.
    #[serde(default)]
    pub allowed_tools: Vec<ToolKind>,
    /// Replaces the built-in prompt for the domain.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Override model for this persona. Falls back to `LlmConfig::model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl PersonaConfig {
    pub fn new(name: &str, domain: &str, allowed_tools: Vec<ToolKind>) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            description: String::new(),
            emoji: String::new(),
            allowed_tools,
            system_prompt: None,
            model: None,
            enabled: true,
        }
    }

    /// The four built-in personas.
    pub fn defaults() -> Vec<PersonaConfig> {
        vec![
            PersonaConfig {
                description: "Valuation, earnings quality and capital markets".to_string(),
                emoji: "💰".to_string(),
                ..Self::new(
                    "finance",
                    "finance",
                    vec![ToolKind::Search, ToolKind::MarketData],
                )
            },
            PersonaConfig {
                description: "Regulation, government policy and geopolitics".to_string(),
                emoji: "🏛".to_string(),
                ..Self::new("policy", "policy", vec![ToolKind::Search])
            },
            PersonaConfig {
                description: "Competitive landscape, supply chain and sector cycles".to_string(),
                emoji: "🏭".to_string(),
                ..Self::new(
                    "industry",
                    "industry",
                    vec![ToolKind::Search, ToolKind::MarketData],
                )
            },
            PersonaConfig {
                description: "Downside scenarios, volatility and tail risks".to_string(),
                emoji: "⚠".to_string(),
                ..Self::new("risk", "risk", vec![ToolKind::Search, ToolKind::MarketData])
            },
        ]
    }
}

/// Configuration for the tool adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Timeout for a single tool call in seconds.
    pub call_timeout_seconds: u64,
    /// Maximum number of cached results of idempotent calls.
    pub cache_capacity: u64,
    /// How long a cached result stays valid, in seconds.
    pub cache_ttl_seconds: u64,
    /// Results requested from search plugins.
    pub search_max_results: usize,
    pub market_data: Option<MarketDataConfig>,
    pub plugins: Vec<PluginConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            call_timeout_seconds: 15,
            cache_capacity: 1_000,
            cache_ttl_seconds: 300,
            search_max_results: 5,
            market_data: None,
            plugins: Vec::new(),
        }
    }
}

/// Market data read from a SQLite cache written by an external data pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketDataConfig {
    pub sqlite_path: String,
}

/// An external plugin executable. Receives the query JSON on stdin and prints JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginConfig {
    pub name: ToolKind,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Safe to retry and to cache.
    #[serde(default = "default_true")]
    pub idempotent: bool,
}

/// Where finished sessions are persisted, if anywhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite_path: Option<String>,
}
