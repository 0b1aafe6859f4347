use std::collections::BTreeSet;

use analyst_models::{PersonaConfig, ToolKind};

use crate::error::AgentError;
use crate::prompts::get_domain_prompt;

/// A persona record with its system prompt resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub name: String,
    pub domain: String,
    pub description: String,
    pub emoji: String,
    pub allowed_tools: BTreeSet<ToolKind>,
    pub system_prompt: String,
    pub model: Option<String>,
}

impl Persona {
    /// Resolve a configured persona. A domain without a built-in prompt needs an explicit one.
    pub fn from_config(config: &PersonaConfig) -> Result<Self, AgentError> {
        let system_prompt = match &config.system_prompt {
            Some(prompt) => prompt.clone(),
            None => get_domain_prompt(&config.domain)
                .ok_or_else(|| AgentError::UnknownDomain(config.domain.clone()))?,
        };

        Ok(Self {
            name: config.name.clone(),
            domain: config.domain.clone(),
            description: config.description.clone(),
            emoji: config.emoji.clone(),
            allowed_tools: config
                .allowed_tools
                .iter()
                .filter(|t| !t.is_export())
                .cloned()
                .collect(),
            system_prompt,
            model: config.model.clone(),
        })
    }

    pub fn allows(&self, tool: &ToolKind) -> bool {
        self.allowed_tools.contains(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_with_builtin_prompts() {
        let personas: Vec<Persona> = PersonaConfig::defaults()
            .iter()
            .map(|c| Persona::from_config(c).unwrap())
            .collect();
        assert_eq!(personas.len(), 4);

        let finance = &personas[0];
        assert!(finance.allows(&ToolKind::MarketData));
        assert!(finance.system_prompt.contains("FINANCE"));

        let policy = &personas[1];
        assert!(policy.allows(&ToolKind::Search));
        assert!(!policy.allows(&ToolKind::MarketData));
    }

    #[test]
    fn unknown_domain_needs_prompt() {
        let config = PersonaConfig::new("esg", "esg", vec![ToolKind::Search]);
        assert!(matches!(
            Persona::from_config(&config),
            Err(AgentError::UnknownDomain(_))
        ));

        let config = PersonaConfig {
            system_prompt: Some("You are the ESG expert.".into()),
            ..config
        };
        let persona = Persona::from_config(&config).unwrap();
        assert_eq!(persona.system_prompt, "You are the ESG expert.");
    }

    #[test]
    fn export_tools_never_allowed_as_evidence() {
        let config = PersonaConfig::new(
            "finance",
            "finance",
            vec![ToolKind::Search, ToolKind::export("markdown")],
        );
        let persona = Persona::from_config(&config).unwrap();
        assert_eq!(persona.allowed_tools.len(), 1);
    }
}
