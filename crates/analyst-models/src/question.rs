use serde::{Deserialize, Serialize};

/// Immutable input to one analysis session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    /// Explicit expert set. `None` means the configured default roster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experts: Option<Vec<String>>,
    /// Round limit for this session. `None` means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            experts: None,
            max_rounds: None,
        }
    }

    pub fn with_experts<I, S>(mut self, experts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.experts = Some(experts.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Check the question is well formed. Returns a human-readable reason otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("question text is empty".to_string());
        }
        if self.max_rounds == Some(0) {
            return Err("max_rounds must be at least 1".to_string());
        }
        if let Some(experts) = &self.experts {
            if experts.is_empty() {
                return Err("expert override is empty".to_string());
            }
            for (i, name) in experts.iter().enumerate() {
                if name.trim().is_empty() {
                    return Err(format!("expert override #{i} is blank"));
                }
                if experts[..i].contains(name) {
                    return Err(format!("expert '{name}' listed twice"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_question_is_valid() {
        assert!(Question::new("Is ACME undervalued?").validate().is_ok());
    }

    #[test]
    fn blank_text_rejected() {
        assert!(Question::new("   ").validate().is_err());
    }

    #[test]
    fn zero_rounds_rejected() {
        let q = Question::new("q").with_max_rounds(0);
        assert!(q.validate().unwrap_err().contains("max_rounds"));
    }

    #[test]
    fn duplicate_and_empty_overrides_rejected() {
        let empty = Question::new("q").with_experts(Vec::<String>::new());
        assert!(empty.validate().is_err());

        let dup = Question::new("q").with_experts(["finance", "risk", "finance"]);
        assert!(dup.validate().unwrap_err().contains("twice"));
    }

    #[test]
    fn optional_fields_skipped_in_json() {
        let json = serde_json::to_value(Question::new("q")).unwrap();
        assert_eq!(json, serde_json::json!({"text": "q"}));
    }
}
