//! Integration tests that invoke the real model CLI.
//!
//! These tests are `#[ignore]` by default. They require the `claude` CLI on
//! PATH with working credentials.
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p analyst-agents --test cli_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use analyst_agents::parser::{extract_json, parse_expert_response};
use analyst_agents::{check_cli_available, CommandBackend, Expert, ExpertContext, LlmBackend};
use analyst_agents::{Persona, PersonaExpert};
use analyst_models::{LlmConfig, PersonaConfig};
use analyst_tools::ToolRegistry;
use uuid::Uuid;

fn backend(timeout: Duration) -> CommandBackend {
    CommandBackend {
        timeout,
        ..CommandBackend::from_config(&LlmConfig::default())
    }
}

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available("claude").await,
        "claude CLI not found on PATH"
    );
}

/// Catches changes in the CLI's output format that would break JSON extraction.
#[tokio::test]
#[ignore]
async fn cli_output_is_parseable_json() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let system = concat!(
        "You are a test agent. Respond ONLY with a JSON object, no other text.\n",
        "The JSON must have exactly these fields:\n",
        "- \"status\": the string \"ok\"\n",
        "- \"echo\": repeat back the user's message exactly\n",
    );
    let raw = backend(Duration::from_secs(30))
        .generate(system, "ping", None)
        .await
        .expect("model CLI invocation failed");

    let json = extract_json(&raw)
        .unwrap_or_else(|e| panic!("no JSON in CLI output ({e}):\n---\n{raw}\n---"));
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("extracted JSON is invalid");
    assert_eq!(parsed["status"], "ok", "unexpected response: {parsed}");
}

#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let result = backend(Duration::from_secs(15))
        .generate("You are a test.", "hello", Some("nonexistent-model-12345"))
        .await;
    assert!(result.is_err(), "expected an error, got: {:?}", result.unwrap());
}

/// A real persona answers in the expert schema.
#[tokio::test]
#[ignore]
async fn finance_persona_answers_in_schema() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let persona = Persona::from_config(&PersonaConfig::defaults()[0]).unwrap();
    let raw = backend(Duration::from_secs(120))
        .generate(
            &persona.system_prompt,
            "Question: Is a company trading at 8x earnings with falling revenue cheap?",
            None,
        )
        .await
        .expect("model CLI invocation failed");
    let response = parse_expert_response(&raw).expect("response not in expert schema");
    assert!(!response.claims.is_empty());

    let expert = PersonaExpert::new(
        persona,
        Arc::new(backend(Duration::from_secs(120))),
        Arc::new(ToolRegistry::new(Duration::from_secs(5), 10, Duration::from_secs(60))),
    );
    let opinion = expert
        .produce_opinion(&ExpertContext {
            session_id: Uuid::new_v4(),
            round: 1,
            question: "Is ACME undervalued?".into(),
            shared_context: vec![],
            prior_conflicts: vec![],
        })
        .await;
    assert!(!opinion.is_degraded(), "{:?}", opinion.degraded_reason());
}
