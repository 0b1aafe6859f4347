use analyst_models::{ClaimId, ExpertResponse};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::AgentError;

/// Locate the JSON object in a model reply.
///
/// Candidates are tried in order: the whole reply, the body of each fenced
/// code block, then each top-level `{...}` span. The first one that parses
/// as a JSON object wins.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let text = text.trim();
    std::iter::once(text)
        .chain(fenced_blocks(text))
        .chain(object_spans(text))
        .find(|candidate| is_object(candidate))
        .map(str::to_string)
        .ok_or_else(|| {
            AgentError::Parse(format!("no JSON object in model reply ({} bytes)", text.len()))
        })
}

fn is_object(candidate: &str) -> bool {
    matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_)))
}

/// Bodies of ``` fences. A language tag on the opening line is dropped.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```").skip(1).step_by(2).map(|block| match block.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with('{') => body.trim(),
        _ => block.trim(),
    })
}

/// Top-level balanced `{...}` spans. Braces inside string literals don't count.
fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut open = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => quoted = true,
            '{' => {
                if depth == 0 {
                    open = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[open..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

/// Parse an expert's reply. Confidences outside [0, 1] are clamped.
pub fn parse_expert_response(raw: &str) -> Result<ExpertResponse, AgentError> {
    let json_str = extract_json(raw)?;
    let mut response: ExpertResponse = serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse expert response: {e}")))?;

    response.confidence = clamp_confidence(response.confidence);
    for claim in &mut response.claims {
        claim.confidence = clamp_confidence(claim.confidence);
    }
    Ok(response)
}

pub fn clamp_confidence(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}

/// A citation label as written by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Citation {
    /// `E<n>`: the n-th gathered evidence item, 1-based.
    Evidence(usize),
    /// `C<n>`: an earlier claim.
    Claim(ClaimId),
}

/// Parse `E3`, `e3`, `C12` or a bare claim number. Anything else is `None`.
pub fn parse_citation(label: &str) -> Option<Citation> {
    let label = label.trim();
    let (prefix, digits) = match label.chars().next()? {
        c if c.is_ascii_alphabetic() => (Some(c.to_ascii_uppercase()), &label[1..]),
        _ => (None, label),
    };
    let n: u64 = digits.parse().ok()?;
    if n == 0 {
        return None;
    }
    match prefix {
        Some('E') => Some(Citation::Evidence(usize::try_from(n).ok()?)),
        Some('C') | None => Some(Citation::Claim(ClaimId(n))),
        _ => None,
    }
}
