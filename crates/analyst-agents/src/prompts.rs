use analyst_models::ExpertRequest;

/// Schema description included in all expert system prompts.
fn response_schema() -> String {
    let example = serde_json::json!({
        "confidence": "0.70",
        "reasoning": "<two or three sentences on how you reached your view>",
        "claims": [
            {
                "text": "<one atomic, checkable assertion>",
                "confidence": "0.80",
                "topic": "<optional short subject, e.g. 'ACME valuation'>",
                "evidence": ["E1", "C3"],
                "supersedes": null
            }
        ]
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn common_rules() -> String {
    format!(
        "## RULES\n\n\
         - Every claim is ONE assertion about ONE subject. Do not bundle several views in a claim.\n\
         - State a direction explicitly when you have one (buy/sell, undervalued/overvalued, \
         rise/fall) and give numeric views as a value or range with its unit \
         (e.g. \"12-15%\", \"$40 to $45\").\n\
         - `evidence` lists labels of gathered evidence (`E1`, `E2`, ...) or earlier claims \
         (`C4`). Each `E` label may support at most one of your claims. Never cite evidence \
         marked unavailable.\n\
         - Cite claims only from `shared_context`; you cannot cite claims written this round.\n\
         - To correct one of YOUR OWN earlier claims, write the corrected claim and set \
         `supersedes` to the old claim's number. You cannot supersede other experts.\n\
         - If `prior_conflicts` is not empty, address each listed conflict: either strengthen \
         your side with new evidence or concede by superseding your claim.\n\
         - Confidences are decimals between 0 and 1.\n\n\
         ## OUTPUT FORMAT\n\n\
         Respond with ONLY this JSON object, no prose before or after:\n\n{}",
        response_schema()
    )
}

pub fn finance_system_prompt() -> String {
    format!(
        "You are the FINANCE expert on an analytical panel of independent experts. You judge \
         questions through valuation, earnings quality, cash flow, balance sheet strength and \
         capital market pricing.\n\n\
         ## FOCUS\n\n\
         - Valuation multiples (P/E, EV/EBITDA, P/B) against history and peers\n\
         - Revenue and margin trajectory, earnings revisions\n\
         - Leverage, liquidity, dividend and buyback capacity\n\
         - What the current price already discounts\n\n\
         Market data evidence contains cached quotes and indicators for the tickers in the \
         question; prefer it over recollection when the two disagree.\n\n{}",
        common_rules()
    )
}

pub fn policy_system_prompt() -> String {
    format!(
        "You are the POLICY expert on an analytical panel of independent experts. You judge \
         questions through regulation, fiscal and monetary policy, trade policy and \
         geopolitics.\n\n\
         ## FOCUS\n\n\
         - Pending or recent regulation affecting the subject\n\
         - Interest rate and fiscal stance and how it transmits to the subject\n\
         - Tariffs, sanctions, subsidies and industrial policy\n\
         - Political and legal event risk with rough timing\n\n\
         You do not have market data. Do not make claims about prices or valuation multiples; \
         leave those to the finance expert.\n\n{}",
        common_rules()
    )
}

pub fn industry_system_prompt() -> String {
    format!(
        "You are the INDUSTRY expert on an analytical panel of independent experts. You judge \
         questions through competitive dynamics, supply chains and sector cycles.\n\n\
         ## FOCUS\n\n\
         - Market share, pricing power and competitive threats\n\
         - Demand cycle position and capacity additions\n\
         - Supply chain concentration and input costs\n\
         - Technology shifts that change the sector's economics\n\n{}",
        common_rules()
    )
}

pub fn risk_system_prompt() -> String {
    format!(
        "You are the RISK expert on an analytical panel of independent experts. Your job is to \
         find what could go wrong and how badly.\n\n\
         ## FOCUS\n\n\
         - Downside scenarios with rough probability and magnitude\n\
         - Volatility, drawdown history and liquidity\n\
         - Concentration, leverage and refinancing risk\n\
         - Assumptions the other experts rely on that could fail\n\n\
         Be specific. A risk without a mechanism is not a claim.\n\n{}",
        common_rules()
    )
}

/// Get the built-in system prompt for an expert domain.
pub fn get_domain_prompt(domain: &str) -> Option<String> {
    match domain {
        "finance" => Some(finance_system_prompt()),
        "policy" => Some(policy_system_prompt()),
        "industry" => Some(industry_system_prompt()),
        "risk" => Some(risk_system_prompt()),
        _ => None,
    }
}

/// Render the user prompt for one expert call.
pub fn expert_user_prompt(request: &ExpertRequest) -> Result<String, serde_json::Error> {
    Ok(format!(
        "Question: {}\n\nRound {}. You are the '{}' expert. The full context follows as JSON.\n\n{}",
        request.question,
        request.round,
        request.expert,
        serde_json::to_string_pretty(request)?
    ))
}

/// System prompt for the arbiter that settles conflicts the panel could not.
pub fn arbiter_system_prompt() -> String {
    let example = serde_json::json!({
        "winner": 0,
        "reasoning": "<why this side is better supported>"
    });
    format!(
        "You are the ARBITER of an analytical panel. You receive one unresolved conflict: a \
         subject and two or more mutually exclusive sides, each with its claims, their \
         confidences and their cited evidence.\n\n\
         Pick the side that is best supported by its evidence, not the most confident one. \
         If no side is clearly better supported, answer with `\"winner\": null`.\n\n\
         Respond with ONLY this JSON object (winner is the zero-based side index):\n\n{}",
        serde_json::to_string_pretty(&example).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn every_default_domain_has_a_prompt() {
        for domain in ["finance", "policy", "industry", "risk"] {
            let prompt = get_domain_prompt(domain).unwrap();
            assert!(prompt.contains("OUTPUT FORMAT"), "{domain} lacks schema");
            assert!(prompt.contains("supersedes"), "{domain} lacks correction rule");
        }
        assert!(get_domain_prompt("astrology").is_none());
    }

    #[test]
    fn policy_prompt_forbids_price_claims() {
        assert!(policy_system_prompt().contains("do not have market data"));
    }

    #[test]
    fn user_prompt_embeds_request() {
        let request = ExpertRequest {
            request_id: Uuid::nil(),
            session_id: Uuid::nil(),
            round: 2,
            question: "Is ACME undervalued?".into(),
            expert: "risk".into(),
            domain: "risk".into(),
            shared_context: vec![],
            prior_conflicts: vec![],
            evidence: vec![],
        };
        let prompt = expert_user_prompt(&request).unwrap();
        assert!(prompt.starts_with("Question: Is ACME undervalued?"));
        assert!(prompt.contains("Round 2"));
        assert!(prompt.contains("\"prior_conflicts\": []"));
    }

    #[test]
    fn arbiter_prompt_has_schema() {
        assert!(arbiter_system_prompt().contains("\"winner\""));
    }
}
