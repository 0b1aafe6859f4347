use analyst_models::{Conflict, ToolKind};
use serde_json::{json, Value};

use crate::persona::Persona;

/// Uppercase tokens that look like tickers but are not.
const TICKER_STOPLIST: &[&str] = &[
    "A", "I", "AI", "AND", "CEO", "CFO", "CPI", "ECB", "EPS", "ESG", "ETF", "EU", "EUR", "EV",
    "FED", "FOMC", "FY", "GDP", "IMF", "IPO", "IS", "IT", "NYSE", "OK", "OR", "PE", "Q1", "Q2",
    "Q3", "Q4", "SEC", "THE", "UK", "US", "USA", "USD", "YOY",
];

/// Most market-data lookups planned for one question.
const MAX_TICKERS: usize = 3;

/// One evidence request an expert will make.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub tool: ToolKind,
    pub query: Value,
}

/// Ticker symbols mentioned in `text`: `$ACME`, or an all-caps token of one to
/// five letters that is not a common abbreviation. Order of first mention.
pub fn extract_tickers(text: &str) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for raw in text.split(|c: char| c.is_whitespace() || ",.;:!?()\"'".contains(c)) {
        let (explicit, token) = match raw.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let is_symbol = (1..=5).contains(&token.len())
            && token.chars().all(|c| c.is_ascii_alphabetic())
            && (explicit || token.chars().all(|c| c.is_ascii_uppercase()));
        if !is_symbol {
            continue;
        }
        let symbol = token.to_ascii_uppercase();
        if !explicit && TICKER_STOPLIST.contains(&symbol.as_str()) {
            continue;
        }
        if !tickers.contains(&symbol) {
            tickers.push(symbol);
        }
        if tickers.len() == MAX_TICKERS {
            break;
        }
    }
    tickers
}

/// Plan the tool calls for one expert round, restricted to the persona's tools.
///
/// A search on the question, one supplemental search per unresolved conflict
/// subject, then a market-data lookup per ticker in the question.
pub fn plan_queries(
    persona: &Persona,
    question: &str,
    prior_conflicts: &[Conflict],
    max_results: usize,
) -> Vec<PlannedQuery> {
    let mut planned = Vec::new();

    if persona.allows(&ToolKind::Search) {
        planned.push(PlannedQuery {
            tool: ToolKind::Search,
            query: json!({"query": question, "max_results": max_results}),
        });
        let mut subjects: Vec<&str> = Vec::new();
        for conflict in prior_conflicts {
            if !subjects.contains(&conflict.subject.as_str()) {
                subjects.push(&conflict.subject);
            }
        }
        for subject in subjects {
            planned.push(PlannedQuery {
                tool: ToolKind::Search,
                query: json!({
                    "query": format!("{question} {subject}"),
                    "max_results": max_results,
                }),
            });
        }
    }

    if persona.allows(&ToolKind::MarketData) {
        for symbol in extract_tickers(question) {
            planned.push(PlannedQuery {
                tool: ToolKind::MarketData,
                query: json!({"symbol": symbol}),
            });
        }
    }

    planned
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_models::{ConflictKind, PersonaConfig, Resolution};
    use rust_decimal::Decimal;

    fn persona(name: &str) -> Persona {
        let config = PersonaConfig::defaults()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap();
        Persona::from_config(&config).unwrap()
    }

    fn conflict(subject: &str) -> Conflict {
        Conflict {
            subject: subject.into(),
            kind: ConflictKind::Direction,
            sides: vec![],
            severity: Decimal::ZERO,
            round: 1,
            resolution: Resolution::Unresolved,
            winner: None,
        }
    }

    #[test]
    fn tickers_from_dollar_and_caps() {
        assert_eq!(
            extract_tickers("Is $acme cheaper than MSFT after the CEO left? And AAPL, MSFT?"),
            vec!["ACME", "MSFT", "AAPL"]
        );
    }

    #[test]
    fn tickers_skip_abbreviations_and_long_words() {
        assert!(extract_tickers("Will US GDP and the FED hurt EPS in Q3?").is_empty());
        assert!(extract_tickers("NVIDIAX is not a ticker, Acme neither").is_empty());
    }

    #[test]
    fn tickers_capped() {
        assert_eq!(extract_tickers("AAA BBB CCC DDD").len(), MAX_TICKERS);
    }

    #[test]
    fn finance_plans_search_supplements_and_market_data() {
        let planned = plan_queries(
            &persona("finance"),
            "Is ACME undervalued?",
            &[conflict("acme"), conflict("acme"), conflict("margin")],
            5,
        );
        let tools: Vec<&ToolKind> = planned.iter().map(|p| &p.tool).collect();
        assert_eq!(
            tools,
            vec![
                &ToolKind::Search,
                &ToolKind::Search,
                &ToolKind::Search,
                &ToolKind::MarketData
            ]
        );
        assert_eq!(planned[1].query["query"], "Is ACME undervalued? acme");
        assert_eq!(planned[3].query["symbol"], "ACME");
    }

    #[test]
    fn policy_never_plans_market_data() {
        let planned = plan_queries(&persona("policy"), "Is ACME undervalued?", &[], 5);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].tool, ToolKind::Search);
    }
}
