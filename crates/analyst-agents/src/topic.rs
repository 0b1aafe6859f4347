//! Subject keys and asserted positions extracted from claim text.
//!
//! Deciding whether two claims talk about the same thing is a heuristic. It
//! sits behind [`SubjectNormalizer`] so a better strategy (entity linking, an
//! embedding model) can replace the keyword approach without touching the
//! detector.

use std::fmt;

use analyst_models::Claim;
use rust_decimal::Decimal;

/// Maps a claim to the normalized key of the subject it addresses.
pub trait SubjectNormalizer: Send + Sync {
    /// `None` when no subject can be derived; such claims never conflict.
    fn subject(&self, claim: &Claim) -> Option<String>;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "will", "would",
    "should", "could", "can", "may", "might", "must", "to", "of", "in", "on", "at", "for",
    "by", "with", "as", "and", "or", "its", "it", "this", "that", "these", "those", "currently",
    "now", "very", "highly", "likely", "remain", "remains", "stay", "stays", "look", "looks",
    "appear", "appears", "seem", "seems", "we", "our", "i", "stock", "share", "shares",
    "company", "equity", "price", "next", "over", "year", "years", "quarter", "quarters",
    "term", "near", "long", "short", "what", "which", "relatively", "significantly",
    "materially", "has", "have", "had", "do", "does", "from", "than", "about", "expect",
    "expected", "see",
];

const BULLISH: &[&str] = &[
    "buy", "undervalued", "outperform", "overweight", "bullish", "upside", "rise", "rises",
    "rising", "grow", "grows", "growing", "increase", "increases", "increasing", "expand",
    "expands", "expanding", "improve", "improves", "improving", "beat", "beats", "cheap",
    "strong", "stronger", "gain", "gains", "positive", "accumulate", "upgrade", "rally",
    "higher", "attractive",
];

const BEARISH: &[&str] = &[
    "sell", "overvalued", "underperform", "underweight", "bearish", "downside", "fall",
    "falls", "falling", "decline", "declines", "declining", "shrink", "shrinks", "shrinking",
    "contract", "contracts", "contracting", "deteriorate", "deteriorates", "worsen", "worsens",
    "miss", "misses", "expensive", "weak", "weaker", "loss", "losses", "negative", "reduce",
    "downgrade", "lower", "drop", "drops", "unattractive",
];

const NEUTRAL: &[&str] = &["hold", "neutral", "fairly", "flat", "stable", "unchanged", "inline"];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "unlikely", "isn", "aren", "won", "doesn", "don", "cannot", "without",
];

/// How far back, in tokens, a negation still flips a stance word.
const NEGATION_WINDOW: usize = 2;

/// Keyword strategy: the topic hint when the expert gave one, otherwise the
/// content words that precede the first stance word or number.
#[derive(Debug, Clone)]
pub struct KeywordNormalizer {
    pub max_tokens: usize,
}

impl KeywordNormalizer {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    fn key(&self, tokens: &[String]) -> Option<String> {
        let content: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .filter(|t| !STOPWORDS.contains(t) && !NEGATIONS.contains(t))
            .collect();
        if content.is_empty() {
            return None;
        }

        let lead: Vec<String> = content
            .iter()
            .take_while(|t| !is_stance_word(t) && !is_numeric(t))
            .take(self.max_tokens)
            .map(|t| stem(t))
            .collect();
        let key = if lead.is_empty() {
            content
                .iter()
                .filter(|t| !is_stance_word(t) && !is_numeric(t))
                .take(self.max_tokens)
                .map(|t| stem(t))
                .collect::<Vec<_>>()
        } else {
            lead
        };

        (!key.is_empty()).then(|| key.join(" "))
    }
}

impl Default for KeywordNormalizer {
    fn default() -> Self {
        Self::new(4)
    }
}

impl SubjectNormalizer for KeywordNormalizer {
    fn subject(&self, claim: &Claim) -> Option<String> {
        if let Some(topic) = &claim.topic {
            if let Some(key) = self.key(&words(topic)) {
                return Some(key);
            }
        }
        self.key(&words(&claim.text))
    }
}

/// Lowercase alphanumeric words.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn stem(token: &str) -> String {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

fn is_numeric(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

fn is_stance_word(token: &str) -> bool {
    BULLISH.contains(&token) || BEARISH.contains(&token) || NEUTRAL.contains(&token)
}

/// The direction a claim asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stance {
    Bullish,
    Bearish,
    Neutral,
}

impl Stance {
    fn flipped(self) -> Self {
        match self {
            Stance::Bullish => Stance::Bearish,
            Stance::Bearish => Stance::Bullish,
            Stance::Neutral => Stance::Neutral,
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stance::Bullish => "bullish",
            Stance::Bearish => "bearish",
            Stance::Neutral => "neutral",
        })
    }
}

/// Classify the direction of `text`. Mixed signals with no majority yield `None`.
pub fn stance(text: &str) -> Option<Stance> {
    let tokens = words(text);
    let (mut bullish, mut bearish, mut neutral) = (0usize, 0usize, 0usize);

    for (i, token) in tokens.iter().enumerate() {
        let base = if BULLISH.contains(&token.as_str()) {
            Stance::Bullish
        } else if BEARISH.contains(&token.as_str()) {
            Stance::Bearish
        } else if NEUTRAL.contains(&token.as_str()) {
            Stance::Neutral
        } else {
            continue;
        };
        let negated = tokens[i.saturating_sub(NEGATION_WINDOW)..i]
            .iter()
            .any(|t| NEGATIONS.contains(&t.as_str()));
        match if negated { base.flipped() } else { base } {
            Stance::Bullish => bullish += 1,
            Stance::Bearish => bearish += 1,
            Stance::Neutral => neutral += 1,
        }
    }

    if bullish > bearish {
        Some(Stance::Bullish)
    } else if bearish > bullish {
        Some(Stance::Bearish)
    } else if bullish == 0 && neutral > 0 {
        Some(Stance::Neutral)
    } else {
        None
    }
}

/// Unit attached to a numeric assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Unit {
    Percent,
    Dollar,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Percent => "%",
            Unit::Dollar => "$",
        })
    }
}

/// A numeric value or range asserted by a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub low: Decimal,
    pub high: Decimal,
    pub unit: Unit,
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Unit::Dollar if self.low == self.high => write!(f, "${}", self.low),
            Unit::Dollar => write!(f, "${}..${}", self.low, self.high),
            Unit::Percent if self.low == self.high => write!(f, "{}%", self.low),
            Unit::Percent => write!(f, "{}..{}%", self.low, self.high),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number { value: Decimal, unit: Option<Unit> },
    RangeJoin,
    Other,
}

fn starts_number(chars: &[char], i: usize, after_number: bool) -> bool {
    match chars[i] {
        '$' => true,
        c if c.is_ascii_digit() => true,
        '-' => !after_number && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()),
        _ => false,
    }
}

/// Most digits a numeric literal may have. `Decimal` holds 28 exactly.
const MAX_NUMBER_DIGITS: usize = 28;

fn lex_numbers(text: &str) -> Vec<Lexeme> {
    let chars: Vec<char> = text.chars().collect();
    let mut out: Vec<Lexeme> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let after_number = matches!(out.last(), Some(Lexeme::Number { .. }));

        if starts_number(&chars, i, after_number) {
            let dollar = c == '$';
            let mut j = if dollar { i + 1 } else { i };
            let negative = chars.get(j) == Some(&'-');
            if negative {
                j += 1;
            }
            let start = j;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.' || chars[j] == ',') {
                j += 1;
            }
            let literal: String = chars[start..j].iter().filter(|c| **c != ',').collect();
            let digits = literal.chars().filter(char::is_ascii_digit).count();
            // Over-long literals lex as plain words, so their claims never
            // enter value-conflict detection.
            let parsed = if digits > MAX_NUMBER_DIGITS {
                None
            } else {
                literal.trim_end_matches('.').parse::<Decimal>().ok()
            };
            let lexeme = match parsed {
                Some(value) => {
                    let mut unit = dollar.then_some(Unit::Dollar);
                    if chars.get(j) == Some(&'%') {
                        unit = Some(Unit::Percent);
                        j += 1;
                    }
                    Lexeme::Number {
                        value: if negative { -value } else { value },
                        unit,
                    }
                }
                None => Lexeme::Other,
            };
            out.push(lexeme);
            i = j.max(i + 1);
        } else if c == '-' || c == '\u{2013}' {
            out.push(Lexeme::RangeJoin);
            i += 1;
        } else if c.is_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
            let word = chars[start..i].iter().collect::<String>().to_lowercase();
            match word.as_str() {
                "to" | "and" | "through" => out.push(Lexeme::RangeJoin),
                "percent" => match out.last_mut() {
                    Some(Lexeme::Number { unit, .. }) => *unit = Some(Unit::Percent),
                    _ => out.push(Lexeme::Other),
                },
                _ => out.push(Lexeme::Other),
            }
        } else {
            i += 1;
        }
    }
    out
}

/// The first numeric value or range in `text` carrying a `%` or `$` unit.
///
/// `12-15%`, `12% to 15%`, `$40 to $45` and `$42` are recognized. Unitless
/// numbers (years, counts) are ignored.
pub fn value_range(text: &str) -> Option<ValueRange> {
    let lexemes = lex_numbers(text);
    let mut i = 0;
    while i < lexemes.len() {
        if let Lexeme::Number { value, unit } = lexemes[i] {
            if let (Some(Lexeme::RangeJoin), Some(Lexeme::Number { value: upper, unit: upper_unit })) =
                (lexemes.get(i + 1), lexemes.get(i + 2))
            {
                let joined = match (unit, *upper_unit) {
                    (Some(a), Some(b)) if a == b => Some(a),
                    (Some(a), None) | (None, Some(a)) => Some(a),
                    _ => None,
                };
                if let Some(unit) = joined {
                    return Some(ValueRange {
                        low: value.min(*upper),
                        high: value.max(*upper),
                        unit,
                    });
                }
            }
            if let Some(unit) = unit {
                return Some(ValueRange {
                    low: value,
                    high: value,
                    unit,
                });
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_models::{ClaimId, ClaimStatus};
    use rust_decimal_macros::dec;

    fn claim(text: &str, topic: Option<&str>) -> Claim {
        Claim {
            id: ClaimId(1),
            expert: "finance".into(),
            round: 1,
            text: text.into(),
            confidence: dec!(0.5),
            topic: topic.map(str::to_string),
            evidence: vec![],
            supersedes: None,
            status: ClaimStatus::Active,
        }
    }

    #[test]
    fn subject_is_lead_before_stance() {
        let n = KeywordNormalizer::default();
        assert_eq!(n.subject(&claim("ACME is undervalued", None)).unwrap(), "acme");
        assert_eq!(n.subject(&claim("ACME shares are overvalued today", None)).unwrap(), "acme");
        assert_eq!(
            n.subject(&claim("Operating margins will expand next year", None)).unwrap(),
            "operating margin"
        );
        assert_eq!(
            n.subject(&claim("Operating margin to contract", None)).unwrap(),
            "operating margin"
        );
    }

    #[test]
    fn subject_prefers_topic_hint() {
        let n = KeywordNormalizer::default();
        let c = claim("We think the whole sector will rally", Some("ACME valuation"));
        assert_eq!(n.subject(&c).unwrap(), "acme valuation");
    }

    #[test]
    fn subject_falls_back_when_stance_leads() {
        let n = KeywordNormalizer::default();
        assert_eq!(n.subject(&claim("Buy ACME", None)).unwrap(), "acme");
        assert_eq!(n.subject(&claim("Sell ACME now", None)).unwrap(), "acme");
        assert!(n.subject(&claim("It is what it is", None)).is_none());
    }

    #[test]
    fn subject_capped_by_max_tokens() {
        let n = KeywordNormalizer::new(2);
        assert_eq!(
            n.subject(&claim("European industrial gas demand recovery is strong", None)).unwrap(),
            "european industrial"
        );
    }

    #[test]
    fn stance_detection_with_negation() {
        assert_eq!(stance("ACME is undervalued"), Some(Stance::Bullish));
        assert_eq!(stance("ACME is overvalued"), Some(Stance::Bearish));
        assert_eq!(stance("ACME is not undervalued"), Some(Stance::Bearish));
        assert_eq!(stance("Margins are unlikely to fall"), Some(Stance::Bullish));
        assert_eq!(stance("Hold ACME"), Some(Stance::Neutral));
        assert_eq!(stance("Strong brand but expensive"), None);
        assert_eq!(stance("ACME reports in May"), None);
    }

    #[test]
    fn value_ranges() {
        assert_eq!(
            value_range("Revenue growth of 12-15% in 2026"),
            Some(ValueRange { low: dec!(12), high: dec!(15), unit: Unit::Percent })
        );
        assert_eq!(
            value_range("Fair value is $40 to $45"),
            Some(ValueRange { low: dec!(40), high: dec!(45), unit: Unit::Dollar })
        );
        assert_eq!(
            value_range("Growth of 3 percent"),
            Some(ValueRange { low: dec!(3), high: dec!(3), unit: Unit::Percent })
        );
        assert_eq!(
            value_range("Margin near 8.5%."),
            Some(ValueRange { low: dec!(8.5), high: dec!(8.5), unit: Unit::Percent })
        );
        assert_eq!(
            value_range("Target $1,250"),
            Some(ValueRange { low: dec!(1250), high: dec!(1250), unit: Unit::Dollar })
        );
        assert_eq!(value_range("Three catalysts by 2027"), None);
    }

    #[test]
    fn digit_limit() {
        assert_eq!(
            value_range("Growth of 9,999,999,999,999,999,999,999,999,999%"),
            Some(ValueRange {
                low: dec!(9999999999999999999999999999),
                high: dec!(9999999999999999999999999999),
                unit: Unit::Percent,
            })
        );
        assert_eq!(value_range("Growth of 79228162514264337593543950335%"), None);
        assert_eq!(value_range("Yield of 0.00000000000000000000000000001%"), None);
    }

    #[test]
    fn range_display() {
        let r = ValueRange { low: dec!(12), high: dec!(15), unit: Unit::Percent };
        assert_eq!(r.to_string(), "12..15%");
        let r = ValueRange { low: dec!(42), high: dec!(42), unit: Unit::Dollar };
        assert_eq!(r.to_string(), "$42");
    }
}
