use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Names an external plugin reachable through the tool adapter.
///
/// Serialized as `search`, `market_data` or `export_<target>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ToolKind {
    Search,
    MarketData,
    Export(String),
}

impl ToolKind {
    pub fn export(target: impl Into<String>) -> Self {
        ToolKind::Export(target.into())
    }

    pub fn is_export(&self) -> bool {
        matches!(self, ToolKind::Export(_))
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Search => f.write_str("search"),
            ToolKind::MarketData => f.write_str("market_data"),
            ToolKind::Export(target) => write!(f, "export_{target}"),
        }
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(ToolKind::Search),
            "market_data" => Ok(ToolKind::MarketData),
            other => match other.strip_prefix("export_") {
                Some(target) if !target.is_empty() => Ok(ToolKind::Export(target.to_string())),
                _ => Err(format!("unknown tool: {other}")),
            },
        }
    }
}

impl TryFrom<String> for ToolKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ToolKind> for String {
    fn from(kind: ToolKind) -> Self {
        kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_names() {
        assert_eq!("search".parse::<ToolKind>().unwrap(), ToolKind::Search);
        assert_eq!("market_data".parse::<ToolKind>().unwrap(), ToolKind::MarketData);
        assert_eq!(
            "export_wechat".parse::<ToolKind>().unwrap(),
            ToolKind::export("wechat")
        );
    }

    #[test]
    fn reject_unknown_and_empty_export() {
        assert!("weather".parse::<ToolKind>().is_err());
        assert!("export_".parse::<ToolKind>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ToolKind::export("news")).unwrap();
        assert_eq!(json, "\"export_news\"");
        let kinds: Vec<ToolKind> = serde_json::from_str(r#"["search","market_data"]"#).unwrap();
        assert_eq!(kinds, vec![ToolKind::Search, ToolKind::MarketData]);
    }
}
