//! Closed enumerations shared by calibration, selection and storage.

use serde::{Deserialize, Serialize};

/// How much value the original source retains beyond its summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    DeepDive,
    WorthALook,
    SummarySufficient,
}

impl Tier {
    /// All tiers in display priority order.
    pub const ALL: [Tier; 3] = [Tier::DeepDive, Tier::WorthALook, Tier::SummarySufficient];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::DeepDive => "deep_dive",
            Tier::WorthALook => "worth_a_look",
            Tier::SummarySufficient => "summary_sufficient",
        }
    }

    /// Parse a stored or model-provided value. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "deep_dive" => Some(Tier::DeepDive),
            "worth_a_look" => Some(Tier::WorthALook),
            "summary_sufficient" => Some(Tier::SummarySufficient),
            _ => None,
        }
    }

    /// Sort key, lower comes first.
    pub fn priority(&self) -> u8 {
        match self {
            Tier::DeepDive => 1,
            Tier::WorthALook => 2,
            Tier::SummarySufficient => 3,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time sensitivity of a piece of content as judged by the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Evergreen,
    Stale,
}

impl Freshness {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Evergreen => "evergreen",
            Freshness::Stale => "stale",
        }
    }

    /// Parse a stored or model-provided value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "fresh" => Some(Freshness::Fresh),
            "evergreen" => Some(Freshness::Evergreen),
            "stale" => Some(Freshness::Stale),
            _ => None,
        }
    }
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Editorial category the model assigns to an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    MarketCall,
    NewsAnalysis,
    IndustryTrend,
    Framework,
    Tutorial,
    Interview,
    Commentary,
}

impl ContentType {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::MarketCall => "market_call",
            ContentType::NewsAnalysis => "news_analysis",
            ContentType::IndustryTrend => "industry_trend",
            ContentType::Framework => "framework",
            ContentType::Tutorial => "tutorial",
            ContentType::Interview => "interview",
            ContentType::Commentary => "commentary",
        }
    }

    /// Parse a stored or model-provided value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "market_call" => Some(ContentType::MarketCall),
            "news_analysis" => Some(ContentType::NewsAnalysis),
            "industry_trend" => Some(ContentType::IndustryTrend),
            "framework" => Some(ContentType::Framework),
            "tutorial" => Some(ContentType::Tutorial),
            "interview" => Some(ContentType::Interview),
            "commentary" => Some(ContentType::Commentary),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_known_values() {
        for tier in Tier::ALL {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
    }

    #[test]
    fn test_tier_parse_unknown() {
        assert_eq!(Tier::parse("must_read"), None);
        assert_eq!(Tier::parse(""), None);
    }

    #[test]
    fn test_tier_priority_order() {
        assert!(Tier::DeepDive.priority() < Tier::WorthALook.priority());
        assert!(Tier::WorthALook.priority() < Tier::SummarySufficient.priority());
    }

    #[test]
    fn test_tier_serde_matches_as_str() {
        let json = serde_json::to_string(&Tier::WorthALook).unwrap();
        assert_eq!(json, "\"worth_a_look\"");
    }

    #[test]
    fn test_freshness_parse() {
        assert_eq!(Freshness::parse("evergreen"), Some(Freshness::Evergreen));
        assert_eq!(Freshness::parse(" stale "), Some(Freshness::Stale));
        assert_eq!(Freshness::parse("timely"), None);
    }

    #[test]
    fn test_content_type_parse() {
        assert_eq!(ContentType::parse("interview"), Some(ContentType::Interview));
        assert_eq!(ContentType::parse("podcast"), None);
    }
}
