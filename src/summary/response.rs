//! Validated view of the model's structured output.
//!
//! Providers return loosely-typed JSON. Every field with a closed set of
//! values is checked here and replaced with a fixed default when it falls
//! outside that set, so a sloppy answer degrades instead of failing the item.
//! Only a missing core summary is fatal.
//!
//! | field          | default              |
//! |----------------|----------------------|
//! | tier           | `summary_sufficient` |
//! | freshness      | `fresh`              |
//! | content_type   | `commentary`         |
//! | topic_tags     | `["general"]`        |
//! | key_insights   | `[]` (scalar → 1-element list) |

use serde_json::Value;

use crate::domain::{Concept, ContentType, Freshness, Tier};
use crate::error::{BriefError, Result};

/// Tier used when the model's guess is missing or not a known tier.
pub const DEFAULT_TIER: Tier = Tier::SummarySufficient;
pub const DEFAULT_FRESHNESS: Freshness = Freshness::Fresh;
pub const DEFAULT_CONTENT_TYPE: ContentType = ContentType::Commentary;
pub const DEFAULT_TOPIC_TAG: &str = "general";
pub const MAX_TOPIC_TAGS: usize = 3;

/// Model output after validation and default substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryResponse {
    pub core_summary: String,
    pub key_insights: Vec<String>,
    pub concepts: Vec<Concept>,
    pub so_what: String,
    pub topic_tags: Vec<String>,
    pub content_type: ContentType,
    pub freshness: Freshness,
    /// The model's tier guess, already mapped into the closed set
    pub tier_guess: Tier,
    pub tier_rationale: String,
    /// Names of fields that were replaced by defaults
    pub defaulted: Vec<&'static str>,
}

impl SummaryResponse {
    /// Validate raw model output.
    pub fn from_value(data: &Value) -> Result<Self> {
        let core_summary = data
            .get("core_summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if core_summary.is_empty() {
            return Err(BriefError::InvalidResponse("missing core_summary".to_string()));
        }

        let mut defaulted = Vec::new();

        let key_insights = match data.get("key_insights") {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                defaulted.push("key_insights");
                scalar_to_string(other).into_iter().collect()
            }
        };

        let concepts = data
            .get("concepts_explained")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| {
                        let term = c.get("term")?.as_str()?;
                        let explanation = c.get("explanation")?.as_str()?;
                        Some(Concept {
                            term: term.to_string(),
                            explanation: explanation.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let so_what = data
            .get("so_what")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Older prompt versions called these "domains"
        let raw_tags = data.get("topic_tags").or_else(|| data.get("domains"));
        let mut topic_tags: Vec<String> = match raw_tags {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items.iter().filter_map(|t| t.as_str().map(str::to_string)).collect(),
            _ => Vec::new(),
        }
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .take(MAX_TOPIC_TAGS)
        .collect();
        if topic_tags.is_empty() {
            defaulted.push("topic_tags");
            topic_tags.push(DEFAULT_TOPIC_TAG.to_string());
        }

        let content_type = parse_or_default(data, "content_type", ContentType::parse, DEFAULT_CONTENT_TYPE, &mut defaulted);
        let freshness = parse_or_default(data, "freshness", Freshness::parse, DEFAULT_FRESHNESS, &mut defaulted);
        let tier_guess = parse_or_default(data, "tier", Tier::parse, DEFAULT_TIER, &mut defaulted);

        let tier_rationale = data
            .get("tier_rationale")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            core_summary,
            key_insights,
            concepts,
            so_what,
            topic_tags,
            content_type,
            freshness,
            tier_guess,
            tier_rationale,
            defaulted,
        })
    }

    /// Apply a text transform to every free-text field.
    pub fn map_text<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        self.core_summary = f(&self.core_summary);
        self.so_what = f(&self.so_what);
        self.tier_rationale = f(&self.tier_rationale);
        for insight in &mut self.key_insights {
            *insight = f(insight);
        }
        for concept in &mut self.concepts {
            concept.explanation = f(&concept.explanation);
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_or_default<T: Copy>(
    data: &Value,
    field: &'static str,
    parse: fn(&str) -> Option<T>,
    default: T,
    defaulted: &mut Vec<&'static str>,
) -> T {
    match data.get(field).and_then(Value::as_str).and_then(parse) {
        Some(v) => v,
        None => {
            defaulted.push(field);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_response() -> Value {
        json!({
            "core_summary": "A long interview about scaling laws.",
            "key_insights": ["compute matters", "data matters"],
            "concepts_explained": [
                {"term": "RLHF", "explanation": "Training from human preferences"},
                {"term": "missing explanation"}
            ],
            "so_what": "Expect bigger models.",
            "topic_tags": ["AI", " Research ", "Startups", "Finance"],
            "content_type": "interview",
            "freshness": "evergreen",
            "tier": "deep_dive",
            "tier_rationale": "Dense and long."
        })
    }

    #[test]
    fn test_valid_response_keeps_values() {
        let resp = SummaryResponse::from_value(&full_response()).unwrap();
        assert_eq!(resp.tier_guess, Tier::DeepDive);
        assert_eq!(resp.freshness, Freshness::Evergreen);
        assert_eq!(resp.content_type, ContentType::Interview);
        assert_eq!(resp.key_insights.len(), 2);
        assert!(resp.defaulted.is_empty());
    }

    #[test]
    fn test_topic_tags_normalized_and_capped() {
        let resp = SummaryResponse::from_value(&full_response()).unwrap();
        assert_eq!(resp.topic_tags, vec!["ai", "research", "startups"]);
    }

    #[test]
    fn test_malformed_concepts_dropped() {
        let resp = SummaryResponse::from_value(&full_response()).unwrap();
        assert_eq!(resp.concepts.len(), 1);
        assert_eq!(resp.concepts[0].term, "RLHF");
    }

    #[test]
    fn test_missing_core_summary_is_error() {
        let err = SummaryResponse::from_value(&json!({"tier": "deep_dive"})).unwrap_err();
        assert!(matches!(err, BriefError::InvalidResponse(_)));
    }

    #[test]
    fn test_out_of_set_values_get_defaults() {
        let data = json!({
            "core_summary": "Short take.",
            "content_type": "rant",
            "freshness": "timely",
            "tier": "must_read",
        });
        let resp = SummaryResponse::from_value(&data).unwrap();
        assert_eq!(resp.tier_guess, DEFAULT_TIER);
        assert_eq!(resp.freshness, DEFAULT_FRESHNESS);
        assert_eq!(resp.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(resp.topic_tags, vec![DEFAULT_TOPIC_TAG]);
        assert!(resp.defaulted.contains(&"tier"));
        assert!(resp.defaulted.contains(&"topic_tags"));
    }

    #[test]
    fn test_scalar_insights_become_list() {
        let data = json!({"core_summary": "x", "key_insights": "only one"});
        let resp = SummaryResponse::from_value(&data).unwrap();
        assert_eq!(resp.key_insights, vec!["only one"]);
    }

    #[test]
    fn test_domains_field_accepted_for_tags() {
        let data = json!({"core_summary": "x", "domains": "Finance"});
        let resp = SummaryResponse::from_value(&data).unwrap();
        assert_eq!(resp.topic_tags, vec!["finance"]);
    }

    #[test]
    fn test_map_text_touches_all_text_fields() {
        let mut resp = SummaryResponse::from_value(&full_response()).unwrap();
        resp.map_text(|s| s.to_uppercase());
        assert_eq!(resp.so_what, "EXPECT BIGGER MODELS.");
        assert_eq!(resp.key_insights[0], "COMPUTE MATTERS");
        assert_eq!(resp.concepts[0].explanation, "TRAINING FROM HUMAN PREFERENCES");
        assert_eq!(resp.concepts[0].term, "RLHF");
    }
}
