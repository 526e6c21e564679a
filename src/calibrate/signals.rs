//! Calibration signals derived from an item.

use chrono::{DateTime, Utc};

use crate::domain::{ContentType, Freshness, ProcessedItem, RawItem};
use crate::summary::SummaryResponse;

/// Items older than this many days at processing time are backlog.
pub const BACKLOG_AGE_DAYS: i64 = 14;

/// The facts tier calibration looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    pub word_count: u32,
    pub source_id: String,
    pub content_type: ContentType,
    pub insight_count: usize,
    pub freshness: Freshness,
    pub is_backlog: bool,
}

impl Signals {
    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

/// Stateless signal extraction.
#[derive(Debug, Clone, Copy)]
pub struct SignalExtractor {
    pub backlog_age_days: i64,
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self {
            backlog_age_days: BACKLOG_AGE_DAYS,
        }
    }
}

impl SignalExtractor {
    pub fn new(backlog_age_days: i64) -> Self {
        Self { backlog_age_days }
    }

    /// Signals for a freshly summarized item. `as_of` is the processing time;
    /// the backlog flag computed here is frozen on the processed item.
    pub fn extract(&self, item: &RawItem, response: &SummaryResponse, as_of: DateTime<Utc>) -> Signals {
        Signals {
            word_count: item.word_count,
            source_id: item.source_id.clone(),
            content_type: response.content_type,
            insight_count: response.key_insights.len(),
            freshness: response.freshness,
            is_backlog: self.is_backlog(item, as_of),
        }
    }

    /// Signals for an already persisted item. Uses the stored backlog flag.
    pub fn from_processed(&self, item: &ProcessedItem) -> Signals {
        Signals {
            word_count: item.word_count,
            source_id: item.source_id.clone(),
            content_type: item.content_type,
            insight_count: item.key_insights.len(),
            freshness: item.freshness,
            is_backlog: item.is_backlog,
        }
    }

    pub fn is_backlog(&self, item: &RawItem, as_of: DateTime<Utc>) -> bool {
        item.age_days(as_of) > self.backlog_age_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentKind;
    use chrono::Duration;
    use serde_json::json;

    fn raw(age_days: i64, as_of: DateTime<Utc>) -> RawItem {
        RawItem::new(
            "dwarkesh-patel",
            "Dwarkesh Patel",
            ContentKind::Video,
            "Episode",
            "https://example.com/ep",
            as_of - Duration::days(age_days),
            Some("body".to_string()),
        )
        .with_word_count(14_000)
    }

    fn response() -> SummaryResponse {
        SummaryResponse::from_value(&json!({
            "core_summary": "x",
            "key_insights": ["a", "b", "c"],
            "content_type": "interview",
            "freshness": "stale",
        }))
        .unwrap()
    }

    #[test]
    fn test_extract_signals() {
        let now = Utc::now();
        let signals = SignalExtractor::default().extract(&raw(3, now), &response(), now);
        assert_eq!(signals.word_count, 14_000);
        assert_eq!(signals.source_id, "dwarkesh-patel");
        assert_eq!(signals.content_type, ContentType::Interview);
        assert_eq!(signals.insight_count, 3);
        assert!(signals.is_stale());
        assert!(!signals.is_backlog);
    }

    #[test]
    fn test_backlog_threshold_is_exclusive() {
        let now = Utc::now();
        let extractor = SignalExtractor::default();
        assert!(!extractor.is_backlog(&raw(14, now), now));
        assert!(extractor.is_backlog(&raw(15, now), now));
    }
}
