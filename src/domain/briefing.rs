//! Daily briefing and backlog progress records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The curated selection for one date. At most one exists per date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Briefing {
    pub id: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    /// Content ids in display order
    pub item_ids: Vec<String>,
    pub fresh_count: usize,
    pub backlog_count: usize,
    /// Set once the notifier accepted the briefing
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Briefing {
    /// Create an unsent briefing for `date`.
    pub fn new(date: NaiveDate, item_ids: Vec<String>, fresh_count: usize, backlog_count: usize) -> Self {
        Self {
            id: Self::generate_id(date),
            date,
            created_at: Utc::now(),
            item_ids,
            fresh_count,
            backlog_count,
            sent: false,
            sent_at: None,
        }
    }

    /// Date-derived id: `sha256("briefing:{date}")`, first 16 hex chars.
    pub fn generate_id(date: NaiveDate) -> String {
        let digest = Sha256::digest(format!("briefing:{}", date.format("%Y-%m-%d")).as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    pub fn total_count(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

/// Progress through the historical backlog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacklogProgress {
    /// Fixed when the backlog is first measured
    pub total_items: u64,
    pub delivered_items: u64,
    pub last_updated: DateTime<Utc>,
}

impl BacklogProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.total_items == 0 {
            return 100.0;
        }
        let pct = self.delivered_items as f64 / self.total_items as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }

    pub fn items_remaining(&self) -> u64 {
        self.total_items.saturating_sub(self.delivered_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_briefing_id_is_date_derived() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();
        let a = Briefing::new(date, vec![], 0, 0);
        let b = Briefing::new(date, vec!["x".to_string()], 1, 0);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn test_briefing_counts() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();
        let briefing = Briefing::new(date, vec!["a".into(), "b".into(), "c".into()], 2, 1);
        assert_eq!(briefing.total_count(), 3);
        assert!(!briefing.sent);
        assert!(!briefing.is_empty());
    }

    #[test]
    fn test_backlog_progress_percent() {
        let progress = BacklogProgress {
            total_items: 300,
            delivered_items: 47,
            last_updated: Utc::now(),
        };
        assert_eq!(progress.percent_complete(), 15.7);
        assert_eq!(progress.items_remaining(), 253);
    }

    #[test]
    fn test_backlog_progress_empty_backlog_is_complete() {
        let progress = BacklogProgress {
            total_items: 0,
            delivered_items: 0,
            last_updated: Utc::now(),
        };
        assert_eq!(progress.percent_complete(), 100.0);
    }
}
