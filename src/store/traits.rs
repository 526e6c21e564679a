//! Store contract used by the processing and selection sides.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{BacklogProgress, Briefing, Freshness, ItemStatus, ProcessedItem, RawItem, Tier};
use crate::error::Result;

/// Query over undelivered processed items.
///
/// Results are always ordered by tier priority, then publication date
/// descending, then content id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    /// Empty means any freshness
    pub freshness_in: Vec<Freshness>,
    /// Only items published at or after this instant
    pub published_after: Option<DateTime<Utc>>,
    /// `Some(true)` backlog only, `Some(false)` non-backlog only
    pub backlog: Option<bool>,
    pub limit: Option<usize>,
}

impl ItemFilter {
    /// Recent, non-backlog items that are still worth reading.
    pub fn fresh_pool(published_after: DateTime<Utc>) -> Self {
        Self {
            freshness_in: vec![Freshness::Fresh, Freshness::Evergreen],
            published_after: Some(published_after),
            backlog: Some(false),
            limit: None,
        }
    }

    /// Backlog items that have not aged out.
    pub fn backlog_pool(limit: usize) -> Self {
        Self {
            freshness_in: vec![Freshness::Evergreen],
            published_after: None,
            backlog: Some(true),
            limit: Some(limit),
        }
    }
}

/// Durable storage for items, briefings and backlog progress.
///
/// Every write is atomic on its own; `save_processed` and `commit_briefing`
/// each touch more than one record inside one transaction.
pub trait Store: Send {
    // Processing side

    /// Insert a raw item. Returns false if the id already exists.
    fn save_raw(&mut self, item: &RawItem) -> Result<bool>;

    fn get_raw(&self, id: &str) -> Result<Option<RawItem>>;

    /// Pending raw items, newest first.
    fn pending_items(&self, limit: Option<usize>) -> Result<Vec<RawItem>>;

    fn set_item_status(&mut self, id: &str, status: ItemStatus) -> Result<()>;

    /// Persist a processed item and mark its raw item processed. An existing
    /// record keeps its backlog flag and delivery state.
    fn save_processed(&mut self, item: &ProcessedItem) -> Result<()>;

    fn get_processed(&self, id: &str) -> Result<Option<ProcessedItem>>;

    fn status_counts(&self) -> Result<BTreeMap<ItemStatus, u64>>;

    // Selection side

    fn fetch_undelivered(&self, filter: &ItemFilter) -> Result<Vec<ProcessedItem>>;

    fn persist_tier_override(&mut self, id: &str, tier: Tier, rationale: &str) -> Result<()>;

    fn mark_delivered(&mut self, ids: &[String], at: DateTime<Utc>) -> Result<()>;

    /// Insert a briefing, or return the existing one for its date unchanged.
    fn create_briefing(&mut self, briefing: &Briefing) -> Result<Briefing>;

    fn briefing_exists(&self, date: NaiveDate) -> Result<bool>;

    fn get_briefing(&self, date: NaiveDate) -> Result<Option<Briefing>>;

    /// Create the briefing, mark its items delivered and advance backlog
    /// progress as one step. Returns the existing record if the date is taken.
    fn commit_briefing(&mut self, briefing: &Briefing) -> Result<Briefing>;

    /// Remove a briefing and revert the delivery marks of its items.
    fn delete_briefing(&mut self, date: NaiveDate) -> Result<Option<Briefing>>;

    fn mark_briefing_sent(&mut self, date: NaiveDate, at: DateTime<Utc>) -> Result<()>;

    fn briefing_count(&self) -> Result<u64>;

    fn delivered_count(&self) -> Result<u64>;

    /// Record the total backlog size once. Later calls leave it untouched.
    fn init_backlog_progress(&mut self, total_items: u64) -> Result<()>;

    fn backlog_progress(&self) -> Result<Option<BacklogProgress>>;

    /// Count of processed backlog items, delivered or not.
    fn backlog_total(&self) -> Result<u64>;
}
