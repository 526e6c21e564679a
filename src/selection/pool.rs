//! Undelivered pool queries and the dynamic backlog quota.

use chrono::{DateTime, Duration, Utc};

use crate::domain::ProcessedItem;
use crate::error::Result;
use crate::store::{ItemFilter, Store};

/// Fresh items older than this many weeks are left out of the pool.
pub const FRESH_MAX_AGE_WEEKS: i64 = 6;

/// Partitions the undelivered pool into fresh and backlog candidates.
#[derive(Debug, Clone, Copy)]
pub struct SelectionPool {
    pub fresh_max_age_weeks: i64,
}

impl Default for SelectionPool {
    fn default() -> Self {
        Self {
            fresh_max_age_weeks: FRESH_MAX_AGE_WEEKS,
        }
    }
}

impl SelectionPool {
    pub fn new(fresh_max_age_weeks: i64) -> Self {
        Self { fresh_max_age_weeks }
    }

    /// Undelivered, non-backlog, fresh or evergreen items published within
    /// the window ending at `as_of`.
    pub fn select_fresh<S: Store + ?Sized>(&self, store: &S, as_of: DateTime<Utc>) -> Result<Vec<ProcessedItem>> {
        let cutoff = as_of - Duration::weeks(self.fresh_max_age_weeks);
        store.fetch_undelivered(&ItemFilter::fresh_pool(cutoff))
    }

    /// Undelivered evergreen backlog items, best first, at most `limit`.
    pub fn select_backlog<S: Store + ?Sized>(&self, store: &S, limit: usize) -> Result<Vec<ProcessedItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        store.fetch_undelivered(&ItemFilter::backlog_pool(limit))
    }
}

/// How many backlog items to mix in for a given number of fresh candidates.
/// Light days get more backlog.
pub fn backlog_target(fresh_count: usize) -> usize {
    match fresh_count {
        0..=3 => 8,
        4..=6 => 5,
        7..=9 => 3,
        _ => 2,
    }
}
