//! Daily briefing composition.
//!
//! Steps, in order:
//! 1. candidates = fresh pool + backlog pool (quota from the fresh count)
//! 2. source diversity
//! 3. deep-dive ceiling, demotions persisted through the calibrator
//! 4. total cap by tier
//! 5. display ordering
//! 6. commit: briefing row, delivery marks and backlog progress together
//!
//! Items dropped at any step stay undelivered for a later day.

use chrono::{DateTime, NaiveDate, Utc};

use crate::calibrate::TierCalibrator;
use crate::domain::{Briefing, ProcessedItem};
use crate::error::{BriefError, Result};
use crate::selection::display::{
    DiversityLimits, cap_by_tier, enforce_source_diversity, order_for_display, split_deep_dive_ceiling,
};
use crate::selection::pool::{SelectionPool, backlog_target};
use crate::store::Store;

/// Hard cap on briefing size
pub const MAX_ITEMS: usize = 18;

/// When everything is special, nothing is
pub const MAX_DEEP_DIVES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct ComposerConfig {
    pub max_items: usize,
    pub max_deep_dives: usize,
    pub diversity: DiversityLimits,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_items: MAX_ITEMS,
            max_deep_dives: MAX_DEEP_DIVES,
            diversity: DiversityLimits::default(),
        }
    }
}

/// Where the candidates of a composition went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionStats {
    pub fresh_candidates: usize,
    pub backlog_candidates: usize,
    pub dropped_for_diversity: usize,
    pub demoted_by_ceiling: usize,
    pub cut_by_cap: usize,
}

/// Builds and commits date-keyed briefings.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    config: ComposerConfig,
    pool: SelectionPool,
    calibrator: TierCalibrator,
}

impl Composer {
    pub fn new(config: ComposerConfig, pool: SelectionPool, calibrator: TierCalibrator) -> Self {
        Self {
            config,
            pool,
            calibrator,
        }
    }

    /// Compose the briefing for `date`, or return the one already stored.
    pub fn compose<S: Store + ?Sized>(&self, store: &mut S, date: NaiveDate) -> Result<Briefing> {
        self.compose_at(store, date, Utc::now())
    }

    /// Compose with an explicit reference time for the freshness window.
    pub fn compose_at<S: Store + ?Sized>(&self, store: &mut S, date: NaiveDate, as_of: DateTime<Utc>) -> Result<Briefing> {
        if let Some(existing) = store.get_briefing(date)? {
            tracing::info!(date = %date, items = existing.total_count(), "Briefing already exists");
            return Ok(existing);
        }

        // Backlog size is measured once, before the first backlog delivery
        if store.backlog_progress()?.is_none() {
            let total = store.backlog_total()?;
            if total > 0 {
                store.init_backlog_progress(total)?;
            }
        }

        let (selected, stats) = self.select(store, as_of)?;
        if selected.is_empty() {
            // Nothing is stored, so a later compose the same day can still fill the date
            tracing::info!(date = %date, "No content available, briefing not stored");
            return Ok(Briefing::new(date, Vec::new(), 0, 0));
        }
        let fresh_count = selected.iter().filter(|i| !i.is_backlog).count();
        let backlog_count = selected.len() - fresh_count;
        let ids = selected.into_iter().map(|i| i.content_id).collect();

        let briefing = store.commit_briefing(&Briefing::new(date, ids, fresh_count, backlog_count))?;
        tracing::info!(
            date = %date,
            fresh = briefing.fresh_count,
            backlog = briefing.backlog_count,
            fresh_candidates = stats.fresh_candidates,
            backlog_candidates = stats.backlog_candidates,
            dropped_for_diversity = stats.dropped_for_diversity,
            demoted = stats.demoted_by_ceiling,
            cut = stats.cut_by_cap,
            "Composed briefing"
        );
        Ok(briefing)
    }

    /// Run selection steps 1-5 and return the ordered items.
    ///
    /// Ceiling demotions are persisted even though nothing is committed here.
    pub fn select<S: Store + ?Sized>(
        &self,
        store: &mut S,
        as_of: DateTime<Utc>,
    ) -> Result<(Vec<ProcessedItem>, CompositionStats)> {
        let mut stats = CompositionStats::default();

        let fresh = self.pool.select_fresh(store, as_of)?;
        let backlog = self.pool.select_backlog(store, backlog_target(fresh.len()))?;
        stats.fresh_candidates = fresh.len();
        stats.backlog_candidates = backlog.len();

        let mut candidates = fresh;
        candidates.extend(backlog);

        let (diverse, dropped) = enforce_source_diversity(candidates, self.config.diversity);
        stats.dropped_for_diversity = dropped.len();

        let split = split_deep_dive_ceiling(diverse, self.config.max_deep_dives);
        let mut demoted = Vec::with_capacity(split.over_ceiling.len());
        for mut item in split.over_ceiling {
            let calibration = self.calibrator.ceiling_demotion(&item);
            self.calibrator.persist_override(store, &mut item, &calibration)?;
            demoted.push(item);
        }
        stats.demoted_by_ceiling = demoted.len();

        let mut after_ceiling = split.kept_deep;
        after_ceiling.extend(split.rest);
        after_ceiling.extend(demoted);

        // A demoted third item no longer qualifies for the deep-dive allowance
        let (diverse, dropped) = enforce_source_diversity(after_ceiling, self.config.diversity);
        stats.dropped_for_diversity += dropped.len();

        let (capped, cut) = cap_by_tier(diverse, self.config.max_items);
        stats.cut_by_cap = cut.len();

        Ok((order_for_display(capped), stats))
    }

    /// Throw away the briefing for `date` and make its items deliverable again.
    pub fn discard<S: Store + ?Sized>(&self, store: &mut S, date: NaiveDate) -> Result<Briefing> {
        store
            .delete_briefing(date)?
            .ok_or_else(|| BriefError::InvalidState(format!("no briefing for {}", date)))
    }

    /// Processed items of a briefing in display order.
    pub fn items<S: Store + ?Sized>(&self, store: &S, briefing: &Briefing) -> Result<Vec<ProcessedItem>> {
        briefing
            .item_ids
            .iter()
            .map(|id| store.get_processed(id)?.ok_or_else(|| BriefError::ItemNotFound(id.clone())))
            .collect()
    }
}
