//! Pending-item processing: intake screening, then a scheduler run.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::calibrate::{SignalExtractor, TierCalibrator};
use crate::domain::{ItemStatus, RawItem};
use crate::error::{BriefError, Result};
use crate::scheduler::{LaneId, LaneTally, Scheduler, WriteFunnel};
use crate::store::Store;
use crate::summary::{BlacklistNormalizer, Intake, Screening, TextNormalizer};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub limit: Option<usize>,
    /// Screen and plan only; nothing is written and no model is called
    pub dry_run: bool,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Pending items fetched for this batch
    pub pending: usize,
    /// Items handed to the scheduler
    pub attempted: usize,
    pub succeeded: usize,
    pub permanently_failed: usize,
    /// Cancelled or not written; picked up by the next run
    pub still_pending: usize,
    /// Items given a terminal status by intake, by status
    pub skipped: BTreeMap<ItemStatus, usize>,
    pub db_errors: usize,
    pub overrides: usize,
    pub per_lane: BTreeMap<LaneId, LaneTally>,
    pub primary_planned: usize,
    pub secondary_planned: usize,
    pub flipped: bool,
    pub final_primary: Option<LaneId>,
    pub dry_run: bool,
}

impl BatchReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

pub struct Pipeline {
    intake: Intake,
    scheduler: Scheduler,
    calibrator: TierCalibrator,
    extractor: SignalExtractor,
    normalizer: Arc<dyn TextNormalizer>,
}

impl Pipeline {
    pub fn new(scheduler: Scheduler, calibrator: TierCalibrator) -> Self {
        Self {
            intake: Intake::default(),
            scheduler,
            calibrator,
            extractor: SignalExtractor::default(),
            normalizer: Arc::new(BlacklistNormalizer::default()),
        }
    }

    pub fn with_intake(mut self, intake: Intake) -> Self {
        self.intake = intake;
        self
    }

    pub fn with_extractor(mut self, extractor: SignalExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn TextNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Screen pending items and summarize the processable ones.
    ///
    /// Fails before touching anything when no provider lane is configured.
    /// The store is moved into the write funnel for the run and returned.
    pub async fn process_pending<S: Store + 'static>(
        &self,
        mut store: S,
        options: ProcessOptions,
        cancel: CancellationToken,
    ) -> Result<(S, BatchReport)> {
        if self.scheduler.lanes().is_empty() {
            return Err(BriefError::NoProviderLanes);
        }

        let pending = store.pending_items(options.limit)?;
        let mut report = BatchReport {
            pending: pending.len(),
            dry_run: options.dry_run,
            ..Default::default()
        };

        let processable = self.screen(&mut store, pending, options.dry_run, &mut report);
        report.attempted = processable.len();

        if options.dry_run {
            let plan = self.scheduler.plan(processable)?;
            report.primary_planned = plan.primary.len();
            report.secondary_planned = plan.secondary.len();
            report.still_pending = plan.len();
            tracing::info!(
                processable = report.attempted,
                skipped = report.skipped_total(),
                primary = report.primary_planned,
                secondary = report.secondary_planned,
                "Dry run planned"
            );
            return Ok((store, report));
        }

        if processable.is_empty() {
            tracing::info!(skipped = report.skipped_total(), "Nothing to process");
            return Ok((store, report));
        }

        let funnel = WriteFunnel::new(store, self.calibrator.clone())
            .with_normalizer(Arc::clone(&self.normalizer))
            .with_extractor(self.extractor);
        let (store, run) = self.scheduler.run(processable, funnel, cancel).await?;

        report.succeeded = run.funnel.succeeded;
        report.permanently_failed = run.funnel.failed;
        report.db_errors += run.funnel.db_errors;
        report.still_pending = run.funnel.cancelled + run.funnel.db_errors;
        report.overrides = run.funnel.overrides;
        report.per_lane = run.funnel.per_lane;
        report.primary_planned = run.primary_planned;
        report.secondary_planned = run.secondary_planned;
        report.flipped = run.flipped;
        report.final_primary = run.final_primary;
        Ok((store, report))
    }

    /// Record terminal statuses for unprocessable items and return the rest.
    fn screen<S: Store>(
        &self,
        store: &mut S,
        pending: Vec<RawItem>,
        dry_run: bool,
        report: &mut BatchReport,
    ) -> Vec<RawItem> {
        let mut processable = Vec::with_capacity(pending.len());
        for item in pending {
            match self.intake.screen(&item) {
                Screening::Processable => processable.push(item),
                Screening::Reject(status) => {
                    *report.skipped.entry(status).or_default() += 1;
                    if dry_run {
                        continue;
                    }
                    if let Err(e) = store.set_item_status(&item.id, status) {
                        tracing::error!(content_id = %item.id, error = %e, "Failed to record skip status");
                        report.db_errors += 1;
                    } else {
                        tracing::debug!(content_id = %item.id, status = status.as_str(), "Skipped at intake");
                    }
                }
            }
        }
        processable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentKind;
    use crate::llm::ScriptedModel;
    use crate::scheduler::{LaneConfig, LaneSet, ProviderLane, RecordingClock, SchedulerConfig};
    use crate::store::SqliteStore;
    use chrono::Utc;
    use serde_json::json;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn raw(n: u32, transcript: Option<String>) -> RawItem {
        RawItem::new(
            format!("src{}", n),
            "Src",
            ContentKind::Article,
            format!("t{}", n),
            format!("https://x/{}", n),
            Utc::now(),
            transcript,
        )
    }

    fn store_with(items: &[RawItem]) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for item in items {
            store.save_raw(item).unwrap();
        }
        store
    }

    fn pipeline(model: Arc<ScriptedModel>) -> Pipeline {
        let lanes = LaneSet::new(Some(ProviderLane::new(LaneId::A, model, LaneConfig::new(2))), None);
        let scheduler = Scheduler::new(lanes, SchedulerConfig::default()).with_clock(Arc::new(RecordingClock::new()));
        Pipeline::new(scheduler, TierCalibrator::default())
    }

    fn model() -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel::new(
            "m",
            json!({"core_summary": "ok", "tier": "worth_a_look", "freshness": "fresh"}),
        ))
    }

    fn batch() -> Vec<RawItem> {
        vec![
            raw(1, Some(words(800))),
            raw(2, Some(words(900))),
            raw(3, None),
            raw(4, Some(words(100))),
        ]
    }

    #[tokio::test]
    async fn test_screening_and_processing() {
        let items = batch();
        let model = model();
        let (store, report) = pipeline(model.clone())
            .process_pending(store_with(&items), ProcessOptions::default(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.pending, 4);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.skipped[&ItemStatus::NoTranscript], 1);
        assert_eq!(report.skipped[&ItemStatus::Skipped], 1);
        assert_eq!(model.calls(), 2);

        assert_eq!(store.get_raw(&items[2].id).unwrap().unwrap().status, ItemStatus::NoTranscript);
        assert_eq!(store.get_raw(&items[0].id).unwrap().unwrap().status, ItemStatus::Processed);
        assert!(store.pending_items(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let items = batch();
        let model = model();
        let (store, report) = pipeline(model.clone())
            .process_pending(
                store_with(&items),
                ProcessOptions {
                    limit: None,
                    dry_run: true,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.primary_planned, 2);
        assert_eq!(report.skipped_total(), 2);
        assert_eq!(model.calls(), 0);
        assert_eq!(store.pending_items(None).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_no_lanes_aborts_before_screening() {
        let items = batch();
        let pipeline = Pipeline::new(
            Scheduler::new(LaneSet::default(), SchedulerConfig::default()),
            TierCalibrator::default(),
        );
        let result = pipeline
            .process_pending(store_with(&items), ProcessOptions::default(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(BriefError::NoProviderLanes)));
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_items_pending() {
        let items = batch();
        let model = model();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (store, report) = pipeline(model.clone())
            .process_pending(store_with(&items), ProcessOptions::default(), cancel)
            .await
            .unwrap();

        assert_eq!(report.still_pending, 2);
        assert_eq!(report.succeeded, 0);
        assert_eq!(model.calls(), 0);
        assert_eq!(store.pending_items(None).unwrap().len(), 2);
    }
}
