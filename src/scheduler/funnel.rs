//! Single-writer persistence of task outcomes.
//!
//! Lane workers never touch the store. They send a [`TaskOutcome`] over a
//! bounded channel and the funnel, which owns the store, validates, calibrates
//! and writes each one in arrival order.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::calibrate::{SignalExtractor, TierCalibrator};
use crate::domain::{ItemStatus, ProcessedItem, RawItem};
use crate::error::{BriefError, Result};
use crate::llm::{ModelError, ModelOutput};
use crate::scheduler::lane::LaneId;
use crate::store::Store;
use crate::summary::{BlacklistNormalizer, PROMPT_VERSION, SummaryResponse, TextNormalizer};

/// How a task ended.
#[derive(Debug, Clone)]
pub enum TaskResult {
    Succeeded(ModelOutput),
    Failed(ModelError),
    /// Never completed; the item stays pending for the next run
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub item: RawItem,
    /// Lane of the final attempt, if one was made
    pub lane: Option<LaneId>,
    pub attempts: u32,
    pub result: TaskResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneTally {
    pub succeeded: usize,
    pub failed: usize,
}

/// What the funnel wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunnelReport {
    pub succeeded: usize,
    /// Items marked failed, including invalid responses
    pub failed: usize,
    pub invalid_responses: usize,
    pub cancelled: usize,
    /// Items whose tier guess was overridden by calibration
    pub overrides: usize,
    pub db_errors: usize,
    pub per_lane: BTreeMap<LaneId, LaneTally>,
}

pub struct WriteFunnel<S: Store> {
    store: S,
    normalizer: Arc<dyn TextNormalizer>,
    extractor: SignalExtractor,
    calibrator: TierCalibrator,
    report: FunnelReport,
}

impl<S: Store> WriteFunnel<S> {
    pub fn new(store: S, calibrator: TierCalibrator) -> Self {
        Self {
            store,
            normalizer: Arc::new(BlacklistNormalizer::default()),
            extractor: SignalExtractor::default(),
            calibrator,
            report: FunnelReport::default(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn TextNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_extractor(mut self, extractor: SignalExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Drain `rx` until every sender is gone, then hand the store back.
    pub async fn run(mut self, mut rx: mpsc::Receiver<TaskOutcome>) -> (S, FunnelReport) {
        while let Some(outcome) = rx.recv().await {
            self.handle(outcome);
        }
        tracing::debug!(
            succeeded = self.report.succeeded,
            failed = self.report.failed,
            db_errors = self.report.db_errors,
            "Write funnel drained"
        );
        (self.store, self.report)
    }

    /// Persist one outcome. Store failures are counted, never propagated.
    pub fn handle(&mut self, outcome: TaskOutcome) {
        let TaskOutcome {
            item,
            lane,
            attempts,
            result,
        } = outcome;

        match result {
            TaskResult::Succeeded(output) => match self.persist_success(&item, &output, Utc::now()) {
                Ok(overridden) => {
                    self.report.succeeded += 1;
                    if overridden {
                        self.report.overrides += 1;
                    }
                    if let Some(lane) = lane {
                        self.report.per_lane.entry(lane).or_default().succeeded += 1;
                    }
                    tracing::debug!(content_id = %item.id, lane = ?lane, attempts, "Item processed");
                }
                Err(BriefError::InvalidResponse(reason)) => {
                    tracing::warn!(content_id = %item.id, %reason, "Model response rejected");
                    self.report.invalid_responses += 1;
                    self.mark_failed(&item, lane);
                }
                Err(e) => {
                    tracing::error!(content_id = %item.id, error = %e, "Failed to persist processed item");
                    self.report.db_errors += 1;
                }
            },
            TaskResult::Failed(error) => {
                tracing::warn!(content_id = %item.id, lane = ?lane, attempts, error = %error, "Item failed permanently");
                self.mark_failed(&item, lane);
            }
            TaskResult::Cancelled => {
                self.report.cancelled += 1;
            }
        }
    }

    fn mark_failed(&mut self, item: &RawItem, lane: Option<LaneId>) {
        match self.store.set_item_status(&item.id, ItemStatus::Failed) {
            Ok(()) => {
                self.report.failed += 1;
                if let Some(lane) = lane {
                    self.report.per_lane.entry(lane).or_default().failed += 1;
                }
            }
            Err(e) => {
                tracing::error!(content_id = %item.id, error = %e, "Failed to record item failure");
                self.report.db_errors += 1;
            }
        }
    }

    /// Validate, normalize, calibrate and save. Returns whether the tier
    /// guess was overridden.
    fn persist_success(&mut self, item: &RawItem, output: &ModelOutput, as_of: DateTime<Utc>) -> Result<bool> {
        let (processed, overridden) = self.build_processed(item, output, as_of)?;
        self.store.save_processed(&processed)?;
        Ok(overridden)
    }

    /// Turn a raw item and model output into the record to store.
    pub fn build_processed(
        &self,
        item: &RawItem,
        output: &ModelOutput,
        as_of: DateTime<Utc>,
    ) -> Result<(ProcessedItem, bool)> {
        let mut response = SummaryResponse::from_value(&output.fields)?;
        let normalizer = Arc::clone(&self.normalizer);
        response.map_text(|text| normalizer.normalize(text));

        let signals = self.extractor.extract(item, &response, as_of);
        let calibration = self
            .calibrator
            .calibrate(response.tier_guess, &response.tier_rationale, &signals);
        if let Some(rule) = calibration.rule {
            tracing::info!(
                content_id = %item.id,
                from = %response.tier_guess,
                to = %calibration.tier,
                rule = rule.code(),
                "Calibrated tier"
            );
        }

        let processed = ProcessedItem {
            content_id: item.id.clone(),
            core_summary: response.core_summary,
            key_insights: response.key_insights,
            concepts: response.concepts,
            so_what: response.so_what,
            topic_tags: response.topic_tags,
            content_type: response.content_type,
            freshness: response.freshness,
            tier: calibration.tier,
            tier_rationale: calibration.rationale,
            processed_at: as_of,
            prompt_version: PROMPT_VERSION.to_string(),
            model_used: output.model.clone(),
            is_backlog: signals.is_backlog,
            delivered: false,
            delivered_at: None,
            source_id: item.source_id.clone(),
            word_count: item.word_count,
            published_at: item.published_at,
        };
        Ok((processed, calibration.rule.is_some()))
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentKind, Tier};
    use crate::store::SqliteStore;
    use chrono::Duration;
    use serde_json::json;

    fn raw(n: u32, words: u32, age_days: i64) -> RawItem {
        RawItem::new(
            "src",
            "Src",
            ContentKind::Article,
            format!("t{}", n),
            format!("https://x/{}", n),
            Utc::now() - Duration::days(age_days),
            Some("body".into()),
        )
        .with_word_count(words)
    }

    fn output(tier: &str) -> ModelOutput {
        ModelOutput::new(
            json!({
                "core_summary": "This is a game-changer for inference.",
                "key_insights": ["one", "two"],
                "topic_tags": ["ai"],
                "content_type": "news_analysis",
                "freshness": "fresh",
                "tier": tier,
                "tier_rationale": "solid",
            }),
            "gemini-2.5-flash",
        )
    }

    fn funnel() -> WriteFunnel<SqliteStore> {
        WriteFunnel::new(SqliteStore::open_in_memory().unwrap(), TierCalibrator::default())
    }

    #[test]
    fn test_success_is_normalized_and_calibrated() {
        let mut funnel = funnel();
        let item = raw(1, 20_000, 1);
        funnel.store.save_raw(&item).unwrap();

        funnel.handle(TaskOutcome {
            item: item.clone(),
            lane: Some(LaneId::A),
            attempts: 1,
            result: TaskResult::Succeeded(output("worth_a_look")),
        });

        let stored = funnel.store().get_processed(&item.id).unwrap().unwrap();
        assert_eq!(stored.tier, Tier::DeepDive);
        assert!(stored.tier_rationale.contains("[calibrated:long_form"));
        assert!(stored.core_summary.contains("significant shift"));
        assert_eq!(stored.model_used, "gemini-2.5-flash");
        assert!(!stored.is_backlog);
        assert_eq!(funnel.store().get_raw(&item.id).unwrap().unwrap().status, ItemStatus::Processed);
        assert_eq!(funnel.report.overrides, 1);
        assert_eq!(funnel.report.per_lane[&LaneId::A].succeeded, 1);
    }

    #[test]
    fn test_backlog_flag_frozen_at_processing() {
        let funnel = funnel();
        let (processed, _) = funnel
            .build_processed(&raw(2, 5000, 30), &output("worth_a_look"), Utc::now())
            .unwrap();
        assert!(processed.is_backlog);
    }

    #[test]
    fn test_invalid_response_marks_failed() {
        let mut funnel = funnel();
        let item = raw(3, 5000, 1);
        funnel.store.save_raw(&item).unwrap();

        funnel.handle(TaskOutcome {
            item: item.clone(),
            lane: Some(LaneId::B),
            attempts: 1,
            result: TaskResult::Succeeded(ModelOutput::new(json!({"tier": "deep_dive"}), "m")),
        });

        assert_eq!(funnel.report.invalid_responses, 1);
        assert_eq!(funnel.report.failed, 1);
        assert_eq!(funnel.store().get_raw(&item.id).unwrap().unwrap().status, ItemStatus::Failed);
    }

    #[test]
    fn test_cancelled_stays_pending() {
        let mut funnel = funnel();
        let item = raw(4, 5000, 1);
        funnel.store.save_raw(&item).unwrap();

        funnel.handle(TaskOutcome {
            item: item.clone(),
            lane: None,
            attempts: 0,
            result: TaskResult::Cancelled,
        });

        assert_eq!(funnel.report.cancelled, 1);
        assert_eq!(funnel.store().get_raw(&item.id).unwrap().unwrap().status, ItemStatus::Pending);
    }

    #[test]
    fn test_store_error_is_counted() {
        let mut funnel = funnel();
        // Never saved as raw, so the status update has nothing to touch
        funnel.handle(TaskOutcome {
            item: raw(5, 5000, 1),
            lane: Some(LaneId::A),
            attempts: 3,
            result: TaskResult::Failed(ModelError::Timeout(std::time::Duration::from_secs(1))),
        });
        assert_eq!(funnel.report.db_errors, 1);
        assert_eq!(funnel.report.failed, 0);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let funnel = funnel();
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(funnel.run(rx));
        tx.send(TaskOutcome {
            item: raw(6, 5000, 1),
            lane: None,
            attempts: 0,
            result: TaskResult::Cancelled,
        })
        .await
        .unwrap();
        drop(tx);

        let (_store, report) = handle.await.unwrap();
        assert_eq!(report.cancelled, 1);
    }
}
