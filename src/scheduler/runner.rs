//! Batch execution across provider lanes.
//!
//! Items are shuffled and split into a primary share and a secondary share.
//! Each share has its own dispatcher; a task takes a permit on its lane
//! before calling the model and keeps it through same-lane retries. When a
//! lane is exhausted for a task the permit is released and the task moves
//! to the other lane once. Outcomes go to the write funnel, the only writer.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::domain::RawItem;
use crate::error::{BriefError, Result};
use crate::llm::{FailureKind, ModelError};
use crate::scheduler::clock::{Clock, TokioClock};
use crate::scheduler::funnel::{FunnelReport, TaskOutcome, TaskResult, WriteFunnel};
use crate::scheduler::lane::{LaneId, LaneSet, Role};
use crate::scheduler::progress::{Progress, ProgressSnapshot, spawn_reporter};
use crate::scheduler::session::RunSession;
use crate::scheduler::task::{Decision, ProviderTask, RetryPolicy, TaskState};
use crate::store::Store;

/// Fraction of a batch assigned to the primary lane
pub const DEFAULT_PRIMARY_SHARE: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub primary_share: f64,
    /// Capacity of the outcome channel in front of the write funnel
    pub channel_capacity: usize,
    pub progress_interval: Duration,
    /// Fixed shuffle seed; random when unset
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            primary_share: DEFAULT_PRIMARY_SHARE,
            channel_capacity: 64,
            progress_interval: Duration::from_secs(30),
            seed: None,
        }
    }
}

/// How a batch will be split before anything is dispatched.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub primary_lane: LaneId,
    /// `None` when only one lane is configured
    pub secondary_lane: Option<LaneId>,
    pub primary: Vec<RawItem>,
    pub secondary: Vec<RawItem>,
}

impl RunPlan {
    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub planned: usize,
    pub primary_planned: usize,
    pub secondary_planned: usize,
    pub configured_primary: Option<LaneId>,
    /// Primary lane when the run ended
    pub final_primary: Option<LaneId>,
    pub flipped: bool,
    pub progress: ProgressSnapshot,
    pub funnel: FunnelReport,
}

pub struct Scheduler {
    lanes: LaneSet,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(lanes: LaneSet, config: SchedulerConfig) -> Self {
        Self {
            lanes,
            policy: RetryPolicy::default(),
            clock: Arc::new(TokioClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn lanes(&self) -> &LaneSet {
        &self.lanes
    }

    /// Shuffle and split `items` between the primary and secondary roles.
    pub fn plan(&self, mut items: Vec<RawItem>) -> Result<RunPlan> {
        let primary_lane = self.lanes.configured_primary().ok_or(BriefError::NoProviderLanes)?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        items.shuffle(&mut rng);

        if self.lanes.single().is_some() {
            return Ok(RunPlan {
                primary_lane,
                secondary_lane: None,
                primary: items,
                secondary: Vec::new(),
            });
        }

        let share = self.config.primary_share.clamp(0.0, 1.0);
        let split_idx = ((items.len() as f64) * share).floor() as usize;
        let secondary = items.split_off(split_idx.min(items.len()));
        Ok(RunPlan {
            primary_lane,
            secondary_lane: Some(primary_lane.other()),
            primary: items,
            secondary,
        })
    }

    /// Process `items` to completion or cancellation, writing through
    /// `funnel`. Returns the funnel's store once every outcome is written.
    pub async fn run<S: Store + 'static>(
        &self,
        items: Vec<RawItem>,
        funnel: WriteFunnel<S>,
        cancel: CancellationToken,
    ) -> Result<(S, RunReport)> {
        let session = Arc::new(RunSession::for_lanes(&self.lanes)?);
        let plan = self.plan(items)?;
        let total = plan.len();
        let mut report = RunReport {
            planned: total,
            primary_planned: plan.primary.len(),
            secondary_planned: plan.secondary.len(),
            configured_primary: Some(session.configured_primary()),
            ..Default::default()
        };
        tracing::info!(
            total,
            primary_lane = %plan.primary_lane,
            primary_items = report.primary_planned,
            secondary_items = report.secondary_planned,
            "Starting batch"
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let writer = tokio::spawn(funnel.run(rx));

        let progress = Arc::new(Progress::default());
        let reporter_stop = CancellationToken::new();
        let reporter = spawn_reporter(
            Arc::clone(&progress),
            total,
            self.config.progress_interval,
            reporter_stop.clone(),
        );

        let ctx = Arc::new(Dispatch {
            lanes: self.lanes.clone(),
            policy: self.policy,
            clock: Arc::clone(&self.clock),
            session: Arc::clone(&session),
            progress: Arc::clone(&progress),
            cancel,
            outcomes: tx,
        });
        tokio::join!(
            dispatch_role(Arc::clone(&ctx), Role::Primary, plan.primary),
            dispatch_role(Arc::clone(&ctx), Role::Secondary, plan.secondary),
        );
        // Last sender goes with the context; the funnel drains and returns
        drop(ctx);

        let written = writer.await;
        reporter_stop.cancel();
        if let Err(e) = reporter.await {
            tracing::debug!(error = %e, "Progress reporter ended abnormally");
        }
        let (store, funnel_report) =
            written.map_err(|e| BriefError::InvalidState(format!("write funnel stopped: {}", e)))?;

        report.final_primary = Some(session.primary());
        report.flipped = session.flipped();
        report.progress = progress.snapshot();
        report.funnel = funnel_report;
        tracing::info!(
            succeeded = report.funnel.succeeded,
            failed = report.funnel.failed,
            cancelled = report.funnel.cancelled,
            flipped = report.flipped,
            "Batch finished"
        );
        Ok((store, report))
    }
}

/// State shared by dispatchers and task drivers for one run.
struct Dispatch {
    lanes: LaneSet,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    session: Arc<RunSession>,
    progress: Arc<Progress>,
    cancel: CancellationToken,
    outcomes: mpsc::Sender<TaskOutcome>,
}

impl Dispatch {
    /// Wait for a permit on `lane`, or `None` once the run is cancelled.
    async fn acquire(&self, lane: LaneId) -> Option<OwnedSemaphorePermit> {
        let permits = Arc::clone(&self.lanes.get(lane)?.permits);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        }
    }

    /// Permit on whichever lane currently serves `role`. The primary may
    /// move while we wait, so the lane is checked again after acquiring.
    async fn acquire_for_role(&self, role: Role) -> Option<(LaneId, OwnedSemaphorePermit)> {
        loop {
            let lane = self.session.lane_for(role);
            let permit = self.acquire(lane).await?;
            if self.session.lane_for(role) == lane {
                return Some((lane, permit));
            }
        }
    }

    async fn finish(&self, mut task: ProviderTask, result: TaskResult) {
        match &result {
            TaskResult::Succeeded(_) => {
                task.transition(TaskState::Succeeded);
                Progress::bump(&self.progress.succeeded);
            }
            TaskResult::Failed(_) => {
                task.transition(TaskState::PermanentFailure);
                Progress::bump(&self.progress.failed);
            }
            TaskResult::Cancelled => {
                task.transition(TaskState::Cancelled);
                Progress::bump(&self.progress.cancelled);
            }
        }
        Progress::bump(&self.progress.completed);

        let outcome = TaskOutcome {
            item: task.item,
            lane: task.lane,
            attempts: task.total_attempts,
            result,
        };
        if self.outcomes.send(outcome).await.is_err() {
            tracing::error!("Write funnel closed, outcome dropped");
        }
    }
}

async fn dispatch_role(ctx: Arc<Dispatch>, role: Role, items: Vec<RawItem>) {
    let mut running = JoinSet::new();
    for item in items {
        let task = ProviderTask::new(item, role);
        let Some((lane, permit)) = ctx.acquire_for_role(role).await else {
            ctx.finish(task, TaskResult::Cancelled).await;
            continue;
        };
        running.spawn(drive(Arc::clone(&ctx), task, lane, permit));
    }
    while let Some(joined) = running.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Task driver panicked");
        }
    }
}

/// Run one task to a terminal state. Holds `permit` for the current lane.
async fn drive(ctx: Arc<Dispatch>, mut task: ProviderTask, mut lane_id: LaneId, mut permit: OwnedSemaphorePermit) {
    loop {
        let Some(lane) = ctx.lanes.get(lane_id) else {
            ctx.finish(task, TaskResult::Cancelled).await;
            return;
        };

        task.dispatch(lane_id);
        Progress::bump(&ctx.progress.dispatched);
        let call = lane.model.submit(&task.request, &lane.config.budget);
        let result = match tokio::time::timeout(lane.config.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(lane.config.timeout)),
        };

        let error = match result {
            Ok(output) => {
                drop(permit);
                ctx.finish(task, TaskResult::Succeeded(output)).await;
                return;
            }
            Err(error) => error,
        };

        match error.kind() {
            FailureKind::Transient => task.transition(TaskState::TransientError),
            FailureKind::RateLimited | FailureKind::LaneExhausted => {
                Progress::bump(&ctx.progress.rate_limited);
                task.transition(TaskState::RateLimited);
            }
        }

        match ctx.policy.decide(task.attempts, &error) {
            Decision::Retry(delay) => {
                tracing::warn!(
                    content_id = %task.content_id(),
                    lane = %lane_id,
                    attempt = task.attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %error,
                    "Model call failed, backing off"
                );
                task.transition(TaskState::BackoffWait);
                ctx.clock.sleep(delay).await;
                if ctx.cancel.is_cancelled() {
                    drop(permit);
                    ctx.finish(task, TaskResult::Cancelled).await;
                    return;
                }
            }
            Decision::ExhaustLane { wait } => {
                if let Some(delay) = wait {
                    task.transition(TaskState::BackoffWait);
                    ctx.clock.sleep(delay).await;
                }
                ctx.session.record_exhaustion(lane_id);
                drop(permit);

                let fallback = lane_id.other();
                if task.rerouted || ctx.lanes.get(fallback).is_none() {
                    tracing::warn!(content_id = %task.content_id(), lane = %lane_id, error = %error, "No lane left for task");
                    ctx.finish(task, TaskResult::Failed(error)).await;
                    return;
                }
                if ctx.cancel.is_cancelled() {
                    ctx.finish(task, TaskResult::Cancelled).await;
                    return;
                }

                tracing::warn!(content_id = %task.content_id(), from = %lane_id, to = %fallback, error = %error, "Rerouting task");
                task.reroute(fallback);
                Progress::bump(&ctx.progress.rerouted);
                permit = match ctx.acquire(fallback).await {
                    Some(permit) => permit,
                    None => {
                        ctx.finish(task, TaskResult::Cancelled).await;
                        return;
                    }
                };
                lane_id = fallback;
            }
            Decision::Fail => {
                drop(permit);
                ctx.finish(task, TaskResult::Failed(error)).await;
                return;
            }
        }
    }
}
