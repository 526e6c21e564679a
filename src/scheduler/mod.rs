//! Scheduler for batch summarization across provider lanes.
//!
//! This module provides:
//! - **Lanes**: a model behind a per-lane concurrency bound.
//! - **Run session**: which lane is primary for the current run. The first
//!   lane exhaustion moves the primary role; a new run starts over.
//! - **Retry policy**: linear backoff for rate limits with one failover to
//!   the other lane, short exponential backoff for transient errors.
//! - **Write funnel**: the single consumer that owns the store.
//!
//! # Architecture
//!
//! 1. The batch is shuffled and split by the primary share
//! 2. One dispatcher per share acquires lane permits and spawns task drivers
//! 3. Drivers call the model, back off, reroute, and send outcomes to the funnel
//! 4. The funnel validates, calibrates and persists each outcome in order
//!
//! # Example
//!
//! ```ignore
//! use dailybrief::scheduler::{LaneSet, Scheduler, SchedulerConfig, WriteFunnel};
//!
//! let scheduler = Scheduler::new(lanes, SchedulerConfig::default());
//! let funnel = WriteFunnel::new(store, TierCalibrator::default());
//! let (store, report) = scheduler.run(pending, funnel, cancel).await?;
//! ```

mod clock;
mod funnel;
mod lane;
mod progress;
mod runner;
mod session;
mod task;

pub use clock::{Clock, RecordingClock, TokioClock};
pub use funnel::{FunnelReport, LaneTally, TaskOutcome, TaskResult, WriteFunnel};
pub use lane::{LaneConfig, LaneId, LaneSet, ProviderLane, Role};
pub use progress::{Progress, ProgressSnapshot, spawn_reporter};
pub use runner::{DEFAULT_PRIMARY_SHARE, RunPlan, RunReport, Scheduler, SchedulerConfig};
pub use session::RunSession;
pub use task::{
    Decision, MAX_ATTEMPTS, ProviderTask, RATE_LIMIT_BASE_DELAY, RetryPolicy, TRANSIENT_BASE_DELAY, TaskState,
};
