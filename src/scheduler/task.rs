//! One item's journey through the lanes, and the retry policy that drives it.

use std::time::Duration;

use crate::domain::RawItem;
use crate::llm::{FailureKind, ModelError};
use crate::scheduler::lane::{LaneId, Role};
use crate::summary::SummaryRequest;

/// Rate-limited attempts per lane before it counts as exhausted for a task;
/// also the number of transient retries
pub const MAX_ATTEMPTS: u32 = 3;

/// Rate-limit backoff grows linearly: base × attempt
pub const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(30);

/// Transient backoff doubles: base × 2^(attempt-1)
pub const TRANSIENT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Lifecycle of a provider task.
///
/// ```text
/// Queued → Dispatched → Succeeded
///              ↓
///        RateLimited ──→ BackoffWait → Dispatched
///              ↓              ↓
///           Queued (other lane, once)
///
/// TransientError → BackoffWait | PermanentFailure
/// ```
///
/// `Cancelled` is reachable from every non-terminal state; the item stays
/// pending in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Queued,
    Dispatched,
    RateLimited,
    TransientError,
    BackoffWait,
    Succeeded,
    PermanentFailure,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::PermanentFailure | TaskState::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Queued, Dispatched)
                | (Dispatched, Succeeded | RateLimited | TransientError | PermanentFailure)
                | (RateLimited, BackoffWait | Queued | PermanentFailure)
                | (TransientError, BackoffWait | PermanentFailure)
                | (BackoffWait, Dispatched | Queued | PermanentFailure)
        )
    }
}

/// A summarization task bound to one raw item.
#[derive(Debug, Clone)]
pub struct ProviderTask {
    pub item: RawItem,
    pub request: SummaryRequest,
    pub role: Role,
    /// Lane of the current or last attempt
    pub lane: Option<LaneId>,
    /// Attempts on the current lane
    pub attempts: u32,
    /// Attempts across all lanes
    pub total_attempts: u32,
    pub rerouted: bool,
    pub state: TaskState,
    history: Vec<TaskState>,
}

impl ProviderTask {
    pub fn new(item: RawItem, role: Role) -> Self {
        let request = SummaryRequest::from_item(&item);
        Self {
            item,
            request,
            role,
            lane: None,
            attempts: 0,
            total_attempts: 0,
            rerouted: false,
            state: TaskState::Queued,
            history: vec![TaskState::Queued],
        }
    }

    pub fn content_id(&self) -> &str {
        &self.item.id
    }

    /// Move to `next`. Illegal moves are bugs in the driver.
    pub fn transition(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal task transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.history.push(next);
    }

    /// Start an attempt on `lane`.
    pub fn dispatch(&mut self, lane: LaneId) {
        self.lane = Some(lane);
        self.attempts += 1;
        self.total_attempts += 1;
        self.transition(TaskState::Dispatched);
    }

    /// Send the task to `lane` with a fresh attempt count.
    pub fn reroute(&mut self, lane: LaneId) {
        self.rerouted = true;
        self.attempts = 0;
        self.lane = Some(lane);
        self.transition(TaskState::Queued);
    }

    pub fn history(&self) -> &[TaskState] {
        &self.history
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Wait, then try the same lane again
    Retry(Duration),
    /// The lane is done with this task; optionally wait before moving on
    ExhaustLane { wait: Option<Duration> },
    /// Give up on the item
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_base: Duration,
    pub transient_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            rate_limit_base: RATE_LIMIT_BASE_DELAY,
            transient_base: TRANSIENT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th rate limit on a lane (1-based).
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.rate_limit_base * attempt.max(1)
    }

    /// Backoff after the `attempt`-th transient failure on a lane (1-based).
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.transient_base * 2u32.pow(exp)
    }

    /// Decide the next step after `attempt` failed with `error`.
    ///
    /// Rate limits back off after every failure, including the last one
    /// before the lane is given up. Transient failures get `max_attempts`
    /// retries on the same lane (1s, 2s, 4s by default) and never change
    /// lanes.
    pub fn decide(&self, attempt: u32, error: &ModelError) -> Decision {
        match error.kind() {
            FailureKind::RateLimited => {
                let delay = self.rate_limit_delay(attempt);
                if attempt < self.max_attempts {
                    Decision::Retry(delay)
                } else {
                    Decision::ExhaustLane { wait: Some(delay) }
                }
            }
            FailureKind::LaneExhausted => Decision::ExhaustLane { wait: None },
            FailureKind::Transient => {
                if attempt <= self.max_attempts {
                    Decision::Retry(self.transient_delay(attempt))
                } else {
                    Decision::Fail
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentKind;
    use chrono::Utc;

    fn task() -> ProviderTask {
        let item = RawItem::new("src", "Src", ContentKind::Article, "t", "https://x/1", Utc::now(), Some("b".into()));
        ProviderTask::new(item, Role::Primary)
    }

    fn rate_limited() -> ModelError {
        ModelError::RateLimited { retry_after: None }
    }

    #[test]
    fn test_rate_limit_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1, &rate_limited()), Decision::Retry(Duration::from_secs(30)));
        assert_eq!(policy.decide(2, &rate_limited()), Decision::Retry(Duration::from_secs(60)));
        assert_eq!(
            policy.decide(3, &rate_limited()),
            Decision::ExhaustLane {
                wait: Some(Duration::from_secs(90))
            }
        );
    }

    #[test]
    fn test_transient_schedule() {
        let policy = RetryPolicy::default();
        let err = ModelError::Timeout(Duration::from_secs(120));
        assert_eq!(policy.decide(1, &err), Decision::Retry(Duration::from_secs(1)));
        assert_eq!(policy.decide(2, &err), Decision::Retry(Duration::from_secs(2)));
        assert_eq!(policy.decide(3, &err), Decision::Retry(Duration::from_secs(4)));
        assert_eq!(policy.decide(4, &err), Decision::Fail);

        let server = ModelError::Server {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(policy.decide(3, &server), Decision::Retry(Duration::from_secs(4)));
    }

    #[test]
    fn test_quota_exhaustion_skips_backoff() {
        let policy = RetryPolicy::default();
        let err = ModelError::QuotaExhausted("limit: 0".into());
        assert_eq!(policy.decide(1, &err), Decision::ExhaustLane { wait: None });
        let err = ModelError::MissingApiKey {
            env_var: "X".into(),
        };
        assert_eq!(policy.decide(1, &err), Decision::ExhaustLane { wait: None });
    }

    #[test]
    fn test_task_reroute_resets_attempts() {
        let mut t = task();
        t.dispatch(LaneId::A);
        t.transition(TaskState::RateLimited);
        t.transition(TaskState::BackoffWait);
        t.dispatch(LaneId::A);
        assert_eq!(t.attempts, 2);

        t.transition(TaskState::RateLimited);
        t.reroute(LaneId::B);
        assert_eq!(t.attempts, 0);
        assert!(t.rerouted);

        t.dispatch(LaneId::B);
        t.transition(TaskState::Succeeded);
        assert_eq!(t.total_attempts, 3);
        assert_eq!(t.lane, Some(LaneId::B));
        assert_eq!(t.history().last(), Some(&TaskState::Succeeded));
    }

    #[test]
    fn test_transitions() {
        assert!(TaskState::Queued.can_transition_to(TaskState::Dispatched));
        assert!(TaskState::BackoffWait.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Succeeded.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Succeeded));
        assert!(!TaskState::TransientError.can_transition_to(TaskState::Queued));
    }
}
