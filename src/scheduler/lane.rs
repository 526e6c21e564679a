//! Provider lanes: one model behind one concurrency bound.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::llm::SummarizationModel;
use crate::summary::BudgetHint;

/// The two lane slots. `A` is the configured primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneId {
    A,
    B,
}

impl LaneId {
    pub fn other(&self) -> LaneId {
        match self {
            LaneId::A => LaneId::B,
            LaneId::B => LaneId::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaneId::A => "a",
            LaneId::B => "b",
        }
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which share of the partition a task was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Secondary,
}

/// Per-lane limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneConfig {
    pub concurrency: usize,
    /// Upper bound on a single model call
    pub timeout: Duration,
    pub budget: BudgetHint,
}

impl LaneConfig {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout: Duration::from_secs(120),
            budget: BudgetHint::default(),
        }
    }
}

/// A model plus the permits that bound calls to it.
#[derive(Clone)]
pub struct ProviderLane {
    pub id: LaneId,
    pub model: Arc<dyn SummarizationModel>,
    pub permits: Arc<Semaphore>,
    pub config: LaneConfig,
}

impl ProviderLane {
    pub fn new(id: LaneId, model: Arc<dyn SummarizationModel>, config: LaneConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            id,
            model,
            permits: Arc::new(Semaphore::new(concurrency)),
            config: LaneConfig { concurrency, ..config },
        }
    }

    /// Calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.config.concurrency - self.permits.available_permits()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

impl std::fmt::Debug for ProviderLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLane")
            .field("id", &self.id)
            .field("model", &self.model.name())
            .field("concurrency", &self.config.concurrency)
            .finish()
    }
}

/// Up to two configured lanes.
#[derive(Debug, Clone, Default)]
pub struct LaneSet {
    a: Option<ProviderLane>,
    b: Option<ProviderLane>,
}

impl LaneSet {
    /// Build from whichever lanes could be initialised. Lane ids are
    /// reassigned to match their slot.
    pub fn new(a: Option<ProviderLane>, b: Option<ProviderLane>) -> Self {
        Self {
            a: a.map(|lane| ProviderLane { id: LaneId::A, ..lane }),
            b: b.map(|lane| ProviderLane { id: LaneId::B, ..lane }),
        }
    }

    pub fn get(&self, id: LaneId) -> Option<&ProviderLane> {
        match id {
            LaneId::A => self.a.as_ref(),
            LaneId::B => self.b.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_none() && self.b.is_none()
    }

    /// The lane that starts as primary: A when present.
    pub fn configured_primary(&self) -> Option<LaneId> {
        match (&self.a, &self.b) {
            (Some(_), _) => Some(LaneId::A),
            (None, Some(_)) => Some(LaneId::B),
            (None, None) => None,
        }
    }

    /// The only lane, when exactly one is configured.
    pub fn single(&self) -> Option<LaneId> {
        match (&self.a, &self.b) {
            (Some(_), None) => Some(LaneId::A),
            (None, Some(_)) => Some(LaneId::B),
            _ => None,
        }
    }

    pub fn lanes(&self) -> impl Iterator<Item = &ProviderLane> {
        self.a.iter().chain(self.b.iter())
    }
}
