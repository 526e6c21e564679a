//! Briefing selection: pool queries, composition and display ordering.

pub mod composer;
pub mod display;
pub mod pool;

pub use composer::{Composer, ComposerConfig, CompositionStats, MAX_DEEP_DIVES, MAX_ITEMS};
pub use display::{
    CeilingSplit, DiversityLimits, cap_by_tier, deep_dive_rank, enforce_source_diversity, order_for_display,
    split_deep_dive_ceiling,
};
pub use pool::{FRESH_MAX_AGE_WEEKS, SelectionPool, backlog_target};
