//! Domain types for dailybrief
//!
//! This module contains the core records:
//! - RawItem: fetched content waiting for summarization
//! - ProcessedItem: summarized, calibrated content with delivery state
//! - Briefing: the date-keyed selection handed to the notifier
//! - Tier / Freshness / ContentType: the closed enumerations the model fills in

pub mod briefing;
pub mod item;
pub mod tier;

pub use briefing::{BacklogProgress, Briefing};
pub use item::{Concept, ContentKind, ItemStatus, ProcessedItem, RawItem};
pub use tier::{ContentType, Freshness, Tier};
