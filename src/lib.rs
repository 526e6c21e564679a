//! Dailybrief - summarized content triaged into a bounded daily briefing
//!
//! Pending items are summarized across two provider lanes, calibrated into
//! reading tiers, and composed into one date-keyed briefing with per-source
//! diversity, a deep-dive ceiling and a total cap.

pub mod calibrate;
pub mod domain;
pub mod error;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod selection;
pub mod store;
pub mod summary;

pub use error::{BriefError, Result};
