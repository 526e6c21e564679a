//! Tier calibration: signals in, deterministic tier out.

pub mod calibrator;
pub mod signals;

pub use calibrator::{Calibration, CalibrationRule, CalibrationRules, DEFAULT_DEEP_SOURCES, TierCalibrator};
pub use signals::{BACKLOG_AGE_DAYS, SignalExtractor, Signals};
