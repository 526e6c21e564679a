//! Signal-based tier calibration.
//!
//! Models drift toward `worth_a_look` for almost everything. The calibrator
//! replaces the guess with a signal-derived tier when the evidence is strong,
//! and leaves it alone otherwise.
//!
//! Rules, promotion phase first, first match wins within a phase:
//!
//! 1. word count >= 18,000                                   -> deep_dive
//! 2. word count >= 12,000 and (deep source | interview | >= 5 insights) -> deep_dive
//! 3. word count <= 1,500                                    -> summary_sufficient
//! 4. stale and currently deep_dive                          -> worth_a_look
//!
//! A matching promotion rule always settles the tier, so the stale demotion
//! only ever applies to a deep_dive *guess*. That keeps `calibrate` idempotent:
//! feeding its output back in changes nothing.

use std::collections::BTreeSet;

use crate::calibrate::signals::Signals;
use crate::domain::{ContentType, ProcessedItem, Tier};
use crate::error::Result;
use crate::store::Store;

pub const LONG_FORM_WORDS: u32 = 18_000;
pub const DEEP_DIVE_MIN_WORDS: u32 = 12_000;
pub const DEEP_DIVE_MIN_INSIGHTS: usize = 5;
pub const SHORT_CONTENT_MAX_WORDS: u32 = 1_500;

/// Sources known for deep long-form content.
pub const DEFAULT_DEEP_SOURCES: &[&str] = &["dwarkesh-patel", "lennys-podcast", "stratechery"];

/// Which override fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalibrationRule {
    LongForm,
    DeepSource,
    LongInterview,
    InsightDense,
    ShortContent,
    StaleDemotion,
    DeepDiveCeiling,
}

impl CalibrationRule {
    /// Machine-readable code used in rationale suffixes.
    pub fn code(&self) -> &'static str {
        match self {
            CalibrationRule::LongForm => "long_form",
            CalibrationRule::DeepSource => "deep_source",
            CalibrationRule::LongInterview => "long_interview",
            CalibrationRule::InsightDense => "insight_dense",
            CalibrationRule::ShortContent => "short_content",
            CalibrationRule::StaleDemotion => "stale_demotion",
            CalibrationRule::DeepDiveCeiling => "deep_dive_ceiling",
        }
    }
}

/// Thresholds and the deep-source set.
#[derive(Debug, Clone)]
pub struct CalibrationRules {
    pub long_form_words: u32,
    pub deep_dive_min_words: u32,
    pub deep_dive_min_insights: usize,
    pub short_content_max_words: u32,
    pub deep_sources: BTreeSet<String>,
}

impl Default for CalibrationRules {
    fn default() -> Self {
        Self {
            long_form_words: LONG_FORM_WORDS,
            deep_dive_min_words: DEEP_DIVE_MIN_WORDS,
            deep_dive_min_insights: DEEP_DIVE_MIN_INSIGHTS,
            short_content_max_words: SHORT_CONTENT_MAX_WORDS,
            deep_sources: DEFAULT_DEEP_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of calibrating one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    pub tier: Tier,
    /// Model rationale with an override suffix appended, if any
    pub rationale: String,
    /// The rule that changed the tier, `None` when the guess stood
    pub rule: Option<CalibrationRule>,
}

impl Calibration {
    pub fn is_override(&self) -> bool {
        self.rule.is_some()
    }
}

/// Deterministic tier calibration.
#[derive(Debug, Clone, Default)]
pub struct TierCalibrator {
    rules: CalibrationRules,
}

impl TierCalibrator {
    pub fn new(rules: CalibrationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &CalibrationRules {
        &self.rules
    }

    /// Calibrate a (validated) tier guess against the item's signals.
    pub fn calibrate(&self, guess: Tier, rationale: &str, signals: &Signals) -> Calibration {
        let (tier, rule) = match self.promotion(signals) {
            Some(rule) => (Tier::DeepDive, Some(rule)),
            None => match self.demotion(guess, signals) {
                Some((tier, rule)) => (tier, Some(rule)),
                None => (guess, None),
            },
        };

        // Only an actual tier change is an override
        if tier == guess {
            return Calibration {
                tier,
                rationale: rationale.to_string(),
                rule: None,
            };
        }

        let rule = rule.unwrap_or(CalibrationRule::LongForm);
        Calibration {
            tier,
            rationale: append_suffix(rationale, rule, guess, tier, signals.word_count),
            rule: Some(rule),
        }
    }

    fn promotion(&self, signals: &Signals) -> Option<CalibrationRule> {
        let r = &self.rules;
        if signals.word_count >= r.long_form_words {
            return Some(CalibrationRule::LongForm);
        }
        if signals.word_count >= r.deep_dive_min_words {
            if r.deep_sources.contains(&signals.source_id) {
                return Some(CalibrationRule::DeepSource);
            }
            if signals.content_type == ContentType::Interview {
                return Some(CalibrationRule::LongInterview);
            }
            if signals.insight_count >= r.deep_dive_min_insights {
                return Some(CalibrationRule::InsightDense);
            }
        }
        None
    }

    fn demotion(&self, current: Tier, signals: &Signals) -> Option<(Tier, CalibrationRule)> {
        if signals.word_count <= self.rules.short_content_max_words {
            return Some((Tier::SummarySufficient, CalibrationRule::ShortContent));
        }
        if signals.is_stale() && current == Tier::DeepDive {
            return Some((Tier::WorthALook, CalibrationRule::StaleDemotion));
        }
        None
    }

    /// Demotion of a deep dive that did not make the briefing's ceiling.
    pub fn ceiling_demotion(&self, item: &ProcessedItem) -> Calibration {
        Calibration {
            tier: Tier::WorthALook,
            rationale: append_suffix(
                &item.tier_rationale,
                CalibrationRule::DeepDiveCeiling,
                item.tier,
                Tier::WorthALook,
                item.word_count,
            ),
            rule: Some(CalibrationRule::DeepDiveCeiling),
        }
    }

    /// The write path for tier changes made after processing. Persists first,
    /// then updates the in-memory view so both agree.
    pub fn persist_override<S: Store + ?Sized>(
        &self,
        store: &mut S,
        item: &mut ProcessedItem,
        calibration: &Calibration,
    ) -> Result<()> {
        store.persist_tier_override(&item.content_id, calibration.tier, &calibration.rationale)?;
        tracing::info!(
            content_id = %item.content_id,
            from = %item.tier,
            to = %calibration.tier,
            rule = calibration.rule.map(|r| r.code()).unwrap_or("none"),
            "Persisted tier override"
        );
        item.tier = calibration.tier;
        item.tier_rationale = calibration.rationale.clone();
        Ok(())
    }
}

fn append_suffix(rationale: &str, rule: CalibrationRule, from: Tier, to: Tier, words: u32) -> String {
    let suffix = format!("[calibrated:{} {}->{} words={}]", rule.code(), from, to, words);
    if rationale.trim().is_empty() {
        suffix
    } else {
        format!("{} {}", rationale.trim_end(), suffix)
    }
}
