//! Permanent-content screening.
//!
//! Items that can never produce a useful summary are given a terminal status
//! before scheduling so they are not retried on every run.

use crate::domain::{ItemStatus, RawItem};

/// Items below this many words are skipped (shorts, teasers).
pub const MIN_WORD_COUNT: u32 = 500;

/// Paywall text only counts as a stub when the body is at most this long.
pub const PAYWALL_MAX_WORDS: usize = 1000;

/// Two or more of these in a short body mark it as a paywall stub.
pub const PAYWALL_SIGNATURES: &[&str] = &[
    "subscribe to stratechery",
    "this update is for paying subscribers",
    "already a subscriber? sign in",
    "join as a paid subscriber",
    "this post is for paid subscribers",
    "upgrade to paid",
    "member-only content",
    "subscriber-only",
    "premium subscription",
    "sign in to read",
    "become a member",
    "exclusive content for subscribers",
    "stratechery plus",
];

/// Outcome of screening one pending item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screening {
    /// Worth sending to a model
    Processable,
    /// Terminal status to record instead
    Reject(ItemStatus),
}

/// Screens raw items for permanent-content problems.
#[derive(Debug, Clone)]
pub struct Intake {
    pub min_word_count: u32,
}

impl Default for Intake {
    fn default() -> Self {
        Self {
            min_word_count: MIN_WORD_COUNT,
        }
    }
}

impl Intake {
    pub fn new(min_word_count: u32) -> Self {
        Self { min_word_count }
    }

    pub fn screen(&self, item: &RawItem) -> Screening {
        let transcript = match item.transcript.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Screening::Reject(ItemStatus::NoTranscript),
        };
        if is_paywall_content(transcript) {
            return Screening::Reject(ItemStatus::Paywall);
        }
        if item.word_count < self.min_word_count {
            return Screening::Reject(ItemStatus::Skipped);
        }
        Screening::Processable
    }
}

/// Detect a paywall stub rather than real article content.
pub fn is_paywall_content(text: &str) -> bool {
    if text.split_whitespace().count() > PAYWALL_MAX_WORDS {
        return false;
    }
    let lower = text.to_lowercase();
    PAYWALL_SIGNATURES.iter().filter(|sig| lower.contains(*sig)).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentKind;
    use chrono::Utc;

    fn item_with(transcript: Option<&str>, words: u32) -> RawItem {
        RawItem::new(
            "src",
            "Source",
            ContentKind::Article,
            "Title",
            "https://example.com/a",
            Utc::now(),
            transcript.map(str::to_string),
        )
        .with_word_count(words)
    }

    #[test]
    fn test_missing_transcript_rejected() {
        let intake = Intake::default();
        assert_eq!(intake.screen(&item_with(None, 0)), Screening::Reject(ItemStatus::NoTranscript));
        assert_eq!(intake.screen(&item_with(Some("   "), 0)), Screening::Reject(ItemStatus::NoTranscript));
    }

    #[test]
    fn test_paywall_stub_rejected() {
        let stub = "This post is for paid subscribers. Already a subscriber? Sign in.";
        let intake = Intake::default();
        assert_eq!(intake.screen(&item_with(Some(stub), 900)), Screening::Reject(ItemStatus::Paywall));
    }

    #[test]
    fn test_single_signature_is_not_paywall() {
        assert!(!is_paywall_content("Become a member to support the show. Today we discuss chips."));
    }

    #[test]
    fn test_long_text_never_paywall() {
        let body = format!("subscribe to stratechery upgrade to paid {}", "word ".repeat(1200));
        assert!(!is_paywall_content(&body));
    }

    #[test]
    fn test_short_content_skipped() {
        let intake = Intake::default();
        assert_eq!(intake.screen(&item_with(Some("a real body"), 120)), Screening::Reject(ItemStatus::Skipped));
    }

    #[test]
    fn test_processable() {
        let intake = Intake::default();
        assert_eq!(intake.screen(&item_with(Some("a real body"), 4000)), Screening::Processable);
    }
}
