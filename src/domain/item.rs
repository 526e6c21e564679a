//! Raw and processed content items.
//!
//! A `RawItem` is what the content source hands over: one video transcript or
//! article. A `ProcessedItem` is the model's summary of it plus the calibrated
//! tier, together with the delivery bookkeeping used by briefing composition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::tier::{ContentType, Freshness, Tier};

/// Medium the content was fetched from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Article,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Article => "article",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(ContentKind::Video),
            "article" => Some(ContentKind::Article),
            _ => None,
        }
    }
}

/// Processing status of a raw item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting for summarization
    Pending,
    /// Summarized and calibrated
    Processed,
    /// Summarization failed after all retries
    Failed,
    /// Below the minimum word count
    Skipped,
    /// Source provided no transcript or article body
    NoTranscript,
    /// Body is a paywall stub
    Paywall,
}

impl ItemStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processed => "processed",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
            ItemStatus::NoTranscript => "no_transcript",
            ItemStatus::Paywall => "paywall",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ItemStatus::Pending),
            "processed" => Some(ItemStatus::Processed),
            "failed" => Some(ItemStatus::Failed),
            "skipped" => Some(ItemStatus::Skipped),
            "no_transcript" => Some(ItemStatus::NoTranscript),
            "paywall" => Some(ItemStatus::Paywall),
            _ => None,
        }
    }

    /// Statuses that are never retried automatically.
    pub fn is_permanent_content(&self) -> bool {
        matches!(self, ItemStatus::Skipped | ItemStatus::NoTranscript | ItemStatus::Paywall)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content fetched from a source, before summarization. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    /// `sha256("{source_id}:{url}")`, first 16 hex chars
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub kind: ContentKind,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub duration_seconds: Option<u32>,
    pub transcript: Option<String>,
    pub word_count: u32,
    pub status: ItemStatus,
}

impl RawItem {
    /// Create a pending item; word count is derived from the transcript.
    pub fn new(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        kind: ContentKind,
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
        transcript: Option<String>,
    ) -> Self {
        let source_id = source_id.into();
        let url = url.into();
        let word_count = transcript
            .as_deref()
            .map(|t| t.split_whitespace().count() as u32)
            .unwrap_or(0);

        Self {
            id: Self::generate_id(&source_id, &url),
            source_id,
            source_name: source_name.into(),
            kind,
            title: title.into(),
            url,
            published_at,
            fetched_at: Utc::now(),
            duration_seconds: None,
            transcript,
            word_count,
            status: ItemStatus::Pending,
        }
    }

    /// Generate a stable id from source and URL.
    pub fn generate_id(source_id: &str, url: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", source_id, url).as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Override the word count, for sources that report it separately.
    pub fn with_word_count(mut self, word_count: u32) -> Self {
        self.word_count = word_count;
        self
    }

    /// Whole days between publication and `as_of`.
    pub fn age_days(&self, as_of: DateTime<Utc>) -> i64 {
        (as_of - self.published_at).num_days()
    }
}

/// A technical term with an accessible explanation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Concept {
    pub term: String,
    pub explanation: String,
}

/// Content after summarization, tagging and tier calibration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedItem {
    /// Id of the raw item this was produced from
    pub content_id: String,

    // Summary payload
    pub core_summary: String,
    pub key_insights: Vec<String>,
    pub concepts: Vec<Concept>,
    pub so_what: String,
    pub topic_tags: Vec<String>,
    pub content_type: ContentType,

    // Classification
    pub freshness: Freshness,
    pub tier: Tier,
    pub tier_rationale: String,

    // Provenance
    pub processed_at: DateTime<Utc>,
    pub prompt_version: String,
    pub model_used: String,

    /// Computed once at processing time and never recomputed
    pub is_backlog: bool,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,

    // Joined from the raw item; read-only
    pub source_id: String,
    pub word_count: u32,
    pub published_at: DateTime<Utc>,
}

impl ProcessedItem {
    pub fn id(&self) -> &str {
        &self.content_id
    }
}
