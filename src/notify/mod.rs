//! Briefing delivery.
//!
//! A briefing's items are marked delivered when it is composed, not when it
//! is sent. Sending is best effort: a notifier failure is reported and the
//! briefing simply stays unsent, to be retried by hand or discarded.

mod console;
mod render;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{BacklogProgress, Briefing};
use crate::error::{BriefError, Result};
use crate::store::Store;

pub use console::ConsoleNotifier;
pub use render::{BriefingEntry, format_length, relative_date, render_text, subject_line, tier_heading};

/// Outbound transport for a composed briefing.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &BriefingMessage) -> Result<()>;

    fn name(&self) -> &str;
}

/// Everything a notifier needs to render one briefing.
#[derive(Debug, Clone, PartialEq)]
pub struct BriefingMessage {
    pub briefing: Briefing,
    pub entries: Vec<BriefingEntry>,
    pub progress: Option<BacklogProgress>,
    /// Ordinal of this briefing among all stored briefings
    pub briefing_number: u64,
    pub total_delivered: u64,
}

impl BriefingMessage {
    /// Gather the briefing's items, in display order, with footer stats.
    pub fn load<S: Store + ?Sized>(store: &S, briefing: &Briefing) -> Result<Self> {
        let entries = briefing
            .item_ids
            .iter()
            .map(|id| {
                let processed = store.get_processed(id)?.ok_or_else(|| BriefError::ItemNotFound(id.clone()))?;
                let raw = store.get_raw(id)?.ok_or_else(|| BriefError::ItemNotFound(id.clone()))?;
                Ok(BriefingEntry { processed, raw })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            briefing: briefing.clone(),
            entries,
            progress: store.backlog_progress()?,
            briefing_number: store.briefing_count()?,
            total_delivered: store.delivered_count()?,
        })
    }

    pub fn subject(&self) -> String {
        subject_line(self)
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub date: NaiveDate,
    pub notifier: String,
    pub items: usize,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    /// Notifier error, when sending failed
    pub error: Option<String>,
}

/// Send the stored briefing for `date`. A notifier failure is not an error:
/// it is returned in the report and the briefing stays unsent.
pub async fn deliver<S: Store + ?Sized>(store: &mut S, notifier: &dyn Notifier, date: NaiveDate) -> Result<DeliveryReport> {
    let briefing = store
        .get_briefing(date)?
        .ok_or_else(|| BriefError::InvalidState(format!("no briefing for {}", date)))?;
    let message = BriefingMessage::load(store, &briefing)?;

    let mut report = DeliveryReport {
        date,
        notifier: notifier.name().to_string(),
        items: briefing.total_count(),
        sent: false,
        sent_at: None,
        error: None,
    };

    match notifier.send(&message).await {
        Ok(()) => {
            let at = Utc::now();
            store.mark_briefing_sent(date, at)?;
            report.sent = true;
            report.sent_at = Some(at);
            tracing::info!(date = %date, notifier = notifier.name(), items = report.items, "Briefing sent");
        }
        Err(e) => {
            tracing::warn!(date = %date, notifier = notifier.name(), error = %e, "Briefing not sent");
            report.error = Some(e.to_string());
        }
    }
    Ok(report)
}

/// Keeps sent messages in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<BriefingMessage>>,
    fail_with: Option<String>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(reason.into()),
        }
    }

    pub fn sent(&self) -> Vec<BriefingMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, message: &BriefingMessage) -> Result<()> {
        if let Some(reason) = &self.fail_with {
            return Err(BriefError::Notify(reason.clone()));
        }
        self.sent
            .lock()
            .map_err(|_| BriefError::Notify("notifier state poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
