use std::io::Write;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{BriefError, Result};
use crate::notify::{BriefingMessage, Notifier, render_text};

/// Prints the rendered briefing to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, message: &BriefingMessage) -> Result<()> {
        let text = render_text(message, Utc::now());
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(text.as_bytes())
            .and_then(|_| stdout.flush())
            .map_err(|e| BriefError::Notify(e.to_string()))
    }

    fn name(&self) -> &str {
        "console"
    }
}
