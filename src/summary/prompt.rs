//! Summarization request and prompt rendering.
//!
//! The prompt wording itself is not what this crate is about; what matters is
//! the contract: the model gets the content plus a budget, and the rendered
//! prompt never exceeds the lane's input-token budget.

use crate::domain::{ContentKind, RawItem};

/// Version stamp recorded on every processed item.
pub const PROMPT_VERSION: &str = "v5.0";

/// Marker appended to truncated content.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated due to length]";

/// What a provider lane is allowed to spend on one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetHint {
    pub max_input_tokens: usize,
    pub max_output_tokens: u32,
}

impl Default for BudgetHint {
    fn default() -> Self {
        Self {
            max_input_tokens: 120_000,
            max_output_tokens: 4096,
        }
    }
}

/// The content handed to a summarization model.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub content_id: String,
    pub source_id: String,
    pub source_name: String,
    pub title: String,
    pub kind: ContentKind,
    pub word_count: u32,
    pub duration_seconds: Option<u32>,
    pub body: String,
}

impl SummaryRequest {
    pub fn from_item(item: &RawItem) -> Self {
        Self {
            content_id: item.id.clone(),
            source_id: item.source_id.clone(),
            source_name: item.source_name.clone(),
            title: item.title.clone(),
            kind: item.kind,
            word_count: item.word_count,
            duration_seconds: item.duration_seconds,
            body: item.transcript.clone().unwrap_or_default(),
        }
    }

    /// Render the full prompt, truncating the body to fit `budget`.
    pub fn render(&self, budget: &BudgetHint) -> String {
        let frame = self.render_with_body("");
        let frame_tokens = estimate_tokens(&frame);
        let body_budget = budget.max_input_tokens.saturating_sub(frame_tokens);

        if estimate_tokens(&self.body) <= body_budget {
            return self.render_with_body(&self.body);
        }
        let truncated = truncate_for_context(&self.body, body_budget);
        self.render_with_body(&truncated)
    }

    fn render_with_body(&self, body: &str) -> String {
        let length = match (self.kind, self.duration_seconds) {
            (ContentKind::Video, Some(secs)) => format!("{} minutes", secs / 60),
            _ => format!("{} words", self.word_count),
        };
        let body = if body.is_empty() { "[No content available]" } else { body };

        format!(
            "You are a sharp tech/business analyst. Summarize the {kind} below for a busy reader.\n\
             Respond with JSON only, using exactly these keys:\n\
             core_summary (3-5 sentences), key_insights (list), concepts_explained (list of {{term, explanation}}),\n\
             so_what, topic_tags (up to 3), content_type (market_call|news_analysis|industry_trend|framework|tutorial|interview|commentary),\n\
             freshness (fresh|evergreen|stale), tier (deep_dive|worth_a_look|summary_sufficient), tier_rationale.\n\n\
             Title: {title}\nSource: {source}\nLength: {length}\n\n---\n{body}\n---\n",
            kind = self.kind.as_str(),
            title = self.title,
            source = self.source_name,
            length = length,
            body = body,
        )
    }
}

/// Roughly four characters per token for English text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Cut `text` to about `max_tokens`, preferring a sentence boundary in the
/// last fifth of the allowance.
pub fn truncate_for_context(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = &text[..end];
    if let Some(last_period) = truncated.rfind(". ") {
        if last_period as f64 > max_chars as f64 * 0.8 {
            truncated = &truncated[..last_period + 1];
        }
    }
    format!("{}{}", truncated, TRUNCATION_MARKER)
}
