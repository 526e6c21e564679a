//! Plain-text rendering of a briefing.

use chrono::{DateTime, Utc};

use crate::domain::{ContentKind, ProcessedItem, RawItem, Tier};
use crate::notify::BriefingMessage;

/// Room left for the lead title in a subject line
pub const SUBJECT_TITLE_MAX: usize = 54;

/// One briefing line item: the processed record plus its source content.
#[derive(Debug, Clone, PartialEq)]
pub struct BriefingEntry {
    pub processed: ProcessedItem,
    pub raw: RawItem,
}

pub fn tier_heading(tier: Tier) -> &'static str {
    match tier {
        Tier::DeepDive => "DEEP DIVE",
        Tier::WorthALook => "WORTH A LOOK",
        Tier::SummarySufficient => "SUMMARY IS ENOUGH",
    }
}

/// "Feb 10: <lead title> (+N more)", cut at a word boundary.
pub fn subject_line(message: &BriefingMessage) -> String {
    let date = message.briefing.date.format("%b %d");
    let Some(lead) = message.entries.first() else {
        return format!("Daily Briefing {} | {} items", date, message.briefing.total_count());
    };

    let title = truncate_title(&lead.raw.title, SUBJECT_TITLE_MAX);
    let remaining = message.briefing.total_count().saturating_sub(1);
    if remaining > 0 {
        format!("{}: {} (+{} more)", date, title, remaining)
    } else {
        format!("{}: {}", date, title)
    }
}

fn truncate_title(title: &str, max: usize) -> String {
    if title.chars().count() <= max {
        return title.to_string();
    }
    let cut: String = title.chars().take(max).collect();
    let cut = match cut.rfind(' ') {
        Some(space) if space > 20 => &cut[..space],
        _ => cut.as_str(),
    };
    format!("{}...", cut.trim_end_matches(['.', ',', ';', ':', '!', '?', ' ']))
}

/// "42m", "1h 5m", or a word count when there is no duration.
pub fn format_length(word_count: u32, duration_seconds: Option<u32>) -> String {
    if let Some(secs) = duration_seconds.filter(|s| *s > 0) {
        if secs >= 3600 {
            return format!("{}h {}m", secs / 3600, (secs % 3600) / 60);
        }
        return format!("{}m", secs / 60);
    }
    if word_count < 1000 {
        format!("{} words", word_count)
    } else {
        format!("{}k words", word_count / 1000)
    }
}

pub fn relative_date(published: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - published).num_days();
    match days {
        i64::MIN..=0 => "today".to_string(),
        1 => "yesterday".to_string(),
        2..=6 => format!("{}d ago", days),
        7..=29 => format!("{}w ago", days / 7),
        30..=59 => "1mo ago".to_string(),
        _ => format!("{}mo ago", days / 30),
    }
}

fn action(raw: &RawItem) -> &'static str {
    match raw.kind {
        ContentKind::Video => "Watch",
        ContentKind::Article => "Read",
    }
}

/// Render the briefing body grouped by tier, in the stored display order.
pub fn render_text(message: &BriefingMessage, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&subject_line(message));
    out.push_str("\n\n");

    for tier in Tier::ALL {
        let entries: Vec<&BriefingEntry> = message.entries.iter().filter(|e| e.processed.tier == tier).collect();
        if entries.is_empty() {
            continue;
        }
        out.push_str(&format!("== {} ({}) ==\n", tier_heading(tier), entries.len()));
        for entry in entries {
            let raw = &entry.raw;
            let backlog = if entry.processed.is_backlog { " [from the archive]" } else { "" };
            out.push_str(&format!(
                "- {}{}\n  {} · {} · {}\n  {}\n",
                raw.title,
                backlog,
                raw.source_name,
                format_length(raw.word_count, raw.duration_seconds),
                relative_date(raw.published_at, now),
                entry.processed.core_summary,
            ));
            if tier != Tier::SummarySufficient {
                for insight in &entry.processed.key_insights {
                    out.push_str(&format!("    * {}\n", insight));
                }
            }
            if !entry.processed.so_what.is_empty() {
                out.push_str(&format!("  So what: {}\n", entry.processed.so_what));
            }
            out.push_str(&format!("  {}: {}\n\n", action(raw), raw.url));
        }
    }

    if let Some(progress) = &message.progress {
        out.push_str(&format!(
            "Backlog: {}/{} delivered ({}%)\n",
            progress.delivered_items,
            progress.total_items,
            progress.percent_complete()
        ));
    }
    out.push_str(&format!(
        "Briefing #{} · {} items delivered so far\n",
        message.briefing_number, message.total_delivered
    ));
    out
}
