//! SQLite-backed store.
//!
//! Timestamps are stored as RFC 3339 UTC text with second precision so they
//! compare correctly as strings. List-valued fields of a processed item are
//! stored as JSON text.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::domain::{
    BacklogProgress, Briefing, ContentKind, ContentType, Freshness, ItemStatus, ProcessedItem, RawItem, Tier,
};
use crate::error::{BriefError, Result};
use crate::store::traits::{ItemFilter, Store};

/// Database file name inside the data directory
pub const DB_FILE_NAME: &str = "dailybrief.db";

const PROCESSED_SELECT: &str = r#"
    SELECT p.content_id, p.core_summary, p.key_insights, p.concepts, p.so_what, p.topic_tags,
           p.content_type, p.freshness, p.tier, p.tier_rationale, p.processed_at, p.prompt_version,
           p.model_used, p.is_backlog, p.delivered, p.delivered_at,
           r.source_id, r.word_count, r.published_at
    FROM processed_items p
    JOIN raw_items r ON r.id = p.content_id
"#;

const TIER_ORDER: &str = "CASE p.tier WHEN 'deep_dive' THEN 1 WHEN 'worth_a_look' THEN 2 ELSE 3 END";

/// SQLite implementation of [`Store`].
pub struct SqliteStore {
    path: Option<PathBuf>,
    db: Connection,
}

impl SqliteStore {
    /// Open or create the database in `data_dir`.
    pub fn open_at(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(DB_FILE_NAME);
        Self::open_file(&path)
    }

    /// Open or create the database at an explicit file path.
    pub fn open_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        tracing::debug!(path = %path.display(), "Opened store");
        Ok(Self {
            path: Some(path.to_path_buf()),
            db,
        })
    }

    /// Throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { path: None, db })
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS raw_items (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                published_at TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                duration_seconds INTEGER,
                transcript TEXT,
                word_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending'
            );

            CREATE TABLE IF NOT EXISTS processed_items (
                content_id TEXT PRIMARY KEY REFERENCES raw_items(id),
                core_summary TEXT NOT NULL,
                key_insights TEXT NOT NULL,
                concepts TEXT NOT NULL,
                so_what TEXT NOT NULL,
                topic_tags TEXT NOT NULL,
                content_type TEXT NOT NULL,
                freshness TEXT NOT NULL,
                tier TEXT NOT NULL,
                tier_rationale TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                prompt_version TEXT NOT NULL,
                model_used TEXT NOT NULL,
                is_backlog INTEGER NOT NULL DEFAULT 0,
                delivered INTEGER NOT NULL DEFAULT 0,
                delivered_at TEXT
            );

            CREATE TABLE IF NOT EXISTS briefings (
                date TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                item_ids TEXT NOT NULL,
                fresh_count INTEGER NOT NULL,
                backlog_count INTEGER NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0,
                sent_at TEXT
            );

            CREATE TABLE IF NOT EXISTS backlog_progress (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                total_items INTEGER NOT NULL,
                delivered_items INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_raw_status ON raw_items(status);
            CREATE INDEX IF NOT EXISTS idx_raw_source ON raw_items(source_id);
            CREATE INDEX IF NOT EXISTS idx_raw_published ON raw_items(published_at);
            CREATE INDEX IF NOT EXISTS idx_processed_delivered ON processed_items(delivered);
            CREATE INDEX IF NOT EXISTS idx_processed_tier ON processed_items(tier);
            "#,
        )?;
        Ok(())
    }

    /// Re-read a briefing just written, so callers see stored precision.
    fn stored_briefing(&self, date: NaiveDate) -> Result<Briefing> {
        self.get_briefing(date)?
            .ok_or_else(|| BriefError::Storage(format!("briefing for {} vanished after insert", date)))
    }

    fn processed_where(&self, clause: &str, params: Vec<SqlValue>) -> Result<Vec<ProcessedItem>> {
        let sql = format!("{} {}", PROCESSED_SELECT, clause);
        let mut stmt = self.db.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), ProcessedRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.into_item()?);
        }
        Ok(items)
    }
}

impl Store for SqliteStore {
    fn save_raw(&mut self, item: &RawItem) -> Result<bool> {
        let inserted = self.db.execute(
            r#"
            INSERT OR IGNORE INTO raw_items
            (id, source_id, source_name, kind, title, url, published_at, fetched_at,
             duration_seconds, transcript, word_count, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                item.id,
                item.source_id,
                item.source_name,
                item.kind.as_str(),
                item.title,
                item.url,
                ts(&item.published_at),
                ts(&item.fetched_at),
                item.duration_seconds,
                item.transcript,
                item.word_count,
                item.status.as_str(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_raw(&self, id: &str) -> Result<Option<RawItem>> {
        let row = self
            .db
            .query_row(&format!("{} WHERE id = ?1", RAW_SELECT), [id], RawRow::from_row)
            .optional()?;
        row.map(RawRow::into_item).transpose()
    }

    fn pending_items(&self, limit: Option<usize>) -> Result<Vec<RawItem>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.db.prepare(&format!(
            "{} WHERE status = 'pending' ORDER BY published_at DESC, id LIMIT ?1",
            RAW_SELECT
        ))?;
        let rows = stmt.query_map([limit], RawRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.into_item()?);
        }
        Ok(items)
    }

    fn set_item_status(&mut self, id: &str, status: ItemStatus) -> Result<()> {
        let updated = self
            .db
            .execute("UPDATE raw_items SET status = ?1 WHERE id = ?2", params![status.as_str(), id])?;
        if updated == 0 {
            return Err(BriefError::ItemNotFound(id.to_string()));
        }
        Ok(())
    }

    fn save_processed(&mut self, item: &ProcessedItem) -> Result<()> {
        let key_insights = serde_json::to_string(&item.key_insights)?;
        let concepts = serde_json::to_string(&item.concepts)?;
        let topic_tags = serde_json::to_string(&item.topic_tags)?;

        let tx = self.db.transaction()?;
        tx.execute(
            r#"
            INSERT INTO processed_items
            (content_id, core_summary, key_insights, concepts, so_what, topic_tags, content_type,
             freshness, tier, tier_rationale, processed_at, prompt_version, model_used,
             is_backlog, delivered, delivered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(content_id) DO UPDATE SET
                core_summary = excluded.core_summary,
                key_insights = excluded.key_insights,
                concepts = excluded.concepts,
                so_what = excluded.so_what,
                topic_tags = excluded.topic_tags,
                content_type = excluded.content_type,
                freshness = excluded.freshness,
                tier = excluded.tier,
                tier_rationale = excluded.tier_rationale,
                processed_at = excluded.processed_at,
                prompt_version = excluded.prompt_version,
                model_used = excluded.model_used
            "#,
            params![
                item.content_id,
                item.core_summary,
                key_insights,
                concepts,
                item.so_what,
                topic_tags,
                item.content_type.as_str(),
                item.freshness.as_str(),
                item.tier.as_str(),
                item.tier_rationale,
                ts(&item.processed_at),
                item.prompt_version,
                item.model_used,
                item.is_backlog,
                item.delivered,
                item.delivered_at.as_ref().map(ts),
            ],
        )?;
        let updated = tx.execute(
            "UPDATE raw_items SET status = 'processed' WHERE id = ?1",
            [&item.content_id],
        )?;
        if updated == 0 {
            return Err(BriefError::ItemNotFound(item.content_id.clone()));
        }
        tx.commit()?;
        Ok(())
    }

    fn get_processed(&self, id: &str) -> Result<Option<ProcessedItem>> {
        let mut items = self.processed_where("WHERE p.content_id = ?1", vec![SqlValue::Text(id.to_string())])?;
        Ok(items.pop())
    }

    fn status_counts(&self) -> Result<BTreeMap<ItemStatus, u64>> {
        let mut stmt = self.db.prepare("SELECT status, COUNT(*) FROM raw_items GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, count) = row?;
            let status = ItemStatus::parse(&status)
                .ok_or_else(|| BriefError::Storage(format!("unknown item status: {}", status)))?;
            counts.insert(status, count as u64);
        }
        Ok(counts)
    }

    fn fetch_undelivered(&self, filter: &ItemFilter) -> Result<Vec<ProcessedItem>> {
        let mut clauses = vec!["p.delivered = 0".to_string()];
        let mut params = Vec::new();

        if !filter.freshness_in.is_empty() {
            let marks: Vec<String> = filter
                .freshness_in
                .iter()
                .map(|f| {
                    params.push(SqlValue::Text(f.as_str().to_string()));
                    format!("?{}", params.len())
                })
                .collect();
            clauses.push(format!("p.freshness IN ({})", marks.join(", ")));
        }
        if let Some(after) = filter.published_after {
            params.push(SqlValue::Text(ts(&after)));
            clauses.push(format!("r.published_at >= ?{}", params.len()));
        }
        if let Some(backlog) = filter.backlog {
            params.push(SqlValue::Integer(backlog as i64));
            clauses.push(format!("p.is_backlog = ?{}", params.len()));
        }

        let mut clause = format!(
            "WHERE {} ORDER BY {}, r.published_at DESC, p.content_id",
            clauses.join(" AND "),
            TIER_ORDER
        );
        if let Some(limit) = filter.limit {
            params.push(SqlValue::Integer(limit as i64));
            clause.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        self.processed_where(&clause, params)
    }

    fn persist_tier_override(&mut self, id: &str, tier: Tier, rationale: &str) -> Result<()> {
        let updated = self.db.execute(
            "UPDATE processed_items SET tier = ?1, tier_rationale = ?2 WHERE content_id = ?3",
            params![tier.as_str(), rationale, id],
        )?;
        if updated == 0 {
            return Err(BriefError::ItemNotFound(id.to_string()));
        }
        Ok(())
    }

    fn mark_delivered(&mut self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        let tx = self.db.transaction()?;
        mark_delivered_in(&tx, ids, at)?;
        tx.commit()?;
        Ok(())
    }

    fn create_briefing(&mut self, briefing: &Briefing) -> Result<Briefing> {
        if let Some(existing) = self.get_briefing(briefing.date)? {
            return Ok(existing);
        }
        insert_briefing(&self.db, briefing)?;
        self.stored_briefing(briefing.date)
    }

    fn briefing_exists(&self, date: NaiveDate) -> Result<bool> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM briefings WHERE date = ?1", [day(date)], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn get_briefing(&self, date: NaiveDate) -> Result<Option<Briefing>> {
        let row = self
            .db
            .query_row(
                "SELECT date, id, created_at, item_ids, fresh_count, backlog_count, sent, sent_at \
                 FROM briefings WHERE date = ?1",
                [day(date)],
                BriefingRow::from_row,
            )
            .optional()?;
        row.map(BriefingRow::into_briefing).transpose()
    }

    fn commit_briefing(&mut self, briefing: &Briefing) -> Result<Briefing> {
        if let Some(existing) = self.get_briefing(briefing.date)? {
            return Ok(existing);
        }

        let tx = self.db.transaction()?;
        insert_briefing(&tx, briefing)?;
        mark_delivered_in(&tx, &briefing.item_ids, briefing.created_at)?;
        if briefing.backlog_count > 0 {
            tx.execute(
                "UPDATE backlog_progress SET delivered_items = delivered_items + ?1, last_updated = ?2 WHERE id = 1",
                params![briefing.backlog_count as i64, ts(&briefing.created_at)],
            )?;
        }
        tx.commit()?;

        tracing::info!(
            date = %briefing.date,
            items = briefing.item_ids.len(),
            backlog = briefing.backlog_count,
            "Committed briefing"
        );
        self.stored_briefing(briefing.date)
    }

    fn delete_briefing(&mut self, date: NaiveDate) -> Result<Option<Briefing>> {
        let Some(briefing) = self.get_briefing(date)? else {
            return Ok(None);
        };

        let tx = self.db.transaction()?;
        for id in &briefing.item_ids {
            tx.execute(
                "UPDATE processed_items SET delivered = 0, delivered_at = NULL WHERE content_id = ?1",
                [id],
            )?;
        }
        if briefing.backlog_count > 0 {
            tx.execute(
                "UPDATE backlog_progress SET delivered_items = MAX(delivered_items - ?1, 0), last_updated = ?2 \
                 WHERE id = 1",
                params![briefing.backlog_count as i64, ts(&Utc::now())],
            )?;
        }
        tx.execute("DELETE FROM briefings WHERE date = ?1", [day(date)])?;
        tx.commit()?;

        tracing::info!(date = %date, items = briefing.item_ids.len(), "Discarded briefing");
        Ok(Some(briefing))
    }

    fn mark_briefing_sent(&mut self, date: NaiveDate, at: DateTime<Utc>) -> Result<()> {
        let updated = self.db.execute(
            "UPDATE briefings SET sent = 1, sent_at = ?1 WHERE date = ?2",
            params![ts(&at), day(date)],
        )?;
        if updated == 0 {
            return Err(BriefError::InvalidState(format!("no briefing for {}", date)));
        }
        Ok(())
    }

    fn briefing_count(&self) -> Result<u64> {
        let count: i64 = self.db.query_row("SELECT COUNT(*) FROM briefings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn delivered_count(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM processed_items WHERE delivered = 1", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn init_backlog_progress(&mut self, total_items: u64) -> Result<()> {
        self.db.execute(
            "INSERT OR IGNORE INTO backlog_progress (id, total_items, delivered_items, last_updated) \
             VALUES (1, ?1, 0, ?2)",
            params![total_items as i64, ts(&Utc::now())],
        )?;
        Ok(())
    }

    fn backlog_progress(&self) -> Result<Option<BacklogProgress>> {
        let row = self
            .db
            .query_row(
                "SELECT total_items, delivered_items, last_updated FROM backlog_progress WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?;

        row.map(|(total, delivered, updated)| {
            Ok(BacklogProgress {
                total_items: total as u64,
                delivered_items: delivered as u64,
                last_updated: parse_ts(&updated)?,
            })
        })
        .transpose()
    }

    fn backlog_total(&self) -> Result<u64> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM processed_items WHERE is_backlog = 1", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn mark_delivered_in(db: &Connection, ids: &[String], at: DateTime<Utc>) -> Result<()> {
    let at = ts(&at);
    for id in ids {
        let updated = db.execute(
            "UPDATE processed_items SET delivered = 1, delivered_at = ?1 WHERE content_id = ?2",
            params![at, id],
        )?;
        if updated == 0 {
            return Err(BriefError::ItemNotFound(id.clone()));
        }
    }
    Ok(())
}

fn insert_briefing(db: &Connection, briefing: &Briefing) -> Result<()> {
    db.execute(
        r#"
        INSERT INTO briefings (date, id, created_at, item_ids, fresh_count, backlog_count, sent, sent_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            day(briefing.date),
            briefing.id,
            ts(&briefing.created_at),
            serde_json::to_string(&briefing.item_ids)?,
            briefing.fresh_count as i64,
            briefing.backlog_count as i64,
            briefing.sent,
            briefing.sent_at.as_ref().map(ts),
        ],
    )?;
    Ok(())
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| BriefError::Storage(format!("bad timestamp {:?}: {}", s, e)))
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| BriefError::Storage(format!("bad date {:?}: {}", s, e)))
}

fn bad_value(column: &str, value: &str) -> BriefError {
    BriefError::Storage(format!("unknown {} value: {}", column, value))
}

const RAW_SELECT: &str = "SELECT id, source_id, source_name, kind, title, url, published_at, fetched_at, \
                          duration_seconds, transcript, word_count, status FROM raw_items";

/// Column values of a raw item before domain conversion.
struct RawRow {
    id: String,
    source_id: String,
    source_name: String,
    kind: String,
    title: String,
    url: String,
    published_at: String,
    fetched_at: String,
    duration_seconds: Option<i64>,
    transcript: Option<String>,
    word_count: i64,
    status: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_id: row.get(1)?,
            source_name: row.get(2)?,
            kind: row.get(3)?,
            title: row.get(4)?,
            url: row.get(5)?,
            published_at: row.get(6)?,
            fetched_at: row.get(7)?,
            duration_seconds: row.get(8)?,
            transcript: row.get(9)?,
            word_count: row.get(10)?,
            status: row.get(11)?,
        })
    }

    fn into_item(self) -> Result<RawItem> {
        Ok(RawItem {
            kind: ContentKind::parse(&self.kind).ok_or_else(|| bad_value("kind", &self.kind))?,
            status: ItemStatus::parse(&self.status).ok_or_else(|| bad_value("status", &self.status))?,
            published_at: parse_ts(&self.published_at)?,
            fetched_at: parse_ts(&self.fetched_at)?,
            duration_seconds: self.duration_seconds.map(|d| d as u32),
            word_count: self.word_count as u32,
            id: self.id,
            source_id: self.source_id,
            source_name: self.source_name,
            title: self.title,
            url: self.url,
            transcript: self.transcript,
        })
    }
}

/// Column values of a processed item joined with its raw item.
struct ProcessedRow {
    content_id: String,
    core_summary: String,
    key_insights: String,
    concepts: String,
    so_what: String,
    topic_tags: String,
    content_type: String,
    freshness: String,
    tier: String,
    tier_rationale: String,
    processed_at: String,
    prompt_version: String,
    model_used: String,
    is_backlog: bool,
    delivered: bool,
    delivered_at: Option<String>,
    source_id: String,
    word_count: i64,
    published_at: String,
}

impl ProcessedRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            content_id: row.get(0)?,
            core_summary: row.get(1)?,
            key_insights: row.get(2)?,
            concepts: row.get(3)?,
            so_what: row.get(4)?,
            topic_tags: row.get(5)?,
            content_type: row.get(6)?,
            freshness: row.get(7)?,
            tier: row.get(8)?,
            tier_rationale: row.get(9)?,
            processed_at: row.get(10)?,
            prompt_version: row.get(11)?,
            model_used: row.get(12)?,
            is_backlog: row.get(13)?,
            delivered: row.get(14)?,
            delivered_at: row.get(15)?,
            source_id: row.get(16)?,
            word_count: row.get(17)?,
            published_at: row.get(18)?,
        })
    }

    fn into_item(self) -> Result<ProcessedItem> {
        Ok(ProcessedItem {
            key_insights: serde_json::from_str(&self.key_insights)?,
            concepts: serde_json::from_str(&self.concepts)?,
            topic_tags: serde_json::from_str(&self.topic_tags)?,
            content_type: ContentType::parse(&self.content_type)
                .ok_or_else(|| bad_value("content_type", &self.content_type))?,
            freshness: Freshness::parse(&self.freshness).ok_or_else(|| bad_value("freshness", &self.freshness))?,
            tier: Tier::parse(&self.tier).ok_or_else(|| bad_value("tier", &self.tier))?,
            processed_at: parse_ts(&self.processed_at)?,
            delivered_at: self.delivered_at.as_deref().map(parse_ts).transpose()?,
            published_at: parse_ts(&self.published_at)?,
            word_count: self.word_count as u32,
            content_id: self.content_id,
            core_summary: self.core_summary,
            so_what: self.so_what,
            tier_rationale: self.tier_rationale,
            prompt_version: self.prompt_version,
            model_used: self.model_used,
            is_backlog: self.is_backlog,
            delivered: self.delivered,
            source_id: self.source_id,
        })
    }
}

/// Column values of a briefing.
struct BriefingRow {
    date: String,
    id: String,
    created_at: String,
    item_ids: String,
    fresh_count: i64,
    backlog_count: i64,
    sent: bool,
    sent_at: Option<String>,
}

impl BriefingRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            date: row.get(0)?,
            id: row.get(1)?,
            created_at: row.get(2)?,
            item_ids: row.get(3)?,
            fresh_count: row.get(4)?,
            backlog_count: row.get(5)?,
            sent: row.get(6)?,
            sent_at: row.get(7)?,
        })
    }

    fn into_briefing(self) -> Result<Briefing> {
        Ok(Briefing {
            date: parse_day(&self.date)?,
            created_at: parse_ts(&self.created_at)?,
            item_ids: serde_json::from_str(&self.item_ids)?,
            fresh_count: self.fresh_count as usize,
            backlog_count: self.backlog_count as usize,
            sent_at: self.sent_at.as_deref().map(parse_ts).transpose()?,
            id: self.id,
            sent: self.sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Concept;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn raw(source: &str, n: u32, age_days: i64) -> RawItem {
        RawItem::new(
            source,
            source,
            ContentKind::Article,
            format!("{} #{}", source, n),
            format!("https://example.com/{}/{}", source, n),
            now() - Duration::days(age_days),
            Some("body text".to_string()),
        )
        .with_word_count(5000)
    }

    fn processed(item: &RawItem, tier: Tier, freshness: Freshness, is_backlog: bool) -> ProcessedItem {
        ProcessedItem {
            content_id: item.id.clone(),
            core_summary: "Summary".to_string(),
            key_insights: vec!["one".to_string(), "two".to_string()],
            concepts: vec![Concept {
                term: "Moat".to_string(),
                explanation: "Durable advantage".to_string(),
            }],
            so_what: "Matters".to_string(),
            topic_tags: vec!["ai".to_string()],
            content_type: ContentType::Commentary,
            freshness,
            tier,
            tier_rationale: "because".to_string(),
            processed_at: now(),
            prompt_version: "v5.0".to_string(),
            model_used: "scripted".to_string(),
            is_backlog,
            delivered: false,
            delivered_at: None,
            source_id: item.source_id.clone(),
            word_count: item.word_count,
            published_at: item.published_at,
        }
    }

    fn seed(store: &mut SqliteStore, item: &RawItem, tier: Tier, freshness: Freshness, backlog: bool) {
        store.save_raw(item).unwrap();
        store.save_processed(&processed(item, tier, freshness, backlog)).unwrap();
    }

    #[test]
    fn test_open_at_creates_database() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::open_at(&temp.path().join("data")).unwrap();
        assert!(temp.path().join("data").join(DB_FILE_NAME).exists());
        assert!(store.path().is_some());
    }

    #[test]
    fn test_save_raw_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = raw("stratechery", 1, 1);
        assert!(store.save_raw(&item).unwrap());
        assert!(!store.save_raw(&item).unwrap());

        let loaded = store.get_raw(&item.id).unwrap().unwrap();
        assert_eq!(loaded.title, item.title);
        assert_eq!(loaded.published_at, item.published_at);
        assert_eq!(loaded.status, ItemStatus::Pending);
    }

    #[test]
    fn test_pending_items_and_status() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = raw("a", 1, 1);
        let b = raw("b", 1, 3);
        store.save_raw(&a).unwrap();
        store.save_raw(&b).unwrap();
        store.set_item_status(&b.id, ItemStatus::Paywall).unwrap();

        let pending = store.pending_items(None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        let counts = store.status_counts().unwrap();
        assert_eq!(counts.get(&ItemStatus::Pending), Some(&1));
        assert_eq!(counts.get(&ItemStatus::Paywall), Some(&1));
        assert!(matches!(
            store.set_item_status("missing", ItemStatus::Failed),
            Err(BriefError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_save_processed_round_trip_and_marks_raw() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = raw("a", 1, 1);
        seed(&mut store, &item, Tier::WorthALook, Freshness::Fresh, false);

        let loaded = store.get_processed(&item.id).unwrap().unwrap();
        assert_eq!(loaded, processed(&item, Tier::WorthALook, Freshness::Fresh, false));
        assert_eq!(store.get_raw(&item.id).unwrap().unwrap().status, ItemStatus::Processed);
    }

    #[test]
    fn test_save_processed_keeps_backlog_flag() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = raw("a", 1, 30);
        seed(&mut store, &item, Tier::WorthALook, Freshness::Evergreen, true);

        let mut again = processed(&item, Tier::DeepDive, Freshness::Evergreen, false);
        again.core_summary = "Revised".to_string();
        store.save_processed(&again).unwrap();

        let loaded = store.get_processed(&item.id).unwrap().unwrap();
        assert!(loaded.is_backlog);
        assert_eq!(loaded.core_summary, "Revised");
    }

    #[test]
    fn test_fetch_undelivered_filters_and_orders() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let newer_worth = raw("a", 1, 1);
        let older_worth = raw("a", 2, 5);
        let deep = raw("b", 1, 7);
        let stale = raw("c", 1, 1);
        let backlog = raw("d", 1, 60);
        let too_old = raw("e", 1, 80);
        seed(&mut store, &newer_worth, Tier::WorthALook, Freshness::Fresh, false);
        seed(&mut store, &older_worth, Tier::WorthALook, Freshness::Evergreen, false);
        seed(&mut store, &deep, Tier::DeepDive, Freshness::Fresh, false);
        seed(&mut store, &stale, Tier::DeepDive, Freshness::Stale, false);
        seed(&mut store, &backlog, Tier::DeepDive, Freshness::Evergreen, true);
        seed(&mut store, &too_old, Tier::DeepDive, Freshness::Fresh, false);

        let fresh = store
            .fetch_undelivered(&ItemFilter::fresh_pool(now() - Duration::weeks(6)))
            .unwrap();
        let ids: Vec<&str> = fresh.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![deep.id.as_str(), newer_worth.id.as_str(), older_worth.id.as_str()]);

        let backlog_pool = store.fetch_undelivered(&ItemFilter::backlog_pool(10)).unwrap();
        assert_eq!(backlog_pool.len(), 1);
        assert_eq!(backlog_pool[0].id(), backlog.id);
    }

    #[test]
    fn test_persist_tier_override() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = raw("a", 1, 1);
        seed(&mut store, &item, Tier::DeepDive, Freshness::Fresh, false);

        store
            .persist_tier_override(&item.id, Tier::WorthALook, "because [calibrated:x]")
            .unwrap();
        let loaded = store.get_processed(&item.id).unwrap().unwrap();
        assert_eq!(loaded.tier, Tier::WorthALook);
        assert_eq!(loaded.tier_rationale, "because [calibrated:x]");
        assert!(store.persist_tier_override("missing", Tier::DeepDive, "").is_err());
    }

    #[test]
    fn test_commit_briefing_marks_delivered_and_progress() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let fresh = raw("a", 1, 1);
        let backlog = raw("b", 1, 40);
        seed(&mut store, &fresh, Tier::WorthALook, Freshness::Fresh, false);
        seed(&mut store, &backlog, Tier::WorthALook, Freshness::Evergreen, true);
        store.init_backlog_progress(store.backlog_total().unwrap()).unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let briefing = Briefing::new(date, vec![fresh.id.clone(), backlog.id.clone()], 1, 1);
        let committed = store.commit_briefing(&briefing).unwrap();
        assert_eq!(committed.id, briefing.id);

        assert!(store.briefing_exists(date).unwrap());
        assert_eq!(store.delivered_count().unwrap(), 2);
        assert!(store.get_processed(&fresh.id).unwrap().unwrap().delivered);
        let progress = store.backlog_progress().unwrap().unwrap();
        assert_eq!(progress.total_items, 1);
        assert_eq!(progress.delivered_items, 1);

        let again = store.commit_briefing(&Briefing::new(date, vec![], 0, 0)).unwrap();
        assert_eq!(again.item_ids, briefing.item_ids);
        assert_eq!(store.briefing_count().unwrap(), 1);
    }

    #[test]
    fn test_commit_briefing_rolls_back_on_unknown_item() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = raw("a", 1, 1);
        seed(&mut store, &item, Tier::WorthALook, Freshness::Fresh, false);

        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let briefing = Briefing::new(date, vec![item.id.clone(), "missing".to_string()], 2, 0);
        assert!(store.commit_briefing(&briefing).is_err());
        assert!(!store.briefing_exists(date).unwrap());
        assert!(!store.get_processed(&item.id).unwrap().unwrap().delivered);
    }

    #[test]
    fn test_delete_briefing_reverts_delivery() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let item = raw("a", 1, 40);
        seed(&mut store, &item, Tier::WorthALook, Freshness::Evergreen, true);
        store.init_backlog_progress(1).unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        store.commit_briefing(&Briefing::new(date, vec![item.id.clone()], 0, 1)).unwrap();
        let removed = store.delete_briefing(date).unwrap().unwrap();
        assert_eq!(removed.item_ids, vec![item.id.clone()]);

        assert!(!store.briefing_exists(date).unwrap());
        assert!(!store.get_processed(&item.id).unwrap().unwrap().delivered);
        assert_eq!(store.backlog_progress().unwrap().unwrap().delivered_items, 0);
        assert!(store.delete_briefing(date).unwrap().is_none());
    }

    #[test]
    fn test_mark_briefing_sent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        assert!(store.mark_briefing_sent(date, now()).is_err());

        store.create_briefing(&Briefing::new(date, vec![], 0, 0)).unwrap();
        store.mark_briefing_sent(date, now()).unwrap();
        let loaded = store.get_briefing(date).unwrap().unwrap();
        assert!(loaded.sent);
        assert_eq!(loaded.sent_at, Some(now()));
    }

    #[test]
    fn test_init_backlog_progress_only_once() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.backlog_progress().unwrap().is_none());
        store.init_backlog_progress(300).unwrap();
        store.init_backlog_progress(5).unwrap();
        assert_eq!(store.backlog_progress().unwrap().unwrap().total_items, 300);
    }
}
