//! Storage layer for dailybrief.
//!
//! The core talks to storage only through the [`Store`] trait; the one
//! implementation keeps everything in a single SQLite database.
//!
//! # Example
//!
//! ```ignore
//! use dailybrief::store::{ItemFilter, SqliteStore, Store};
//!
//! let mut store = SqliteStore::open_at(Path::new("/var/lib/dailybrief"))?;
//! let pending = store.pending_items(Some(50))?;
//! let backlog = store.fetch_undelivered(&ItemFilter::backlog_pool(5))?;
//! ```

mod sqlite;
mod traits;

pub use sqlite::{DB_FILE_NAME, SqliteStore};
pub use traits::{ItemFilter, Store};
