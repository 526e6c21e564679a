//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - process: summarize pending items across the provider lanes
//! - compose: build the briefing for a date
//! - send: compose if needed, then hand the briefing to the notifier
//! - discard: throw a briefing away and release its items
//! - stats: item and briefing counts

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dailybrief - triage summarized content into a daily briefing
#[derive(Parser, Debug)]
#[command(name = "dailybrief")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize pending items
    Process {
        /// Maximum items to take from the pending queue
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Screen and plan only; no model calls, no writes
        #[arg(long)]
        dry_run: bool,

        /// Fraction of the batch for the primary lane (0.0-1.0)
        #[arg(long)]
        share: Option<f64>,

        /// Concurrency override for lane A
        #[arg(long)]
        concurrency_a: Option<usize>,

        /// Concurrency override for lane B
        #[arg(long)]
        concurrency_b: Option<usize>,
    },

    /// Compose the briefing for a date
    Compose {
        /// Briefing date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Compose if needed, then send the briefing
    Send {
        /// Briefing date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Compose and mark delivered without notifying
        #[arg(long)]
        no_notify: bool,
    },

    /// Discard a briefing and return its items to the pool
    Discard {
        /// Briefing date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
    },

    /// Show item and briefing statistics
    Stats,
}
