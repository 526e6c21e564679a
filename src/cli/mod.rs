//! CLI module for dailybrief - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for processing pending
//! items and composing, sending and discarding briefings.

pub mod commands;

pub use commands::Cli;
