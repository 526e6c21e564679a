use chrono::{Local, NaiveDate};
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;
use dailybrief::domain::{ItemStatus, Tier};
use dailybrief::notify::{self, BriefingMessage, ConsoleNotifier};
use dailybrief::pipeline::{BatchReport, Pipeline, ProcessOptions};
use dailybrief::scheduler::Scheduler;
use dailybrief::selection::{Composer, SelectionPool};
use dailybrief::store::{SqliteStore, Store};

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dailybrief")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("dailybrief.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open_at(&config.database.data_dir)
        .context(format!("Failed to open database in {}", config.database.data_dir.display()))
}

fn composer(config: &Config) -> Composer {
    Composer::new(
        config.composer_config(),
        SelectionPool::new(config.briefing.fresh_max_age_weeks),
        config.calibrator(),
    )
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Process {
            limit,
            dry_run,
            share,
            concurrency_a,
            concurrency_b,
        } => {
            let mut config = config.clone();
            if let Some(share) = share {
                config.scheduler.primary_share = *share;
            }
            if concurrency_a.is_some() {
                config.lanes.a.concurrency = *concurrency_a;
            }
            if concurrency_b.is_some() {
                config.lanes.b.concurrency = *concurrency_b;
            }
            handle_process_command(&config, *limit, *dry_run).await
        }
        Commands::Compose { date } => handle_compose_command(date.unwrap_or_else(today), config),
        Commands::Send { date, no_notify } => handle_send_command(date.unwrap_or_else(today), *no_notify, config).await,
        Commands::Discard { date } => handle_discard_command(*date, config),
        Commands::Stats => handle_stats_command(config),
    }
}

async fn handle_process_command(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    info!("Processing pending items (limit: {:?}, dry_run: {})", limit, dry_run);

    let lanes = config.build_lanes();
    for lane in lanes.lanes() {
        println!(
            "  Lane {}: {} (concurrency {})",
            lane.id.to_string().cyan(),
            lane.model_name(),
            lane.config.concurrency
        );
    }

    let scheduler = Scheduler::new(lanes, config.scheduler_config()).with_policy(config.retry_policy());
    let pipeline = Pipeline::new(scheduler, config.calibrator())
        .with_intake(config.intake())
        .with_extractor(config.signal_extractor());

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, finishing in-flight calls");
            eprintln!("{}", "Interrupted: finishing in-flight calls, nothing new will start".yellow());
            watcher.cancel();
        }
    });

    let store = open_store(config)?;
    let (_store, report) = pipeline
        .process_pending(store, ProcessOptions { limit, dry_run }, cancel)
        .await
        .context("Processing failed")?;

    print_batch_report(&report);
    Ok(())
}

fn print_batch_report(report: &BatchReport) {
    if report.dry_run {
        println!("{}", "Dry run: nothing was sent or written".yellow());
        println!("  Pending:        {}", report.pending);
        println!("  Processable:    {}", report.attempted);
        println!("  Primary lane:   {}", report.primary_planned);
        println!("  Secondary lane: {}", report.secondary_planned);
    } else {
        println!("{}", "Batch complete".green().bold());
        println!("  Attempted:      {}", report.attempted);
        println!("  Succeeded:      {}", report.succeeded.to_string().green());
        println!("  Failed:         {}", report.permanently_failed.to_string().red());
        println!("  Still pending:  {}", report.still_pending);
        println!("  Tier overrides: {}", report.overrides);
        for (lane, tally) in &report.per_lane {
            println!("  Lane {}: {} ok, {} failed", lane, tally.succeeded, tally.failed);
        }
        if report.flipped {
            if let Some(primary) = report.final_primary {
                println!("  {} primary moved to lane {}", "Failover:".yellow(), primary);
            }
        }
        if report.db_errors > 0 {
            println!("  {} {}", "Store errors:".red(), report.db_errors);
        }
    }
    for (status, count) in &report.skipped {
        println!("  Skipped ({}): {}", status.as_str(), count);
    }
}

fn handle_compose_command(date: NaiveDate, config: &Config) -> Result<()> {
    info!("Composing briefing for {}", date);
    let mut store = open_store(config)?;
    let composer = composer(config);

    let briefing = composer.compose(&mut store, date).context("Failed to compose briefing")?;
    if briefing.is_empty() {
        println!("No content available for {}.", date);
        return Ok(());
    }

    println!(
        "{} {} items ({} fresh, {} backlog)",
        format!("Briefing {}:", date).green().bold(),
        briefing.total_count(),
        briefing.fresh_count,
        briefing.backlog_count
    );
    let message = BriefingMessage::load(&store, &briefing)?;
    for entry in &message.entries {
        let tier = match entry.processed.tier {
            Tier::DeepDive => entry.processed.tier.as_str().magenta(),
            Tier::WorthALook => entry.processed.tier.as_str().cyan(),
            Tier::SummarySufficient => entry.processed.tier.as_str().normal(),
        };
        println!("  [{}] {} ({})", tier, entry.raw.title, entry.raw.source_name);
    }
    Ok(())
}

async fn handle_send_command(date: NaiveDate, no_notify: bool, config: &Config) -> Result<()> {
    info!("Sending briefing for {} (notify: {})", date, !no_notify);
    let mut store = open_store(config)?;
    let briefing = composer(config)
        .compose(&mut store, date)
        .context("Failed to compose briefing")?;

    if briefing.is_empty() {
        println!("No content available for {}.", date);
        return Ok(());
    }
    if briefing.sent {
        println!("Briefing for {} was already sent.", date);
        return Ok(());
    }
    if no_notify {
        println!(
            "Briefing saved. {} items marked as delivered; notifier skipped.",
            briefing.total_count()
        );
        return Ok(());
    }

    let report = notify::deliver(&mut store, &ConsoleNotifier, date).await?;
    if report.sent {
        println!("{} {} items via {}", "Sent:".green(), report.items, report.notifier);
    } else {
        println!(
            "{} {}",
            "Briefing NOT sent:".red(),
            report.error.unwrap_or_else(|| "unknown error".to_string())
        );
        println!("  Items stay marked delivered; use `discard` to release them.");
    }
    Ok(())
}

fn handle_discard_command(date: NaiveDate, config: &Config) -> Result<()> {
    info!("Discarding briefing for {}", date);
    let mut store = open_store(config)?;
    let briefing = composer(config)
        .discard(&mut store, date)
        .context(format!("Failed to discard briefing for {}", date))?;
    println!(
        "{} {} items returned to the pool",
        format!("Discarded {}:", date).yellow(),
        briefing.total_count()
    );
    Ok(())
}

fn handle_stats_command(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let counts = store.status_counts()?;

    println!("{}", "Items".bold());
    for status in [
        ItemStatus::Pending,
        ItemStatus::Processed,
        ItemStatus::Failed,
        ItemStatus::Skipped,
        ItemStatus::NoTranscript,
        ItemStatus::Paywall,
    ] {
        println!("  {:<14} {}", status.as_str(), counts.get(&status).copied().unwrap_or(0));
    }

    println!("{}", "Briefings".bold());
    println!("  {:<14} {}", "composed", store.briefing_count()?);
    println!("  {:<14} {}", "delivered", store.delivered_count()?);
    if let Some(progress) = store.backlog_progress()? {
        println!(
            "  {:<14} {}/{} ({}%)",
            "backlog",
            progress.delivered_items,
            progress.total_items,
            progress.percent_complete()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
