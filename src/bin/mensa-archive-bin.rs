use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use log::log_enabled;
use tokio::sync::{mpsc, Mutex};
use tokio_cron_scheduler::JobScheduler;

use mensa_archive_rs::archive::Archive;
use mensa_archive_rs::config::Config;
use mensa_archive_rs::constants::DEFAULT_CONFIG;
use mensa_archive_rs::notifications::{LogMailer, NotificationMatcher};
use mensa_archive_rs::shared_main::logger_init;
use mensa_archive_rs::task_scheduler_funcs::{build_client, run_cycle, start_scheduled_runs};

/// Scrapes canteen menus into a local archive and notifies users about dishes they wait for.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML file listing the canteens and thresholds
    #[arg(short, long, env = "MENSA_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// SQLite database, overrides the config file
    #[arg(short, long, env = "MENSA_DB")]
    database: Option<PathBuf>,
    /// Run on this cron schedule instead of once{n}Example: '0 0 7,10 * * Mon-Fri'
    #[arg(long, env = "MENSA_CRON")]
    cron: Option<String>,
    /// Skip the notification pass
    #[arg(long)]
    no_notify: bool,
    /// Enable verbose logging (mostly performance metrics){n}[SETS env: RUST_LOG=debug]
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    //// Args setup
    let args = Args::parse();

    if args.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    logger_init(module_path!());
    log::info!("Starting mensa archive...");

    if !(log_enabled!(log::Level::Debug) || log_enabled!(log::Level::Trace)) {
        log::info!("Enable verbose logging for performance metrics");
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    //// Config + DB setup
    let mut config = Config::load(&args.config)?;
    if let Some(database) = args.database {
        config.database = database;
    }

    let mut archive = Archive::open(&config.database, config.thresholds)?;
    let client = build_client(&config)?;
    let matcher = (!args.no_notify)
        .then(|| Arc::new(NotificationMatcher::new(config.thresholds, Arc::new(LogMailer))));

    let Some(schedule) = args.cron else {
        let today = Local::now().date_naive();
        let report = run_cycle(&config, &client, &mut archive, matcher.as_deref(), today).await?;
        for failed in &report.failed {
            log::warn!("{} failed: {}", failed.canteen, failed.reason);
        }
        return Ok(());
    };

    //// Scheduled mode
    let sched = JobScheduler::new().await?;
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    start_scheduled_runs(
        &sched,
        &schedule,
        Arc::new(config),
        client,
        Arc::new(Mutex::new(archive)),
        matcher,
        fatal_tx,
    )
    .await?;
    sched.start().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            Ok(())
        }
        Some(e) = fatal_rx.recv() => Err(e.into()),
    }
}
