//! Haloreel watch daemon.
//!
//! Re-runs the indexing pass on a timer and whenever new captures appear in
//! a configured root. Each pass is the same idempotent scan → correlate →
//! derive sequence as `haloreel`, so overlapping triggers are harmless.
//!
//! ## Usage
//!
//! ```bash
//! haloreel-daemon              # Run in foreground
//! haloreel-daemon --once       # Run a single pass and exit
//! ```

use anyhow::{bail, Result};
use chrono::Local;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use haloreel::cli;
use haloreel::config::Config;
use haloreel::correlate::SqliteOwnerStores;
use haloreel::db::Database;
use haloreel::logging;
use haloreel::pipeline::{self, PassOptions};
use haloreel::scanner::ExtensionMap;
use haloreel::watch::{should_process_now, MediaWatcher, Trigger};

/// Daemon configuration
#[derive(Default)]
struct DaemonConfig {
    /// Overrides `watch.poll_interval_secs`
    poll_interval: Option<u64>,
    /// Run once and exit
    once: bool,
    /// Poll only, no filesystem notifications
    no_watch: bool,
    /// Config path override
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let daemon_config = parse_args();

    logging::init(Some(Config::data_dir().join("logs")), false)?;

    info!("Haloreel daemon starting...");

    let config = cli::load_config(daemon_config.config_path.as_deref())?;
    if config.roots.is_empty() {
        bail!("No media roots configured; set `roots` in the config file");
    }

    let db = cli::open_store(&config)?;
    let owners = cli::owner_stores(&config);

    if daemon_config.once {
        info!("Running in single-shot mode");
        run_pass(&config, &db, &owners);
    } else {
        let interval = Duration::from_secs(
            daemon_config
                .poll_interval
                .unwrap_or(config.watch.poll_interval_secs)
                .max(1),
        );
        info!("Running in daemon mode, polling every {} seconds", interval.as_secs());
        run_daemon_loop(&config, &db, &owners, interval, !daemon_config.no_watch);
    }

    info!("Haloreel daemon stopped");
    Ok(())
}

fn parse_args() -> DaemonConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DaemonConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                config.once = true;
            }
            "--no-watch" => {
                config.no_watch = true;
            }
            "--interval" | "-i" => {
                let raw = value(&args, i, "--interval");
                match raw.parse() {
                    Ok(interval) => config.poll_interval = Some(interval),
                    Err(_) => {
                        eprintln!("Error: --interval expects a number of seconds, got {:?}", raw);
                        std::process::exit(cli::EXIT_FATAL);
                    }
                }
                i += 1;
            }
            "--config" | "-c" => {
                config.config_path = Some(PathBuf::from(value(&args, i, "--config")));
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(cli::EXIT_FATAL);
            }
        }
        i += 1;
    }

    config
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match cli::flag_value(args, i, flag) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(cli::EXIT_FATAL);
        }
    }
}

fn print_help() {
    println!(
        r#"haloreel-daemon - keep the capture index up to date

USAGE:
    haloreel-daemon [OPTIONS]

OPTIONS:
    --once, -1          Run one pass and exit
    --interval, -i N    Poll interval in seconds (default: watch.poll_interval_secs)
    --no-watch          Disable filesystem notifications, poll only
    --config, -c PATH   Path to config file
    --help, -h          Show this help message

ENVIRONMENT:
    HALOREEL_CONFIG     Path to config file (overrides default location)
    HALOREEL_LOG        Log level (trace, debug, info, warn, error)

Passes only run within watch.hours_start..watch.hours_end when both are set.
"#
    );
}

fn run_daemon_loop(
    config: &Config,
    db: &Database,
    owners: &SqliteOwnerStores,
    interval: Duration,
    notifications: bool,
) {
    let mut watcher = if notifications {
        match MediaWatcher::start(&config.roots, ExtensionMap::from_config(&config.scanner)) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(error = %e, "Filesystem notifications unavailable, polling only");
                None
            }
        }
    } else {
        None
    };

    loop {
        // Check if we should process (based on hours of operation)
        if should_process_now(&config.watch, Local::now().time()) {
            run_pass(config, db, owners);
        } else {
            info!("Outside hours of operation, skipping this cycle");
        }

        match watcher.as_ref().map(|w| w.wait(interval)) {
            Some(Trigger::Files(count)) => info!(files = count, "New captures detected"),
            Some(Trigger::Timer) => {}
            Some(Trigger::Disconnected) => {
                warn!("Filesystem notifications stopped, polling only");
                watcher = None;
                thread::sleep(interval);
            }
            None => thread::sleep(interval),
        }
    }
}

fn run_pass(config: &Config, db: &Database, owners: &SqliteOwnerStores) {
    match pipeline::run_pass(config, db, owners, &PassOptions::default()) {
        Ok(summary) if summary.has_errors() => {
            warn!(%summary, "Pass finished with errors");
        }
        Ok(_) => {}
        Err(e) => error!("Pass failed: {:#}", e),
    }
}
