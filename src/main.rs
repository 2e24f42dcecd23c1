use anyhow::Result;
use std::path::PathBuf;
use tracing::error;

use haloreel::cli::{self, EXIT_FATAL, EXIT_OK};
use haloreel::config::Config;
use haloreel::logging;
use haloreel::pipeline::{self, PassOptions};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    dirs: Vec<PathBuf>,
    tolerance_minutes: Option<i64>,
    force: bool,
    reset: bool,
    json: bool,
    verbose: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(EXIT_OK);
            }
            "--version" | "-V" => {
                println!("haloreel {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(EXIT_OK);
            }
            "--config" | "-c" => {
                parsed.config_path = Some(PathBuf::from(value(&args, i, "--config")));
                i += 1;
            }
            "--dir" | "-d" => {
                parsed.dirs.push(PathBuf::from(value(&args, i, "--dir")));
                i += 1;
            }
            "--tolerance" | "-t" => {
                let raw = value(&args, i, "--tolerance");
                match raw.parse::<i64>() {
                    Ok(minutes) if minutes >= 0 => parsed.tolerance_minutes = Some(minutes),
                    _ => {
                        eprintln!("Error: --tolerance expects a non-negative number of minutes, got {:?}", raw);
                        std::process::exit(EXIT_FATAL);
                    }
                }
                i += 1;
            }
            "--force" | "-f" => parsed.force = true,
            "--reset" => parsed.reset = true,
            "--json" => parsed.json = true,
            "--verbose" | "-v" => parsed.verbose = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(EXIT_FATAL);
            }
        }
        i += 1;
    }

    parsed
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match cli::flag_value(args, i, flag) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn print_help() {
    println!(
        r#"haloreel - index Halo Infinite captures and link them to match history

USAGE:
    haloreel [OPTIONS]

OPTIONS:
    --config, -c PATH      Path to config file
    --dir, -d DIR          Directory to scan (repeatable; overrides config roots)
    --tolerance, -t MIN    Match window tolerance in minutes (default: 5)
    --force, -f            Rehash every file even if mtime and size match
    --reset                Clear the inventory and all associations, then exit
    --json                 Print the pass summary as JSON
    --verbose, -v          Also log to stderr
    --version, -V          Show version
    --help, -h             Show this help message

ENVIRONMENT:
    HALOREEL_CONFIG        Path to config file (overrides default location)
    HALOREEL_LOG           Log level (trace, debug, info, warn, error)

EXIT STATUS:
    0  clean pass
    1  pass finished with file or owner store errors
    2  fatal error (configuration or media store)

Config file location: $XDG_CONFIG_HOME/haloreel/config.toml

See also: haloreel-daemon --help"#
    );
}

fn main() {
    let args = parse_args();

    let _ = logging::init(Some(Config::data_dir().join("logs")), args.verbose);

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Fatal error");
            eprintln!("Error: {:#}", e);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn run(args: &Args) -> Result<i32> {
    let mut config = cli::load_config(args.config_path.as_deref())?;
    if let Some(minutes) = args.tolerance_minutes {
        config.correlation.tolerance_minutes = minutes;
    }
    config.correlation.validate()?;

    let db = cli::open_store(&config)?;

    if args.reset {
        let cleared = pipeline::reset(&db)?;
        if args.json {
            println!(
                "{}",
                serde_json::json!({
                    "reset": { "media": cleared.media, "associations": cleared.associations }
                })
            );
        } else {
            println!(
                "reset: removed {} media rows and {} associations",
                cleared.media, cleared.associations
            );
        }
        return Ok(EXIT_OK);
    }

    let owners = cli::owner_stores(&config);
    let options = PassOptions {
        roots: args.dirs.clone(),
        force: args.force,
    };
    let summary = pipeline::run_pass(&config, &db, &owners, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary);
        for sample in &summary.errors.samples {
            eprintln!("  {}", sample);
        }
        let unlisted = summary.errors.count.saturating_sub(summary.errors.samples.len());
        if unlisted > 0 {
            eprintln!("  ... and {} more", unlisted);
        }
    }

    Ok(cli::exit_code(&summary))
}
