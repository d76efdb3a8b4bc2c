//! # estrattore
//!
//! Command-line extractor for active-business statistics. Resolves the
//! requested province and period range, runs the fetch/cache/transform
//! pipeline and writes the resulting CSV.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser};
use thiserror::Error;

use tracing::{error, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, EnvFilter};

use lib_common::configs::config_app::{AppConfig, ConfigError, LoggingSection};
use lib_common::statistics::camcom::extractor::{ExtractError, Extractor};
use lib_common::statistics::camcom::processor::StatisticsSummary;
use lib_common::statistics::camcom::provinces;
use lib_common::{get_process_info, ProcessInfo, ProcessInfoError};

// load .env files before anything else
use static_init::dynamic;

#[dynamic]
static DOTENV_INIT: () = {
    // Set up environment variables
    dotenvy::dotenv().ok();
};

#[dynamic]
pub static PROCESSINFO: Result<ProcessInfo, ProcessInfoError> = get_process_info();

/// CLI arguments for the extractor.
#[derive(Parser)]
#[clap(
    name = "estrattore",
    version,
    about = "Extracts active-business statistics from the chamber of commerce open-data API into CSV.",
    long_about = "Retrieves active-business counts by province, year, quarter, ATECO sector and \
                  legal form from the JSON-stat open-data endpoint, caches raw payloads locally \
                  and exports the flattened rows (with year-over-year variation) to CSV."
)]
struct Cli {
    /// Province to extract (e.g. Venezia, Padova).
    #[clap(long)]
    provincia: Option<String>,

    /// Region used when listing provinces.
    #[clap(long, default_value = "Veneto")]
    regione: String,

    /// Start period (YYYY, YYYY-MM or YYYY-MM-DD).
    #[clap(long)]
    start: Option<String>,

    /// End period (YYYY, YYYY-MM or YYYY-MM-DD).
    #[clap(long)]
    end: Option<String>,

    /// Restrict the extraction to one ATECO sector code.
    #[clap(long)]
    settore: Option<String>,

    /// Path of the configuration file.
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Explicit output CSV path, bypassing the filename pattern.
    #[clap(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print summary statistics of the extracted rows.
    #[clap(long, action = ArgAction::SetTrue)]
    stats: bool,

    /// List the periods available for the requested province and exit.
    #[clap(long, action = ArgAction::SetTrue)]
    list_periods: bool,

    /// List known regions and provinces and exit.
    #[clap(long, action = ArgAction::SetTrue)]
    list_province: bool,

    /// Bypass the response cache for this run.
    #[clap(long, action = ArgAction::SetTrue)]
    no_cache: bool,

    /// Enable verbose output.
    #[clap(long, short = 'v', action = ArgAction::SetTrue)]
    verbose: bool,
}

/// A command-line usage problem (missing or inconsistent flags).
#[derive(Debug, Error)]
#[error("{0}")]
struct UsageError(String);

fn setup_logging(logging: &LoggingSection, verbose: bool) -> std::io::Result<non_blocking::WorkerGuard> {
    // Verbose wins, then the environment, then the configuration file.
    let log_level: String = if verbose {
        "debug".to_string()
    } else {
        env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone())
    };

    // Get log directory from environment variable or the configuration
    let log_dir: String = env::var("LOG_DIR")
        .unwrap_or_else(|_| logging.directory.to_string_lossy().into_owned());

    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&log_dir)?;

    // Configure file appender for rotating log files daily
    let process_basename: &String = match &*PROCESSINFO {
        Ok(process_info) => &process_info.process_basename,
        Err(e) => {
            eprintln!("Failed to retrieve process info: {}", e);
            std::process::exit(1);
        }
    };
    let file_appender = rolling::daily(&log_dir, process_basename.as_str());
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    // Create console layer for stdout
    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    // Create environment filter from log level
    let env_filter: EnvFilter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json_file {
        // JSON-formatted file layer
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_appender)
            .json();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking_appender);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    info!("Logging initialized with level: {}", log_level);
    Ok(guard)
}

/// Maps failures onto the process exit code: 2 for configuration and usage
/// problems, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() || err.downcast_ref::<UsageError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<ExtractError>() {
        Some(ExtractError::UnknownProvince(_))
        | Some(ExtractError::InvalidRange { .. })
        | Some(ExtractError::Config(_)) => 2,
        _ => 1,
    }
}

fn print_provinces(regione: &str) -> Result<()> {
    match provinces::list_provinces(regione) {
        Some(list) => {
            println!("Province della regione {regione}:");
            for (name, code) in list {
                println!("  {code}  {name}");
            }
            Ok(())
        }
        None => {
            println!("Regione sconosciuta: {regione}. Regioni disponibili:");
            for region in provinces::list_regions() {
                println!("  {region}");
            }
            Err(UsageError(format!("unknown region `{regione}`")).into())
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    if cli.list_province {
        return print_provinces(&cli.regione);
    }

    let Some(provincia) = cli.provincia.as_deref() else {
        return Err(UsageError("--provincia is required (see --list-province)".to_string()).into());
    };

    let mut config = config;
    if cli.no_cache {
        config.cache.enabled = false;
    }

    let extractor = Extractor::new(config)?;
    let params = extractor.resolve_params(
        provincia,
        cli.start.as_deref(),
        cli.end.as_deref(),
        cli.settore.clone(),
    )?;

    if cli.list_periods {
        let periods = extractor.list_periods(&params).await?;
        println!("Periodi disponibili per {}:", params.provincia);
        for period in &periods {
            println!("  {period}");
        }
        println!("Totale: {} periodi", periods.len());
        return Ok(());
    }

    let report = extractor.run(&params, cli.output.as_deref()).await?;
    println!(
        "Estrazione completata: {} righe in {} ({} finestre, {} da cache, {} ms)",
        report.rows_written,
        report.output_path.display(),
        report.windows,
        report.cache_hits,
        report.elapsed.as_millis()
    );

    if cli.stats {
        let stats = StatisticsSummary::from_records(&report.records);
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configuration comes first: the logging section lives inside it.
    let config_path = AppConfig::resolve_path(cli.config.as_deref());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error ({}): {}", config_path.display(), e);
            return ExitCode::from(2);
        }
    };

    let _guard = match setup_logging(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match &*PROCESSINFO {
        Ok(process_info) => {
            info!("{}", process_info);
        }
        Err(e) => {
            error!("Failed to retrieve process info: {}", e);
            return ExitCode::from(1);
        }
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
