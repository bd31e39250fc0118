//! span-convert CLI
//!
//! Converts Crossref works into intermediate schema records, one JSON object
//! per line, attaching ISILs on the way. Records go to stdout, logs to stderr.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use span::{
    config::{apply_holding_spec, load_isil_holdings, parse_holding_spec},
    error::{AppError, Result},
    models::{Config, crossref::Document},
    pipeline,
    services::holdings_map,
};

const DEFAULT_CONFIG: &str = "span.toml";

/// span - metadata conversion with holdings based ISIL attachment
#[derive(Parser, Debug)]
#[command(
    name = "span-convert",
    version,
    about = "Convert metadata into intermediate schema and attach ISILs"
)]
struct Cli {
    /// Path to TOML configuration file (default: span.toml, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Records per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Number of workers (default: number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip records that fail to convert
    #[arg(long)]
    ignore: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Holdings files per ISIL, as ISIL:PATH,ISIL:PATH
    #[arg(long, default_value = "")]
    hspec: String,

    /// Crossref member names, one JSON object per line
    #[arg(long)]
    members: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert line delimited Crossref works
    Convert {
        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },

    /// Validate configuration and referenced files
    Validate,

    /// Dump decoded holdings as JSON
    Holdings {
        /// Holdings file (default: every file of --hspec)
        file: Option<PathBuf>,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Apply command line overrides on top of the loaded configuration.
fn apply_overrides(cli: &Cli, config: &mut Config) -> Result<()> {
    if let Some(batch_size) = cli.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }
    config.pipeline.ignore_errors |= cli.ignore;
    config.pipeline.verbose |= cli.verbose;
    if let Some(members) = &cli.members {
        config.members = Some(members.clone());
    }

    let hspec = parse_holding_spec(&cli.hspec)?;
    apply_holding_spec(config, &hspec);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // An explicit config file must exist
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(DEFAULT_CONFIG)?,
    };
    apply_overrides(&cli, &mut config)?;

    match &cli.command {
        Command::Convert { file } => {
            let input: Box<dyn BufRead + Send> = match file {
                Some(path) => {
                    let file = File::open(path).map_err(|e| {
                        AppError::config(format!("cannot open {}: {}", path.display(), e))
                    })?;
                    Box::new(BufReader::new(file))
                }
                None => Box::new(BufReader::new(std::io::stdin())),
            };

            pipeline::run_convert::<Document, _, _>(&config, input, std::io::stdout()).await?;
        }

        Command::Validate => {
            pipeline::run_validate(&config)?;
        }

        Command::Holdings { file } => {
            let stdout = std::io::stdout();
            match file {
                Some(path) => {
                    let file = File::open(path).map_err(|e| {
                        AppError::config(format!("cannot open {}: {}", path.display(), e))
                    })?;
                    let holdings = holdings_map(BufReader::new(file));
                    log::info!("Decoded {} ISSNs from {}", holdings.len(), path.display());
                    serde_json::to_writer_pretty(stdout.lock(), &holdings)?;
                }
                None => {
                    let hspec = parse_holding_spec(&cli.hspec)?;
                    if hspec.is_empty() {
                        return Err(AppError::config("no holdings file given, use FILE or --hspec"));
                    }
                    let holdings = load_isil_holdings(&hspec)?;
                    log::info!("Decoded holdings of {}", holdings.isils().join(", "));
                    serde_json::to_writer_pretty(stdout.lock(), &holdings)?;
                }
            }
            println!();
        }
    }

    Ok(())
}
