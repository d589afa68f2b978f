//! Command-line entry point.
//!
//! # Usage
//!
//! Run a script file (or stdin when no file is given):
//! ```bash
//! acdb-sim run acdb-sim/scripts/deadlock.txt -v
//! ```
//!
//! JSON-lines output, layout from a configuration file:
//! ```bash
//! acdb-sim run script.txt --format json --config acdb.json
//! ```
//!
//! Random workloads under invariant checking:
//! ```bash
//! acdb-sim chaos --seed 42 --iterations 500 --operations 80
//! ```
//!
//! Logs go to stderr; set `--log-level debug` or `RUST_LOG` to see lock
//! traffic.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use acdb_sim::{
    run_chaos, ChaosConfig, Database, OutputFormat, SimError, SimulationConfig, WorkloadConfig,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "acdb-sim", version)]
#[command(about = "Replicated database simulator with available-copies replication", long_about = None)]
struct Cli {
    /// Log filter (e.g. `info`, `acdb=debug`); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a script
    Run(RunArgs),
    /// Run seeded random workloads and check invariants
    Chaos(ChaosArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Script to run (reads stdin when omitted)
    file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (defaults to the configuration file, then text)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ChaosArgs {
    /// Seed of the first iteration
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of iterations
    #[arg(long, default_value = "100")]
    iterations: usize,

    /// Commands generated per iteration
    #[arg(long, default_value = "60")]
    operations: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let result = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Chaos(args) => chaos(args),
    };
    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> Result<ExitCode, SimError> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };
    config.verbose |= args.verbose;
    if let Some(format) = args.format {
        config.format = format;
    }

    let stdout = io::stdout();
    let mut db = Database::new(&config, BufWriter::new(stdout.lock()))?;
    match &args.file {
        Some(path) => {
            let file = File::open(path)?;
            db.run_script(BufReader::new(file))?;
        }
        None => {
            db.run_script(io::stdin().lock())?;
        }
    }
    db.into_output().flush()?;
    Ok(ExitCode::SUCCESS)
}

fn chaos(args: ChaosArgs) -> Result<ExitCode, SimError> {
    let config = ChaosConfig {
        seed: args.seed,
        iterations: args.iterations,
        workload: WorkloadConfig {
            operations: args.operations,
            ..WorkloadConfig::default()
        },
        ..ChaosConfig::default()
    };
    let report = run_chaos(&config)?;
    println!("{report}");

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
