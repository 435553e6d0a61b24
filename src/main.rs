use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docket::client::Submitter;
use docket::config::{DocketConfig, LoggingConfig};

/// Submit signed documents to the registration endpoint under a rate limit.
#[derive(Debug, Parser)]
#[command(name = "docket", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a JSON document
    Submit {
        /// File containing the JSON document
        #[arg(short, long)]
        document: PathBuf,

        /// Signature sent alongside the document
        #[arg(short, long)]
        sign: String,

        /// How many times to submit the document
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Caller threads sharing the submitter
        #[arg(long, default_value_t = 1)]
        threads: usize,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DocketConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Submit {
            document,
            sign,
            repeat,
            threads,
        } => submit(&config, &document, &sign, repeat, threads),
        Command::ShowConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn submit(
    config: &DocketConfig,
    path: &Path,
    sign: &str,
    repeat: usize,
    threads: usize,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let submitter = Submitter::new(config)?;
    let threads = threads.clamp(1, repeat.max(1));

    info!(repeat, threads, "Submitting documents");

    thread::scope(|scope| {
        for worker in 0..threads {
            // Spread the submissions as evenly as possible across workers
            let share = repeat / threads + usize::from(worker < repeat % threads);
            let submitter = &submitter;
            let document = &document;
            scope.spawn(move || {
                for _ in 0..share {
                    submitter.submit(document, sign);
                }
            });
        }
    });

    let stats = submitter.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        failed = stats.failed,
        "Done"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
