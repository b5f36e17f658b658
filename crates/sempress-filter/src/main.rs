//! Sempress Git filter CLI
//!
//! Semantic compression for tabular files, wired into Git as a
//! clean/smudge filter.
//!
//! ## Usage
//!
//! ```bash
//! # One-time setup in a repository
//! sempress init
//!
//! # Invoked by Git via .gitattributes (stdin -> stdout)
//! sempress clean data.csv
//! sempress smudge data.csv
//!
//! # Inspect reconstruction quality by hand
//! sempress check original.csv reconstructed.csv
//! ```
//!
//! Logging goes to stderr; stdout carries filter payload bytes. The exit
//! code is non-zero only for fatal conditions. A quality-gate rejection
//! stores the original raw and exits zero.

use clap::{Parser, Subcommand};
use sempress_core::{classify, evaluate, Table};
use sempress_filter::{report, Config, FilterPipeline};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "sempress")]
#[command(version)]
#[command(about = "Semantic compression Git filter for tabular files", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress stdin to stdout (Git clean filter)
    Clean {
        /// Path Git reports for the content, for logs only
        filename: Option<String>,
    },
    /// Decompress stdin to stdout (Git smudge filter)
    Smudge {
        /// Path Git reports for the content, for logs only
        filename: Option<String>,
    },
    /// Write a default .sempress.yml and print the Git wiring to add
    Init,
    /// Compare an original CSV against a reconstruction
    Check {
        /// Original file
        original: PathBuf,
        /// Reconstructed file
        reconstructed: PathBuf,
    },
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        Command::Clean { filename } => clean(filename.as_deref()),
        Command::Smudge { filename } => smudge(filename.as_deref()),
        Command::Init => init(),
        Command::Check {
            original,
            reconstructed,
        } => check(&original, &reconstructed),
    }
}

fn clean(filename: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let raw = read_stdin()?;
    let config = Config::discover(&std::env::current_dir()?)?;
    let mut pipeline = FilterPipeline::new(config)?;

    let outcome = pipeline.clean(&raw)?;
    let name = filename.unwrap_or("<stdin>");
    if outcome.cache_hit {
        info!("{name}: cache hit, {} bytes", outcome.bytes.len());
    } else {
        info!("{name}: {}", outcome.stats.summary());
    }

    write_stdout(&outcome.bytes)
}

fn smudge(filename: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let stored = read_stdin()?;
    let config = Config::discover(&std::env::current_dir()?)?;
    let pipeline = FilterPipeline::new(config)?;

    let restored = pipeline.smudge(&stored)?;
    info!(
        "{}: restored {} bytes",
        filename.unwrap_or("<stdin>"),
        restored.len()
    );
    write_stdout(&restored)
}

fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = PathBuf::from(sempress_filter::config::CONFIG_FILE_NAME);
    if path.exists() {
        eprintln!("{} already exists, leaving it alone", path.display());
    } else {
        std::fs::write(&path, sempress_filter::config::DEFAULT_CONFIG_YAML)?;
        eprintln!("wrote {}", path.display());
    }

    eprintln!();
    eprintln!("To wire the filter into this repository, run:");
    eprintln!();
    eprintln!("  git config filter.sempress.clean  \"sempress clean %f\"");
    eprintln!("  git config filter.sempress.smudge \"sempress smudge %f\"");
    eprintln!("  git config filter.sempress.required true");
    eprintln!();
    eprintln!("and add to .gitattributes:");
    eprintln!();
    eprintln!("  *.csv filter=sempress");
    Ok(())
}

fn check(original: &PathBuf, reconstructed: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::discover(&std::env::current_dir()?)?;

    let orig = Table::parse_csv(&std::fs::read(original)?)?;
    let recon = Table::parse_csv(&std::fs::read(reconstructed)?)?;
    let roles = classify(&orig, &config.classify_config())?;
    let quality = evaluate(
        &orig,
        &recon,
        &roles,
        config.compression.uncertainty_threshold,
    )?;

    print!("{}", report::render(&quality));
    Ok(())
}

fn read_stdin() -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin().lock().read_to_end(&mut buf)?;
    Ok(buf)
}

fn write_stdout(bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes)?;
    stdout.flush()?;
    Ok(())
}

fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // Stdout carries the filter payload, so logs must go to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
