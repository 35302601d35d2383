//! `bucketc`: compile a Bucket program to generated procedures.
//!
//! ## Usage
//!
//! ```bash
//! # Bundle as JSON on stdout
//! bucketc schema.json
//!
//! # Seed data from ./data, prototype text only, written to a file
//! bucketc schema.json --data-dir data --prototype -o store.js
//! ```
//!
//! Logging is configured by `logging.level` / `logging.format` in the config
//! file; `RUST_LOG` takes precedence over the configured level.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use bucket::config::LoggingConfig;
use bucket::storage::{DataProvider, DirectoryProvider, NoFiles};
use bucket::{Config, Program};

#[derive(Debug, Parser)]
#[command(name = "bucketc", version, about = "Compile a Bucket program")]
struct Args {
    /// Program declarations as JSON
    input: PathBuf,

    /// Config file; defaults to config.toml / config.local.toml / BUCKET_* env
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory that `source(...)` seed files are read from
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Emit only the prototype assignments instead of the JSON bundle
    #[arg(long)]
    prototype: bool,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Using default configuration ({e})");
            Config::default()
        }),
    };
    init_tracing(&config.logging);

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let program = Program::from_json(&text)
        .with_context(|| format!("parsing {}", args.input.display()))?;

    let directory;
    let provider: &dyn DataProvider = match &args.data_dir {
        Some(dir) => {
            directory = DirectoryProvider::new(dir);
            &directory
        }
        None => &NoFiles,
    };

    let bundle = bucket::compile(&program, provider, &config)?;
    let rendered = if args.prototype {
        bundle.prototype.clone()
    } else {
        bundle.to_json()?
    };

    match &args.output {
        Some(path) => fs::write(path, rendered + "\n")
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // RUST_LOG takes precedence over config.logging.level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging_config.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = env::var("BUCKET_LOG_JSON")
        .ok()
        .map_or_else(|| logging_config.format == "json", |v| v != "0");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
