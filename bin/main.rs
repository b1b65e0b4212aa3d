//! Keel CLI Entry Point
//!
//! Commands:
//! - keel bench  - Run the CRUD benchmark against a document or relational store

mod bench;

use clap::{Args, Parser, Subcommand};
use keel_core::config::{DbLocation, StoreOptions, resolve_location};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::bench::{BenchConfig, Mode};

/// Keel CLI
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the store benchmark script
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
struct BenchArgs {
    /// Storage style to exercise
    #[arg(long, value_enum, default_value_t = Mode::Document)]
    mode: Mode,

    /// Database file path
    #[arg(long, conflicts_with = "settings")]
    db: Option<PathBuf>,

    /// Settings file holding named connection strings (JSON or YAML)
    #[arg(long, requires = "name")]
    settings: Option<PathBuf>,

    /// Connection string name, or database name without a settings file
    #[arg(long)]
    name: Option<String>,

    /// Number of records in the bulk steps
    #[arg(long, default_value_t = 1000)]
    count: usize,
}

impl BenchArgs {
    fn resolve(&self) -> anyhow::Result<(DbLocation, StoreOptions)> {
        if let Some(db) = &self.db {
            let location = DbLocation::from_path(db)
                .ok_or_else(|| anyhow::anyhow!("invalid database path: {}", db.display()))?;
            return Ok((location, StoreOptions::default()));
        }
        let name = self.name.as_deref().unwrap_or("keel");
        Ok(match &self.settings {
            Some(settings) => resolve_location(settings, name),
            None => (DbLocation::from_name(name), StoreOptions::default()),
        })
    }
}

fn init_logging(verbose: bool) {
    if verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Bench(args) => {
            let (location, options) = args.resolve()?;
            println!("Database: {}", location.connection_string());
            let config = BenchConfig {
                mode: args.mode,
                location,
                options,
                count: args.count,
            };
            for step in bench::run(&config).await? {
                println!(
                    "{:<32} {:>6} items {:>8} ms",
                    step.label,
                    step.items,
                    step.elapsed.as_millis()
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
