//! Zelos CLI
//!
//! Command-line interface for inspecting and editing a Zelos data directory.

use std::path::Path;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use zelos::store::StoreRecovery;
use zelos::{Config, Container, Document, Result};

/// Zelos CLI
#[derive(Parser, Debug)]
#[command(name = "zelos-cli")]
#[command(about = "CLI for the Zelos document store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./zelos_data")]
    data_dir: String,

    /// Batch fsyncs instead of syncing every write
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a document
    Get {
        /// Collection name
        collection: String,

        /// Document key
        key: String,
    },

    /// Store a document
    Put {
        /// Collection name
        collection: String,

        /// JSON document body
        value: String,

        /// Document key (defaults to the body's "_id", or a new UUID)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Delete a document
    Delete {
        /// Collection name
        collection: String,

        /// Document key
        key: String,
    },

    /// List keys, or documents with --values
    List {
        /// Collection name
        collection: String,

        /// Print each document body as well
        #[arg(long)]
        values: bool,
    },

    /// Rewrite a collection's file without dead records
    Compact {
        /// Collection name
        collection: String,
    },

    /// Show collection statistics
    Stats {
        /// Collection name
        collection: String,
    },

    /// Check a collection's file without modifying it
    Verify {
        /// Collection name
        collection: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,zelos=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .base_dir(&args.data_dir)
        .flush_on_write(!args.no_sync)
        .build();

    let container = Container::open(config)?;

    match args.command {
        Commands::Get { collection, key } => {
            let document = container.get_or_open_collection(&collection)?.get(&key)?;
            println!("{}", serde_json::to_string_pretty(&document.value)?);
        }

        Commands::Put {
            collection,
            value,
            key,
        } => {
            let value: serde_json::Value = serde_json::from_str(&value)?;
            let document = match key {
                Some(key) => Document::new(key, value),
                None => Document::from_value(value),
            };
            let key = document.key.clone();
            let version = container.get_or_open_collection(&collection)?.put(document)?;
            println!("{} (version {})", key, version);
        }

        Commands::Delete { collection, key } => {
            if container.get_or_open_collection(&collection)?.delete(&key)? {
                println!("deleted {}", key);
            } else {
                println!("{} not found", key);
            }
        }

        Commands::List { collection, values } => {
            let collection = container.get_or_open_collection(&collection)?;
            if values {
                for document in collection.query(|_| true)? {
                    let document = document?;
                    println!("{}\t{}", document.key, serde_json::to_string(&document.value)?);
                }
            } else {
                for key in collection.keys()? {
                    println!("{}", key);
                }
            }
        }

        Commands::Compact { collection } => {
            let report = container.get_or_open_collection(&collection)?.compact()?;
            println!(
                "{} records, {} -> {} bytes ({} reclaimed)",
                report.records_written,
                report.bytes_before,
                report.bytes_after,
                report.bytes_reclaimed()
            );
        }

        Commands::Stats { collection } => {
            let stats = container.get_or_open_collection(&collection)?.stats()?;
            println!("collection:    {}", stats.name);
            println!("documents:     {}", stats.documents);
            println!("tombstones:    {}", stats.tombstones);
            println!("live bytes:    {}", stats.live_bytes);
            println!("file bytes:    {}", stats.file_bytes);
            println!("dead ratio:    {:.3}", stats.dead_ratio);
            println!("last sequence: {}", stats.last_sequence);
        }

        // Reads the file directly, without taking the collection lock
        Commands::Verify { collection } => {
            verify(&container.collection_path(&collection)?)?;
        }
    }

    container.close_all()
}

fn verify(path: &Path) -> Result<()> {
    let report = StoreRecovery::verify(path)?;

    println!("file:          {}", path.display());
    println!("records:       {}", report.records_recovered);
    println!("valid bytes:   {}", report.valid_len);
    println!("last sequence: {}", report.last_sequence);

    match report.torn_tail {
        Some(torn) => {
            println!(
                "torn tail:     {} bytes at offset {} ({})",
                report.bytes_discarded, torn.offset, torn.reason
            );
        }
        None => println!("torn tail:     none"),
    }

    if let Some(damage) = report.corruption {
        println!(
            "corruption:    record at offset {} ({}), intact records follow",
            damage.offset, damage.reason
        );
    }
    Ok(())
}
