use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use layerinfo::{normalize_digest, probe_driver, DriverRegistry, LayerStore, StoreConfig};

/// layerinfo
#[derive(Debug, Parser)]
#[clap(name = "layerinfo", version)]
pub struct App {
    /// Engine data directory to inspect (default /var/lib/docker)
    #[clap(long)]
    root: Option<PathBuf>,
    /// Read store settings from this TOML file
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prints the storage driver in use
    Probe,
    /// Lists the digest and uncompressed size of every complete layer
    List {
        /// Print a JSON array instead of one line per layer
        #[clap(long)]
        json: bool,
    },
    /// Prints the size of each given layer, one per line
    Size {
        /// Layer digests, with or without the sha256: prefix
        #[clap(required = true)]
        digests: Vec<String>,
    },
}

fn load_config(args: &App) -> Result<StoreConfig> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(root) = &args.root {
        config.engine_root = root.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();

    let args = App::parse();
    let config = load_config(&args)?;
    let registry = DriverRegistry::builtin();

    match args.cmd {
        Command::Probe => {
            let driver = match config.driver {
                Some(driver) => driver,
                None => probe_driver(&config.engine_root, &registry)?,
            };
            println!("{driver}");
        }
        Command::List { json } => {
            let store = LayerStore::open_with(config, registry)?;
            let mut records = store.records().to_vec();
            records.sort_by(|a, b| a.digest.cmp(&b.digest));
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in records {
                    println!("{} {}", record.digest, record.size_bytes);
                }
            }
        }
        Command::Size { ref digests } => {
            let digests = digests
                .iter()
                .map(|digest| normalize_digest(digest))
                .collect::<Result<Vec<_>, _>>()
                .context("Parsing layer digests")?;
            let store = LayerStore::open_with(config, registry)?;
            for size in store.size_of(&digests)? {
                println!("{size}");
            }
        }
    }
    Ok(())
}
