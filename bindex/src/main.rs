//! bindex - command-line tool for B-tree index files
//!
//! Every subcommand opens the index, performs one operation and closes it;
//! without a subcommand the interactive menu starts.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

use bindex_engine::{ImportFormat, IndexFile, InsertOutcome};

mod config;
mod menu;

use config::Config;
use menu::Menu;

/// bindex - create, load, query and dump B-tree index files
#[derive(Parser, Debug)]
#[command(name = "bindex")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Node cache size (number of blocks, 0 disables)
    #[arg(long, global = true)]
    cache_blocks: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new, empty index file
    Create {
        index: PathBuf,
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Insert or overwrite one pair
    Insert { index: PathBuf, key: u64, value: u64 },
    /// Look up the value of a key
    Search { index: PathBuf, key: u64 },
    /// Load pairs from a text or binary dump
    Load {
        index: PathBuf,
        input: PathBuf,
        /// Dump format: auto, text or binary
        #[arg(long, default_value = "auto")]
        format: ImportFormat,
    },
    /// Print the header and every node
    Print { index: PathBuf },
    /// Write all pairs to a `key,value` text file
    Extract {
        index: PathBuf,
        output: PathBuf,
        /// Replace an existing output file
        #[arg(short, long)]
        force: bool,
    },
    /// Interactive menu (default)
    Menu,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?
        .with_overrides(args.log_level, args.cache_blocks);

    // Logs go to stderr so command output stays clean
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    run(args.command.unwrap_or(Command::Menu), &config)
}

fn run(command: Command, config: &Config) -> Result<()> {
    let options = config.index.clone();
    let stdout = io::stdout();

    match command {
        Command::Create { index, force } => {
            IndexFile::create(&index, force, options)?.close()?;
            println!("Created {}", index.display());
        }
        Command::Insert { index, key, value } => {
            let mut file = IndexFile::open(&index, options)?;
            match file.insert(key, value)? {
                InsertOutcome::Inserted => println!("Inserted ({}, {})", key, value),
                InsertOutcome::Updated { previous } => {
                    println!("Updated key {}: {} -> {}", key, previous, value)
                }
            }
            file.close()?;
        }
        Command::Search { index, key } => {
            let mut file = IndexFile::open(&index, options)?;
            let value = file.search(key)?;
            println!("{}", value);
        }
        Command::Load {
            index,
            input,
            format,
        } => {
            let mut file = IndexFile::open(&index, options)?;
            let report = file.import_file(&input, format)?;
            debug!("Node cache after load: {:?}", file.cache_stats());
            file.close()?;
            println!(
                "Loaded {} ({}): {} inserted, {} updated, {} skipped",
                input.display(),
                report.format,
                report.inserted,
                report.updated,
                report.skipped
            );
        }
        Command::Print { index } => {
            let mut file = IndexFile::open(&index, options)?;
            let mut out = BufWriter::new(stdout.lock());
            let summary = file.print(&mut out)?;
            out.flush()?;
            info!(
                "Printed {} nodes ({} entries, {} stray)",
                summary.nodes, summary.entries, summary.stray
            );
            if summary.corrupt > 0 || summary.missing > 0 {
                bail!(
                    "{} unreadable node(s), {} missing block(s) in {}",
                    summary.corrupt,
                    summary.missing,
                    index.display()
                );
            }
        }
        Command::Extract {
            index,
            output,
            force,
        } => {
            let mut file = IndexFile::open(&index, options)?;
            let written = file.export_file(&output, force)?;
            println!("Extracted {} pairs to {}", written, output.display());
        }
        Command::Menu => {
            let mut menu = Menu::new(io::stdin().lock(), stdout.lock(), options);
            menu.run()?;
        }
    }

    Ok(())
}
