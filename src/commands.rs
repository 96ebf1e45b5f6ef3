//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use lyricrec::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Recommend { seeds, .. } = cli.command {
//!     println!("{} seeds", seeds.len());
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file to use instead of the per-user default.
    #[arg(long, global = true, env = "LYRICREC_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config file.
    Init,

    /// Fetch lyrics for every item of a catalog snapshot, then update the index.
    Ingest {
        /// JSON catalog snapshot.
        catalog: PathBuf,
    },

    /// Build or reconcile the index against the lyric cache.
    Index {
        /// Throw the existing index away and embed everything again.
        #[arg(long)]
        rebuild: bool,
    },

    /// Rank a catalog by lyric similarity to seed songs.
    #[clap(name = "recommend", alias = "r")]
    Recommend {
        /// JSON catalog snapshot to rank.
        catalog: PathBuf,

        /// Seed catalog ids (repeatable).
        #[arg(short = 's', long = "seed", required = true)]
        seeds: Vec<String>,

        /// Neighbors fetched per seed; defaults to the config value.
        #[arg(short = 'k', long)]
        neighbors: Option<usize>,

        /// Number of results; defaults to the config value.
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Leave the seed songs out of the results.
        #[arg(long)]
        exclude_seeds: bool,

        /// Look up lyrics of uncached seeds before ranking.
        #[arg(long)]
        fetch: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show what the cache knows about an item.
    Lyrics { id: String },

    /// Delete a cached lyric record so the next ingest looks it up again.
    Forget { id: String },

    /// Overwrite a cached lyric record with the contents of a file.
    Correct {
        id: String,
        /// Text file with the lyrics; an empty file marks the lyrics absent.
        file: PathBuf,
    },
}
