//! # lyricrec (library root)
//!
//! Song recommendations by lyric similarity. Lyrics are cached in SQLite,
//! embedded into 384-d vectors, indexed with HNSW, and a set of seed songs is
//! turned into a ranked list of catalog items by cumulative distance.
//!
//! - Lyric cache with remembered negative lookups (`lyric_cache`, `models`, `schema`).
//! - External collaborators behind traits (`lyric_source`, `embedding`).
//! - Persistent nearest-neighbor index (`vector_index`).
//! - Multi-seed ranking and the locking service around it (`recommender`).
//! - Catalog snapshots (`catalog`), configuration (`config`), CLI parsing (`commands`).
//!
//! ## Data flow
//! ```text
//! catalog item ──resolve──▶ LyricCache ──all()──▶ VectorIndexStore (build / reconcile)
//!                                                       │
//! seed ids ──lyrics──▶ embed ──query(k)──▶ ScoreAggregator ──▶ ranked catalog items
//! ```
//!
//! ## Modules
//! - [`catalog`], [`commands`], [`config`], [`embedding`], [`error`],
//!   [`lyric_cache`], [`lyric_source`], [`models`], [`recommender`], [`schema`],
//!   [`vector_index`]

use directories::ProjectDirs;

pub mod catalog;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod lyric_cache;
pub mod lyric_source;
pub mod models;
pub mod recommender;
pub mod schema;
pub mod vector_index;

use error::{LyricRecError, Result};

/// Return the per-platform configuration directory used by lyricrec.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "lyricrec", "lyricrec")`, so you get the right place on each OS
/// (e.g., `~/.config/lyricrec` on Linux).
///
/// The directory is **not** created by this function.
pub fn config_dir() -> Result<std::path::PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "lyricrec", "lyricrec")
        .ok_or_else(|| LyricRecError::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
