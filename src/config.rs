//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `LyricRecConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a file.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use lyricrec::config::{LyricRecConfig, load_config};
//!
//! let config_file_path = "/path/to/config.yaml";
//! let config: LyricRecConfig = load_config(config_file_path).unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use tracing::*;

use crate::error::{LyricRecError, Result};

/// Output dimension of all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSION: usize = 384;

/// Represents the application's configuration.
///
/// Every field except the two storage locations has a default, so a minimal
/// YAML file only needs `lyric_db_url` and `index_path`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct LyricRecConfig {
    /// SQLite database holding the lyric cache.
    pub lyric_db_url: String,

    /// Well-known location of the serialized nearest-neighbor index.
    pub index_path: PathBuf,

    /// Embedding dimension; fixed once an index has been created.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Neighbors fetched per seed (k).
    #[serde(default = "default_neighbors_per_seed")]
    pub neighbors_per_seed: usize,

    /// Recommendations returned when the caller does not ask for a count.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    // Lyric source base url
    #[serde(default = "default_lrclib_base_url")]
    pub lrclib_base_url: String,

    #[serde(default = "default_lyric_source_timeout_secs")]
    pub lyric_source_timeout_secs: u64,

    // Hugging Face model id
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_neighbors_per_seed() -> usize {
    10
}

fn default_top_n() -> usize {
    10
}

fn default_lrclib_base_url() -> String {
    "https://lrclib.net".to_string()
}

fn default_lyric_source_timeout_secs() -> u64 {
    10
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

impl LyricRecConfig {
    /// Configuration rooted in `dir`: `lyrics.db` and `index.hnsw` live there.
    pub fn in_dir(dir: &std::path::Path) -> Self {
        Self {
            lyric_db_url: dir.join("lyrics.db").to_string_lossy().into_owned(),
            index_path: dir.join("index.hnsw"),
            dimension: default_dimension(),
            neighbors_per_seed: default_neighbors_per_seed(),
            top_n: default_top_n(),
            lrclib_base_url: default_lrclib_base_url(),
            lyric_source_timeout_secs: default_lyric_source_timeout_secs(),
            embedding_model: default_embedding_model(),
        }
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(LyricRecError::Config("dimension must be at least 1".into()));
        }
        if !(1..=1000).contains(&self.neighbors_per_seed) {
            return Err(LyricRecError::Config(format!(
                "neighbors_per_seed must be within 1..=1000, got {}",
                self.neighbors_per_seed
            )));
        }
        if self.top_n == 0 {
            return Err(LyricRecError::Config("top_n must be at least 1".into()));
        }
        if self.lyric_db_url.is_empty() {
            return Err(LyricRecError::Config("lyric_db_url is empty".into()));
        }
        Ok(())
    }
}

/// Loads the application's configuration from a YAML file.
///
/// This function reads the file at the given path, parses it as YAML, and
/// validates the result.
///
/// # Errors
///
/// - `Storage` when the file cannot be read or is not valid YAML.
/// - `Config` when a value is out of range.
pub fn load_config(file: &str) -> Result<LyricRecConfig> {
    debug!("Loading config: {}", file);
    let content = fs::read_to_string(file)?;
    let config: LyricRecConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
