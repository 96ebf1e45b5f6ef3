//! Main module for the lyricrec CLI application.
//!
//! Handles command parsing, configuration loading and initialization, and
//! invokes the library for the requested subcommand.
//!
//! # Examples
//!
//! ```sh
//! lyricrec init
//! lyricrec ingest playlist.json
//! lyricrec recommend playlist.json -s 4uLU6hMCjMI75M1A2tKUQC -s 0VjIjW4GlUZAMYd2vXMi3b -n 20
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lyricrec::{
    catalog::Catalog,
    commands::{Cli, Commands},
    config::{self, LyricRecConfig},
    config_dir,
    embedding::MiniLmEmbedder,
    lyric_cache::{CachedLyrics, LyricCache},
    lyric_source::{LrclibClient, LyricSource},
    recommender::{RecommendOptions, Recommender},
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    });
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };

    let load = || {
        debug!("Loading config from: {}", config_path.display());
        config::load_config(&config_path.to_string_lossy())
    };

    match cli.command {
        Commands::Init => init(&config_path)?,
        Commands::Ingest { catalog } => {
            let config = load()?;
            let catalog = Catalog::load(catalog)?;
            let service = open_service(&config)?;
            let source = lyric_source(&config)?;
            let report = service.ingest(&catalog, &source)?;
            println!(
                "{} with lyrics, {} without, {} failed, {} newly indexed, {} retired",
                report.with_lyrics,
                report.confirmed_absent,
                report.failed,
                report.indexed,
                report.retired
            );
        }
        Commands::Index { rebuild } => {
            let config = load()?;
            let service = open_service(&config)?;
            if rebuild {
                let total = service.rebuild_index()?;
                println!("Rebuilt index with {total} vectors");
            } else {
                println!("Index holds {} vectors", service.indexed()?);
            }
        }
        Commands::Recommend {
            catalog,
            seeds,
            neighbors,
            top,
            exclude_seeds,
            fetch,
            json,
        } => {
            let mut config = load()?;
            if let Some(k) = neighbors {
                config.neighbors_per_seed = k;
            }
            let catalog = Catalog::load(catalog)?;
            let service = open_service(&config)?;
            let source = if fetch {
                Some(lyric_source(&config)?)
            } else {
                None
            };
            let seed_ids: Vec<&str> = seeds.iter().map(String::as_str).collect();
            let options = RecommendOptions {
                top_n: top.unwrap_or(config.top_n),
                exclude_seeds,
            };
            let ranked = service.recommend(
                &catalog,
                &seed_ids,
                &options,
                source.as_ref().map(|s| s as &dyn LyricSource),
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else {
                for (rank, rec) in ranked.iter().enumerate() {
                    println!(
                        "{:>3}. {:<40} {:<30} {:.4}",
                        rank + 1,
                        rec.name,
                        rec.artists.join(", "),
                        rec.score
                    );
                }
            }
        }
        Commands::Lyrics { id } => {
            let config = load()?;
            let mut cache = LyricCache::open(&config.lyric_db_url)?;
            match cache.get(&id)? {
                CachedLyrics::Found(text) => println!("{text}"),
                CachedLyrics::ConfirmedAbsent => println!("{id}: looked up, no lyrics exist"),
                CachedLyrics::Unknown => println!("{id}: never looked up"),
            }
        }
        Commands::Forget { id } => {
            let config = load()?;
            let outcome = open_service(&config)?.forget(&id)?;
            println!("Forgot {id} ({} vectors retired)", outcome.retired);
        }
        Commands::Correct { id, file } => {
            let config = load()?;
            let text = fs::read_to_string(&file)?;
            let outcome = open_service(&config)?.correct(&id, Some(&text))?;
            println!(
                "Corrected {id} ({} vectors added, {} retired)",
                outcome.added, outcome.retired
            );
        }
    }

    Ok(())
}

fn open_service(config: &LyricRecConfig) -> Result<Recommender, Box<dyn Error>> {
    let embedder = MiniLmEmbedder::load(&config.embedding_model)?;
    Ok(Recommender::open(config, Box::new(embedder))?)
}

fn lyric_source(config: &LyricRecConfig) -> Result<LrclibClient, Box<dyn Error>> {
    Ok(LrclibClient::new(
        &config.lrclib_base_url,
        Duration::from_secs(config.lyric_source_timeout_secs),
    )?)
}

/// Creates the configuration directory and a default config file.
///
/// Storage paths default to the same directory as the config file.
fn init(config_path: &Path) -> Result<(), Box<dyn Error>> {
    let dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Creating config directory: {}", dir.display());
    fs::create_dir_all(&dir)?;

    let config = LyricRecConfig::in_dir(&dir);
    info!("Creating config file: {}", config_path.display());
    fs::write(config_path, serde_yaml::to_string(&config)?)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
