//! # Catalog snapshot
//!
//! Catalog items arrive from an external music catalog. The engine only needs a
//! point-in-time snapshot of them, read from a JSON array:
//!
//! ```json
//! [
//!   { "id": "4uLU6hMCjMI75M1A2tKUQC", "name": "Never Gonna Give You Up",
//!     "artists": ["Rick Astley"], "album": "Whenever You Need Somebody",
//!     "duration_ms": 213573 }
//! ]
//! ```
//!
//! Snapshot order matters: recommendations with equal scores keep it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{LyricRecError, Result};

/// One song in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Stable, unique catalog identifier.
    pub id: String,
    /// Display name (track title).
    pub name: String,
    /// Contributing artists, primary artist first.
    #[serde(default)]
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
    /// Embedding, filled in lazily once lyrics are known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl CatalogItem {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    /// Duration rounded to whole seconds, as lyric providers expect it.
    pub fn duration_secs(&self) -> u64 {
        (self.duration_ms + 500) / 1000
    }
}

/// An ordered, id-addressable set of catalog items.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    positions: HashMap<String, usize>,
}

impl Catalog {
    /// Build a snapshot; a repeated id keeps its first occurrence.
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let mut kept = Vec::with_capacity(items.len());
        let mut positions = HashMap::with_capacity(items.len());
        for item in items {
            if positions.contains_key(&item.id) {
                tracing::warn!("Duplicate catalog id {} ignored", item.id);
                continue;
            }
            positions.insert(item.id.clone(), kept.len());
            kept.push(item);
        }
        Self {
            items: kept,
            positions,
        }
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            LyricRecError::Storage(format!("reading catalog {}: {e}", path.display()))
        })?;
        let items: Vec<CatalogItem> = serde_json::from_str(&content)?;
        tracing::debug!("Loaded {} catalog items from {}", items.len(), path.display());
        Ok(Self::new(items))
    }

    /// Position of `id` in snapshot order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.positions.get(id).map(|&pos| &self.items[pos])
    }

    /// Look up an id that must exist.
    pub fn require(&self, id: &str) -> Result<&CatalogItem> {
        self.get(id)
            .ok_or_else(|| LyricRecError::UnknownItem(id.to_string()))
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn item(id: &str, name: &str) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: name.to_string(),
        artists: vec!["Test Artist".to_string()],
        album: "Test Album".to_string(),
        duration_ms: 180_000,
        vector: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let catalog = Catalog::new(vec![item("a", "first"), item("b", "b"), item("a", "second")]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("a").unwrap().name, "first");
        assert_eq!(catalog.items()[1].id, "b");
    }

    #[test]
    fn require_reports_unknown_ids() {
        let catalog = Catalog::new(vec![item("a", "a")]);
        assert!(matches!(
            catalog.require("zz"),
            Err(LyricRecError::UnknownItem(id)) if id == "zz"
        ));
    }

    #[test]
    fn load_reads_json_snapshot() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"[{{"id":"x1","name":"Song","artists":["A","B"],"album":"Al","duration_ms":213573}}]"#
        )
        .unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        let song = catalog.require("x1").unwrap();
        assert_eq!(song.primary_artist(), "A");
        assert_eq!(song.duration_secs(), 214);
        assert!(song.vector.is_none());
    }
}
