//! # VectorIndexStore
//!
//! Persistent nearest-neighbor index over lyric embeddings.
//!
//! This module wraps a [HNSW](https://arxiv.org/abs/1603.09320) approximate
//! nearest-neighbor index (`hora` crate) keyed by catalog item id. It is the only
//! component that mutates the index.
//!
//! ## Responsibilities
//! - **Build**: embed every cached lyric once, when no index exists yet.
//! - **Reconcile**: on startup, embed and insert the ids the persisted index has
//!   never seen, and retire the ids whose cached lyrics were removed or changed.
//! - **Persist**: write the index dump and its manifest; the manifest rename is
//!   the commit point.
//! - **Query**: k nearest ids to a vector, ascending Euclidean distance.
//!
//! ## Serialization layout
//! - `<index_path>.ids.yaml`: the manifest. `dimension`, the file name of the
//!   current dump (`blob`), and `slots`, where `slots[n]` is the catalog id and
//!   lyric fingerprint stored under internal slot `n`, or `null` once retired.
//! - `<index_path>.<random>.hnsw`: the `hora` index dump named by the manifest.
//!   Every persist writes a fresh dump, so a crash before the manifest is
//!   renamed leaves the previous dump and manifest pairing intact.
//!
//! HNSW has no delete. A retired slot keeps its vector in the graph but is
//! filtered out of every query; `index --rebuild` compacts them away.
//!
//! ## Quick Example
//! ```no_run
//! use lyricrec::embedding::{Embedder, MiniLmEmbedder};
//! use lyricrec::lyric_cache::LyricCache;
//! use lyricrec::vector_index::VectorIndexStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cache = LyricCache::open("lyrics.db")?;
//! let model = MiniLmEmbedder::load("sentence-transformers/all-MiniLM-L6-v2")?;
//! let store = VectorIndexStore::open_or_build("index.hnsw", 384, &cache.all()?, &model)?;
//! let q = model.embed("love and loss")?;
//! for hit in store.query(&q, 10)? {
//!     println!("{} {:.3}", hit.id, hit.distance);
//! }
//! # Ok(()) }
//! ```

use hora::core::ann_index::{ANNIndex, SerializableIndex};
use hora::core::metrics::Metric;
use hora::core::node::Node;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::embedding::{Embedder, euclidean_distance};
use crate::error::{LyricRecError, Result};
use crate::models::LyricRecord;

/// Records embedded per call to [`Embedder::embed_batch`].
const EMBED_CHUNK: usize = 64;

const BLOB_SUFFIX: &str = ".hnsw";

/// One query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub distance: f32,
}

/// What a [`VectorIndexStore::reconcile`] changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// Ids inserted, including re-embedded corrections.
    pub added: usize,
    /// Slots taken out of service.
    pub retired: usize,
}

impl Reconciled {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.retired > 0
    }
}

/// The catalog id held by one index slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SlotEntry {
    id: String,
    /// sha256 of the lyrics the vector was embedded from.
    fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct IndexManifest {
    dimension: usize,
    blob: Option<String>,
    slots: Vec<Option<SlotEntry>>,
}

/// A record waiting to be embedded.
struct Pending<'a> {
    id: &'a str,
    text: &'a str,
    fingerprint: String,
}

/// Id-keyed HNSW index with durable storage.
pub struct VectorIndexStore {
    index: HNSWIndex<f32, usize>,
    dimension: usize,
    /// `slots[slot]` is the entry stored under `slot`; `None` once retired.
    slots: Vec<Option<SlotEntry>>,
    /// Live ids only.
    known: HashMap<String, usize>,
    path: PathBuf,
    /// Dump the manifest on disk currently points at.
    blob: Option<PathBuf>,
}

impl VectorIndexStore {
    /// An empty index that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            index: HNSWIndex::new(dimension, &HNSWParams::default()),
            dimension,
            slots: Vec::new(),
            known: HashMap::new(),
            path: path.into(),
            blob: None,
        }
    }

    /// Location of the manifest for an index stored at `path`.
    pub fn manifest_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".ids.yaml");
        PathBuf::from(name)
    }

    /// Whether a persisted index exists at `path`.
    pub fn exists(path: &Path) -> bool {
        Self::manifest_path(path).is_file()
    }

    /// Initial bulk build: embed every record with lyrics and index it.
    ///
    /// Nothing is written to disk; call [`persist`](Self::persist) afterwards.
    /// Any embedding failure aborts the whole build.
    pub fn build_from(
        path: impl Into<PathBuf>,
        dimension: usize,
        records: &[LyricRecord],
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        check_embedder(embedder, dimension)?;
        let mut store = Self::new(path, dimension);
        let pending = pending(records);
        let vectors = store.embed(&pending, embedder)?;
        store.insert(&pending, &vectors)?;
        info!("Built index with {} vectors from {} lyric records", store.len(), records.len());
        Ok(store)
    }

    /// Reload a persisted index.
    ///
    /// Fails with `DimensionMismatch` when the index was created with a
    /// different dimension than `dimension`, and with `Storage` when the
    /// manifest or dump is missing or unreadable.
    pub fn load(path: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let path = path.into();
        let manifest_file = Self::manifest_path(&path);
        let manifest: IndexManifest = serde_yaml::from_str(&fs::read_to_string(&manifest_file)?)?;
        if manifest.dimension != dimension {
            return Err(LyricRecError::DimensionMismatch {
                expected: dimension,
                actual: manifest.dimension,
            });
        }

        let blob = manifest.blob.as_ref().map(|name| parent_dir(&path).join(name));
        let index = match &blob {
            Some(blob) => load_dump(blob, dimension)?,
            None if manifest.slots.is_empty() => HNSWIndex::new(dimension, &HNSWParams::default()),
            None => {
                return Err(LyricRecError::Storage(format!(
                    "{} lists {} slots but no index file",
                    manifest_file.display(),
                    manifest.slots.len()
                )));
            }
        };

        let mut known = HashMap::new();
        for (slot, entry) in manifest.slots.iter().enumerate() {
            let Some(entry) = entry else { continue };
            if known.insert(entry.id.clone(), slot).is_some() {
                return Err(LyricRecError::Storage(format!(
                    "{} lists {} more than once",
                    manifest_file.display(),
                    entry.id
                )));
            }
        }

        info!("Loaded index with {} vectors from {}", known.len(), path.display());
        Ok(Self {
            index,
            dimension,
            slots: manifest.slots,
            known,
            path,
            blob,
        })
    }

    /// Bring the index in line with `records`.
    ///
    /// Ids with lyrics the index has never seen are inserted. Indexed ids whose
    /// record is gone, confirmed absent, or holds different lyrics are retired;
    /// changed lyrics are embedded again under a new slot. Running it twice is a
    /// no-op. All new vectors are embedded before anything is modified, so an
    /// embedding failure leaves the index as it was.
    pub fn reconcile(&mut self, records: &[LyricRecord], embedder: &dyn Embedder) -> Result<Reconciled> {
        check_embedder(embedder, self.dimension)?;
        let wanted = pending(records);
        let fingerprints: HashMap<&str, &str> = wanted
            .iter()
            .map(|p| (p.id, p.fingerprint.as_str()))
            .collect();

        let stale: Vec<usize> = self
            .known
            .iter()
            .filter(|(id, slot)| {
                let indexed = self.slots[**slot].as_ref().map(|e| e.fingerprint.as_str());
                fingerprints.get(id.as_str()).copied() != indexed
            })
            .map(|(_, slot)| *slot)
            .collect();
        let missing: Vec<Pending<'_>> = wanted
            .into_iter()
            .filter(|p| !self.known.contains_key(p.id) || stale.contains(&self.known[p.id]))
            .collect();

        let vectors = self.embed(&missing, embedder)?;
        for slot in &stale {
            if let Some(entry) = self.slots[*slot].take() {
                debug!("Retiring index slot {} ({})", slot, entry.id);
                self.known.remove(&entry.id);
            }
        }
        self.insert(&missing, &vectors)?;

        let outcome = Reconciled {
            added: missing.len(),
            retired: stale.len(),
        };
        if outcome.changed() {
            info!(
                "Reconciled index: {} added, {} retired, {} live",
                outcome.added,
                outcome.retired,
                self.len()
            );
        } else {
            debug!("Reconciled index: nothing to do");
        }
        Ok(outcome)
    }

    /// Load-and-reconcile when a persisted index exists, otherwise build from
    /// scratch; persist in both cases.
    ///
    /// An index that exists but cannot be read is rebuilt from `records`.
    pub fn open_or_build(
        path: impl Into<PathBuf>,
        dimension: usize,
        records: &[LyricRecord],
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let path = path.into();
        let mut store = if Self::exists(&path) {
            match Self::load(&path, dimension) {
                Ok(mut store) => {
                    store.reconcile(records, embedder)?;
                    store
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Rebuilding index at {}: {}", path.display(), e);
                    Self::build_from(&path, dimension, records, embedder)?
                }
                Err(e) => return Err(e),
            }
        } else {
            Self::build_from(&path, dimension, records, embedder)?
        };
        store.persist()?;
        Ok(store)
    }

    /// Write the index dump and manifest to disk.
    ///
    /// The dump goes to a new file; the manifest naming it is written to a
    /// temporary file and renamed into place. Dumps the manifest no longer
    /// names are removed afterwards.
    pub fn persist(&mut self) -> Result<()> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(&dir)?;
        let stem = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LyricRecError::Storage(format!("bad index path {}", self.path.display())))?
            .to_string();

        let blob = if self.slots.is_empty() {
            None
        } else {
            let file = tempfile::Builder::new()
                .prefix(&format!("{stem}."))
                .suffix(BLOB_SUFFIX)
                .tempfile_in(&dir)?;
            let target = path_str(file.path())?;
            match panic::catch_unwind(AssertUnwindSafe(|| self.index.dump(&target))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(LyricRecError::Storage(format!("dumping index: {e}"))),
                Err(_) => return Err(LyricRecError::Storage(format!("dumping index to {target} failed"))),
            }
            let kept = file
                .into_temp_path()
                .keep()
                .map_err(|e| LyricRecError::Storage(e.to_string()))?;
            Some(kept)
        };

        let manifest = IndexManifest {
            dimension: self.dimension,
            blob: blob
                .as_ref()
                .and_then(|b| b.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            slots: self.slots.clone(),
        };
        if let Err(e) = write_manifest(&dir, &Self::manifest_path(&self.path), &manifest) {
            if let Some(blob) = &blob {
                let _ = fs::remove_file(blob);
            }
            return Err(e);
        }
        self.blob = blob;
        sweep_dumps(&dir, &stem, self.blob.as_deref());

        info!("Persisted index ({} vectors) to {}", self.len(), self.path.display());
        Ok(())
    }

    /// Up to `k` nearest ids to `vector`, ascending by Euclidean distance.
    ///
    /// An empty index answers with an empty list.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if vector.len() != self.dimension {
            return Err(LyricRecError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = self
            .index
            .search_nodes(vector, k + self.retired())
            .into_iter()
            .filter_map(|(node, _): (Node<f32, usize>, f32)| {
                let slot = (*node.idx())?;
                let entry = self.slots.get(slot)?.as_ref()?;
                Some(Neighbor {
                    id: entry.id.clone(),
                    distance: euclidean_distance(vector, node.vectors()),
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.known.contains_key(id)
    }

    /// Live vectors.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Slots still in the graph but filtered out of queries.
    pub fn retired(&self) -> usize {
        self.slots.len() - self.known.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ids currently indexed, in slot order.
    pub fn known_ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().flatten().map(|e| e.id.as_str())
    }

    /// Embed `pending` without touching the index.
    fn embed(&self, pending: &[Pending<'_>], embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>> {
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let pb = progress_bar(pending.len() as u64, "Embedding lyrics");
        let mut vectors = Vec::with_capacity(pending.len());
        for chunk in pending.chunks(EMBED_CHUNK) {
            let texts: Vec<&str> = chunk.iter().map(|p| p.text).collect();
            let batch = embedder.embed_batch(&texts)?;
            if batch.len() != chunk.len() {
                return Err(LyricRecError::embedder(format!(
                    "asked for {} embeddings, got {}",
                    chunk.len(),
                    batch.len()
                )));
            }
            vectors.extend(batch);
            pb.inc(chunk.len() as u64);
        }
        pb.finish_and_clear();

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(LyricRecError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }

    /// Insert each vector under a fresh slot and rebuild the graph.
    fn insert(&mut self, pending: &[Pending<'_>], vectors: &[Vec<f32>]) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        for (p, vector) in pending.iter().zip(vectors) {
            let slot = self.slots.len();
            self.index
                .add(vector, slot)
                .map_err(|e| LyricRecError::Storage(format!("inserting {}: {e}", p.id)))?;
            self.slots.push(Some(SlotEntry {
                id: p.id.to_string(),
                fingerprint: p.fingerprint.clone(),
            }));
            self.known.insert(p.id.to_string(), slot);
        }
        self.index
            .build(Metric::Euclidean)
            .map_err(|e| LyricRecError::Storage(format!("building index: {e}")))
    }
}

/// Records with lyrics, first occurrence of each id.
fn pending(records: &[LyricRecord]) -> Vec<Pending<'_>> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| Some((r.id.as_str(), r.text()?)))
        .filter(|(id, _)| seen.insert(*id))
        .map(|(id, text)| Pending {
            id,
            text,
            fingerprint: sha256::digest(text),
        })
        .collect()
}

/// hora panics instead of erroring on a missing or malformed dump.
fn load_dump(blob: &Path, dimension: usize) -> Result<HNSWIndex<f32, usize>> {
    if !blob.is_file() {
        return Err(LyricRecError::Storage(format!("index file {} is missing", blob.display())));
    }
    let file = path_str(blob)?;
    let index = match panic::catch_unwind(|| HNSWIndex::<f32, usize>::load(&file)) {
        Ok(Ok(index)) => index,
        Ok(Err(e)) => return Err(LyricRecError::Storage(format!("loading {file}: {e}"))),
        Err(_) => return Err(LyricRecError::Storage(format!("{file} is not a readable index"))),
    };
    if index.dimension() != dimension {
        return Err(LyricRecError::Storage(format!(
            "{file} holds {}-d vectors, manifest says {dimension}",
            index.dimension()
        )));
    }
    Ok(index)
}

fn write_manifest(dir: &Path, target: &Path, manifest: &IndexManifest) -> Result<()> {
    let mut sidecar = tempfile::Builder::new()
        .prefix(".index-ids-")
        .tempfile_in(dir)?;
    sidecar.write_all(serde_yaml::to_string(manifest)?.as_bytes())?;
    sidecar
        .persist(target)
        .map_err(|e| LyricRecError::Storage(e.to_string()))?;
    Ok(())
}

/// Remove dumps of the index named `stem` other than `keep`.
fn sweep_dumps(dir: &Path, stem: &str, keep: Option<&Path>) {
    let prefix = format!("{stem}.");
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Listing {} for old index files: {}", dir.display(), e);
            return;
        }
    };
    for path in entries.flatten().map(|e| e.path()) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) || !name.ends_with(BLOB_SUFFIX) || Some(path.as_path()) == keep {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed old index file {}", path.display()),
            Err(e) => warn!("Removing old index file {}: {}", path.display(), e),
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn check_embedder(embedder: &dyn Embedder, dimension: usize) -> Result<()> {
    if embedder.dimension() != dimension {
        return Err(LyricRecError::DimensionMismatch {
            expected: dimension,
            actual: embedder.dimension(),
        });
    }
    Ok(())
}

fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| LyricRecError::Storage(format!("non UTF-8 path {}", path.display())))
}

fn progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if len < EMBED_CHUNK as u64 {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    match ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => warn!("progress style: {e}"),
    }
    pb.set_message(msg.to_string());
    pb
}
