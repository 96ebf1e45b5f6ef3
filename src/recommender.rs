//! # Recommender
//!
//! Ranks a catalog by cumulative lyric distance to a set of seed songs.
//!
//! [`ScoreAggregator`] holds the ranking algorithm:
//!
//! 1. Every catalog item starts *unset* (no evidence), not at zero.
//! 2. Each seed is embedded and its `k` nearest neighbors fetched; each hit's
//!    distance is added to that item's score (an unset score becomes the
//!    distance).
//! 3. Items never hit by any seed stay unset and are left out of the ranking.
//! 4. The rest are sorted ascending (lower = closer across all seeds); equal
//!    scores keep catalog order.
//!
//! Seeds are embedded and queried in parallel, but partial hit lists are folded
//! in seed order so repeated calls produce bit-identical scores.
//!
//! [`Recommender`] wires the aggregator to the lyric cache and the index and
//! enforces the locking discipline: queries share a read lock on the index,
//! build/reconcile/persist take the write lock, and the cache lock is never
//! held across a lyric source lookup.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogItem};
use crate::config::LyricRecConfig;
use crate::embedding::Embedder;
use crate::error::{LyricRecError, Result};
use crate::lyric_cache::{CachedLyrics, LyricCache};
use crate::lyric_source::LyricSource;
use crate::vector_index::{Neighbor, Reconciled, VectorIndexStore};

/// A query basis for one seed song.
#[derive(Debug, Clone, Copy)]
pub enum Seed<'a> {
    /// Lyrics still to be embedded.
    Lyrics(&'a str),
    /// An embedding computed earlier.
    Vector(&'a [f32]),
    /// Lyrics confirmed absent or never looked up; contributes nothing.
    Absent,
}

/// One ranked catalog item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    /// Cumulative distance over all seeds that hit this item.
    pub score: f32,
}

/// Running score per catalog position; `None` means never hit.
#[derive(Debug, Clone)]
pub struct ScoreBoard {
    scores: Vec<Option<f32>>,
}

impl ScoreBoard {
    /// All positions unset.
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            scores: vec![None; catalog.len()],
        }
    }

    /// Fold one seed's neighbors in. Hits outside the catalog are ignored.
    pub fn add_hits(&mut self, catalog: &Catalog, hits: &[Neighbor]) {
        for hit in hits {
            let Some(pos) = catalog.position(&hit.id) else {
                continue;
            };
            let score = &mut self.scores[pos];
            *score = Some(score.map_or(hit.distance, |s| s + hit.distance));
        }
    }

    pub fn score(&self, catalog: &Catalog, id: &str) -> Option<f32> {
        catalog.position(id).and_then(|pos| self.scores[pos])
    }

    /// Number of positions with a score.
    pub fn scored(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }
}

/// Multi-seed ranking over a [`VectorIndexStore`].
#[derive(Debug, Clone, Copy)]
pub struct ScoreAggregator {
    neighbors_per_seed: usize,
}

impl ScoreAggregator {
    pub fn new(neighbors_per_seed: usize) -> Self {
        Self { neighbors_per_seed }
    }

    pub fn neighbors_per_seed(&self) -> usize {
        self.neighbors_per_seed
    }

    /// Score every catalog item against `seeds`.
    ///
    /// Seeds run in parallel; any embedding or query failure fails the call.
    pub fn score(
        &self,
        index: &VectorIndexStore,
        embedder: &dyn Embedder,
        catalog: &Catalog,
        seeds: &[Seed<'_>],
    ) -> Result<ScoreBoard> {
        let hit_lists = seeds
            .par_iter()
            .map(|seed| match *seed {
                Seed::Lyrics(text) if !text.trim().is_empty() => {
                    let vector = embedder.embed(text)?;
                    index.query(&vector, self.neighbors_per_seed)
                }
                Seed::Vector(vector) => index.query(vector, self.neighbors_per_seed),
                Seed::Lyrics(_) | Seed::Absent => Ok(Vec::new()),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut board = ScoreBoard::new(catalog);
        for hits in &hit_lists {
            board.add_hits(catalog, hits);
        }
        debug!(
            "Scored {} of {} catalog items from {} seeds",
            board.scored(),
            catalog.len(),
            seeds.len()
        );
        Ok(board)
    }

    /// Top `top_n` scored items, ascending by score, skipping `exclude`.
    pub fn rank(
        &self,
        catalog: &Catalog,
        board: &ScoreBoard,
        top_n: usize,
        exclude: &HashSet<&str>,
    ) -> Vec<Recommendation> {
        let mut ranked: Vec<(usize, f32)> = board
            .scores
            .iter()
            .enumerate()
            .filter_map(|(pos, score)| score.map(|s| (pos, s)))
            .filter(|(pos, _)| !exclude.contains(catalog.items()[*pos].id.as_str()))
            .collect();

        // stable: equal scores keep catalog order
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        ranked
            .into_iter()
            .take(top_n)
            .map(|(pos, score)| {
                let item = &catalog.items()[pos];
                Recommendation {
                    id: item.id.clone(),
                    name: item.name.clone(),
                    artists: item.artists.clone(),
                    album: item.album.clone(),
                    score,
                }
            })
            .collect()
    }

    /// [`score`](Self::score) then [`rank`](Self::rank).
    pub fn recommend(
        &self,
        index: &VectorIndexStore,
        embedder: &dyn Embedder,
        catalog: &Catalog,
        seeds: &[Seed<'_>],
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        let board = self.score(index, embedder, catalog, seeds)?;
        Ok(self.rank(catalog, &board, top_n, &HashSet::new()))
    }
}

/// Per-request knobs for [`Recommender::recommend`].
#[derive(Debug, Clone)]
pub struct RecommendOptions {
    pub top_n: usize,
    /// Leave the seed songs themselves out of the result.
    pub exclude_seeds: bool,
}

/// Outcome counts of [`Recommender::ingest`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub with_lyrics: usize,
    pub confirmed_absent: usize,
    pub failed: usize,
    pub indexed: usize,
    pub retired: usize,
}

/// Lyric cache + index + embedder behind the single-writer discipline.
pub struct Recommender {
    cache: Mutex<LyricCache>,
    index: RwLock<VectorIndexStore>,
    embedder: Box<dyn Embedder>,
    aggregator: ScoreAggregator,
}

impl Recommender {
    /// Assemble from already-open parts.
    pub fn new(
        cache: LyricCache,
        index: VectorIndexStore,
        embedder: Box<dyn Embedder>,
        neighbors_per_seed: usize,
    ) -> Self {
        Self {
            cache: Mutex::new(cache),
            index: RwLock::new(index),
            embedder,
            aggregator: ScoreAggregator::new(neighbors_per_seed),
        }
    }

    /// Open the cache, then load-and-reconcile or build the index.
    pub fn open(config: &LyricRecConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let mut cache = LyricCache::open(&config.lyric_db_url)?;
        let records = cache.all()?;
        let index = VectorIndexStore::open_or_build(
            &config.index_path,
            config.dimension,
            &records,
            embedder.as_ref(),
        )?;
        Ok(Self::new(cache, index, embedder, config.neighbors_per_seed))
    }

    fn cache(&self) -> Result<MutexGuard<'_, LyricCache>> {
        self.cache
            .lock()
            .map_err(|_| LyricRecError::Storage("lyric cache lock poisoned".into()))
    }

    /// Run `f` against the cache.
    pub fn with_cache<T>(&self, f: impl FnOnce(&mut LyricCache) -> Result<T>) -> Result<T> {
        f(&mut *self.cache()?)
    }

    /// Bring the index up to date with the cache and persist it.
    ///
    /// Takes the cache snapshot first, so every write that returned before this
    /// call is included.
    pub fn sync_index(&self) -> Result<Reconciled> {
        let records = self.cache()?.all()?;
        let mut index = self
            .index
            .write()
            .map_err(|_| LyricRecError::Storage("index lock poisoned".into()))?;
        let outcome = index.reconcile(&records, self.embedder.as_ref())?;
        if outcome.changed() {
            index.persist()?;
        }
        Ok(outcome)
    }

    /// Delete a cached lyric record and take its vector out of the index.
    pub fn forget(&self, id: &str) -> Result<Reconciled> {
        self.cache()?.remove(id)?;
        self.sync_index()
    }

    /// Overwrite a cached lyric record; the index follows the new lyrics.
    pub fn correct(&self, id: &str, lyrics: Option<&str>) -> Result<Reconciled> {
        self.cache()?.replace(id, lyrics)?;
        self.sync_index()
    }

    /// Fetch-on-miss without holding the cache lock during the lookup.
    fn resolve(&self, item: &CatalogItem, source: &dyn LyricSource) -> Result<Option<String>> {
        match self.cache()?.get(&item.id)? {
            CachedLyrics::Found(text) => return Ok(Some(text)),
            CachedLyrics::ConfirmedAbsent => return Ok(None),
            CachedLyrics::Unknown => {}
        }
        let answer = source.lookup(item)?;
        self.cache()?.remember(&item.id, answer)
    }

    /// Drop the index and rebuild it from every cached lyric.
    pub fn rebuild_index(&self) -> Result<usize> {
        let records = self.cache()?.all()?;
        let mut index = self
            .index
            .write()
            .map_err(|_| LyricRecError::Storage("index lock poisoned".into()))?;
        let mut fresh = VectorIndexStore::build_from(
            index.path().to_path_buf(),
            index.dimension(),
            &records,
            self.embedder.as_ref(),
        )?;
        fresh.persist()?;
        *index = fresh;
        Ok(index.len())
    }

    /// Resolve lyrics for every catalog item, then sync the index.
    ///
    /// A failed lookup is logged and counted; the item stays unknown and is
    /// retried on the next ingest.
    pub fn ingest(&self, catalog: &Catalog, source: &dyn LyricSource) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let pb = indicatif::ProgressBar::new(catalog.len() as u64);
        for item in catalog.items() {
            match self.resolve(item, source) {
                Ok(Some(_)) => report.with_lyrics += 1,
                Ok(None) => report.confirmed_absent += 1,
                Err(e @ LyricRecError::ProviderUnavailable { .. }) => {
                    warn!("Lyric lookup for {} failed: {}", item.id, e);
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let outcome = self.sync_index()?;
        report.indexed = outcome.added;
        report.retired = outcome.retired;
        info!("Ingest finished: {:?}", report);
        Ok(report)
    }

    /// Recommend catalog items for the seed ids.
    ///
    /// Every seed must be in `catalog`. A seed's stored vector is used when the
    /// catalog carries one; otherwise its cached lyrics are embedded. With a
    /// `source`, seeds never looked up are resolved first; without one they are
    /// skipped like confirmed-absent seeds.
    pub fn recommend(
        &self,
        catalog: &Catalog,
        seed_ids: &[&str],
        options: &RecommendOptions,
        source: Option<&dyn LyricSource>,
    ) -> Result<Vec<Recommendation>> {
        let items = seed_ids
            .iter()
            .map(|id| catalog.require(id))
            .collect::<Result<Vec<_>>>()?;

        let mut lyrics: Vec<Option<String>> = Vec::with_capacity(items.len());
        for item in &items {
            if item.vector.is_some() {
                lyrics.push(None);
                continue;
            }
            let cached = self.cache()?.get(&item.id)?;
            let text = match (cached, source) {
                (CachedLyrics::Found(text), _) => Some(text),
                (CachedLyrics::ConfirmedAbsent, _) => None,
                (CachedLyrics::Unknown, Some(source)) => self.resolve(item, source)?,
                (CachedLyrics::Unknown, None) => None,
            };
            if text.is_none() {
                debug!("Seed {} has no lyrics, skipped", item.id);
            }
            lyrics.push(text);
        }

        let seeds: Vec<Seed<'_>> = items
            .iter()
            .zip(&lyrics)
            .map(|(item, text)| match (item.vector.as_deref(), text) {
                (Some(vector), _) => Seed::Vector(vector),
                (None, Some(text)) => Seed::Lyrics(text),
                (None, None) => Seed::Absent,
            })
            .collect();

        let index = self
            .index
            .read()
            .map_err(|_| LyricRecError::Storage("index lock poisoned".into()))?;
        let board = self
            .aggregator
            .score(&index, self.embedder.as_ref(), catalog, &seeds)?;

        let exclude: HashSet<&str> = if options.exclude_seeds {
            seed_ids.iter().copied().collect()
        } else {
            HashSet::new()
        };
        let ranked = self.aggregator.rank(catalog, &board, options.top_n, &exclude);
        info!(
            "Recommended {} items from {} seeds (k = {})",
            ranked.len(),
            seed_ids.len(),
            self.aggregator.neighbors_per_seed()
        );
        Ok(ranked)
    }

    /// Number of vectors in the index.
    pub fn indexed(&self) -> Result<usize> {
        Ok(self
            .index
            .read()
            .map_err(|_| LyricRecError::Storage("index lock poisoned".into()))?
            .len())
    }

    pub fn is_indexed(&self, id: &str) -> Result<bool> {
        Ok(self
            .index
            .read()
            .map_err(|_| LyricRecError::Storage("index lock poisoned".into()))?
            .contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::item;
    use crate::embedding::testing::HashingEmbedder;
    use crate::lyric_source::LyricLookup;
    use crate::models::LyricRecord;

    const DIM: usize = 32;

    fn record(id: &str, lyrics: &str) -> LyricRecord {
        LyricRecord {
            id: id.to_string(),
            lyrics: Some(lyrics.to_string()),
        }
    }

    fn love_catalog() -> (Catalog, Vec<LyricRecord>) {
        let catalog = Catalog::new(vec![
            item("A", "Heartache"),
            item("B", "Friday"),
            item("C", "Heartache (Live)"),
            item("D", "Unrelated"),
        ]);
        let records = vec![
            record("A", "love and loss"),
            record("B", "dancing all night"),
            record("C", "love and loss"),
            record("D", "tractor engine diesel"),
        ];
        (catalog, records)
    }

    fn build(records: &[LyricRecord], embedder: &HashingEmbedder) -> (tempfile::TempDir, VectorIndexStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorIndexStore::build_from(dir.path().join("i.hnsw"), DIM, records, embedder).unwrap();
        (dir, store)
    }

    #[test]
    fn identical_lyrics_rank_first_with_equal_scores() {
        let embedder = HashingEmbedder::new(DIM);
        let (catalog, records) = love_catalog();
        let (_dir, index) = build(&records, &embedder);

        let ranked = ScoreAggregator::new(2)
            .recommend(&index, &embedder, &catalog, &[Seed::Lyrics("love and loss")], 10)
            .unwrap();

        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["A", "C"]);
        assert_eq!(ranked[0].score, ranked[1].score);
    }

    #[test]
    fn never_hit_items_are_not_ranked() {
        let embedder = HashingEmbedder::new(DIM);
        let (catalog, records) = love_catalog();
        let (_dir, index) = build(&records, &embedder);

        let aggregator = ScoreAggregator::new(1);
        let board = aggregator
            .score(&index, &embedder, &catalog, &[Seed::Lyrics("dancing all night")])
            .unwrap();
        assert_eq!(board.scored(), 1);
        assert_eq!(board.score(&catalog, "A"), None);

        let ranked = aggregator.rank(&catalog, &board, 10, &HashSet::new());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "B");
        assert!(ranked[0].score < 1e-6);
    }

    #[test]
    fn absent_seeds_contribute_nothing() {
        let embedder = HashingEmbedder::new(DIM);
        let (catalog, records) = love_catalog();
        let (_dir, index) = build(&records, &embedder);

        let ranked = ScoreAggregator::new(4)
            .recommend(&index, &embedder, &catalog, &[Seed::Absent, Seed::Lyrics("  ")], 10)
            .unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn extra_seed_never_lowers_existing_scores() {
        let embedder = HashingEmbedder::new(DIM);
        let (catalog, records) = love_catalog();
        let (_dir, index) = build(&records, &embedder);
        let aggregator = ScoreAggregator::new(3);

        let one = aggregator
            .score(&index, &embedder, &catalog, &[Seed::Lyrics("love and loss")])
            .unwrap();
        let two = aggregator
            .score(
                &index,
                &embedder,
                &catalog,
                &[Seed::Lyrics("love and loss"), Seed::Lyrics("dancing all night")],
            )
            .unwrap();

        for it in catalog.items() {
            if let Some(before) = one.score(&catalog, &it.id) {
                let after = two.score(&catalog, &it.id).unwrap();
                assert!(after >= before, "{} went from {} to {}", it.id, before, after);
            }
        }
        assert!(two.scored() >= one.scored());
    }

    #[test]
    fn repeated_calls_are_identical() {
        let embedder = HashingEmbedder::new(DIM);
        let (catalog, records) = love_catalog();
        let (_dir, index) = build(&records, &embedder);
        let aggregator = ScoreAggregator::new(3);
        let seeds = [
            Seed::Lyrics("love and loss"),
            Seed::Lyrics("dancing all night"),
            Seed::Lyrics("diesel love"),
        ];

        let first = aggregator.recommend(&index, &embedder, &catalog, &seeds, 3).unwrap();
        for _ in 0..5 {
            assert_eq!(aggregator.recommend(&index, &embedder, &catalog, &seeds, 3).unwrap(), first);
        }
    }

    #[test]
    fn vector_seeds_skip_embedding() {
        let embedder = HashingEmbedder::new(DIM);
        let (catalog, records) = love_catalog();
        let (_dir, index) = build(&records, &embedder);
        let v = embedder.embed("dancing all night").unwrap();

        let calls = embedder.calls();
        let ranked = ScoreAggregator::new(1)
            .recommend(&index, &embedder, &catalog, &[Seed::Vector(&v)], 5)
            .unwrap();
        assert_eq!(embedder.calls(), calls);
        assert_eq!(ranked[0].id, "B");
    }

    #[test]
    fn hits_outside_catalog_are_dropped() {
        let embedder = HashingEmbedder::new(DIM);
        let (_, records) = love_catalog();
        let (_dir, index) = build(&records, &embedder);
        let catalog = Catalog::new(vec![item("B", "Friday")]);

        let ranked = ScoreAggregator::new(4)
            .recommend(&index, &embedder, &catalog, &[Seed::Lyrics("love and loss")], 10)
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "B");
    }

    struct FixedSource(&'static str);

    impl LyricSource for FixedSource {
        fn lookup(&self, _item: &crate::catalog::CatalogItem) -> Result<LyricLookup> {
            Ok(LyricLookup::Found(self.0.to_string()))
        }
    }

    fn recommender(dir: &tempfile::TempDir) -> Recommender {
        let mut config = LyricRecConfig::in_dir(dir.path());
        config.dimension = DIM;
        config.neighbors_per_seed = 2;
        Recommender::open(&config, Box::new(HashingEmbedder::new(DIM))).unwrap()
    }

    #[test]
    fn service_ingests_then_recommends() {
        let dir = tempfile::tempdir().unwrap();
        let service = recommender(&dir);
        let (catalog, records) = love_catalog();
        service
            .with_cache(|cache| {
                cache.put_many_if_absent(records.iter().map(|r| (r.id.as_str(), r.text())))
            })
            .unwrap();

        let report = service.ingest(&catalog, &FixedSource("unused")).unwrap();
        assert_eq!(report.with_lyrics, 4);
        assert_eq!(report.indexed, 4);
        assert_eq!(service.indexed().unwrap(), 4);

        let options = RecommendOptions {
            top_n: 10,
            exclude_seeds: true,
        };
        let ranked = service.recommend(&catalog, &["A"], &options, None).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["C"]);
    }

    #[test]
    fn service_resolves_unknown_seed_through_source() {
        let dir = tempfile::tempdir().unwrap();
        let service = recommender(&dir);
        let (catalog, records) = love_catalog();
        service
            .with_cache(|cache| {
                cache.put_many_if_absent(records.iter().skip(1).map(|r| (r.id.as_str(), r.text())))
            })
            .unwrap();
        service.sync_index().unwrap();
        assert!(!service.is_indexed("A").unwrap());

        let options = RecommendOptions {
            top_n: 10,
            exclude_seeds: false,
        };
        assert!(service.recommend(&catalog, &["A"], &options, None).unwrap().is_empty());

        let ranked = service
            .recommend(&catalog, &["A"], &options, Some(&FixedSource("love and loss")))
            .unwrap();
        assert_eq!(ranked[0].id, "C");
        assert_eq!(
            service.with_cache(|cache| cache.get("A")).unwrap(),
            CachedLyrics::Found("love and loss".into())
        );
    }

    #[test]
    fn service_reopen_reconciles_new_cache_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let service = recommender(&dir);
            service
                .with_cache(|cache| cache.put_if_absent("1", Some("one fish")))
                .unwrap();
            assert_eq!(service.sync_index().unwrap().added, 1);
            service
                .with_cache(|cache| cache.put_if_absent("2", Some("two fish")))
                .unwrap();
        }
        let service = recommender(&dir);
        assert!(service.is_indexed("1").unwrap());
        assert!(service.is_indexed("2").unwrap());
        assert_eq!(service.rebuild_index().unwrap(), 2);
    }

    fn options(exclude_seeds: bool) -> RecommendOptions {
        RecommendOptions {
            top_n: 10,
            exclude_seeds,
        }
    }

    fn seeded(dir: &tempfile::TempDir, records: &[LyricRecord]) -> Recommender {
        let service = recommender(dir);
        service
            .with_cache(|cache| {
                cache.put_many_if_absent(records.iter().map(|r| (r.id.as_str(), r.text())))
            })
            .unwrap();
        service.sync_index().unwrap();
        service
    }

    fn ranked_ids(ranked: &[Recommendation]) -> Vec<&str> {
        ranked.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn lyrics_corrected_to_absent_leave_the_index_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, _) = love_catalog();
        {
            let service = seeded(&dir, &[record("A", "love and loss"), record("B", "love and loss")]);
            assert!(service.is_indexed("B").unwrap());
            service.with_cache(|cache| cache.replace("B", None)).unwrap();
        }

        let service = recommender(&dir);
        assert_eq!(
            service.with_cache(|cache| cache.get("B")).unwrap(),
            CachedLyrics::ConfirmedAbsent
        );
        assert!(!service.is_indexed("B").unwrap());
        let ranked = service.recommend(&catalog, &["A"], &options(true), None).unwrap();
        assert!(ranked.is_empty(), "{:?}", ranked_ids(&ranked));
    }

    #[test]
    fn correct_and_forget_update_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, records) = love_catalog();
        let service = seeded(&dir, &records);
        assert_eq!(
            ranked_ids(&service.recommend(&catalog, &["A"], &options(true), None).unwrap()),
            ["C"]
        );

        let outcome = service.correct("C", None).unwrap();
        assert_eq!(outcome.retired, 1);
        assert!(!service.is_indexed("C").unwrap());
        assert!(
            !ranked_ids(&service.recommend(&catalog, &["A"], &options(true), None).unwrap()).contains(&"C")
        );

        let outcome = service.correct("B", Some("love and loss")).unwrap();
        assert_eq!((outcome.added, outcome.retired), (1, 1));
        let ranked = service.recommend(&catalog, &["A"], &options(true), None).unwrap();
        assert_eq!(ranked[0].id, "B");
        assert!(ranked[0].score < 1e-6);

        service.forget("B").unwrap();
        assert_eq!(service.with_cache(|cache| cache.get("B")).unwrap(), CachedLyrics::Unknown);
        assert!(!service.is_indexed("B").unwrap());
        drop(service);

        let service = recommender(&dir);
        assert!(!service.is_indexed("B").unwrap());
        assert!(!service.is_indexed("C").unwrap());
        assert_eq!(service.indexed().unwrap(), 2);
        let ranked = service.recommend(&catalog, &["A"], &options(true), None).unwrap();
        assert!(ranked.iter().all(|r| r.id != "B" && r.id != "C"));
    }

    #[test]
    fn unknown_seed_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, records) = love_catalog();
        let service = seeded(&dir, &records);

        let err = service
            .recommend(&catalog, &["A", "nope"], &options(false), None)
            .unwrap_err();
        assert!(matches!(err, LyricRecError::UnknownItem(ref id) if id == "nope"), "{err}");
    }

    /// Reports whether the cache lock was free while it was being asked.
    struct LockCheckingSource<'a> {
        service: &'a Recommender,
        lookups: std::sync::atomic::AtomicUsize,
        cache_was_locked: std::sync::atomic::AtomicBool,
    }

    impl LyricSource for LockCheckingSource<'_> {
        fn lookup(&self, _item: &crate::catalog::CatalogItem) -> Result<LyricLookup> {
            use std::sync::atomic::Ordering;
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.service.cache.try_lock().is_err() {
                self.cache_was_locked.store(true, Ordering::SeqCst);
            }
            Ok(LyricLookup::Found("love and loss".into()))
        }
    }

    #[test]
    fn lookups_run_without_the_cache_lock() {
        use std::sync::atomic::Ordering;
        let dir = tempfile::tempdir().unwrap();
        let (catalog, records) = love_catalog();
        let service = seeded(&dir, &records[1..]);
        let source = LockCheckingSource {
            service: &service,
            lookups: Default::default(),
            cache_was_locked: Default::default(),
        };

        let ranked = service.recommend(&catalog, &["A"], &options(true), Some(&source)).unwrap();
        assert_eq!(ranked_ids(&ranked)[0], "C");
        service.with_cache(|cache| cache.remove("A")).unwrap();
        service.ingest(&catalog, &source).unwrap();

        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
        assert!(!source.cache_was_locked.load(Ordering::SeqCst));
    }
}
