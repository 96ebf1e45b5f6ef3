//! # Lyric cache
//!
//! Durable SQLite store mapping a catalog item id to its lyrics, backed by
//! **Diesel**. Every id is in one of three states:
//!
//! | state               | stored as                           | re-query source? |
//! |---------------------|-------------------------------------|------------------|
//! | lyrics known        | row, `present = true`               | no               |
//! | confirmed absent    | row, `present = false`, empty text  | no               |
//! | never looked up     | no row                              | yes              |
//!
//! Negative lookups are cached exactly like positive ones: the external source
//! costs a network round-trip per song, so asking it twice about a song it has
//! already said it doesn't know is pure waste.
//!
//! Writes are first-writer-wins ([`LyricCache::put_if_absent`]); only the
//! explicit correction path ([`LyricCache::replace`]) overwrites.
//!
//! ## Quick start
//! ```no_run
//! use lyricrec::lyric_cache::{CachedLyrics, LyricCache};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cache = LyricCache::open("lyrics.db")?;
//! cache.put_if_absent("4uLU6hMCjMI75M1A2tKUQC", Some("never gonna give you up"))?;
//! cache.put_if_absent("instrumental-1", None)?;
//! assert_eq!(cache.get("instrumental-1")?, CachedLyrics::ConfirmedAbsent);
//! # Ok(()) }
//! ```

use diesel::prelude::*;
use diesel::{Connection, SqliteConnection};
use tracing::{debug, info};

use crate::catalog::CatalogItem;
use crate::error::Result;
use crate::lyric_source::{LyricLookup, LyricSource};
use crate::models::{LyricRecord, LyricRow};
use crate::schema::lyrics;

/// Tri-state answer of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedLyrics {
    Found(String),
    ConfirmedAbsent,
    Unknown,
}

/// Persistent lyric cache owning one SQLite connection.
pub struct LyricCache {
    connection: SqliteConnection,
}

impl LyricCache {
    /// Open (or create) the cache at `db_url` and make sure the table exists.
    ///
    /// `":memory:"` gives a private in-memory cache.
    pub fn open(db_url: &str) -> Result<Self> {
        let mut connection = SqliteConnection::establish(db_url)?;
        diesel::sql_query(
            "CREATE TABLE IF NOT EXISTS lyrics (
                id TEXT PRIMARY KEY NOT NULL,
                plain_lyrics TEXT NOT NULL DEFAULT '',
                present BOOLEAN NOT NULL
            )",
        )
        .execute(&mut connection)?;
        info!("Lyric cache open at {}", db_url);
        Ok(Self { connection })
    }

    /// Pure lookup; never touches the network.
    pub fn get(&mut self, id: &str) -> Result<CachedLyrics> {
        let row = lyrics::table
            .find(id)
            .select(LyricRow::as_select())
            .first(&mut self.connection)
            .optional()?;

        Ok(match row {
            Some(row) if row.present => CachedLyrics::Found(row.plain_lyrics),
            Some(_) => CachedLyrics::ConfirmedAbsent,
            None => CachedLyrics::Unknown,
        })
    }

    /// Insert a record unless `id` already has one.
    ///
    /// `None` (or blank text) records a confirmed-absent lookup. Returns
    /// whether a row was written; a repeat call is a no-op.
    pub fn put_if_absent(&mut self, id: &str, lyrics: Option<&str>) -> Result<bool> {
        let row = LyricRow::new(id, lyrics);
        let written = diesel::insert_or_ignore_into(lyrics::table)
            .values(&row)
            .execute(&mut self.connection)?;
        Ok(written > 0)
    }

    /// [`put_if_absent`](Self::put_if_absent) for many records in one transaction.
    ///
    /// Returns the number of rows actually written.
    pub fn put_many_if_absent<'a, I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let rows: Vec<LyricRow> = records
            .into_iter()
            .map(|(id, lyrics)| LyricRow::new(id, lyrics))
            .collect();

        let written = self.connection.transaction(|conn| {
            let mut written = 0;
            for row in &rows {
                written += diesel::insert_or_ignore_into(lyrics::table)
                    .values(row)
                    .execute(conn)?;
            }
            Ok::<_, diesel::result::Error>(written)
        })?;
        debug!("Bulk insert wrote {} of {} lyric records", written, rows.len());
        Ok(written)
    }

    /// Unconditional upsert, for explicit corrections.
    pub fn replace(&mut self, id: &str, lyrics: Option<&str>) -> Result<()> {
        let row = LyricRow::new(id, lyrics);
        diesel::replace_into(lyrics::table)
            .values(&row)
            .execute(&mut self.connection)?;
        info!("Replaced lyric record {}", id);
        Ok(())
    }

    /// Delete a record if it exists, so the next resolve asks the source again.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let removed = diesel::delete(lyrics::table.find(id)).execute(&mut self.connection)?;
        debug!("Removed {} lyric record(s) for {}", removed, id);
        Ok(())
    }

    /// Point-in-time snapshot of every record, ordered by id.
    ///
    /// A single `SELECT` runs against one SQLite read snapshot.
    pub fn all(&mut self) -> Result<Vec<LyricRecord>> {
        let rows = lyrics::table
            .select(LyricRow::as_select())
            .order(lyrics::id.asc())
            .load(&mut self.connection)?;
        Ok(rows.into_iter().map(LyricRecord::from).collect())
    }

    pub fn len(&mut self) -> Result<i64> {
        Ok(lyrics::table.count().get_result(&mut self.connection)?)
    }

    /// Fetch-on-miss: answer from the cache, asking `source` only for ids that
    /// were never looked up.
    ///
    /// Both a found and a not-found answer are remembered. A source failure is
    /// propagated and nothing is written, so the id stays `Unknown`.
    pub fn resolve(
        &mut self,
        item: &CatalogItem,
        source: &dyn LyricSource,
    ) -> Result<Option<String>> {
        match self.get(&item.id)? {
            CachedLyrics::Found(text) => return Ok(Some(text)),
            CachedLyrics::ConfirmedAbsent => return Ok(None),
            CachedLyrics::Unknown => {}
        }

        let answer = source.lookup(item)?;
        self.remember(&item.id, answer)
    }

    /// Store a lookup answer unless a record already exists, and return what
    /// the cache holds afterwards.
    ///
    /// When another writer got there first its record wins and is returned.
    pub fn remember(&mut self, id: &str, answer: LyricLookup) -> Result<Option<String>> {
        let inserted = match &answer {
            LyricLookup::Found(text) => self.put_if_absent(id, Some(text))?,
            LyricLookup::NotFound => self.put_if_absent(id, None)?,
        };
        if inserted {
            debug!("Cached lookup answer for {}", id);
        }
        match self.get(id)? {
            CachedLyrics::Found(text) => Ok(Some(text)),
            _ => Ok(None),
        }
    }
}
