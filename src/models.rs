//! # Database models
//!
//! Row types that map to the lyric cache's SQLite schema via **Diesel**, plus
//! the domain-level [`LyricRecord`] the rest of the crate consumes.
//!
//! ## Table
//!
//! `lyrics` (see [`crate::schema`]):
//!
//! | column         | type | meaning                                            |
//! |----------------|------|----------------------------------------------------|
//! | `id`           | TEXT | catalog item id, primary key                       |
//! | `plain_lyrics` | TEXT | lyric text, empty when `present` is false          |
//! | `present`      | BOOL | `false` = looked up, confirmed absent              |
//!
//! A row only exists once a lookup has happened, so "never looked up" is the
//! absence of a row.
use diesel::prelude::*;

/// One row of the `lyrics` table.
#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::lyrics)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LyricRow {
    pub id: String,
    pub plain_lyrics: String,
    pub present: bool,
}

impl LyricRow {
    /// Build a row, folding blank text into the confirmed-absent state.
    pub fn new(id: &str, lyrics: Option<&str>) -> Self {
        match lyrics {
            Some(text) if !text.trim().is_empty() => Self {
                id: id.to_string(),
                plain_lyrics: text.to_string(),
                present: true,
            },
            _ => Self {
                id: id.to_string(),
                plain_lyrics: String::new(),
                present: false,
            },
        }
    }
}

/// A cached lookup result: `lyrics` is `None` for confirmed-absent items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricRecord {
    pub id: String,
    pub lyrics: Option<String>,
}

impl LyricRecord {
    /// Lyric text, only when the item has some.
    pub fn text(&self) -> Option<&str> {
        self.lyrics.as_deref()
    }
}

impl From<LyricRow> for LyricRecord {
    fn from(row: LyricRow) -> Self {
        Self {
            id: row.id,
            lyrics: row.present.then_some(row.plain_lyrics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_stored_as_absent() {
        let row = LyricRow::new("x", Some("   \n"));
        assert!(!row.present);
        assert_eq!(LyricRecord::from(row).lyrics, None);
    }

    #[test]
    fn text_is_kept_verbatim() {
        let row = LyricRow::new("x", Some("love and loss\n"));
        assert!(row.present);
        assert_eq!(LyricRecord::from(row).text(), Some("love and loss\n"));
    }
}
