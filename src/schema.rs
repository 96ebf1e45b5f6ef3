// Mirrors the table created by `LyricCache::open`.

diesel::table! {
    lyrics (id) {
        id -> Text,
        plain_lyrics -> Text,
        present -> Bool,
    }
}
