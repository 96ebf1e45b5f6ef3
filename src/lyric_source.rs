//! # Lyric source
//!
//! The external lookup that fills the lyric cache on a miss. The engine only
//! depends on the [`LyricSource`] trait; [`LrclibClient`] is the production
//! implementation talking to the [LRCLIB](https://lrclib.net/docs) HTTP API.
//!
//! A lookup has three outcomes:
//! - `Ok(LyricLookup::Found(text))`
//! - `Ok(LyricLookup::NotFound)`: the provider confirmed there is nothing to find
//!   (unknown track, or an instrumental with no plain lyrics)
//! - `Err(ProviderUnavailable)`: anything else, nothing is learned

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::catalog::CatalogItem;
use crate::error::{LyricRecError, Result};

/// Result of one external lyric lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricLookup {
    Found(String),
    NotFound,
}

/// Anything able to look up lyrics for a catalog item.
pub trait LyricSource: Send + Sync {
    fn lookup(&self, item: &CatalogItem) -> Result<LyricLookup>;
}

/// Subset of the LRCLIB `/api/get` response body we consume.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibTrack {
    plain_lyrics: Option<String>,
    #[serde(default)]
    instrumental: bool,
}

/// Blocking LRCLIB client.
pub struct LrclibClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl LrclibClient {
    /// Create a client for `base_url` (e.g. `https://lrclib.net`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lyricrec/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LyricRecError::lyric_source)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl LyricSource for LrclibClient {
    fn lookup(&self, item: &CatalogItem) -> Result<LyricLookup> {
        let url = format!("{}/api/get", self.base_url);
        let duration = item.duration_secs().to_string();
        debug!("LRCLIB lookup {} ({} - {})", item.id, item.primary_artist(), item.name);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("artist_name", item.primary_artist()),
                ("track_name", item.name.as_str()),
                ("album_name", item.album.as_str()),
                ("duration", duration.as_str()),
            ])
            .send()
            .map_err(LyricRecError::lyric_source)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(LyricLookup::NotFound);
        }
        if !status.is_success() {
            warn!("LRCLIB answered {} for {}", status, item.id);
            return Err(LyricRecError::lyric_source(format!("HTTP {status}")));
        }

        let track: LrclibTrack = response.json().map_err(LyricRecError::lyric_source)?;
        match track.plain_lyrics {
            Some(text) if !track.instrumental && !text.trim().is_empty() => {
                Ok(LyricLookup::Found(text))
            }
            _ => Ok(LyricLookup::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::item;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> LrclibClient {
        LrclibClient::new(&server.base_url(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn found_lyrics_are_returned() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/get")
                .query_param("artist_name", "Test Artist")
                .query_param("track_name", "Heartache")
                .query_param("album_name", "Test Album")
                .query_param("duration", "180");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":1,"plainLyrics":"love and loss","instrumental":false}"#);
        });

        let result = client(&server).lookup(&item("s1", "Heartache")).unwrap();
        mock.assert();
        assert_eq!(result, LyricLookup::Found("love and loss".to_string()));
    }

    #[test]
    fn missing_track_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/get");
            then.status(404)
                .body(r#"{"code":404,"name":"TrackNotFound","message":"Failed to find specified track"}"#);
        });

        let result = client(&server).lookup(&item("s1", "Nope")).unwrap();
        assert_eq!(result, LyricLookup::NotFound);
    }

    #[test]
    fn instrumental_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/get");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":2,"plainLyrics":null,"instrumental":true}"#);
        });

        let result = client(&server).lookup(&item("s2", "Interlude")).unwrap();
        assert_eq!(result, LyricLookup::NotFound);
    }

    #[test]
    fn server_errors_are_provider_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/get");
            then.status(503);
        });

        let result = client(&server).lookup(&item("s3", "Busy"));
        assert!(matches!(
            result,
            Err(LyricRecError::ProviderUnavailable { provider: "lyric source", .. })
        ));
    }
}
