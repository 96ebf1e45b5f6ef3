//! # Error taxonomy
//!
//! Every fallible library call returns [`Result`]. The variants keep three
//! situations apart that callers must never conflate:
//!
//! - persistence failed ([`LyricRecError::Storage`]),
//! - a collaborator could not answer ([`LyricRecError::ProviderUnavailable`]),
//! - the configuration is inconsistent ([`LyricRecError::DimensionMismatch`],
//!   [`LyricRecError::Config`]).
//!
//! A lyric source answering "no lyrics exist" is *not* an error. It is a normal
//! terminal state recorded in the cache as
//! [`CachedLyrics::ConfirmedAbsent`](crate::lyric_cache::CachedLyrics::ConfirmedAbsent).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LyricRecError {
    /// Cache or index persistence I/O failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The embedding model or lyric source failed or timed out.
    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: &'static str,
        reason: String,
    },

    /// A vector's length disagrees with the index configuration.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An id was named that the catalog snapshot does not contain.
    #[error("unknown catalog item: {0}")]
    UnknownItem(String),
}

pub type Result<T> = std::result::Result<T, LyricRecError>;

impl LyricRecError {
    pub(crate) fn embedder(reason: impl ToString) -> Self {
        Self::ProviderUnavailable {
            provider: "embedding model",
            reason: reason.to_string(),
        }
    }

    pub(crate) fn lyric_source(reason: impl ToString) -> Self {
        Self::ProviderUnavailable {
            provider: "lyric source",
            reason: reason.to_string(),
        }
    }

    /// `true` for failures that must abort the operation without a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::Config(_))
    }
}

impl From<diesel::result::Error> for LyricRecError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Storage(format!("lyric database: {e}"))
    }
}

impl From<diesel::ConnectionError> for LyricRecError {
    fn from(e: diesel::ConnectionError) -> Self {
        Self::Storage(format!("lyric database connection: {e}"))
    }
}

impl From<std::io::Error> for LyricRecError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_yaml::Error> for LyricRecError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Storage(format!("yaml: {e}"))
    }
}

impl From<serde_json::Error> for LyricRecError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("json: {e}"))
    }
}
