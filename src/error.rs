//! Errors surfaced by the recommendation core.
//!
//! Every variant is scoped to a single request or session. Catalog and store
//! failures are wrapped as they are reported and never retried.

use crate::genre::Genre;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecommendError {
    /// No catalog record survived the genre filter.
    #[error(
        "No recommendation could be generated: the library is empty or no song matches the genre filter `{genre}`"
    )]
    EmptyCatalog { genre: Genre },

    /// A candidate vector does not have the query's dimensionality.
    #[error("Dimension mismatch for `{id}`: expected {expected} features, found {found}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown genre `{0}`")]
    InvalidGenre(String),

    #[error("Invalid emotion weights (valence: {valence}, arousal: {arousal}); weights must be finite, non-negative and not both zero")]
    InvalidWeights { valence: f64, arousal: f64 },

    #[error("Invalid emotion sample (valence: {valence}, arousal: {arousal}); both values must be finite")]
    InvalidSample { valence: f64, arousal: f64 },

    /// A query or candidate vector holds a NaN or infinite value.
    #[error("Non-finite feature value {value} in `{id}`")]
    NonFiniteFeature { id: String, value: f64 },

    #[error("Playlist length must be at least 1")]
    InvalidLength,

    /// The query carries no feature at all, so there is nothing to rank by.
    #[error("Query has no features to compare")]
    EmptyQuery,

    #[error("Catalog error: {0:#}")]
    Catalog(#[source] anyhow::Error),
}

impl RecommendError {
    /// True for failures caused by the request itself rather than the store.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(self, RecommendError::Catalog(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_catalog_message_names_genre() {
        let err = RecommendError::EmptyCatalog { genre: Genre::Jazz };
        let message = err.to_string();
        assert!(message.contains("No recommendation could be generated"));
        assert!(message.contains("jazz"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_catalog_errors_keep_context() {
        let inner = anyhow::anyhow!("disk I/O error").context("Failed to query candidates");
        let err = RecommendError::Catalog(inner);
        let message = err.to_string();
        assert!(message.contains("Failed to query candidates"));
        assert!(message.contains("disk I/O error"));
        assert!(!err.is_user_error());
    }
}
