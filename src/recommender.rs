//! The recommendation service.
//!
//! [`Recommender`] owns a [`CandidateStore`] and the tuning and is built once
//! by the caller. It never touches session storage itself: callers hand in a
//! [`SessionState`] and persist the result, usually through
//! [`SessionStore::update`](crate::session::SessionStore::update).

use crate::algorithm::{self, RankedCandidate};
use crate::config::RecommenderConfig;
use crate::db::{CandidateStore, CatalogRecord};
use crate::emotion::{EmotionSample, EmotionWeights, MeanSnapshot, SlopeDetector};
use crate::error::RecommendError;
use crate::features::{FeatureKey, FeatureVector};
use crate::genre::Genre;
use crate::session::SessionState;
use log::{debug, info};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashMap;

/// A playlist entry with its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistEntry {
    pub record: CatalogRecord,
    pub distance: f64,
}

pub type Playlist = Vec<PlaylistEntry>;

/// One "recommend from emotion" request.
#[derive(Debug, Clone, Default)]
pub struct RecommendRequest {
    /// Emotion reading, already on the [-1, 1] scale.
    pub sample: EmotionSample,
    /// Extra query features. Valence and arousal are taken from `sample`.
    pub extra: FeatureVector,
    pub genre: Genre,
    /// Falls back to the configured default weights.
    pub weights: Option<EmotionWeights>,
    /// Falls back to the configured playlist length.
    pub length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// The first playlist entry not played yet in this session.
    pub song: CatalogRecord,
    pub playlist: Playlist,
    pub switch_probability: f64,
    pub mean: MeanSnapshot,
}

pub struct Recommender<C> {
    store: C,
    config: RecommenderConfig,
    detector: SlopeDetector,
}

impl<C: CandidateStore> Recommender<C> {
    pub fn new(store: C, config: RecommenderConfig) -> Self {
        let detector = SlopeDetector::from(config.slope);
        Self {
            store,
            config,
            detector,
        }
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Up to `length` catalog records closest to `query`, one per artist where
    /// the catalog allows it. Only the features present in `query` count.
    ///
    /// # Errors
    ///
    /// - `InvalidLength` when `length` is 0
    /// - `EmptyQuery` when `query` has no features
    /// - `NonFiniteFeature` when a query value is NaN or infinite
    /// - `EmptyCatalog` when nothing matches `genre`
    /// - `DimensionMismatch` when a candidate lacks a queried feature
    /// - `Catalog` when the store fails
    pub fn generate_playlist(
        &self,
        query: &FeatureVector,
        genre: Genre,
        length: usize,
    ) -> Result<Playlist, RecommendError> {
        let ranked = self.rank(query, genre, length)?;
        self.resolve(&ranked)
    }

    /// Push `sample` into a copy of `state` and score the drift of the window
    /// mean. The returned state carries the new mean as its old mean.
    ///
    /// # Errors
    ///
    /// `InvalidSample` for non-finite samples.
    pub fn update_and_score_emotion(
        &self,
        state: &SessionState,
        sample: EmotionSample,
        weights: EmotionWeights,
    ) -> Result<(SessionState, f64), RecommendError> {
        let sample = sample.validate()?;
        let mut next = state.clone();
        let score = self
            .detector
            .observe(&mut next.window, &mut next.old_mean, sample, weights);
        debug!(
            "Window mean ({:.3}, {:.3}), delta {:.4}, switch probability {:.3}",
            score.mean.valence, score.mean.arousal, score.delta, score.probability
        );
        Ok((next, score.probability))
    }

    /// Full request flow: build the query, rank the catalog, update the
    /// emotion window and pick the next unplayed song. `state` is only
    /// modified when the whole request succeeds.
    ///
    /// # Errors
    ///
    /// Same as [`generate_playlist`](Self::generate_playlist), plus
    /// `InvalidSample`.
    pub fn recommend(
        &self,
        state: &mut SessionState,
        request: &RecommendRequest,
    ) -> Result<Recommendation, RecommendError> {
        let sample = request.sample.validate()?;
        let query = request
            .extra
            .with(FeatureKey::Valence, sample.valence)
            .with(FeatureKey::Arousal, sample.arousal);
        let length = request.length.unwrap_or(self.config.playlist_length);

        let ranked = self.rank(&query, request.genre, length)?;
        let next_id = algorithm::select_next(&ranked, &state.played)
            .map(|candidate| candidate.id.clone())
            .ok_or(RecommendError::EmptyCatalog {
                genre: request.genre,
            })?;
        let playlist = self.resolve(&ranked)?;
        let song = playlist
            .iter()
            .find(|entry| entry.record.id == next_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| {
                RecommendError::Catalog(anyhow::anyhow!(
                    "Song `{next_id}` vanished from the catalog"
                ))
            })?;

        let weights = request.weights.unwrap_or(self.config.default_weights);
        let (next_state, switch_probability) =
            self.update_and_score_emotion(state, sample, weights)?;
        let mean = next_state.old_mean;
        *state = next_state;

        info!(
            "Recommending `{}` by `{}` (switch probability {switch_probability:.3})",
            song.title, song.artist
        );
        Ok(Recommendation {
            song,
            playlist,
            switch_probability,
            mean,
        })
    }

    /// `length` records drawn uniformly from the whole catalog.
    ///
    /// # Errors
    ///
    /// `InvalidLength` for a zero `length`, `EmptyCatalog` for an empty
    /// catalog, `Catalog` when the store fails.
    pub fn random_playlist(&self, length: usize) -> Result<Vec<CatalogRecord>, RecommendError> {
        if length == 0 {
            return Err(RecommendError::InvalidLength);
        }
        let ids = self.store.ids().map_err(catalog_error)?;
        if ids.is_empty() {
            return Err(RecommendError::EmptyCatalog { genre: Genre::None });
        }

        let picked: Vec<String> = ids
            .choose_multiple(&mut rand::thread_rng(), length)
            .cloned()
            .collect();
        self.store.records(&picked).map_err(catalog_error)
    }

    fn rank(
        &self,
        query: &FeatureVector,
        genre: Genre,
        length: usize,
    ) -> Result<Vec<RankedCandidate>, RecommendError> {
        if length == 0 {
            return Err(RecommendError::InvalidLength);
        }
        let keys = query.present_keys();
        if keys.is_empty() {
            return Err(RecommendError::EmptyQuery);
        }
        let point = query.project(&keys, "query")?;

        let candidates = self.store.candidates(genre, &keys).map_err(catalog_error)?;
        if candidates.is_empty() {
            return Err(RecommendError::EmptyCatalog { genre });
        }

        algorithm::build_playlist(&candidates, &point, &self.config.playlist_params(length))
    }

    fn resolve(&self, ranked: &[RankedCandidate]) -> Result<Playlist, RecommendError> {
        let ids: Vec<String> = ranked.iter().map(|c| c.id.clone()).collect();
        let mut records: HashMap<String, CatalogRecord> = self
            .store
            .records(&ids)
            .map_err(catalog_error)?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        Ok(ranked
            .iter()
            .filter_map(|candidate| {
                records.remove(&candidate.id).map(|record| PlaylistEntry {
                    record,
                    distance: candidate.distance,
                })
            })
            .collect())
    }
}

/// Keep typed errors raised inside the store, wrap everything else.
fn catalog_error(err: anyhow::Error) -> RecommendError {
    match err.downcast::<RecommendError>() {
        Ok(inner) => inner,
        Err(err) => RecommendError::Catalog(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Candidates, MemoryCatalog};
    use crate::features::FeatureKeys;

    fn song(id: &str, artist: &str, valence: f64, arousal: f64, genres: &[Genre]) -> CatalogRecord {
        let features = FeatureKey::ALL
            .into_iter()
            .fold(FeatureVector::default(), |v, key| v.with(key, 0.0))
            .with(FeatureKey::Valence, valence)
            .with(FeatureKey::Arousal, arousal);
        CatalogRecord {
            id: id.to_string(),
            title: id.to_uppercase(),
            artist: artist.to_string(),
            album: None,
            duration_s: None,
            features,
            genres: genres.to_vec(),
        }
    }

    fn recommender() -> Recommender<MemoryCatalog> {
        let catalog = MemoryCatalog::new(vec![
            song("calm", "A", -0.5, -0.5, &[Genre::Ambient]),
            song("happy", "B", 0.8, 0.6, &[Genre::Pop]),
            song("angry", "C", -0.7, 0.9, &[Genre::Metal]),
            song("content", "D", 0.6, -0.3, &[Genre::Jazz, Genre::Pop]),
        ]);
        Recommender::new(catalog, RecommenderConfig::default())
    }

    fn valence_arousal(valence: f64, arousal: f64) -> FeatureVector {
        FeatureVector::default()
            .with(FeatureKey::Valence, valence)
            .with(FeatureKey::Arousal, arousal)
    }

    fn ids(playlist: &Playlist) -> Vec<&str> {
        playlist.iter().map(|e| e.record.id.as_str()).collect()
    }

    #[test]
    fn test_playlist_is_ordered_by_distance() {
        let playlist = recommender()
            .generate_playlist(&valence_arousal(0.7, 0.5), Genre::None, 16)
            .unwrap();
        assert_eq!(playlist.len(), 4);
        assert_eq!(playlist[0].record.id, "happy");
        assert!(playlist.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_genre_filter_restricts_playlist() {
        let playlist = recommender()
            .generate_playlist(&valence_arousal(0.0, 0.0), Genre::Pop, 16)
            .unwrap();
        let mut found = ids(&playlist);
        found.sort_unstable();
        assert_eq!(found, vec!["content", "happy"]);
    }

    #[test]
    fn test_unmatched_genre_is_empty_catalog() {
        let err = recommender()
            .generate_playlist(&valence_arousal(0.0, 0.0), Genre::Folk, 16)
            .unwrap_err();
        assert!(matches!(err, RecommendError::EmptyCatalog { genre: Genre::Folk }));
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let err = recommender()
            .generate_playlist(&FeatureVector::default(), Genre::None, 16)
            .unwrap_err();
        assert!(matches!(err, RecommendError::EmptyQuery));
    }

    #[test]
    fn test_non_finite_query_feature_is_rejected() {
        let query = valence_arousal(0.2, 0.2).with(FeatureKey::Bpm, f64::NAN);
        let err = recommender()
            .generate_playlist(&query, Genre::None, 16)
            .unwrap_err();
        assert!(matches!(err, RecommendError::NonFiniteFeature { .. }));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let recommender = recommender();
        let err = recommender
            .generate_playlist(&valence_arousal(0.0, 0.0), Genre::None, 0)
            .unwrap_err();
        assert!(matches!(err, RecommendError::InvalidLength));
        assert!(matches!(recommender.random_playlist(0), Err(RecommendError::InvalidLength)));

        let mut state = recommender.config().fresh_session();
        let before = state.clone();
        let request = RecommendRequest {
            sample: EmotionSample::new(0.1, 0.1),
            length: Some(0),
            ..RecommendRequest::default()
        };
        assert!(matches!(
            recommender.recommend(&mut state, &request),
            Err(RecommendError::InvalidLength)
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_recommend_skips_played_and_updates_state() {
        let recommender = recommender();
        let mut state = recommender.config().fresh_session();
        state.played.insert("happy");

        let request = RecommendRequest {
            sample: EmotionSample::new(0.7, 0.5),
            ..RecommendRequest::default()
        };
        let result = recommender.recommend(&mut state, &request).unwrap();

        assert_eq!(result.song.id, "content");
        assert_eq!(result.playlist[0].record.id, "happy");
        assert_eq!(state.old_mean, result.mean);
        assert_eq!(state.window.samples().last(), Some(EmotionSample::new(0.7, 0.5)));
        assert!((0.0..=1.0).contains(&result.switch_probability));
    }

    #[test]
    fn test_failed_recommend_leaves_state_alone() {
        let recommender = recommender();
        let mut state = recommender.config().fresh_session();
        let before = state.clone();

        let request = RecommendRequest {
            sample: EmotionSample::new(0.1, 0.1),
            genre: Genre::Country,
            ..RecommendRequest::default()
        };
        assert!(recommender.recommend(&mut state, &request).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_update_and_score_emotion_is_pure() {
        let recommender = recommender();
        let state = recommender.config().fresh_session();

        let (next, probability) = recommender
            .update_and_score_emotion(
                &state,
                EmotionSample::new(0.5, 0.5),
                EmotionWeights::default(),
            )
            .unwrap();
        assert!((probability - 1.0).abs() < 1e-9);
        assert_eq!(next.old_mean, MeanSnapshot { valence: 0.5, arousal: 0.5 });
        assert_eq!(state.old_mean, MeanSnapshot::default());

        let (_, again) = recommender
            .update_and_score_emotion(
                &next,
                EmotionSample::new(0.5, 0.5),
                EmotionWeights::default(),
            )
            .unwrap();
        assert_eq!(again, 0.0);
    }

    #[test]
    fn test_random_playlist_draws_distinct_records() {
        let picked = recommender().random_playlist(3).unwrap();
        assert_eq!(picked.len(), 3);
        let mut ids: Vec<&str> = picked.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    struct FailingStore;

    impl CandidateStore for FailingStore {
        fn candidates(&self, _: Genre, _: &FeatureKeys) -> anyhow::Result<Candidates> {
            anyhow::bail!("connection refused")
        }

        fn records(&self, _: &[String]) -> anyhow::Result<Vec<CatalogRecord>> {
            anyhow::bail!("connection refused")
        }

        fn ids(&self) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_store_failures_propagate_as_catalog_errors() {
        let recommender = Recommender::new(FailingStore, RecommenderConfig::default());
        let err = recommender
            .generate_playlist(&valence_arousal(0.0, 0.0), Genre::None, 4)
            .unwrap_err();
        assert!(matches!(err, RecommendError::Catalog(_)));
        assert!(err.to_string().contains("connection refused"));
        assert!(matches!(recommender.random_playlist(2), Err(RecommendError::Catalog(_))));
    }
}
