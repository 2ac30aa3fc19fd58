//! Emotion-driven playlist recommendation over a local song catalog.
//!
//! Core modules:
//! - [`algorithm`] - Nearest-neighbour ranking over a k-d tree, artist deduplication,
//!   next-song selection
//! - [`emotion`] - Emotion window, online mean and switch probability
//! - [`recommender`] - The service tying catalog, ranking and emotion tracking together
//!
//! ### Supporting Modules
//!
//! - [`features`] - Fixed-schema feature vectors and ordered key lists
//! - [`genre`] - The closed genre label set
//! - [`db`] - Catalog storage (SQLite) behind the [`db::CandidateStore`] trait
//! - [`session`] - Session state and its SQLite store
//! - [`config`] - Data directory and tuning
//! - [`error`] - Typed errors of the recommendation core
//!
//! ## Quick Start Example
//!
//! ```
//! use moodmix::config::RecommenderConfig;
//! use moodmix::db::{Catalog, CatalogRecord};
//! use moodmix::emotion::EmotionSample;
//! use moodmix::features::{FeatureKey, FeatureVector};
//! use moodmix::genre::Genre;
//! use moodmix::recommender::{RecommendRequest, Recommender};
//!
//! let mut catalog = Catalog::open_in_memory()?;
//! for (id, artist, valence) in [("a", "Ann", -0.4), ("b", "Bo", 0.3), ("c", "Cy", 0.9)] {
//!     let features = FeatureKey::ALL
//!         .into_iter()
//!         .fold(FeatureVector::default(), |v, key| v.with(key, 0.0))
//!         .with(FeatureKey::Valence, valence);
//!     catalog.insert_record(&CatalogRecord {
//!         id: id.to_string(),
//!         title: format!("Song {id}"),
//!         artist: artist.to_string(),
//!         album: None,
//!         duration_s: None,
//!         features,
//!         genres: vec![Genre::Jazz],
//!     })?;
//! }
//!
//! let config = RecommenderConfig::default();
//! let mut session = config.fresh_session();
//! let recommender = Recommender::new(catalog, config);
//!
//! let request = RecommendRequest {
//!     sample: EmotionSample::new(0.35, 0.0),
//!     genre: Genre::Jazz,
//!     ..RecommendRequest::default()
//! };
//! let recommendation = recommender.recommend(&mut session, &request)?;
//! assert_eq!(recommendation.song.id, "b");
//! assert!((0.0..=1.0).contains(&recommendation.switch_probability));
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## How a Recommendation Is Made
//!
//! 1. The query keeps only the features the caller supplied.
//! 2. The catalog yields every song of the requested genre, projected onto
//!    those features.
//! 3. A k-d tree is built over the query and the candidates; the nearest
//!    songs come back in ascending Euclidean distance.
//! 4. Repeated artists are dropped while enough distinct artists exist.
//! 5. The first song the session has not played yet is picked.
//! 6. The emotion reading enters the session window and the drift of the
//!    window mean becomes the switch probability.
//!
//! ## Error Handling
//!
//! Recommendation operations return [`error::RecommendError`]. Storage helpers
//! return `anyhow::Result` with context on every failure.

pub mod algorithm;
pub mod config;
pub mod db;
pub mod emotion;
pub mod error;
pub mod features;
pub mod genre;
pub mod recommender;
pub mod session;
