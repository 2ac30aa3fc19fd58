//! Playlist construction: nearest-neighbour ranking, artist deduplication and
//! next-song selection.
//!
//! The query is inserted as point 0 of a fresh k-d tree built over the
//! candidate vectors, so ranking is always exact and nothing is cached between
//! requests. The tree is a `kiddo::KdTree`, whose dimensionality is a const
//! parameter; [`NeighbourRanker`] picks the instantiation matching the query.

use crate::db::Candidates;
use crate::error::RecommendError;
use crate::features::FeatureKey;
use crate::session::PlayedHistory;
use kiddo::distance::squared_euclidean;
use kiddo::KdTree;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Most dimensions a query can have: one per feature key.
pub const MAX_DIMENSIONS: usize = FeatureKey::ALL.len();

/// A catalog id with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub id: String,
    pub distance: f64,
    pub artist: String,
}

/// How [`dedupe_artists`] picks removed duplicates to put back when the
/// deduplicated list is shorter than requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RestorePolicy {
    /// Restore the removed entry with the lowest position in the input list.
    /// On a distance-sorted list this is also the closest one, but on an
    /// unsorted list a farther duplicate can come back before a closer one.
    #[default]
    IndexOrder,
    /// Restore the removed entry with the smallest distance, ties by position.
    DistanceOrder,
}

/// Knobs for [`build_playlist`].
#[derive(Debug, Clone, Copy)]
pub struct PlaylistParams {
    pub length: usize,
    /// Initial fetch is `length * oversample` neighbours.
    pub oversample: usize,
    /// Points per k-d tree bucket.
    pub leaf_size: usize,
    pub restore_policy: RestorePolicy,
}

impl Default for PlaylistParams {
    fn default() -> Self {
        Self {
            length: 16,
            oversample: 2,
            leaf_size: 3,
            restore_policy: RestorePolicy::IndexOrder,
        }
    }
}

/// Nearest-neighbour lookups, as `(point index, distance)` pairs.
trait SpatialIndex {
    fn nearest(&self, seed: &[f64], count: usize) -> Result<Vec<(usize, f64)>, RecommendError>;
}

struct Index<const K: usize> {
    tree: KdTree<f64, usize, K>,
}

impl<const K: usize> Index<K> {
    fn build(points: &[Vec<f64>], leaf_size: usize) -> Result<Self, RecommendError> {
        let mut tree = KdTree::with_per_node_capacity(leaf_size.max(1)).map_err(index_error)?;
        for (index, point) in points.iter().enumerate() {
            tree.add(&coords::<K>(point)?, index).map_err(index_error)?;
        }
        Ok(Self { tree })
    }
}

impl<const K: usize> SpatialIndex for Index<K> {
    fn nearest(&self, seed: &[f64], count: usize) -> Result<Vec<(usize, f64)>, RecommendError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let hits = self
            .tree
            .nearest(&coords::<K>(seed)?, count, &squared_euclidean)
            .map_err(index_error)?;
        Ok(hits
            .into_iter()
            .map(|(distance_sq, &index)| (index, distance_sq.sqrt()))
            .collect())
    }
}

fn coords<const K: usize>(point: &[f64]) -> Result<[f64; K], RecommendError> {
    point
        .try_into()
        .map_err(|_| RecommendError::DimensionMismatch {
            id: "query".to_string(),
            expected: K,
            found: point.len(),
        })
}

fn index_error(err: impl fmt::Debug) -> RecommendError {
    RecommendError::Catalog(anyhow::anyhow!("Spatial index error: {err:?}"))
}

fn build_index(
    points: &[Vec<f64>],
    dims: usize,
    leaf_size: usize,
) -> Result<Box<dyn SpatialIndex>, RecommendError> {
    macro_rules! by_dimension {
        ($($k:literal)+) => {
            match dims {
                0 => Err(RecommendError::EmptyQuery),
                $($k => {
                    let index = Index::<$k>::build(points, leaf_size)?;
                    Ok(Box::new(index) as Box<dyn SpatialIndex>)
                })+
                _ => Err(RecommendError::DimensionMismatch {
                    id: "query".to_string(),
                    expected: MAX_DIMENSIONS,
                    found: dims,
                }),
            }
        };
    }
    by_dimension!(1 2 3 4 5 6 7 8 9)
}

fn first_non_finite(vector: &[f64]) -> Option<f64> {
    vector.iter().copied().find(|value| !value.is_finite())
}

/// A k-d tree over one query and its candidates. Point 0 is the query.
pub struct NeighbourRanker<'a> {
    candidates: &'a Candidates,
    query: Vec<f64>,
    index: Box<dyn SpatialIndex>,
}

impl<'a> NeighbourRanker<'a> {
    /// # Errors
    ///
    /// - `DimensionMismatch` if any candidate vector differs in length from
    ///   the query (nothing is truncated or padded), or the query has more
    ///   than [`MAX_DIMENSIONS`] features
    /// - `NonFiniteFeature` for NaN or infinite values
    /// - `EmptyQuery` for a zero-length query
    /// - `Catalog` if the candidate lists have different lengths
    pub fn new(
        candidates: &'a Candidates,
        query: &[f64],
        leaf_size: usize,
    ) -> Result<Self, RecommendError> {
        let (ids, artists, vectors) = (&candidates.ids, &candidates.artists, &candidates.vectors);
        if ids.len() != vectors.len() || artists.len() != vectors.len() {
            return Err(RecommendError::Catalog(anyhow::anyhow!(
                "Candidate lists disagree: {} ids, {} artists, {} vectors",
                ids.len(),
                artists.len(),
                vectors.len()
            )));
        }
        if let Some(value) = first_non_finite(query) {
            return Err(RecommendError::NonFiniteFeature {
                id: "query".to_string(),
                value,
            });
        }
        for (id, vector) in ids.iter().zip(vectors) {
            if vector.len() != query.len() {
                return Err(RecommendError::DimensionMismatch {
                    id: id.clone(),
                    expected: query.len(),
                    found: vector.len(),
                });
            }
            if let Some(value) = first_non_finite(vector) {
                return Err(RecommendError::NonFiniteFeature { id: id.clone(), value });
            }
        }

        let mut points = Vec::with_capacity(candidates.len() + 1);
        points.push(query.to_vec());
        points.extend(vectors.iter().cloned());
        let index = build_index(&points, query.len(), leaf_size)?;

        Ok(Self {
            candidates,
            query: query.to_vec(),
            index,
        })
    }

    /// The `count` closest candidates (clamped to the candidate count),
    /// ascending by distance, without the query point. Equidistant
    /// candidates come back in point order.
    ///
    /// # Errors
    ///
    /// `Catalog` if the index rejects the lookup.
    pub fn ranked(&self, count: usize) -> Result<Vec<RankedCandidate>, RecommendError> {
        let count = count.min(self.candidates.len());
        let mut hits = self.index.nearest(&self.query, count + 1)?;
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut ranked: Vec<RankedCandidate> = hits
            .into_iter()
            // Drop the query by its reserved index, not by its position.
            .filter(|&(index, _)| index != 0)
            .map(|(index, distance)| {
                let i = index - 1;
                RankedCandidate {
                    id: self.candidates.ids[i].clone(),
                    distance,
                    artist: self.candidates.artists[i].clone(),
                }
            })
            .collect();
        ranked.truncate(count);
        Ok(ranked)
    }
}

/// Rank `candidates` by Euclidean distance to `query` and keep the closest
/// `count`.
///
/// # Examples
///
/// ```
/// use moodmix::algorithm::rank_neighbours;
/// use moodmix::db::Candidates;
///
/// let mut candidates = Candidates::default();
/// candidates.push("far".into(), "A".into(), vec![0.9, 0.9]);
/// candidates.push("near".into(), "B".into(), vec![0.1, 0.0]);
///
/// let ranked = rank_neighbours(&candidates, &[0.0, 0.0], 1, 3)?;
/// assert_eq!(ranked[0].id, "near");
/// # Ok::<(), moodmix::error::RecommendError>(())
/// ```
///
/// # Errors
///
/// `DimensionMismatch` if a candidate vector has the wrong length.
pub fn rank_neighbours(
    candidates: &Candidates,
    query: &[f64],
    count: usize,
    leaf_size: usize,
) -> Result<Vec<RankedCandidate>, RecommendError> {
    NeighbourRanker::new(candidates, query, leaf_size)?.ranked(count)
}

fn distinct_artists(ranked: &[RankedCandidate]) -> usize {
    ranked
        .iter()
        .map(|c| c.artist.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Keep the first occurrence of every artist, then restore removed duplicates
/// (per `policy`) until `length` entries remain or none are left, then
/// truncate to `length`. Surviving entries keep their input order. Artist
/// names are compared exactly.
#[must_use]
pub fn dedupe_artists(
    ranked: Vec<RankedCandidate>,
    length: usize,
    policy: RestorePolicy,
) -> Vec<RankedCandidate> {
    let mut keep = vec![false; ranked.len()];
    let mut removed = Vec::new();
    {
        let mut seen = HashSet::new();
        for (i, candidate) in ranked.iter().enumerate() {
            if seen.insert(candidate.artist.as_str()) {
                keep[i] = true;
            } else {
                removed.push(i);
            }
        }
    }

    let mut kept = ranked.len() - removed.len();
    while kept < length && !removed.is_empty() {
        let pick = match policy {
            // `removed` is built in input order, so its head is the minimum.
            RestorePolicy::IndexOrder => 0,
            RestorePolicy::DistanceOrder => removed
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    ranked[**a]
                        .distance
                        .total_cmp(&ranked[**b].distance)
                        .then_with(|| a.cmp(b))
                })
                .map_or(0, |(pos, _)| pos),
        };
        let index = removed.remove(pick);
        trace!("Restoring duplicate artist entry `{}`", ranked[index].id);
        keep[index] = true;
        kept += 1;
    }

    if !removed.is_empty() {
        debug!("Dropped {} duplicate-artist entries", removed.len());
    }

    let mut result: Vec<RankedCandidate> = ranked
        .into_iter()
        .zip(keep)
        .filter_map(|(candidate, keep)| keep.then_some(candidate))
        .collect();
    result.truncate(length);
    result
}

/// Rank, widen until `params.length` distinct artists are covered (or the
/// candidates run out), then deduplicate down to `params.length`.
///
/// # Errors
///
/// Same as [`NeighbourRanker::new`].
pub fn build_playlist(
    candidates: &Candidates,
    query: &[f64],
    params: &PlaylistParams,
) -> Result<Vec<RankedCandidate>, RecommendError> {
    let ranker = NeighbourRanker::new(candidates, query, params.leaf_size)?;
    let length = params.length.min(candidates.len());
    let mut fetch = length
        .saturating_mul(params.oversample.max(1))
        .min(candidates.len());

    loop {
        let ranked = ranker.ranked(fetch)?;
        if fetch >= candidates.len() || distinct_artists(&ranked) >= length {
            debug!(
                "Ranked {} of {} candidates for a playlist of {length}",
                ranked.len(),
                candidates.len()
            );
            return Ok(dedupe_artists(ranked, length, params.restore_policy));
        }
        fetch = fetch.saturating_mul(2).max(1).min(candidates.len());
    }
}

/// First entry not yet played, or the top entry when everything has been
/// played. `None` only for an empty playlist.
#[must_use]
pub fn select_next<'a>(
    playlist: &'a [RankedCandidate],
    played: &PlayedHistory,
) -> Option<&'a RankedCandidate> {
    playlist
        .iter()
        .find(|candidate| !played.contains(&candidate.id))
        .or_else(|| playlist.first())
}
