//! # Feature Vectors
//!
//! Songs and queries share one fixed schema of nine numeric features. A song
//! in the catalog always carries all nine; a query carries whatever subset the
//! caller could extract (at minimum valence and arousal when it comes from
//! speech). Absent query features are excluded from the distance computation.
//!
//! [`FeatureKeys`] is the ordered key list used to line query and candidate
//! vectors up before they reach the k-d tree. Its order is always the canonical
//! [`FeatureKey::ALL`] order, so two key lists built from the same set of keys
//! project to identically laid out vectors.

use crate::error::RecommendError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One named dimension of the feature space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKey {
    Valence,
    Arousal,
    Authenticity,
    Timeliness,
    Complexity,
    Danceability,
    Tonal,
    Voice,
    Bpm,
}

impl FeatureKey {
    /// Every key, in canonical order.
    pub const ALL: [FeatureKey; 9] = [
        FeatureKey::Valence,
        FeatureKey::Arousal,
        FeatureKey::Authenticity,
        FeatureKey::Timeliness,
        FeatureKey::Complexity,
        FeatureKey::Danceability,
        FeatureKey::Tonal,
        FeatureKey::Voice,
        FeatureKey::Bpm,
    ];

    /// Lowercase name, also used as the SQL column name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FeatureKey::Valence => "valence",
            FeatureKey::Arousal => "arousal",
            FeatureKey::Authenticity => "authenticity",
            FeatureKey::Timeliness => "timeliness",
            FeatureKey::Complexity => "complexity",
            FeatureKey::Danceability => "danceability",
            FeatureKey::Tonal => "tonal",
            FeatureKey::Voice => "voice",
            FeatureKey::Bpm => "bpm",
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        FeatureKey::ALL
            .into_iter()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| format!("Unknown feature `{s}`"))
    }
}

/// Fixed-schema feature record. `None` means "not part of this vector".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arousal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeliness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danceability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tonal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

impl FeatureVector {
    #[must_use]
    pub const fn get(&self, key: FeatureKey) -> Option<f64> {
        match key {
            FeatureKey::Valence => self.valence,
            FeatureKey::Arousal => self.arousal,
            FeatureKey::Authenticity => self.authenticity,
            FeatureKey::Timeliness => self.timeliness,
            FeatureKey::Complexity => self.complexity,
            FeatureKey::Danceability => self.danceability,
            FeatureKey::Tonal => self.tonal,
            FeatureKey::Voice => self.voice,
            FeatureKey::Bpm => self.bpm,
        }
    }

    pub fn set(&mut self, key: FeatureKey, value: Option<f64>) {
        let slot = match key {
            FeatureKey::Valence => &mut self.valence,
            FeatureKey::Arousal => &mut self.arousal,
            FeatureKey::Authenticity => &mut self.authenticity,
            FeatureKey::Timeliness => &mut self.timeliness,
            FeatureKey::Complexity => &mut self.complexity,
            FeatureKey::Danceability => &mut self.danceability,
            FeatureKey::Tonal => &mut self.tonal,
            FeatureKey::Voice => &mut self.voice,
            FeatureKey::Bpm => &mut self.bpm,
        };
        *slot = value;
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, key: FeatureKey, value: f64) -> Self {
        self.set(key, Some(value));
        self
    }

    /// Keys that carry a value, in canonical order.
    #[must_use]
    pub fn present_keys(&self) -> FeatureKeys {
        FeatureKeys::new(FeatureKey::ALL.into_iter().filter(|key| self.get(*key).is_some()))
    }

    /// True when all nine features are set, as required for catalog records.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        FeatureKey::ALL.iter().all(|key| self.get(*key).is_some())
    }

    /// Project onto `keys`, in their order.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when one of the requested keys is absent, since the
    /// resulting vector would be shorter than its peers.
    pub fn project(&self, keys: &FeatureKeys, id: &str) -> Result<Vec<f64>, RecommendError> {
        let values: Vec<f64> = keys.iter().filter_map(|key| self.get(key)).collect();
        if values.len() != keys.len() {
            return Err(RecommendError::DimensionMismatch {
                id: id.to_string(),
                expected: keys.len(),
                found: values.len(),
            });
        }
        Ok(values)
    }
}

/// Ordered, duplicate-free list of feature keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeatureKeys(Vec<FeatureKey>);

impl FeatureKeys {
    /// Collect keys into canonical order, dropping duplicates.
    pub fn new(keys: impl IntoIterator<Item = FeatureKey>) -> Self {
        let mut keys: Vec<FeatureKey> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        Self(keys)
    }

    #[must_use]
    pub fn all() -> Self {
        Self(FeatureKey::ALL.to_vec())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: FeatureKey) -> bool {
        self.0.contains(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureKey> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[FeatureKey] {
        &self.0
    }
}

impl fmt::Display for FeatureKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|key| key.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
