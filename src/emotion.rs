//! # Emotion Trend Detection
//!
//! Each session keeps the last few (valence, arousal) samples in an
//! [`EmotionWindow`]. After every new sample the window mean is recomputed
//! with Welford's online algorithm and compared with the mean stored on the
//! previous request. [`SlopeDetector`] turns the weighted distance between the
//! two means into a switch probability:
//!
//! ```text
//! delta       = w_v * |v - v_old| + w_a * |a - a_old|
//! probability = clamp(tanh((delta - threshold) * gain), 0, 1)
//! ```
//!
//! Samples use the [-1, 1] range. Speech models reporting [0, 1] go through
//! [`EmotionSample::from_unit_range`] first.

use crate::error::RecommendError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One emotion reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub valence: f64,
    pub arousal: f64,
}

impl EmotionSample {
    #[must_use]
    pub const fn new(valence: f64, arousal: f64) -> Self {
        Self { valence, arousal }
    }

    /// Map a [0, 1] reading onto [-1, 1].
    #[must_use]
    pub fn from_unit_range(valence: f64, arousal: f64) -> Self {
        Self::new(valence * 2.0 - 1.0, arousal * 2.0 - 1.0)
    }

    /// Mirror either axis around the neutral point.
    #[must_use]
    pub fn inverted(self, invert_valence: bool, invert_arousal: bool) -> Self {
        Self {
            valence: if invert_valence { -self.valence } else { self.valence },
            arousal: if invert_arousal { -self.arousal } else { self.arousal },
        }
    }

    /// # Errors
    ///
    /// `InvalidSample` for NaN or infinite components.
    pub fn validate(self) -> Result<Self, RecommendError> {
        if self.valence.is_finite() && self.arousal.is_finite() {
            Ok(self)
        } else {
            Err(RecommendError::InvalidSample {
                valence: self.valence,
                arousal: self.arousal,
            })
        }
    }
}

/// Window mean as of the last request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanSnapshot {
    pub valence: f64,
    pub arousal: f64,
}

/// Welford accumulator. Variance is not used by the switch probability, but
/// the accumulator carries it at no extra pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OnlineStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl OnlineStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean = value;
            self.m2 = 0.0;
        } else {
            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// 0.0 until something was pushed.
    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    #[must_use]
    pub fn population_variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }

    #[must_use]
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }
}

impl FromIterator<f64> for OnlineStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = Self::new();
        for value in iter {
            stats.push(value);
        }
        stats
    }
}

impl Extend<f64> for OnlineStats {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WindowRepr {
    capacity: usize,
    valence: Vec<f64>,
    arousal: Vec<f64>,
}

/// Fixed-capacity FIFO of emotion samples, kept as two parallel queues.
/// The newest sample is always at the back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WindowRepr", into = "WindowRepr")]
pub struct EmotionWindow {
    capacity: usize,
    valence: VecDeque<f64>,
    arousal: VecDeque<f64>,
}

impl EmotionWindow {
    /// Window that starts full of `fill` on both axes.
    #[must_use]
    pub fn filled(capacity: usize, fill: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            valence: std::iter::repeat(fill).take(capacity).collect(),
            arousal: std::iter::repeat(fill).take(capacity).collect(),
        }
    }

    #[must_use]
    pub fn empty(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            valence: VecDeque::with_capacity(capacity),
            arousal: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: EmotionSample) {
        if self.valence.len() == self.capacity {
            self.valence.pop_front();
            self.arousal.pop_front();
        }
        self.valence.push_back(sample.valence);
        self.arousal.push_back(sample.arousal);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.valence.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.valence.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Oldest first.
    pub fn samples(&self) -> impl Iterator<Item = EmotionSample> + '_ {
        self.valence
            .iter()
            .zip(&self.arousal)
            .map(|(v, a)| EmotionSample::new(*v, *a))
    }

    /// Per-axis statistics over the current contents.
    #[must_use]
    pub fn stats(&self) -> (OnlineStats, OnlineStats) {
        (
            self.valence.iter().copied().collect(),
            self.arousal.iter().copied().collect(),
        )
    }

    /// Mean over the current contents; (0, 0) for an empty window.
    #[must_use]
    pub fn mean(&self) -> MeanSnapshot {
        let (valence, arousal) = self.stats();
        MeanSnapshot {
            valence: valence.mean(),
            arousal: arousal.mean(),
        }
    }
}

impl TryFrom<WindowRepr> for EmotionWindow {
    type Error = String;

    fn try_from(repr: WindowRepr) -> Result<Self, Self::Error> {
        if repr.capacity == 0 {
            return Err("emotion window capacity must be positive".to_string());
        }
        if repr.valence.len() != repr.arousal.len() {
            return Err(format!(
                "emotion window histories differ in length ({} valence, {} arousal)",
                repr.valence.len(),
                repr.arousal.len()
            ));
        }
        if repr.valence.len() > repr.capacity {
            return Err(format!(
                "emotion window holds {} samples but its capacity is {}",
                repr.valence.len(),
                repr.capacity
            ));
        }
        Ok(Self {
            capacity: repr.capacity,
            valence: repr.valence.into(),
            arousal: repr.arousal.into(),
        })
    }
}

impl From<EmotionWindow> for WindowRepr {
    fn from(window: EmotionWindow) -> Self {
        Self {
            capacity: window.capacity,
            valence: window.valence.into(),
            arousal: window.arousal.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WeightsRepr {
    valence: f64,
    arousal: f64,
}

/// Per-axis weights for the mean delta. Always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightsRepr", into = "WeightsRepr")]
pub struct EmotionWeights {
    valence: f64,
    arousal: f64,
}

impl EmotionWeights {
    /// Normalize the two weights so they sum to 1.
    ///
    /// # Errors
    ///
    /// `InvalidWeights` if a weight is negative or not finite, or both are 0.
    pub fn new(valence: f64, arousal: f64) -> Result<Self, RecommendError> {
        let valid = valence.is_finite() && arousal.is_finite() && valence >= 0.0 && arousal >= 0.0;
        let total = valence + arousal;
        if !valid || total <= 0.0 {
            return Err(RecommendError::InvalidWeights { valence, arousal });
        }
        Ok(Self {
            valence: valence / total,
            arousal: arousal / total,
        })
    }

    #[must_use]
    pub const fn valence(&self) -> f64 {
        self.valence
    }

    #[must_use]
    pub const fn arousal(&self) -> f64 {
        self.arousal
    }

    /// Replace either weight and renormalize. A missing override keeps the
    /// current value of that weight.
    ///
    /// # Errors
    ///
    /// Same as [`EmotionWeights::new`].
    pub fn with_overrides(
        self,
        valence: Option<f64>,
        arousal: Option<f64>,
    ) -> Result<Self, RecommendError> {
        if valence.is_none() && arousal.is_none() {
            return Ok(self);
        }
        Self::new(valence.unwrap_or(self.valence), arousal.unwrap_or(self.arousal))
    }
}

impl Default for EmotionWeights {
    fn default() -> Self {
        Self {
            valence: 0.5,
            arousal: 0.5,
        }
    }
}

impl TryFrom<WeightsRepr> for EmotionWeights {
    type Error = RecommendError;

    fn try_from(repr: WeightsRepr) -> Result<Self, Self::Error> {
        Self::new(repr.valence, repr.arousal)
    }
}

impl From<EmotionWeights> for WeightsRepr {
    fn from(weights: EmotionWeights) -> Self {
        Self {
            valence: weights.valence,
            arousal: weights.arousal,
        }
    }
}

/// Result of one window update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchScore {
    pub mean: MeanSnapshot,
    pub delta: f64,
    pub probability: f64,
}

/// Maps mean drift to a switch probability in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeDetector {
    pub threshold: f64,
    pub gain: f64,
}

impl Default for SlopeDetector {
    fn default() -> Self {
        Self {
            threshold: 0.005,
            gain: 50.0,
        }
    }
}

impl SlopeDetector {
    #[must_use]
    pub const fn new(threshold: f64, gain: f64) -> Self {
        Self { threshold, gain }
    }

    #[must_use]
    pub fn delta(&self, mean: MeanSnapshot, old: MeanSnapshot, weights: EmotionWeights) -> f64 {
        weights.valence * (mean.valence - old.valence).abs()
            + weights.arousal * (mean.arousal - old.arousal).abs()
    }

    #[must_use]
    pub fn probability(&self, delta: f64) -> f64 {
        ((delta - self.threshold) * self.gain).tanh().clamp(0.0, 1.0)
    }

    /// Push `sample`, recompute the window mean, score it against `old_mean`
    /// and overwrite `old_mean` with the new mean.
    pub fn observe(
        &self,
        window: &mut EmotionWindow,
        old_mean: &mut MeanSnapshot,
        sample: EmotionSample,
        weights: EmotionWeights,
    ) -> SwitchScore {
        window.push(sample);
        let mean = window.mean();
        let delta = self.delta(mean, *old_mean, weights);
        let probability = self.probability(delta);
        *old_mean = mean;

        SwitchScore {
            mean,
            delta,
            probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_matches_two_pass() {
        let values = [0.3, -0.7, 0.1, 0.9, -0.2, 0.4];
        let stats: OnlineStats = values.iter().copied().collect();

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;

        assert_eq!(stats.count(), 6);
        assert!((stats.mean() - mean).abs() < 1e-12);
        assert!((stats.sample_variance().unwrap() - variance).abs() < 1e-12);
    }

    #[test]
    fn test_variance_needs_enough_samples() {
        let mut stats = OnlineStats::new();
        assert_eq!(stats.population_variance(), None);
        stats.push(2.0);
        assert_eq!(stats.population_variance(), Some(0.0));
        assert_eq!(stats.sample_variance(), None);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = EmotionWindow::empty(3);
        for i in 0..5 {
            window.push(EmotionSample::new(f64::from(i), -f64::from(i)));
        }
        let valences: Vec<f64> = window.samples().map(|s| s.valence).collect();
        assert_eq!(valences, vec![2.0, 3.0, 4.0]);
        assert!(window.is_full());
    }

    #[test]
    fn test_repeated_sample_drives_mean_exactly() {
        let mut window = EmotionWindow::filled(10, 0.5);
        let sample = EmotionSample::new(-0.37, 0.81);
        for _ in 0..10 {
            window.push(sample);
        }
        let mean = window.mean();
        assert_eq!(mean.valence, -0.37);
        assert_eq!(mean.arousal, 0.81);
    }

    #[test]
    fn test_empty_window_mean_is_zero() {
        assert_eq!(EmotionWindow::empty(4).mean(), MeanSnapshot::default());
    }

    #[test]
    fn test_unchanged_mean_scores_zero() {
        let detector = SlopeDetector::default();
        let mut window = EmotionWindow::filled(10, 0.2);
        let mut old = MeanSnapshot {
            valence: 0.2,
            arousal: 0.2,
        };
        let sample = EmotionSample::new(0.2, 0.2);
        let score = detector.observe(&mut window, &mut old, sample, EmotionWeights::default());
        assert_eq!(score.probability, 0.0);
    }

    #[test]
    fn test_first_request_from_neutral_window() {
        let detector = SlopeDetector::default();
        let mut window = EmotionWindow::filled(10, 0.5);
        let mut old = MeanSnapshot::default();

        let sample = EmotionSample::new(0.5, 0.5);
        let score = detector.observe(&mut window, &mut old, sample, EmotionWeights::default());
        assert_eq!(score.mean, MeanSnapshot { valence: 0.5, arousal: 0.5 });
        assert!((score.delta - 0.5).abs() < 1e-12);
        assert!((score.probability - 1.0).abs() < 1e-9);
        assert_eq!(old, score.mean);
    }

    #[test]
    fn test_large_delta_saturates() {
        let detector = SlopeDetector::default();
        assert!((detector.probability(1e6) - 1.0).abs() < 1e-12);
        assert_eq!(detector.probability(-1e6), 0.0);
    }

    #[test]
    fn test_weights_are_normalized() {
        let weights = EmotionWeights::new(3.0, 1.0).unwrap();
        assert!((weights.valence() - 0.75).abs() < 1e-12);
        assert!((weights.arousal() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_single_weight_override_is_renormalized() {
        let weights = EmotionWeights::default().with_overrides(Some(1.5), None).unwrap();
        assert!((weights.valence() - 0.75).abs() < 1e-12);
        assert!((weights.arousal() - 0.25).abs() < 1e-12);

        let untouched = EmotionWeights::default().with_overrides(None, None).unwrap();
        assert_eq!(untouched, EmotionWeights::default());
        assert!(EmotionWeights::default().with_overrides(None, Some(-1.0)).is_err());
    }

    #[test]
    fn test_invalid_weights_are_rejected() {
        assert!(EmotionWeights::new(0.0, 0.0).is_err());
        assert!(EmotionWeights::new(-1.0, 2.0).is_err());
        assert!(EmotionWeights::new(f64::NAN, 1.0).is_err());
        assert!(serde_json::from_str::<EmotionWeights>(r#"{"valence":0,"arousal":0}"#).is_err());
    }

    #[test]
    fn test_weighted_delta() {
        let detector = SlopeDetector::default();
        let weights = EmotionWeights::new(1.0, 0.0).unwrap();
        let delta = detector.delta(
            MeanSnapshot { valence: 0.4, arousal: 0.9 },
            MeanSnapshot { valence: 0.1, arousal: -0.9 },
            weights,
        );
        assert!((delta - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_unit_range_and_inversion() {
        let sample = EmotionSample::from_unit_range(0.75, 0.0);
        assert_eq!(sample, EmotionSample::new(0.5, -1.0));
        assert_eq!(sample.inverted(true, false), EmotionSample::new(-0.5, -1.0));
        assert!(EmotionSample::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_window_serde_rejects_ragged_histories() {
        let window = EmotionWindow::filled(2, 0.5);
        let json = serde_json::to_string(&window).unwrap();
        assert_eq!(serde_json::from_str::<EmotionWindow>(&json).unwrap(), window);

        let ragged = r#"{"capacity":2,"valence":[0.1,0.2],"arousal":[0.1]}"#;
        assert!(serde_json::from_str::<EmotionWindow>(ragged).is_err());
    }
}
