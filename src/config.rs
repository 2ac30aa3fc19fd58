//! # Configuration Module
//!
//! Data directory layout and recommender tuning.
//!
//! ## Data Storage
//!
//! moodmix keeps the catalog, the sessions and its configuration file in the
//! platform-standard data directory:
//! - Linux: `~/.local/share/moodmix/`
//! - macOS: `~/Library/Application Support/moodmix/`
//! - Windows: `%APPDATA%\moodmix\`
//!
//! ## Tuning
//!
//! [`RecommenderConfig`] is read from `config.json` in that directory. Every
//! field is optional; missing fields and a missing file fall back to the
//! defaults below.
//!
//! ```json
//! {
//!   "playlist_length": 16,
//!   "oversample": 2,
//!   "leaf_size": 3,
//!   "window_size": 10,
//!   "neutral_fill": 0.5,
//!   "slope": { "threshold": 0.005, "gain": 50.0 },
//!   "restore_policy": "index-order",
//!   "default_weights": { "valence": 0.5, "arousal": 0.5 }
//! }
//! ```

use crate::algorithm::{PlaylistParams, RestorePolicy};
use crate::emotion::{EmotionWeights, SlopeDetector};
use crate::session::SessionState;
use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the moodmix data directory, creating it if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The moodmix subdirectory cannot be created due to permissions
///
/// # Examples
///
/// ```no_run
/// use moodmix::config::get_data_dir;
///
/// let dir = get_data_dir()?;
/// println!("Data lives in {}", dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join("moodmix");
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create moodmix data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Default location of the SQLite database holding catalog and sessions.
///
/// # Errors
///
/// See [`get_data_dir`].
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("catalog.db"))
}

/// Default location of `config.json`.
///
/// # Errors
///
/// See [`get_data_dir`].
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.json"))
}

/// Switch-probability sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeConfig {
    /// Weighted mean delta below which the probability stays 0.
    pub threshold: f64,
    /// Steepness of the tanh above the threshold.
    pub gain: f64,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            threshold: 0.005,
            gain: 50.0,
        }
    }
}

impl From<SlopeConfig> for SlopeDetector {
    fn from(config: SlopeConfig) -> Self {
        SlopeDetector::new(config.threshold, config.gain)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    pub playlist_length: usize,
    pub oversample: usize,
    pub leaf_size: usize,
    pub window_size: usize,
    pub neutral_fill: f64,
    pub slope: SlopeConfig,
    pub restore_policy: RestorePolicy,
    pub default_weights: EmotionWeights,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            playlist_length: 16,
            oversample: 2,
            leaf_size: 3,
            window_size: 10,
            neutral_fill: 0.5,
            slope: SlopeConfig::default(),
            restore_policy: RestorePolicy::IndexOrder,
            default_weights: EmotionWeights::default(),
        }
    }
}

impl RecommenderConfig {
    /// Read `path`, or return the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to encode config")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// # Errors
    ///
    /// Fails for zero sizes or non-finite numbers.
    pub fn validate(&self) -> Result<()> {
        if self.playlist_length == 0 {
            bail!("playlist_length must be at least 1");
        }
        if self.window_size == 0 {
            bail!("window_size must be at least 1");
        }
        if self.leaf_size == 0 {
            bail!("leaf_size must be at least 1");
        }
        if !self.neutral_fill.is_finite() {
            bail!("neutral_fill must be a finite number");
        }
        if !(self.slope.threshold.is_finite() && self.slope.gain.is_finite()) {
            bail!("slope threshold and gain must be finite numbers");
        }
        Ok(())
    }

    #[must_use]
    pub fn playlist_params(&self, length: usize) -> PlaylistParams {
        PlaylistParams {
            length,
            oversample: self.oversample,
            leaf_size: self.leaf_size,
            restore_policy: self.restore_policy,
        }
    }

    #[must_use]
    pub fn fresh_session(&self) -> SessionState {
        SessionState::fresh(self.window_size, self.neutral_fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_structure() {
        let path = get_db_path().expect("Should get valid path");
        assert!(path.is_absolute(), "Database path should be absolute");
        assert!(path.to_string_lossy().ends_with("catalog.db"));
        let parent = path.parent().expect("Should have parent directory");
        assert_eq!(parent.file_name().unwrap(), "moodmix");
        assert!(parent.is_dir());
    }

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let config = RecommenderConfig::load(&dir.path().join("absent.json"))?;
        assert_eq!(config, RecommenderConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"playlist_length": 8, "slope": {"gain": 20.0}, "restore_policy": "distance-order"}"#,
        )?;

        let config = RecommenderConfig::load(&path)?;
        assert_eq!(config.playlist_length, 8);
        assert_eq!(config.slope.gain, 20.0);
        assert_eq!(config.slope.threshold, 0.005);
        assert_eq!(config.restore_policy, RestorePolicy::DistanceOrder);
        assert_eq!(config.window_size, 10);
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("config.json");
        let config = RecommenderConfig {
            neutral_fill: 0.0,
            default_weights: EmotionWeights::new(1.0, 3.0)?,
            ..RecommenderConfig::default()
        };
        config.save(&path)?;
        assert_eq!(RecommenderConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{"window_size": 0}"#)?;
        assert!(RecommenderConfig::load(&path).is_err());

        fs::write(&path, r#"{"default_weights": {"valence": -1.0, "arousal": 1.0}}"#)?;
        assert!(RecommenderConfig::load(&path).is_err());
        Ok(())
    }
}
