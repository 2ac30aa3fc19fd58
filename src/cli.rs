//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `moodmix` binary.
//!
//! ## Commands
//!
//! - `init-db`, `import`, `add`, `delete`, `list`, `search`: catalog upkeep
//! - `playlist`: nearest songs for a feature query
//! - `random`: random songs from the catalog
//! - `recommend`: session-aware recommendation from an emotion reading
//! - `session`: start, clear, end and inspect listener sessions
//! - `genres`, `completion`: helpers
//!
//! ## Examples
//!
//! ```bash
//! moodmix import ./analysed/
//! moodmix playlist --valence 0.4 --arousal -0.2 --genre jazz
//! moodmix recommend --session me --valence 0.8 --arousal 0.3 --unit-range
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use moodmix::algorithm::RestorePolicy;
use moodmix::features::{FeatureKey, FeatureVector};
use moodmix::genre::Genre;
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "moodmix")]
#[command(about = "moodmix: emotion-driven playlists from a local song catalog")]
#[command(version)]
pub struct Args {
    /// Database file holding catalog and sessions
    ///
    /// Defaults to `catalog.db` in the platform data directory.
    #[arg(long, global = true, env = "MOODMIX_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// Recommender configuration file (JSON)
    ///
    /// Defaults to `config.json` in the platform data directory. A missing
    /// file means default settings.
    #[arg(long, global = true, env = "MOODMIX_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Print results as JSON instead of plain text
    #[arg(long, global = true)]
    pub json: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Optional values for the features other than valence and arousal.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ExtraFeatures {
    #[arg(long, allow_negative_numbers = true)]
    pub authenticity: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub timeliness: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub complexity: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub danceability: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub tonal: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub voice: Option<f64>,
    /// Tempo in beats per minute
    #[arg(long)]
    pub bpm: Option<f64>,
}

impl ExtraFeatures {
    #[must_use]
    pub fn to_vector(&self) -> FeatureVector {
        let mut vector = FeatureVector::default();
        vector.set(FeatureKey::Authenticity, self.authenticity);
        vector.set(FeatureKey::Timeliness, self.timeliness);
        vector.set(FeatureKey::Complexity, self.complexity);
        vector.set(FeatureKey::Danceability, self.danceability);
        vector.set(FeatureKey::Tonal, self.tonal);
        vector.set(FeatureKey::Voice, self.voice);
        vector.set(FeatureKey::Bpm, self.bpm);
        vector
    }
}

/// Any subset of the nine features.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FeatureArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub valence: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub arousal: Option<f64>,
    #[command(flatten)]
    pub extra: ExtraFeatures,
}

impl FeatureArgs {
    #[must_use]
    pub fn to_vector(&self) -> FeatureVector {
        let mut vector = self.extra.to_vector();
        vector.set(FeatureKey::Valence, self.valence);
        vector.set(FeatureKey::Arousal, self.arousal);
        vector
    }
}

/// Enumeration of all available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Create the database tables
    ///
    /// Safe to run on an existing database; existing rows are kept.
    InitDb,

    /// Import pre-analysed songs from JSON
    ///
    /// Accepts one file or a directory of `.json` files. Each file holds one
    /// record or an array of records. Songs whose title and artist are
    /// already catalogued are skipped.
    Import {
        /// JSON file or directory
        #[arg(value_hint = clap::ValueHint::AnyPath)]
        path: PathBuf,
    },

    /// Add (or replace) a single song
    ///
    /// All nine features are required.
    Add {
        /// Unique song id
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        album: Option<String>,
        /// Duration in seconds
        #[arg(long)]
        duration: Option<f64>,
        /// Genre label, repeat for several (most likely first)
        #[arg(long = "genre")]
        genres: Vec<Genre>,
        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Remove a song from the catalog
    Delete {
        /// Song id
        id: String,
    },

    /// List all songs in the catalog
    ///
    /// Sorted by artist, then title.
    List,

    /// Find songs by title or artist
    Search {
        /// Case-insensitive substring
        text: String,
    },

    /// Build a playlist around a feature query
    ///
    /// Only the features given on the command line are compared. Songs are
    /// ordered by distance, with at most one song per artist while enough
    /// artists are available.
    Playlist {
        #[command(flatten)]
        features: FeatureArgs,
        /// Only consider songs tagged with this genre
        #[arg(long, default_value = "none")]
        genre: Genre,
        /// Playlist length (defaults to the configured length)
        #[arg(short = 'n', long)]
        length: Option<usize>,
        /// How removed duplicate artists are restored for short lists
        #[arg(long, value_enum)]
        restore_policy: Option<RestorePolicy>,
    },

    /// Draw random songs from the catalog
    Random {
        /// Number of songs (defaults to the configured length)
        #[arg(short = 'n', long)]
        length: Option<usize>,
    },

    /// Recommend the next song for a session from an emotion reading
    ///
    /// Updates the session's emotion window and reports how likely it is
    /// that the listener's mood shifted enough to change songs.
    Recommend {
        /// Session id
        #[arg(long, short)]
        session: String,
        #[arg(long, allow_negative_numbers = true)]
        valence: f64,
        #[arg(long, allow_negative_numbers = true)]
        arousal: f64,
        /// Readings are in [0, 1] and get mapped to [-1, 1]
        #[arg(long)]
        unit_range: bool,
        #[arg(long)]
        invert_valence: bool,
        #[arg(long)]
        invert_arousal: bool,
        /// Weight of the valence drift; the pair is renormalized to sum to 1
        #[arg(long)]
        weight_valence: Option<f64>,
        /// Weight of the arousal drift; the pair is renormalized to sum to 1
        #[arg(long)]
        weight_arousal: Option<f64>,
        #[arg(long, default_value = "none")]
        genre: Genre,
        #[arg(short = 'n', long)]
        length: Option<usize>,
        #[command(flatten)]
        extra: ExtraFeatures,
    },

    /// Manage listener sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// List the genre labels accepted by --genre
    Genres,

    /// Generate shell completions
    ///
    /// Usage: moodmix completion bash > ~/.local/share/bash-completion/completions/moodmix
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// Generate enhanced completion with genre completion
    ///
    /// Usage: moodmix completion-enhanced bash > ~/.local/share/bash-completion/completions/moodmix
    CompletionEnhanced {
        /// Shell to generate enhanced completions for (currently bash and fish supported)
        shell: Shell,
    },

    /// List genre labels for completion (hidden command)
    #[command(hide = true)]
    CompleteGenres,
}

/// Session management actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start (or restart) a session with a fresh emotion window
    Start { id: String },

    /// Reset a session's window, mean and history
    Clear { id: String },

    /// Delete a session
    End { id: String },

    /// Record that a song was played in a session
    Played {
        id: String,
        /// Song id
        song: String,
    },

    /// Print a session's state
    Show { id: String },

    /// List stored sessions
    List,
}
