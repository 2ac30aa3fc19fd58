//! # moodmix
//!
//! Command-line front end for the moodmix library: keeps a song catalog in
//! SQLite, builds nearest-neighbour playlists from feature queries and tracks
//! listener sessions whose emotion readings decide when to switch songs.
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and load analysed songs
//! moodmix init-db
//! moodmix import ./analysed/
//!
//! # Songs close to a mood, jazz only
//! moodmix playlist --valence 0.6 --arousal -0.2 --genre jazz
//!
//! # Session-aware recommendation
//! moodmix session start me
//! moodmix recommend --session me --valence 0.7 --arousal 0.4
//! moodmix session played me some-song-id
//! ```

mod cli;
mod completion;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use moodmix::config::{self, RecommenderConfig};
use moodmix::db::{Catalog, CatalogRecord};
use moodmix::emotion::EmotionSample;
use moodmix::genre::Genre;
use moodmix::recommender::{Playlist, RecommendRequest, Recommender};
use moodmix::session::SessionStore;
use serde::Serialize;
use std::path::PathBuf;

/// Main entry point for moodmix.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug moodmix playlist ...` - Enable debug logging
/// - `RUST_LOG=moodmix::algorithm=trace moodmix recommend ...` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let json = args.json;

    match args.command {
        cli::Command::InitDb => {
            let db_path = db_path(args.db)?;
            info!("Initializing database at {}", db_path.display());
            let catalog = Catalog::open(&db_path)?;
            SessionStore::open(&db_path, load_config(args.config)?.fresh_session())?;
            println!("Database ready at {} ({} songs)", db_path.display(), catalog.count()?);
        }
        cli::Command::Import { path } => {
            let mut catalog = Catalog::open(&db_path(args.db)?)?;
            info!("Importing songs from {}", path.display());
            let summary = catalog.import_json(&path)?;
            println!(
                "Imported {} songs ({} already present, {} invalid)",
                summary.added, summary.skipped, summary.invalid
            );
        }
        cli::Command::Add {
            id,
            title,
            artist,
            album,
            duration,
            genres,
            features,
        } => {
            let mut catalog = Catalog::open(&db_path(args.db)?)?;
            let record = CatalogRecord {
                id,
                title,
                artist,
                album,
                duration_s: duration,
                features: features.to_vector(),
                genres,
            };
            catalog.insert_record(&record)?;
            println!("Added `{}` by {}", record.title, record.artist);
        }
        cli::Command::Delete { id } => {
            let mut catalog = Catalog::open(&db_path(args.db)?)?;
            if catalog.delete_record(&id)? {
                println!("Deleted `{id}`");
            } else {
                anyhow::bail!("No song with id `{id}`");
            }
        }
        cli::Command::List => {
            let catalog = Catalog::open(&db_path(args.db)?)?;
            print_records(&catalog.list_records()?, json)?;
        }
        cli::Command::Search { text } => {
            let catalog = Catalog::open(&db_path(args.db)?)?;
            print_records(&catalog.search(&text)?, json)?;
        }
        cli::Command::Playlist {
            features,
            genre,
            length,
            restore_policy,
        } => {
            let mut config = load_config(args.config)?;
            if let Some(policy) = restore_policy {
                config.restore_policy = policy;
            }
            let length = length.unwrap_or(config.playlist_length);
            let recommender = Recommender::new(Catalog::open(&db_path(args.db)?)?, config);

            info!("Generating playlist of {length} for genre `{genre}`");
            let playlist = recommender.generate_playlist(&features.to_vector(), genre, length)?;
            print_playlist(&playlist, json)?;
        }
        cli::Command::Random { length } => {
            let config = load_config(args.config)?;
            let length = length.unwrap_or(config.playlist_length);
            let recommender = Recommender::new(Catalog::open(&db_path(args.db)?)?, config);
            print_records(&recommender.random_playlist(length)?, json)?;
        }
        cli::Command::Recommend {
            session,
            valence,
            arousal,
            unit_range,
            invert_valence,
            invert_arousal,
            weight_valence,
            weight_arousal,
            genre,
            length,
            extra,
        } => {
            let db_path = db_path(args.db)?;
            let config = load_config(args.config)?;
            let sessions = SessionStore::open(&db_path, config.fresh_session())?;
            let recommender = Recommender::new(Catalog::open(&db_path)?, config);

            let sample = if unit_range {
                EmotionSample::from_unit_range(valence, arousal)
            } else {
                EmotionSample::new(valence, arousal)
            }
            .inverted(invert_valence, invert_arousal);
            let weights = match (weight_valence, weight_arousal) {
                (None, None) => None,
                _ => Some(
                    recommender
                        .config()
                        .default_weights
                        .with_overrides(weight_valence, weight_arousal)?,
                ),
            };
            debug!("Emotion sample {sample:?} for session `{session}`");

            let request = RecommendRequest {
                sample,
                extra: extra.to_vector(),
                genre,
                weights,
                length,
            };
            let recommendation =
                sessions.update(&session, |state| Ok(recommender.recommend(state, &request)?))?;

            if json {
                print_json(&recommendation)?;
            } else {
                let song = &recommendation.song;
                println!("Next: {} - {} [{}]", song.artist, song.title, song.id);
                println!("Switch probability: {:.3}", recommendation.switch_probability);
                println!(
                    "Window mean: valence {:.3}, arousal {:.3}",
                    recommendation.mean.valence, recommendation.mean.arousal
                );
                println!();
                print_playlist(&recommendation.playlist, false)?;
            }
        }
        cli::Command::Session { action } => {
            let db_path = db_path(args.db)?;
            let sessions = SessionStore::open(&db_path, load_config(args.config)?.fresh_session())?;

            match action {
                cli::SessionAction::Start { id } => {
                    sessions.start(&id)?;
                    println!("Session `{id}` started");
                }
                cli::SessionAction::Clear { id } => {
                    sessions.clear(&id)?;
                    println!("Session `{id}` cleared");
                }
                cli::SessionAction::End { id } => {
                    if sessions.end(&id)? {
                        println!("Session `{id}` ended");
                    } else {
                        println!("Session `{id}` did not exist");
                    }
                }
                cli::SessionAction::Played { id, song } => {
                    let catalog = Catalog::open(&db_path)?;
                    if catalog.get_record(&song)?.is_none() {
                        anyhow::bail!("No song with id `{song}`");
                    }
                    sessions.add_played(&id, &song)?;
                    println!("Recorded `{song}` as played in `{id}`");
                }
                cli::SessionAction::Show { id } => {
                    let state = sessions.load(&id)?;
                    if json {
                        print_json(&state)?;
                    } else {
                        let samples: Vec<String> = state
                            .window
                            .samples()
                            .map(|s| format!("({:.2}, {:.2})", s.valence, s.arousal))
                            .collect();
                        println!("Window:   {}", samples.join(" "));
                        println!(
                            "Old mean: valence {:.3}, arousal {:.3}",
                            state.old_mean.valence, state.old_mean.arousal
                        );
                        println!("Played:   {} songs", state.played.len());
                        for song in state.played.iter() {
                            println!("  {song}");
                        }
                    }
                }
                cli::SessionAction::List => {
                    for id in sessions.ids()? {
                        println!("{id}");
                    }
                }
            }
        }
        cli::Command::Genres => {
            for genre in Genre::LABELS {
                println!("{genre}");
            }
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            let shell = completion::shell_to_completion_shell(&shell);
            completion::generate_completions(shell, &mut cmd);
        }
        cli::Command::CompletionEnhanced { shell } => match shell {
            cli::Shell::Bash => completion::generate_enhanced_bash_completion(),
            cli::Shell::Fish => completion::generate_enhanced_fish_completion(),
            _ => {
                return Err(anyhow::anyhow!(
                    "Enhanced completions only supported for bash and fish"
                ))
            }
        },
        cli::Command::CompleteGenres => {
            completion::print_genre_completions();
        }
    }

    Ok(())
}

fn db_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => config::get_db_path(),
    }
}

fn load_config(explicit: Option<PathBuf>) -> Result<RecommenderConfig> {
    let path = match explicit {
        Some(path) => path,
        None => config::get_config_path()?,
    };
    RecommenderConfig::load(&path)
        .with_context(|| format!("Could not load configuration from {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?);
    Ok(())
}

fn print_records(records: &[CatalogRecord], json: bool) -> Result<()> {
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No songs found.");
        return Ok(());
    }

    println!("{:<24} {:<28} {:<36} Genres", "Id", "Artist", "Title");
    println!("{}", "-".repeat(100));
    for record in records {
        let genres: Vec<&str> = record.genres.iter().map(|g| g.label()).collect();
        println!(
            "{:<24} {:<28} {:<36} {}",
            record.id,
            record.artist,
            record.title,
            genres.join(", ")
        );
    }
    println!("\n{} songs", records.len());
    Ok(())
}

fn print_playlist(playlist: &Playlist, json: bool) -> Result<()> {
    if json {
        return print_json(playlist);
    }

    for (position, entry) in playlist.iter().enumerate() {
        println!(
            "{:>2}. {:<28} {:<36} {:.4}",
            position + 1,
            entry.record.artist,
            entry.record.title,
            entry.distance
        );
    }
    Ok(())
}
