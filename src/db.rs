//! # Catalog Storage
//!
//! The song catalog lives in SQLite: one `songs` row per record with all nine
//! features as columns, plus a `song_genres` table holding each song's top
//! genre labels. The recommender only reads through the [`CandidateStore`]
//! trait, so anything that can answer "which songs match this genre, projected
//! onto these features" can stand in for the database ([`MemoryCatalog`] does
//! in tests and benchmarks).

use crate::features::{FeatureKey, FeatureKeys, FeatureVector};
use crate::genre::Genre;
use anyhow::{bail, Context, Result};
use log::{debug, info, trace, warn};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const SONG_COLUMNS: &str = "id, title, artist, album, duration_s, \
    valence, arousal, authenticity, timeliness, complexity, danceability, tonal, voice, bpm";

/// Offset of the first feature column in [`SONG_COLUMNS`].
const FEATURE_OFFSET: usize = 5;

/// A song as the catalog knows it. Features are always complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
    pub features: FeatureVector,
    /// Top genre labels from the tagger.
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl CatalogRecord {
    /// Whether this record passes `genre` as a filter. `Genre::None` passes
    /// everything.
    #[must_use]
    pub fn in_genre(&self, genre: Genre) -> bool {
        genre
            .as_filter()
            .map_or(true, |wanted| self.genres.contains(&wanted))
    }

    /// Check the invariants the catalog relies on.
    ///
    /// # Errors
    ///
    /// Fails for an empty id, incomplete features or the `none` genre label.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("Song `{}` by `{}` has an empty id", self.title, self.artist);
        }
        if !self.features.is_complete() {
            let missing: Vec<&str> = FeatureKey::ALL
                .iter()
                .filter(|key| self.features.get(**key).is_none())
                .map(|key| key.as_str())
                .collect();
            bail!("Song `{}` is missing features: {}", self.id, missing.join(", "));
        }
        if self.genres.contains(&Genre::None) {
            bail!("Song `{}` lists `none` as a genre", self.id);
        }
        Ok(())
    }
}

/// Genre-filtered catalog slice, projected onto a key list.
/// The three vectors are parallel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    pub ids: Vec<String>,
    pub artists: Vec<String>,
    pub vectors: Vec<Vec<f64>>,
}

impl Candidates {
    pub fn push(&mut self, id: String, artist: String, vector: Vec<f64>) {
        self.ids.push(id);
        self.artists.push(artist);
        self.vectors.push(vector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Read access to the catalog, as needed by the recommender.
pub trait CandidateStore {
    /// Every record in `genre` (all records for `Genre::None`), with vector
    /// components in exactly the order of `keys`. No match is an empty result,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn candidates(&self, genre: Genre, keys: &FeatureKeys) -> Result<Candidates>;

    /// Full records for `ids`, in the same order. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn records(&self, ids: &[String]) -> Result<Vec<CatalogRecord>>;

    /// Every id in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn ids(&self) -> Result<Vec<String>>;
}

/// Outcome of a JSON import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped: usize,
    pub invalid: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Many(Vec<CatalogRecord>),
    One(Box<CatalogRecord>),
}

/// SQLite-backed catalog.
#[derive(Debug)]
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) the catalog database at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog database at {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout on catalog database")?;
        Self::from_connection(conn)
    }

    /// In-memory catalog, mostly for tests.
    ///
    /// # Errors
    ///
    /// Fails if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory catalog")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS songs (
                id           TEXT PRIMARY KEY,
                title        TEXT NOT NULL,
                artist       TEXT NOT NULL,
                album        TEXT,
                duration_s   REAL,
                valence      REAL NOT NULL,
                arousal      REAL NOT NULL,
                authenticity REAL NOT NULL,
                timeliness   REAL NOT NULL,
                complexity   REAL NOT NULL,
                danceability REAL NOT NULL,
                tonal        REAL NOT NULL,
                voice        REAL NOT NULL,
                bpm          REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS song_genres (
                song_id TEXT NOT NULL,
                genre   TEXT NOT NULL,
                rank    INTEGER NOT NULL,
                PRIMARY KEY (song_id, genre)
            );
            CREATE INDEX IF NOT EXISTS idx_song_genres_genre ON song_genres(genre);
            CREATE INDEX IF NOT EXISTS idx_songs_title_artist ON songs(title, artist);",
        )
        .context("Invalid SQL when creating catalog tables")?;

        Ok(Self { conn })
    }

    /// Insert or replace one record.
    ///
    /// # Errors
    ///
    /// Fails on invalid records or SQL errors.
    pub fn insert_record(&mut self, record: &CatalogRecord) -> Result<()> {
        self.insert_records(std::slice::from_ref(record)).map(|_| ())
    }

    /// Insert or replace records in a single transaction.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid record or SQL error; nothing is written then.
    pub fn insert_records(&mut self, records: &[CatalogRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;

        {
            let mut song_stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO songs ({SONG_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ))?;
            let mut clear_stmt = tx.prepare("DELETE FROM song_genres WHERE song_id = ?1")?;
            let mut genre_stmt = tx.prepare(
                "INSERT OR IGNORE INTO song_genres (song_id, genre, rank) VALUES (?1, ?2, ?3)",
            )?;

            for record in records {
                record.validate()?;
                let f = &record.features;
                song_stmt
                    .execute(params![
                        record.id,
                        record.title,
                        record.artist,
                        record.album,
                        record.duration_s,
                        f.valence,
                        f.arousal,
                        f.authenticity,
                        f.timeliness,
                        f.complexity,
                        f.danceability,
                        f.tonal,
                        f.voice,
                        f.bpm,
                    ])
                    .with_context(|| format!("Failed to INSERT song `{}`", record.id))?;

                clear_stmt.execute([&record.id])?;
                for (rank, genre) in record.genres.iter().enumerate() {
                    genre_stmt
                        .execute(params![record.id, genre.label(), rank as i64])
                        .with_context(|| {
                            format!("Failed to INSERT genre `{genre}` for song `{}`", record.id)
                        })?;
                }
                trace!("Stored song `{}` ({} genres)", record.id, record.genres.len());
            }
        }

        tx.commit().context("Committing catalog transaction failed")?;
        Ok(records.len())
    }

    /// Remove a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn delete_record(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM song_genres WHERE song_id = ?1", [id])?;
        let removed = tx
            .execute("DELETE FROM songs WHERE id = ?1", [id])
            .with_context(|| format!("Failed to DELETE song `{id}`"))?;
        tx.commit().context("Committing catalog transaction failed")?;
        Ok(removed > 0)
    }

    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn get_record(&self, id: &str) -> Result<Option<CatalogRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1"),
                [id],
                record_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query song `{id}`"))?;

        match record {
            Some(mut record) => {
                record.genres = self.genres_of(&record.id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// All records, sorted by artist then title.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn list_records(&self) -> Result<Vec<CatalogRecord>> {
        self.query_records(
            &format!(
                "SELECT {SONG_COLUMNS} FROM songs ORDER BY artist COLLATE NOCASE, title COLLATE NOCASE"
            ),
            [],
        )
    }

    /// Case-insensitive substring search over titles and artists.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn search(&self, text: &str) -> Result<Vec<CatalogRecord>> {
        let pattern = format!("%{}%", text.trim());
        self.query_records(
            &format!(
                "SELECT {SONG_COLUMNS} FROM songs
                 WHERE title LIKE ?1 OR artist LIKE ?1
                 ORDER BY title COLLATE NOCASE"
            ),
            [pattern],
        )
    }

    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn count(&self) -> Result<u32> {
        self.conn
            .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))
            .context("Could not count catalog entries")
    }

    /// Whether a song with this title and artist is already catalogued.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn contains_song(&self, title: &str, artist: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM songs WHERE title = ?1 AND artist = ?2 LIMIT 1",
                [title, artist],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Import pre-computed records from a JSON file, or from every `.json`
    /// file in a directory. A file holds one record or an array of records.
    /// Records whose (title, artist) is already present are skipped; invalid
    /// records are logged and counted but do not abort the import.
    ///
    /// # Errors
    ///
    /// Fails if the path cannot be read or a file is not valid JSON.
    pub fn import_json(&mut self, path: &Path) -> Result<ImportSummary> {
        let files = if path.is_dir() {
            let mut files: Vec<_> = fs::read_dir(path)
                .with_context(|| format!("Failed to read import directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut summary = ImportSummary::default();
        for file in files {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records = match serde_json::from_str::<ImportFile>(&raw)
                .with_context(|| format!("Could not decode {}", file.display()))?
            {
                ImportFile::Many(records) => records,
                ImportFile::One(record) => vec![*record],
            };

            for record in records {
                if let Err(e) = record.validate() {
                    warn!("Skipping invalid record in {}: {e}", file.display());
                    summary.invalid += 1;
                    continue;
                }
                if self.contains_song(&record.title, &record.artist)? {
                    debug!("`{}` by `{}` already catalogued", record.title, record.artist);
                    summary.skipped += 1;
                    continue;
                }
                self.insert_record(&record)?;
                summary.added += 1;
            }
        }

        info!(
            "Import finished: {} added, {} skipped, {} invalid",
            summary.added, summary.skipped, summary.invalid
        );
        Ok(summary)
    }

    fn query_records<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<CatalogRecord>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Invalid SQL statement: {sql}"))?;
        let rows = stmt
            .query_map(params, record_from_row)
            .context("Cannot query songs.")?;

        let mut records = Vec::new();
        // Could use extend, but then no error handling.
        for row in rows {
            let mut record = row.context("Queried song unwrap failed.")?;
            record.genres = self.genres_of(&record.id)?;
            records.push(record);
        }
        Ok(records)
    }

    fn genres_of(&self, id: &str) -> Result<Vec<Genre>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT genre FROM song_genres WHERE song_id = ?1 ORDER BY rank")?;
        let labels = stmt.query_map([id], |row| row.get::<_, String>(0))?;

        let mut genres = Vec::new();
        for label in labels {
            let label = label?;
            match label.parse::<Genre>() {
                Ok(genre) => genres.push(genre),
                Err(_) => warn!("Ignoring unknown genre `{label}` on song `{id}`"),
            }
        }
        Ok(genres)
    }
}

impl CandidateStore for Catalog {
    fn candidates(&self, genre: Genre, keys: &FeatureKeys) -> Result<Candidates> {
        if keys.is_empty() {
            bail!("Cannot project candidates onto an empty feature list");
        }

        // Column names come from the closed FeatureKey set, never from input.
        let columns: Vec<String> = keys.iter().map(|key| format!("s.{key}")).collect();
        let columns = columns.join(", ");
        let sql = match genre.as_filter() {
            Some(_) => format!(
                "SELECT s.id, s.artist, {columns} FROM songs s
                 WHERE EXISTS (SELECT 1 FROM song_genres g WHERE g.song_id = s.id AND g.genre = ?1)
                 ORDER BY s.rowid"
            ),
            None => format!("SELECT s.id, s.artist, {columns} FROM songs s ORDER BY s.rowid"),
        };

        let width = keys.len();
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Invalid SQL statement when SELECTing candidates: {sql}"))?;
        let rows = stmt
            .query_map(params_from_iter(genre.as_filter().map(Genre::label)), |row| {
                let vector = (0..width)
                    .map(|i| row.get::<_, f64>(i + 2))
                    .collect::<rusqlite::Result<Vec<f64>>>()?;
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, vector))
            })
            .with_context(|| format!("Cannot query candidates for genre `{genre}`"))?;

        let mut candidates = Candidates::default();
        for row in rows {
            let (id, artist, vector) = row.context("Queried candidate unwrap failed.")?;
            candidates.push(id, artist, vector);
        }
        debug!(
            "{} candidates for genre `{genre}` over {keys}",
            candidates.len()
        );
        Ok(candidates)
    }

    fn records(&self, ids: &[String]) -> Result<Vec<CatalogRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_record(id)? {
                Some(record) => records.push(record),
                None => warn!("Song `{id}` vanished from the catalog"),
            }
        }
        Ok(records)
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM songs ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Cannot query song ids.")?;
        Ok(ids)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogRecord> {
    let mut features = FeatureVector::default();
    for (i, key) in FeatureKey::ALL.into_iter().enumerate() {
        features.set(key, Some(row.get(FEATURE_OFFSET + i)?));
    }

    Ok(CatalogRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        duration_s: row.get(4)?,
        features,
        genres: Vec::new(),
    })
}

/// Catalog held in memory. Used by tests and benchmarks, and handy for
/// callers that already have their records loaded.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    records: Vec<CatalogRecord>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CandidateStore for MemoryCatalog {
    fn candidates(&self, genre: Genre, keys: &FeatureKeys) -> Result<Candidates> {
        let mut candidates = Candidates::default();
        for record in self.records.iter().filter(|r| r.in_genre(genre)) {
            let vector = record.features.project(keys, &record.id)?;
            candidates.push(record.id.clone(), record.artist.clone(), vector);
        }
        Ok(candidates)
    }

    fn records(&self, ids: &[String]) -> Result<Vec<CatalogRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.records.iter().find(|r| &r.id == id).cloned())
            .collect())
    }

    fn ids(&self) -> Result<Vec<String>> {
        Ok(self.records.iter().map(|r| r.id.clone()).collect())
    }
}
