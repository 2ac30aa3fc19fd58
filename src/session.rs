//! Listener sessions.
//!
//! A session is one JSON blob: the emotion window, the mean from the previous
//! request and the ids of songs already played. [`SessionStore`] keeps blobs
//! in SQLite and applies every read-modify-write under a per-session lock, so
//! two concurrent requests on one session run one after the other.

use crate::emotion::{EmotionWindow, MeanSnapshot};
use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Ids of songs the listener actually played.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayedHistory(BTreeSet<String>);

impl PlayedHistory {
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Returns false if the id was already recorded.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for PlayedHistory {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub window: EmotionWindow,
    #[serde(default)]
    pub old_mean: MeanSnapshot,
    #[serde(default)]
    pub played: PlayedHistory,
}

impl SessionState {
    /// A fresh session: window pre-filled with `neutral_fill`, old mean at
    /// (0, 0), nothing played.
    #[must_use]
    pub fn fresh(window_size: usize, neutral_fill: f64) -> Self {
        Self {
            window: EmotionWindow::filled(window_size, neutral_fill),
            old_mean: MeanSnapshot::default(),
            played: PlayedHistory::default(),
        }
    }

    /// # Errors
    ///
    /// Fails if the state cannot be encoded.
    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode session state")
    }

    /// # Errors
    ///
    /// Fails on malformed JSON or an inconsistent window.
    pub fn from_blob(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).context("Failed to decode session state")
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::fresh(10, 0.5)
    }
}

/// One mutex per session id.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the lock for `session_id`, created on first use.
    pub fn lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Run `f` while holding the lock for `session_id`.
    pub fn with_session<T>(&self, session_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock(session_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Drop the lock entry of an ended session. The entry stays while any
    /// other caller still holds a handle to it, so every holder of `id`
    /// keeps contending on the same mutex.
    pub fn forget(&self, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }
}

/// SQLite store for session blobs.
#[derive(Debug)]
pub struct SessionStore {
    conn: Mutex<Connection>,
    fresh: SessionState,
    locks: SessionLocks,
}

impl SessionStore {
    /// Open (or create) the session table in the database at `path`. `fresh`
    /// is the state new and cleared sessions start from.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or the table cannot be created.
    pub fn open(path: &Path, fresh: SessionState) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open session database at {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout on session database")?;
        Self::from_connection(conn, fresh)
    }

    /// # Errors
    ///
    /// Fails if the table cannot be created.
    pub fn open_in_memory(fresh: SessionState) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory session store")?;
        Self::from_connection(conn, fresh)
    }

    fn from_connection(conn: Connection, fresh: SessionState) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                state      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .context("Invalid SQL when creating sessions table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            fresh,
            locks: SessionLocks::new(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn fresh_state(&self) -> SessionState {
        self.fresh.clone()
    }

    /// Create `id` with a fresh state, replacing whatever was there.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn start(&self, id: &str) -> Result<SessionState> {
        self.locks.with_session(id, || {
            let state = self.fresh_state();
            self.write(id, &state)?;
            info!("Started session `{id}`");
            Ok(state)
        })
    }

    /// Stored state of `id`, or a fresh state if there is none.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors or a corrupt blob.
    pub fn load(&self, id: &str) -> Result<SessionState> {
        Ok(self.read(id)?.unwrap_or_else(|| self.fresh_state()))
    }

    /// Whether `id` has a stored state.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors or a corrupt blob.
    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read(id)?.is_some())
    }

    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn save(&self, id: &str, state: &SessionState) -> Result<()> {
        self.locks.with_session(id, || self.write(id, state))
    }

    /// Load, modify and save `id` under its session lock. The state is only
    /// written back when `f` succeeds.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or store failures.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut SessionState) -> Result<T>) -> Result<T> {
        self.locks.with_session(id, || {
            let mut state = self.load(id)?;
            let value = f(&mut state)?;
            self.write(id, &state)?;
            Ok(value)
        })
    }

    /// Reset `id` to a fresh state.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn clear(&self, id: &str) -> Result<()> {
        self.locks.with_session(id, || {
            self.write(id, &self.fresh)?;
            debug!("Cleared session `{id}`");
            Ok(())
        })
    }

    /// Delete `id`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn end(&self, id: &str) -> Result<bool> {
        let removed = self.locks.with_session(id, || {
            self.conn()
                .execute("DELETE FROM sessions WHERE id = ?1", [id])
                .with_context(|| format!("Failed to DELETE session `{id}`"))
        })?;
        self.locks.forget(id);
        info!("Ended session `{id}`");
        Ok(removed > 0)
    }

    /// Record a played song.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn add_played(&self, id: &str, song_id: &str) -> Result<()> {
        self.update(id, |state| {
            if !state.played.insert(song_id) {
                debug!("Song `{song_id}` already in history of `{id}`");
            }
            Ok(())
        })
    }

    /// All stored session ids.
    ///
    /// # Errors
    ///
    /// Fails on SQL errors.
    pub fn ids(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Cannot query session ids.")?;
        Ok(ids)
    }

    fn read(&self, id: &str) -> Result<Option<SessionState>> {
        let blob: Option<String> = self
            .conn()
            .query_row("SELECT state FROM sessions WHERE id = ?1", [id], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to query session `{id}`"))?;

        blob.map(|blob| {
            SessionState::from_blob(&blob).with_context(|| format!("Session `{id}` is corrupt"))
        })
        .transpose()
    }

    fn write(&self, id: &str, state: &SessionState) -> Result<()> {
        let blob = state.to_blob()?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO sessions (id, state, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, blob, now],
            )
            .with_context(|| format!("Failed to store session `{id}`"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionSample;
    use std::thread;

    fn store() -> SessionStore {
        SessionStore::open_in_memory(SessionState::fresh(10, 0.5)).unwrap()
    }

    #[test]
    fn test_missing_session_loads_fresh() -> Result<()> {
        let store = store();
        let state = store.load("nobody")?;
        assert_eq!(state, SessionState::fresh(10, 0.5));
        assert!(!store.exists("nobody")?);
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let store = store();
        let mut state = store.start("s1")?;
        state.window.push(EmotionSample::new(-0.3, 0.8));
        state.old_mean = MeanSnapshot {
            valence: 0.1,
            arousal: 0.2,
        };
        store.save("s1", &state)?;

        assert_eq!(store.load("s1")?, state);
        Ok(())
    }

    #[test]
    fn test_add_played_creates_and_extends_history() -> Result<()> {
        let store = store();
        store.add_played("s1", "song-a")?;
        store.add_played("s1", "song-b")?;
        store.add_played("s1", "song-a")?;

        let played: Vec<String> = store.load("s1")?.played.iter().map(String::from).collect();
        assert_eq!(played, vec!["song-a", "song-b"]);
        Ok(())
    }

    #[test]
    fn test_clear_resets_but_keeps_session() -> Result<()> {
        let store = store();
        store.add_played("s1", "song-a")?;
        store.clear("s1")?;

        assert!(store.exists("s1")?);
        assert!(store.load("s1")?.played.is_empty());
        Ok(())
    }

    #[test]
    fn test_end_removes_session() -> Result<()> {
        let store = store();
        store.start("s1")?;
        assert!(store.end("s1")?);
        assert!(!store.end("s1")?);
        assert!(store.ids()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_update_leaves_state_untouched() -> Result<()> {
        let store = store();
        store.add_played("s1", "song-a")?;

        let result: Result<()> = store.update("s1", |state| {
            state.played.insert("song-b");
            anyhow::bail!("request failed")
        });
        assert!(result.is_err());
        assert_eq!(store.load("s1")?.played.len(), 1);
        Ok(())
    }

    #[test]
    fn test_concurrent_updates_are_serialized() -> Result<()> {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || -> Result<()> {
                    for i in 0..10 {
                        store.add_played("shared", &format!("song-{t}-{i}"))?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked")?;
        }

        assert_eq!(store.load("shared")?.played.len(), 80);
        Ok(())
    }

    #[test]
    fn test_corrupt_blob_is_reported() -> Result<()> {
        let store = store();
        store
            .conn()
            .execute("INSERT INTO sessions (id, state, updated_at) VALUES ('bad', '{', 0)", [])?;
        let err = store.load("bad").unwrap_err();
        assert!(format!("{err:#}").contains("corrupt"));
        Ok(())
    }

    #[test]
    fn test_locks_are_shared_per_id() {
        let locks = SessionLocks::new();
        assert!(Arc::ptr_eq(&locks.lock("a"), &locks.lock("a")));
        assert!(!Arc::ptr_eq(&locks.lock("a"), &locks.lock("b")));
        assert_eq!(locks.with_session("a", || 7), 7);
    }

    #[test]
    fn test_forget_keeps_locks_that_are_still_held() {
        let locks = SessionLocks::new();
        let held = locks.lock("s");
        locks.forget("s");
        assert!(Arc::ptr_eq(&held, &locks.lock("s")));

        drop(held);
        locks.forget("s");
        assert_eq!(locks.locks.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_end_does_not_split_the_session_lock() -> Result<()> {
        let store = Arc::new(store());
        store.start("s")?;

        let old = store.locks.lock("s");
        assert!(store.end("s")?);
        let new = store.locks.lock("s");
        assert!(Arc::ptr_eq(&old, &new));

        let _guard = old.lock().unwrap();
        let contender = thread::spawn(move || {
            let acquired = new.try_lock().is_ok();
            acquired
        });
        assert!(!contender.join().expect("contender panicked"));
        Ok(())
    }
}
