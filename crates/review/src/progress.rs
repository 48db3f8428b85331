//! Durable client-side state.
//!
//! A single explicit state struct persisted as JSON, replacing the web
//! client's ambient key-value storage: the analysis progress snapshot,
//! the "has data" flag, the cached session id, and display preferences.
//! All of it is advisory, never authoritative.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::Error;
use serde::{Deserialize, Serialize};

/// Loading-state snapshot persisted throughout ingestion so a restarted
/// process resumes the correct progress display instead of re-triggering
/// an analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub is_running: bool,
    pub current: u64,
    pub total: u64,
    pub started_at: Option<DateTime<Utc>>,
}

/// Persisted display preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayPrefs {
    pub items_per_page: usize,
    pub default_sort: String,
    pub show_fairly_priced: bool,
}

impl Default for DisplayPrefs {
    fn default() -> Self {
        Self {
            items_per_page: 25,
            default_sort: "price_delta".to_string(),
            show_fairly_priced: false,
        }
    }
}

/// Everything the client persists between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewState {
    #[serde(default)]
    pub progress: ProgressSnapshot,
    /// A completed run's results are available server-side; a reload
    /// should fetch them rather than re-trigger ingestion.
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub prefs: DisplayPrefs,
}

/// Loads and persists [`ReviewState`] under the state directory.
pub struct StateStore {
    state_path: PathBuf,
    state: ReviewState,
}

impl StateStore {
    /// Load existing state, falling back to defaults on a missing or
    /// corrupt file.
    pub fn open(dir: &Path) -> Result<Self, Error> {
        create_dir_all(dir)?;
        let state_path = dir.join("review-state.json");
        let state = if state_path.exists() {
            let mut raw = String::new();
            File::open(&state_path)?.read_to_string(&mut raw)?;
            serde_json::from_str::<ReviewState>(&raw).unwrap_or_default()
        } else {
            ReviewState::default()
        };

        Ok(Self { state_path, state })
    }

    fn persist(&self) -> Result<(), Error> {
        let data = serde_json::to_string_pretty(&self.state)?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.state_path)?;
        file.write_all(data.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.state.session_id.as_deref()
    }

    pub fn set_session_id(&mut self, session_id: &str) -> Result<(), Error> {
        self.state.session_id = Some(session_id.to_string());
        self.persist()
    }

    /// Drop the local session, e.g. after the server rejects it with 401.
    /// The in-memory suggestion store is unaffected.
    pub fn clear_session(&mut self) -> Result<(), Error> {
        self.state.session_id = None;
        self.persist()
    }

    pub fn begin_run(&mut self, total: u64) -> Result<(), Error> {
        self.state.progress = ProgressSnapshot {
            is_running: true,
            current: 0,
            total,
            started_at: Some(Utc::now()),
        };
        self.persist()
    }

    pub fn update_progress(&mut self, current: u64, total: u64) -> Result<(), Error> {
        self.state.progress.current = current;
        self.state.progress.total = total;
        if !self.state.progress.is_running {
            self.state.progress.is_running = true;
            self.state.progress.started_at = Some(Utc::now());
        }
        self.persist()
    }

    /// Ingestion finished: clear the running flag and mark results
    /// available.
    pub fn finish_run(&mut self) -> Result<(), Error> {
        self.state.progress.is_running = false;
        self.state.has_data = true;
        self.persist()
    }

    /// Ingestion aborted without completing.
    pub fn abort_run(&mut self) -> Result<(), Error> {
        self.state.progress.is_running = false;
        self.persist()
    }

    pub fn set_prefs(&mut self, prefs: DisplayPrefs) -> Result<(), Error> {
        self.state.prefs = prefs;
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "waxvalue-state-test-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_round_trip_across_reopen() {
        let dir = temp_dir("roundtrip");

        {
            let mut store = StateStore::open(&dir).unwrap();
            store.set_session_id("sess-123").unwrap();
            store.begin_run(40).unwrap();
            store.update_progress(12, 40).unwrap();
        }

        let store = StateStore::open(&dir).unwrap();
        assert_eq!(store.session_id(), Some("sess-123"));
        assert!(store.state().progress.is_running);
        assert_eq!(store.state().progress.current, 12);
        assert_eq!(store.state().progress.total, 40);
        assert!(!store.state().has_data);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_finish_run_sets_has_data_and_stops() {
        let dir = temp_dir("finish");

        let mut store = StateStore::open(&dir).unwrap();
        store.begin_run(3).unwrap();
        store.finish_run().unwrap();

        assert!(!store.state().progress.is_running);
        assert!(store.state().has_data);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_clear_session_keeps_everything_else() {
        let dir = temp_dir("clear");

        let mut store = StateStore::open(&dir).unwrap();
        store.set_session_id("sess-abc").unwrap();
        store.finish_run().unwrap();
        store.clear_session().unwrap();

        assert_eq!(store.session_id(), None);
        assert!(store.state().has_data);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_state_file_falls_back_to_defaults() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("review-state.json"), b"{nope").unwrap();

        let store = StateStore::open(&dir).unwrap();
        assert!(store.session_id().is_none());
        assert!(!store.state().has_data);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
