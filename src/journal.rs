//! Apply journal and state-directory resolution.
//!
//! Every applied price change is appended to a daily-rotated JSONL file
//! so there is an auditable record of what was pushed to the live
//! marketplace.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

const STATE_DIR_NAME: &str = ".waxvalue";

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn resolve_repo_root() -> Option<PathBuf> {
    let mut cursor = std::env::current_dir().ok()?;
    loop {
        if cursor.join(".git").is_dir() {
            return Some(cursor);
        }
        if !cursor.pop() {
            return None;
        }
    }
}

/// Resolve the durable state directory: explicit config/env value first,
/// then `.waxvalue/` at the repo root, then the working directory.
pub fn resolve_state_dir(configured: &str) -> PathBuf {
    let trimmed = configured.trim();
    if !trimmed.is_empty() {
        return PathBuf::from(trimmed);
    }

    if let Some(root) = resolve_repo_root() {
        return root.join(STATE_DIR_NAME);
    }

    PathBuf::from(STATE_DIR_NAME)
}

pub struct ApplyJournal {
    dir: PathBuf,
    day_key: String,
    file: File,
}

impl ApplyJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let day_key = Utc::now().format("%Y-%m-%d").to_string();
        let file = Self::open_day_file(&dir, &day_key)?;
        Ok(Self { dir, day_key, file })
    }

    fn open_day_file(dir: &Path, day_key: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("applies-{}.jsonl", day_key)))
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        if today != self.day_key {
            self.file = Self::open_day_file(&self.dir, &today)?;
            self.day_key = today;
        }
        Ok(())
    }

    pub fn write_event(&mut self, event: serde_json::Value) {
        let result = (|| -> std::io::Result<()> {
            self.rotate_if_needed()?;
            let line = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            writeln!(self.file, "{}", line)?;
            self.file.flush()?;
            Ok(())
        })();

        if let Err(e) = result {
            tracing::warn!("Apply journal write failed: {}", e);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
