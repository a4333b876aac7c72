//! Append-only JSON-lines store for activation logs.
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::model::ActivationLog;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode activation log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One record per line. Appends from concurrent requests are serialized so
/// lines never interleave.
#[derive(Debug)]
pub struct FileLogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub async fn append(&self, log: &ActivationLog) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(log)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| self.io_err(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        file.write_all(&line).await.map_err(|e| self.io_err(e))?;
        file.flush().await.map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), entry_id = %log.entry_id, "activation log appended");
        Ok(())
    }

    /// Most recent record for `entry_id`, skipping lines that do not parse.
    pub async fn read_latest(&self, entry_id: &str) -> Result<Option<ActivationLog>, AuditError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let lines: Vec<&str> = contents.lines().collect();
        for (idx, line) in lines.iter().enumerate().rev() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActivationLog>(line) {
                Ok(record) if record.entry_id == entry_id => return Ok(Some(record)),
                Ok(_) => {}
                Err(err) => warn!(line = idx + 1, %err, "skipping unreadable audit line"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivationStatus, ValidationReport};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn log(entry_id: &str, activation_id: &str) -> ActivationLog {
        ActivationLog {
            activation_id: activation_id.into(),
            entry_id: entry_id.into(),
            timestamp: Utc::now(),
            status: ActivationStatus::Completed,
            ai_outputs: None,
            validation: ValidationReport::default(),
            platform_response: None,
            platform_error: None,
            brand_voice: BTreeMap::new(),
            transitions: vec![],
            errors: vec![],
            processing_time: 0.1,
        }
    }

    #[tokio::test]
    async fn latest_record_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path().join("nested").join("logs.jsonl"));
        assert!(store.read_latest("a").await.unwrap().is_none());

        store.append(&log("a", "1")).await.unwrap();
        store.append(&log("b", "2")).await.unwrap();
        store.append(&log("a", "3")).await.unwrap();

        let latest = store.read_latest("a").await.unwrap().unwrap();
        assert_eq!(latest.activation_id, "3");
        assert!(store.read_latest("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.jsonl");
        let store = FileLogStore::new(&path);
        store.append(&log("a", "1")).await.unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n\n");
        std::fs::write(&path, raw).unwrap();

        assert_eq!(store.read_latest("a").await.unwrap().unwrap().activation_id, "1");
    }

    #[tokio::test]
    async fn concurrent_appends_stay_line_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileLogStore::new(dir.path().join("logs.jsonl")));
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.append(&log("e", &i.to_string())).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 20);
        for line in lines {
            serde_json::from_str::<ActivationLog>(line).unwrap();
        }
    }
}
