//! Durable session snapshots
//!
//! One pretty-printed JSON file per session, `{id}.json`, under a
//! configured directory. Writes land in a temp file first and are renamed
//! into place so a crash never leaves a torn snapshot. A single mutex
//! serializes the in-memory map and disk writes; readers receive deep
//! copies.

use fir_common::{Error, Result, Session};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Session store backed by a directory of JSON snapshots
pub struct SessionStore {
    dir: PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// Open the store, creating the directory if needed, and load every
    /// parsable snapshot. Unparsable snapshots are logged and skipped so a
    /// bad record never blocks startup.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Storage(format!("failed to create {}: {e}", dir.display())))?;

        let mut sessions = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::Storage(format!("failed to read {}: {e}", dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("failed to list {}: {e}", dir.display())))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Session>(&bytes) {
                    Ok(session) => {
                        debug!(id = %session.id, "loaded session snapshot");
                        sessions.insert(session.id.clone(), session);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unparsable snapshot");
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }

        info!(
            count = sessions.len(),
            dir = %dir.display(),
            "session store opened"
        );
        Ok(Self {
            dir,
            sessions: Mutex::new(sessions),
        })
    }

    /// Persist a session snapshot. The write is atomic: serialize, write to
    /// a temp file, rename over the target.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id.clone(), session.clone());

        let bytes = serde_json::to_vec_pretty(session)?;
        let target = self.dir.join(format!("{}.json", session.id));
        let tmp = self.dir.join(format!("{}.json.tmp", session.id));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| Error::Storage(format!("failed to rename {}: {e}", target.display())))?;
        Ok(())
    }

    /// Deep copy of one session
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Deep copies of all sessions, most recently created first
    pub async fn list(&self) -> Vec<Session> {
        let sessions = self.sessions.lock().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Remove a session and its snapshot. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        let existed = sessions.remove(id).is_some();
        let path = self.dir.join(format!("{id}.json"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Storage(format!(
                    "failed to delete {}: {e}",
                    path.display()
                )))
            }
        }
        Ok(existed)
    }

    /// Session counts keyed by status name, for the health endpoint
    pub async fn status_counts(&self) -> HashMap<String, usize> {
        let sessions = self.sessions.lock().await;
        let mut counts = HashMap::new();
        for session in sessions.values() {
            *counts.entry(session.status.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fir_common::config::AnalyzerSettings;
    use fir_common::SearchSpace;
    use tempfile::tempdir;

    fn session() -> Session {
        let space = SearchSpace::from_json_value(serde_json::json!({
            "name": "s",
            "dimensions": [
                {"name": "percentage", "type": "integer", "bounds": [1, 100], "default": 50}
            ]
        }))
        .unwrap();
        Session::new("svc", space, 10, AnalyzerSettings::default(), None)
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();

        let session = session();
        store.save(&session).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap();
        assert_eq!(loaded, session);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn snapshots_survive_a_reopen() {
        let dir = tempdir().unwrap();
        let session = session();
        {
            let store = SessionStore::open(dir.path()).await.unwrap();
            store.save(&session).await.unwrap();
        }

        let reopened = SessionStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(&session.id).await.unwrap(), session);
    }

    #[tokio::test]
    async fn repeated_saves_of_unchanged_state_are_byte_identical() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();
        let session = session();

        store.save(&session).await.unwrap();
        let path = dir.path().join(format!("{}.json", session.id));
        let first = tokio::fs::read(&path).await.unwrap();

        store.save(&session).await.unwrap();
        let second = tokio::fs::read(&path).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn a_corrupt_snapshot_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let session = session();
        {
            let store = SessionStore::open(dir.path()).await.unwrap();
            store.save(&session).await.unwrap();
        }
        tokio::fs::write(dir.path().join("broken.json"), b"{ not json")
            .await
            .unwrap();

        let store = SessionStore::open(dir.path()).await.unwrap();
        assert_eq!(store.list().await.len(), 1);
        assert!(store.get(&session.id).await.is_some());
    }

    #[tokio::test]
    async fn delete_removes_the_snapshot_file() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();
        let session = session();
        store.save(&session).await.unwrap();

        assert!(store.delete(&session.id).await.unwrap());
        assert!(store.get(&session.id).await.is_none());
        assert!(!dir.path().join(format!("{}.json", session.id)).exists());

        // deleting twice is a quiet no-op
        assert!(!store.delete(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn status_counts_group_sessions() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();

        let mut running = session();
        running.start().unwrap();
        store.save(&running).await.unwrap();
        store.save(&session()).await.unwrap();
        store.save(&session()).await.unwrap();

        let counts = store.status_counts().await;
        assert_eq!(counts.get("RUNNING"), Some(&1));
        assert_eq!(counts.get("PENDING"), Some(&2));
    }
}
