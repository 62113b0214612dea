//! Durable per-session transcript storage.
//!
//! Each session lives in its own `<id>.json` file under the configured
//! sessions directory. Writes go through a temp-file-then-rename sequence so
//! a crash mid-write never leaves a half-written session on disk.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sa_domain::tool::Message;
use sa_domain::trace::TraceEvent;

/// Sessions are truncated to their most recent messages past this count, to
/// bound both file size and the prompt sent to the provider on replay.
pub const MAX_MESSAGES: usize = 1000;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// A durable session record: header metadata plus the message transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub session_id: Uuid,
    /// Auto-derived from the first 30 characters of the first user message,
    /// or left unset until one exists.
    #[serde(default)]
    pub name: Option<String>,
    pub model: String,
    #[serde(default)]
    pub system: Option<String>,
    pub max_tokens: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Metadata-only view returned by `list_all`, without the message bodies.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub name: Option<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(r: &SessionRecord) -> Self {
        Self {
            session_id: r.session_id,
            name: r.name.clone(),
            model: r.model.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
            message_count: r.messages.len(),
        }
    }
}

/// Durable session storage, one JSON file per session under `directory`.
pub struct SessionStore {
    directory: PathBuf,
    /// Per-session lock, so concurrent `save`/`delete` calls for the same id
    /// serialize instead of racing on the read-modify-write cycle.
    locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            locks: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.directory.join(format!("{id}.json"))
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(&id) {
            return lock.clone();
        }
        self.locks
            .write()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a new, empty session and persist it.
    pub fn create(&self, model: String, system: Option<String>, max_tokens: u32) -> Result<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            schema_version: SCHEMA_VERSION,
            session_id: Uuid::new_v4(),
            name: None,
            model,
            system,
            max_tokens,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.write_record(&record)?;
        TraceEvent::SessionCreated {
            session_id: record.session_id.to_string(),
        }
        .emit();
        Ok(record)
    }

    /// Load a session's full record.
    pub fn load(&self, id: Uuid) -> Result<SessionRecord> {
        let _guard = self.lock_for(id).lock();
        self.read_record(id)
    }

    fn read_record(&self, id: Uuid) -> Result<SessionRecord> {
        let path = self.path_for(id);
        let raw = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SessionError::NotFound(id)
            } else {
                SessionError::Storage(e)
            }
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Replace a session's messages and persist, deriving `name` from the
    /// first user message if not already set, and truncating to the most
    /// recent `MAX_MESSAGES` entries.
    pub fn save(&self, id: Uuid, mut messages: Vec<Message>) -> Result<SessionRecord> {
        let guard = self.lock_for(id);
        let _guard = guard.lock();

        let mut record = self.read_record(id)?;
        if messages.len() > MAX_MESSAGES {
            let excess = messages.len() - MAX_MESSAGES;
            messages.drain(0..excess);
        }
        record.messages = messages;
        record.updated_at = Utc::now();
        if record.name.is_none() {
            record.name = record
                .messages
                .iter()
                .find(|m| matches!(m.role, sa_domain::tool::Role::User))
                .and_then(|m| m.content.text())
                .map(|t| t.chars().take(30).collect());
        }

        self.write_record(&record)?;
        TraceEvent::SessionSaved {
            session_id: id.to_string(),
            message_count: record.messages.len(),
        }
        .emit();
        Ok(record)
    }

    /// Clear a session's message history, keeping its header fields.
    pub fn clear_history(&self, id: Uuid) -> Result<SessionRecord> {
        let guard = self.lock_for(id);
        let _guard = guard.lock();

        let mut record = self.read_record(id)?;
        record.messages.clear();
        record.updated_at = Utc::now();
        self.write_record(&record)?;
        TraceEvent::SessionCleared {
            session_id: id.to_string(),
        }
        .emit();
        Ok(record)
    }

    /// Delete a single session.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let guard = self.lock_for(id);
        let _guard = guard.lock();

        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                TraceEvent::SessionDeleted {
                    session_id: id.to_string(),
                }
                .emit();
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SessionError::NotFound(id)),
            Err(e) => Err(SessionError::Storage(e)),
        }
    }

    /// Clear the message history of every session on disk, keeping each
    /// session's header fields and file intact — distinct from
    /// `delete_all`, which removes the session files themselves.
    pub fn clear_all_history(&self) -> Result<usize> {
        let mut count = 0;
        for summary in self.list_all()? {
            if self.clear_history(summary.session_id).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete every session on disk.
    pub fn delete_all(&self) -> Result<usize> {
        let mut count = 0;
        for summary in self.list_all()? {
            if self.delete(summary.session_id).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether a session exists.
    pub fn exists(&self, id: Uuid) -> bool {
        self.path_for(id).exists()
    }

    /// List metadata for every session on disk, newest first.
    pub fn list_all(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(stem) else {
                continue;
            };
            if let Ok(record) = self.read_record(id) {
                summaries.push(SessionSummary::from(&record));
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Atomically write `record` to its file: write a temp file in the same
    /// directory, fsync it, then rename over the destination. The rename is
    /// atomic on the same filesystem, so readers never observe a partial
    /// write.
    fn write_record(&self, record: &SessionRecord) -> Result<()> {
        let path = self.path_for(record.session_id);
        let tmp_path = self
            .directory
            .join(format!("{}.json.tmp-{}", record.session_id, Uuid::new_v4()));

        let json = serde_json::to_string_pretty(record)?;
        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn create_then_load_round_trips() {
        let (_dir, store) = make_store();
        let created = store.create("claude-sonnet-4-20250514".into(), None, 8192).unwrap();
        let loaded = store.load(created.session_id).unwrap();
        assert_eq!(loaded.session_id, created.session_id);
        assert!(loaded.messages.is_empty());
    }

    #[test]
    fn load_missing_session_is_not_found() {
        let (_dir, store) = make_store();
        let err = store.load(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn save_derives_name_from_first_user_message() {
        let (_dir, store) = make_store();
        let created = store.create("m".into(), None, 100).unwrap();
        let messages = vec![Message::user(
            "this is a fairly long first message that will get truncated",
        )];
        let saved = store.save(created.session_id, messages).unwrap();
        assert_eq!(saved.name.as_deref(), Some("this is a fairly long first "));
    }

    #[test]
    fn save_truncates_to_max_messages() {
        let (_dir, store) = make_store();
        let created = store.create("m".into(), None, 100).unwrap();
        let messages: Vec<Message> = (0..MAX_MESSAGES + 50)
            .map(|i| Message::user(format!("msg {i}")))
            .collect();
        let saved = store.save(created.session_id, messages).unwrap();
        assert_eq!(saved.messages.len(), MAX_MESSAGES);
        assert_eq!(saved.messages[0].content.text(), Some("msg 50"));
    }

    #[test]
    fn clear_history_keeps_header_fields() {
        let (_dir, store) = make_store();
        let created = store.create("m".into(), Some("sys".into()), 100).unwrap();
        store
            .save(created.session_id, vec![Message::user("hi")])
            .unwrap();
        let cleared = store.clear_history(created.session_id).unwrap();
        assert!(cleared.messages.is_empty());
        assert_eq!(cleared.system.as_deref(), Some("sys"));
    }

    #[test]
    fn delete_removes_file_and_then_not_found() {
        let (_dir, store) = make_store();
        let created = store.create("m".into(), None, 100).unwrap();
        assert!(store.exists(created.session_id));
        store.delete(created.session_id).unwrap();
        assert!(!store.exists(created.session_id));
        assert!(matches!(
            store.delete(created.session_id).unwrap_err(),
            SessionError::NotFound(_)
        ));
    }

    #[test]
    fn list_all_returns_every_session() {
        let (_dir, store) = make_store();
        store.create("m".into(), None, 100).unwrap();
        store.create("m".into(), None, 100).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn delete_all_clears_the_directory() {
        let (_dir, store) = make_store();
        store.create("m".into(), None, 100).unwrap();
        store.create("m".into(), None, 100).unwrap();
        let removed = store.delete_all().unwrap();
        assert_eq!(removed, 2);
        assert!(store.list_all().unwrap().is_empty());
    }
}
