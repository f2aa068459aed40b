//! JSON-backed session index.
//!
//! ```text
//! <data root>/
//!   sessions.json               ← every RecordingSession
//!   session_<id>.mp4            ← artifacts, referenced by filename
//!   session_<id>.jpg            ← thumbnail sidecars
//! ```
//!
//! The index is held in memory behind an `RwLock`.  A mutation builds the
//! next index, rewrites the file through a temporary copy and only then
//! replaces the in-memory list, so a failed write leaves both untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use uuid::Uuid;

use super::{thumbnail_filename, RecordingSession};

/// Name of the index file under the data root.
pub const INDEX_FILE: &str = "sessions.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("session index is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("session {0} already exists")]
    Duplicate(Uuid),

    #[error("summary failed: {0}")]
    Summary(String),
}

pub struct SessionStore {
    root: PathBuf,
    index: PathBuf,
    sessions: RwLock<Vec<RecordingSession>>,
}

impl SessionStore {
    /// Open (or create) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let index = root.join(INDEX_FILE);

        let mut sessions: Vec<RecordingSession> = match fs::read_to_string(&index) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        for session in &mut sessions {
            let Some(name) = &session.thumbnail_filename else {
                continue;
            };
            match fs::read(root.join(name)) {
                Ok(jpeg) => session.thumbnail = Some(jpeg),
                Err(e) => log::warn!("store: thumbnail {name} unavailable: {e}"),
            }
        }

        let store = Self {
            root,
            index,
            sessions: RwLock::new(sessions),
        };
        log::debug!(
            "store: opened {} ({} sessions)",
            store.index.display(),
            store.len()
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a session's artifact.
    pub fn artifact_path(&self, session: &RecordingSession) -> PathBuf {
        self.root.join(&session.video_filename)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a new record.  A thumbnail is written to its sidecar first and
    /// removed again if the index cannot be saved.
    pub fn insert(&self, mut session: RecordingSession) -> Result<(), StoreError> {
        let mut sessions = self.write();
        if sessions.iter().any(|s| s.id == session.id) {
            return Err(StoreError::Duplicate(session.id));
        }

        let sidecar = self.save_thumbnail(&mut session)?;
        let mut next = sessions.clone();
        next.push(session);
        if let Err(e) = self.persist(&next) {
            if let Some(path) = sidecar {
                remove_quietly(&path);
            }
            return Err(e);
        }

        if let Some(saved) = next.last() {
            log::info!("store: saved \"{}\" ({})", saved.title, saved.id);
        }
        *sessions = next;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<RecordingSession> {
        self.read().iter().find(|s| s.id == id).cloned()
    }

    /// Every session, newest first.
    pub fn list(&self) -> Vec<RecordingSession> {
        let mut sessions = self.read().clone();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Replace the stored record with the same id.
    pub fn update(&self, mut session: RecordingSession) -> Result<(), StoreError> {
        let mut sessions = self.write();
        let position = sessions
            .iter()
            .position(|s| s.id == session.id)
            .ok_or(StoreError::NotFound(session.id))?;

        let previous = &sessions[position];
        if session.thumbnail != previous.thumbnail {
            self.save_thumbnail(&mut session)?;
        } else {
            session.thumbnail_filename = previous.thumbnail_filename.clone();
        }

        let mut next = sessions.clone();
        next[position] = session;
        self.persist(&next)?;
        *sessions = next;
        Ok(())
    }

    pub fn mark_analyzed(&self, id: Uuid, summary: Option<String>) -> Result<(), StoreError> {
        let mut sessions = self.write();
        let mut next = sessions.clone();
        let slot = next
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound(id))?;
        slot.analyzed = true;
        if summary.is_some() {
            slot.summary = summary;
        }
        self.persist(&next)?;
        *sessions = next;
        Ok(())
    }

    /// Remove the record together with its artifact and thumbnail.
    ///
    /// The artifact is moved aside before the index is rewritten and put
    /// back if that write fails, so record and file never part ways.
    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut sessions = self.write();
        let position = sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or(StoreError::NotFound(id))?;

        let artifact = self.artifact_path(&sessions[position]);
        let staged = artifact.with_extension("deleting");
        let moved = match fs::rename(&artifact, &staged) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("store: artifact {} was already gone", artifact.display());
                false
            }
            Err(e) => return Err(e.into()),
        };

        let mut next = sessions.clone();
        let removed = next.remove(position);
        if let Err(e) = self.persist(&next) {
            if moved {
                if let Err(restore) = fs::rename(&staged, &artifact) {
                    log::error!("store: could not restore {}: {restore}", artifact.display());
                }
            }
            return Err(e);
        }
        *sessions = next;

        if moved {
            remove_quietly(&staged);
        }
        if let Some(name) = &removed.thumbnail_filename {
            remove_quietly(&self.root.join(name));
        }
        log::info!("store: deleted session {id}");
        Ok(())
    }

    /// Write `session.thumbnail` to its sidecar and record the filename.
    /// Returns the sidecar path when one was written.
    fn save_thumbnail(
        &self,
        session: &mut RecordingSession,
    ) -> Result<Option<PathBuf>, StoreError> {
        let Some(jpeg) = &session.thumbnail else {
            session.thumbnail_filename = None;
            return Ok(None);
        };
        let name = thumbnail_filename(session.id);
        let path = self.root.join(&name);
        fs::write(&path, jpeg)?;
        session.thumbnail_filename = Some(name);
        Ok(Some(path))
    }

    fn persist(&self, sessions: &[RecordingSession]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(sessions)?;
        let staging = self.index.with_extension("json.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.index)?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<RecordingSession>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<RecordingSession>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("store: could not remove {}: {e}", path.display()),
    }
}
