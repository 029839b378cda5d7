//! Persistent `RoomLog` backed by `sled`
//!
//! `space-core` ships an in-memory `RoomLog` for its own tests; this crate
//! is the reference on-disk embedding for the "local persistence backend"
//! spec's core treats as an external collaborator. One [`SledRoomLog`] is
//! opened per `(space_id, room_id)`, matching the core's "no global lock —
//! each (Space, Room) keeps its own append-only log" model.

use sled::{Db, Tree};
use space_core::event::Event;
use space_core::dag::RoomLog;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A `sled`-backed `RoomLog` for one `(space_id, room_id)`.
pub struct SledRoomLog {
    events: Tree,
    /// ids referenced as someone's parent — complement of `heads`.
    referenced: Tree,
    /// parent_id -> JSON array of child event ids.
    children: Tree,
}

impl SledRoomLog {
    /// Open (or create) the trees for one Room within an already-open `Db`.
    pub fn open(db: &Db, space_id: &str, room_id: &str) -> Result<Self, StorageError> {
        let events = db.open_tree(format!("events:{space_id}:{room_id}"))?;
        let referenced = db.open_tree(format!("referenced:{space_id}:{room_id}"))?;
        let children = db.open_tree(format!("children:{space_id}:{room_id}"))?;
        Ok(Self { events, referenced, children })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.events.flush()?;
        self.referenced.flush()?;
        self.children.flush()?;
        Ok(())
    }

    fn children_of_tree(&self, parent_id: &str) -> Result<Vec<String>, StorageError> {
        match self.children.get(parent_id.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

impl RoomLog for SledRoomLog {
    fn put(&mut self, event: Event) -> space_core::error::Result<()> {
        let key = event.event_id.as_bytes();
        let exists = self
            .events
            .contains_key(key)
            .map_err(|e| to_core_error(StorageError::from(e)))?;
        if exists {
            return Ok(());
        }
        let bytes = serde_json::to_vec(&event).map_err(|e| to_core_error(StorageError::from(e)))?;
        self.events
            .insert(key, bytes)
            .map_err(|e| to_core_error(StorageError::from(e)))?;

        for parent in &event.prev {
            self.referenced
                .insert(parent.as_bytes(), &[])
                .map_err(|e| to_core_error(StorageError::from(e)))?;
            let mut kids = self
                .children_of_tree(parent)
                .map_err(to_core_error)?;
            kids.push(event.event_id.clone());
            let kids_bytes = serde_json::to_vec(&kids).map_err(|e| to_core_error(StorageError::from(e)))?;
            self.children
                .insert(parent.as_bytes(), kids_bytes)
                .map_err(|e| to_core_error(StorageError::from(e)))?;
        }
        Ok(())
    }

    fn get(&self, event_id: &str) -> Option<Event> {
        let bytes = self.events.get(event_id.as_bytes()).ok().flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn has(&self, event_id: &str) -> bool {
        self.events.contains_key(event_id.as_bytes()).unwrap_or(false)
    }

    fn heads(&self) -> Vec<String> {
        self.events
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter_map(|k| String::from_utf8(k.to_vec()).ok())
            .filter(|id| !self.referenced.contains_key(id.as_bytes()).unwrap_or(false))
            .collect()
    }

    fn all_ids(&self) -> Vec<String> {
        self.events
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter_map(|k| String::from_utf8(k.to_vec()).ok())
            .collect()
    }

    fn children_of(&self, event_id: &str) -> Vec<String> {
        self.children_of_tree(event_id).unwrap_or_default()
    }
}

fn to_core_error(e: StorageError) -> space_core::error::Error {
    space_core::error::Error::Storage(e.to_string())
}
