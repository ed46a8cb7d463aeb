//! In-memory note store.
//!
//! Provides a thread-safe in-memory backend for the built-in jobs and tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use uuid::Uuid;

use super::{MAX_CONTENT_LENGTH, Note, NoteStore, StoreError};

/// In-memory note store.
///
/// Thread-safe storage using RwLock for concurrent access.
/// Data is not persisted across restarts.
pub struct InMemoryNoteStore {
    /// Notes in insertion order.
    notes: RwLock<Vec<Note>>,
}

impl InMemoryNoteStore {
    /// Create a new empty note store.
    pub fn new() -> Self {
        Self {
            notes: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored notes.
    pub fn len(&self) -> Result<usize, StoreError> {
        let notes = self.notes.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(notes.len())
    }

    /// Whether the store holds no notes.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryNoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn add_note(&self, note: Note) -> Result<(), StoreError> {
        let length = note.content.chars().count();
        if length > MAX_CONTENT_LENGTH {
            return Err(StoreError::ContentTooLong {
                length,
                max: MAX_CONTENT_LENGTH,
            });
        }

        let mut notes = self.notes.write().map_err(|_| StoreError::LockPoisoned)?;
        if notes.iter().any(|existing| existing.id == note.id) {
            return Err(StoreError::DuplicateId(note.id));
        }
        notes.push(note);
        Ok(())
    }

    async fn list_notes_descending(&self, skip: usize) -> Result<Vec<Note>, StoreError> {
        let notes = self.notes.read().map_err(|_| StoreError::LockPoisoned)?;
        // Newest insertion first, then a stable sort keeps it first among ties.
        let mut result: Vec<Note> = notes.iter().rev().cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result.into_iter().skip(skip).collect())
    }

    async fn remove_notes(&self, ids: &[Uuid]) -> Result<usize, StoreError> {
        let ids: HashSet<&Uuid> = ids.iter().collect();
        let mut notes = self.notes.write().map_err(|_| StoreError::LockPoisoned)?;
        let before = notes.len();
        notes.retain(|note| !ids.contains(&note.id));
        Ok(before - notes.len())
    }
}
