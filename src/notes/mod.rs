//! Note records used by the built-in jobs.
//!
//! The scheduler never touches notes; they exist so the bundled jobs have
//! something to create and prune. Storage is behind the [`NoteStore`] trait.

mod memory;

pub use memory::InMemoryNoteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted note content, in characters.
pub const MAX_CONTENT_LENGTH: usize = 800;

/// Errors that can occur during note store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The note content exceeds [`MAX_CONTENT_LENGTH`].
    #[error("note content is {length} characters, maximum is {max}")]
    ContentTooLong { length: usize, max: usize },

    /// A note with the same id already exists.
    #[error("duplicate note id: {0}")]
    DuplicateId(Uuid),

    /// Store lock was poisoned.
    #[error("note store lock poisoned")]
    LockPoisoned,
}

/// A stored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique note identifier.
    pub id: Uuid,
    /// Free-text content.
    pub content: String,
    /// When the note was created.
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Create a note stamped with the current time.
    pub fn new(content: impl Into<String>) -> Self {
        Self::created_at(content, Utc::now())
    }

    /// Create a note with an explicit creation time.
    pub fn created_at(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            created_at,
        }
    }
}

/// Note storage.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Add a note.
    async fn add_note(&self, note: Note) -> Result<(), StoreError>;

    /// List notes newest first, skipping the `skip` newest.
    async fn list_notes_descending(&self, skip: usize) -> Result<Vec<Note>, StoreError>;

    /// Remove the notes with the given ids. Unknown ids are ignored.
    ///
    /// Returns the number of notes removed.
    async fn remove_notes(&self, ids: &[Uuid]) -> Result<usize, StoreError>;
}
