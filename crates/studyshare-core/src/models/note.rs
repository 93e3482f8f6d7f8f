//! Note model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Store-assigned identifier of a note row.
///
/// Minted by the backend at insert time; opaque to this layer. The
/// blob object key for a note is derived from this id, so it only
/// exists after the metadata row does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A note record in the table store.
///
/// `file_path` is empty while ingestion is in progress; a non-empty
/// value must point at an existing blob in the notes bucket. Rows with
/// an empty `file_path` are incomplete and candidates for repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Store-assigned identifier
    pub id: NoteId,
    /// Display title
    pub title: String,
    /// Optional free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Subject the notes belong to
    pub subject: String,
    /// Object key of the uploaded file, empty until ingestion completes
    pub file_path: String,
    /// Store-assigned creation timestamp
    pub created_at: DateTime<Utc>,
    /// Owning principal id
    pub user_id: String,
}

impl Note {
    /// Whether ingestion completed for this note.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.file_path.is_empty()
    }
}

/// User-provided note metadata, validated before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub description: Option<String>,
    pub subject: String,
}

impl NoteDraft {
    /// Reject drafts with missing required fields. Description is optional.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("title is required".to_string()));
        }
        if self.subject.trim().is_empty() {
            return Err(Error::InvalidInput("subject is required".to_string()));
        }
        Ok(())
    }
}
