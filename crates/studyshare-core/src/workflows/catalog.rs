//! Note listing, download, and delete flow.

use crate::backend::{BlobStore, Filter, Order, TableStore};
use crate::models::{Note, NoteId};
use crate::workflows::NOTES_BUCKET;
use crate::{Error, Result};

const NOTES_TABLE: &str = "notes";

/// A downloaded note file, ready to be written out by the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedNote {
    /// File name to save under, derived from the note title and the
    /// stored object's extension.
    pub suggested_name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Lists all visible notes and offers per-item download and delete.
///
/// The local list is the component's only mutable state; delete updates
/// it in place instead of re-fetching.
pub struct NotesCatalog<T, B> {
    store: T,
    blobs: B,
    notes: Vec<Note>,
}

impl<T: TableStore, B: BlobStore> NotesCatalog<T, B> {
    pub fn new(store: T, blobs: B) -> Self {
        Self {
            store,
            blobs,
            notes: Vec::new(),
        }
    }

    /// Fetch all note rows, newest first.
    pub async fn list(&mut self) -> Result<&[Note]> {
        let rows = self
            .store
            .select(
                NOTES_TABLE,
                None,
                Some(&Order::descending("created_at")),
            )
            .await?;

        self.notes = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Note>, _>>()?;
        Ok(&self.notes)
    }

    /// Notes from the last successful list, minus local deletions.
    #[must_use]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Fetch the blob behind a note.
    pub async fn download(&self, note: &Note) -> Result<DownloadedNote> {
        if !note.is_complete() {
            return Err(Error::InvalidInput(format!(
                "note '{}' has no uploaded file yet",
                note.id
            )));
        }

        let (bytes, content_type) = self.blobs.download(NOTES_BUCKET, &note.file_path).await?;
        Ok(DownloadedNote {
            suggested_name: suggested_file_name(&note.title, &note.file_path),
            bytes,
            content_type,
        })
    }

    /// Delete a note: blob first, then the metadata row.
    ///
    /// If blob removal fails the row is left intact so no row ever
    /// points at a file whose state is unknown. The caller is expected
    /// to have confirmed the deletion with the user.
    pub async fn delete(&mut self, id: &NoteId) -> Result<()> {
        let note = self
            .notes
            .iter()
            .find(|note| note.id == *id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if note.is_complete() {
            self.blobs
                .remove(NOTES_BUCKET, std::slice::from_ref(&note.file_path))
                .await?;
        }

        self.store
            .delete(NOTES_TABLE, &Filter::eq("id", id.as_str()))
            .await?;

        tracing::info!(note_id = %id, "Note deleted");
        self.notes.retain(|note| note.id != *id);
        Ok(())
    }
}

/// File name offered on save-as: the note title, carrying over the
/// stored object's extension when the title does not already have one.
fn suggested_file_name(title: &str, file_path: &str) -> String {
    let title = title.trim();
    let extension = file_path
        .rsplit_once('.')
        .map(|(_, extension)| extension)
        .filter(|extension| !extension.is_empty());

    match extension {
        Some(extension) if !title.ends_with(&format!(".{extension}")) => {
            format!("{title}.{extension}")
        }
        _ => title.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::backend::memory::InMemoryBackend;

    fn seeded_backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.seed_bucket(NOTES_BUCKET);
        backend.seed_row(
            "notes",
            json!({
                "id": "n-1",
                "title": "Calculus II",
                "description": "Limits and series",
                "subject": "Math",
                "file_path": "n-1.pdf",
                "created_at": "2024-01-01T00:00:00Z",
                "user_id": "u-1"
            }),
        );
        backend.seed_row(
            "notes",
            json!({
                "id": "n-2",
                "title": "Thermodynamics",
                "description": null,
                "subject": "Physics",
                "file_path": "n-2.pdf",
                "created_at": "2024-01-03T00:00:00Z",
                "user_id": "u-1"
            }),
        );
        backend.seed_row(
            "notes",
            json!({
                "id": "n-3",
                "title": "Linear Algebra",
                "description": null,
                "subject": "Math",
                "file_path": "n-3.pdf",
                "created_at": "2024-01-02T00:00:00Z",
                "user_id": "u-2"
            }),
        );
        backend.seed_object(NOTES_BUCKET, "n-1.pdf", b"pdf-1".to_vec());
        backend.seed_object(NOTES_BUCKET, "n-2.pdf", b"pdf-2".to_vec());
        backend.seed_object(NOTES_BUCKET, "n-3.pdf", b"pdf-3".to_vec());
        backend
    }

    #[tokio::test]
    async fn list_returns_notes_newest_first() {
        let backend = seeded_backend();
        let mut catalog = NotesCatalog::new(backend.clone(), backend);

        let notes = catalog.list().await.unwrap();
        let ids: Vec<&str> = notes.iter().map(|note| note.id.as_str()).collect();
        assert_eq!(ids, vec!["n-2", "n-3", "n-1"]);
        for pair in notes.windows(2) {
            assert!(pair[0].created_at > pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn download_returns_bytes_and_suggested_name() {
        let backend = seeded_backend();
        let mut catalog = NotesCatalog::new(backend.clone(), backend);
        catalog.list().await.unwrap();

        let note = catalog.notes()[0].clone();
        let downloaded = catalog.download(&note).await.unwrap();
        assert_eq!(downloaded.bytes, b"pdf-2");
        assert_eq!(downloaded.suggested_name, "Thermodynamics.pdf");
    }

    #[tokio::test]
    async fn download_rejects_incomplete_note() {
        let backend = seeded_backend();
        backend.seed_row(
            "notes",
            json!({
                "id": "n-4",
                "title": "Pending",
                "subject": "Math",
                "file_path": "",
                "created_at": "2024-01-04T00:00:00Z",
                "user_id": "u-1"
            }),
        );
        let mut catalog = NotesCatalog::new(backend.clone(), backend);
        catalog.list().await.unwrap();

        let note = catalog.notes()[0].clone();
        let error = catalog.download(&note).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn delete_removes_blob_then_row_and_updates_local_list() {
        let backend = seeded_backend();
        let mut catalog = NotesCatalog::new(backend.clone(), backend.clone());
        catalog.list().await.unwrap();

        catalog.delete(&NoteId::new("n-1")).await.unwrap();

        assert!(!backend.object_keys(NOTES_BUCKET).contains(&"n-1.pdf".to_string()));
        assert_eq!(backend.rows("notes").len(), 2);
        assert_eq!(catalog.notes().len(), 2);
        assert!(catalog.notes().iter().all(|note| note.id.as_str() != "n-1"));
        // List itself is not re-fetched.
        assert_eq!(backend.op_count("select"), 1);
    }

    #[tokio::test]
    async fn delete_keeps_row_when_blob_removal_fails() {
        let backend = seeded_backend();
        backend.fail_next("remove", "storage unavailable");
        let mut catalog = NotesCatalog::new(backend.clone(), backend.clone());
        catalog.list().await.unwrap();

        let error = catalog.delete(&NoteId::new("n-1")).await.unwrap_err();
        assert!(error.to_string().contains("storage unavailable"));

        // Row untouched, local list untouched, no row delete attempted.
        assert_eq!(backend.rows("notes").len(), 3);
        assert_eq!(catalog.notes().len(), 3);
        assert_eq!(backend.op_count("delete"), 0);
    }

    #[tokio::test]
    async fn delete_of_incomplete_note_skips_blob_removal() {
        let backend = seeded_backend();
        backend.seed_row(
            "notes",
            json!({
                "id": "n-4",
                "title": "Pending",
                "subject": "Math",
                "file_path": "",
                "created_at": "2024-01-04T00:00:00Z",
                "user_id": "u-1"
            }),
        );
        let mut catalog = NotesCatalog::new(backend.clone(), backend.clone());
        catalog.list().await.unwrap();

        catalog.delete(&NoteId::new("n-4")).await.unwrap();
        assert_eq!(backend.op_count("remove"), 0);
        assert_eq!(backend.rows("notes").len(), 3);
    }

    #[test]
    fn suggested_file_name_carries_extension() {
        assert_eq!(suggested_file_name("Calculus II", "n-1.pdf"), "Calculus II.pdf");
        assert_eq!(suggested_file_name("notes.pdf", "n-1.pdf"), "notes.pdf");
        assert_eq!(suggested_file_name("Calculus II", "n-1"), "Calculus II");
    }
}
