//! Two-phase note ingestion saga.
//!
//! Order of operations is the correctness core of the whole workflow:
//! the metadata row is inserted first so the object key can be derived
//! from a store-assigned id, the blob is uploaded second, and the row
//! is patched with the final key last. A failed upload compensates by
//! deleting the just-inserted row; a failed finalize is surfaced and
//! left to the explicit [`NoteIngestion::repair`] pass.

use serde_json::json;

use crate::backend::{
    Auth, BlobStore, BucketSettings, Filter, TableStore, UploadSettings,
};
use crate::models::{Note, NoteDraft, NoteId};
use crate::workflows::{MAX_FILE_SIZE_BYTES, NOTES_BUCKET};
use crate::{Error, Result};

const NOTES_TABLE: &str = "notes";
const CACHE_CONTROL_SECONDS: &str = "3600";

/// Saga state of the current ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionState {
    /// No attempt in progress.
    Idle,
    /// Metadata row inserted with an empty `file_path`.
    Inserted { note_id: NoteId },
    /// Blob upload in flight under the derived key.
    Uploading { note_id: NoteId, object_key: String },
    /// Blob stored; row patch in flight.
    ///
    /// An attempt stuck here holds a durable blob and an incomplete
    /// row, which only the repair pass reconciles.
    Finalizing { note_id: NoteId, object_key: String },
    /// Row and blob both durable and consistent.
    Committed { note: Note },
    /// Upload failed and the metadata row was compensated away.
    RolledBack { reason: String },
}

/// The file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Original file name; only its extension reaches the backend.
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Outcome of a repair pass over incomplete rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Rows whose `file_path` was patched to the one existing blob.
    pub patched: Vec<NoteId>,
    /// Orphaned rows with no blob, deleted.
    pub deleted: Vec<NoteId>,
    /// Rows with several candidate blobs, left untouched.
    pub skipped: Vec<NoteId>,
}

/// Orchestrates the insert / upload / finalize sequence for one note.
pub struct NoteIngestion<A, T, B> {
    auth: A,
    store: T,
    blobs: B,
    bucket_ready: bool,
    state: IngestionState,
}

impl<A: Auth, T: TableStore, B: BlobStore> NoteIngestion<A, T, B> {
    pub fn new(auth: A, store: T, blobs: B) -> Self {
        Self {
            auth,
            store,
            blobs,
            bucket_ready: false,
            state: IngestionState::Idle,
        }
    }

    /// Saga state of the most recent attempt.
    #[must_use]
    pub fn state(&self) -> &IngestionState {
        &self.state
    }

    /// Preflight: make sure the notes bucket exists, creating it with
    /// a private policy and a per-object size cap when absent.
    ///
    /// Failure here blocks every subsequent step of the attempt.
    pub async fn ensure_bucket(&mut self) -> Result<()> {
        let buckets = self.blobs.list_buckets().await?;
        if !buckets.iter().any(|name| name == NOTES_BUCKET) {
            tracing::info!("Creating '{NOTES_BUCKET}' bucket");
            self.blobs
                .create_bucket(
                    NOTES_BUCKET,
                    &BucketSettings {
                        public: false,
                        file_size_limit: Some(MAX_FILE_SIZE_BYTES),
                    },
                )
                .await?;
        }
        self.bucket_ready = true;
        Ok(())
    }

    /// Run one full ingestion attempt.
    pub async fn ingest(&mut self, draft: &NoteDraft, file: &UploadFile) -> Result<Note> {
        // Local validation: nothing reaches the backend on failure.
        if !self.bucket_ready {
            return Err(Error::InvalidInput(
                "storage is not provisioned; run the bucket preflight first".to_string(),
            ));
        }
        if file.file_name.trim().is_empty() {
            return Err(Error::InvalidInput("a file must be selected".to_string()));
        }
        draft.validate()?;

        let principal = self
            .auth
            .current_principal()
            .await?
            .ok_or(Error::NoSession)?;

        self.state = IngestionState::Idle;

        // Step 1: metadata row with an empty file_path. Terminal on failure.
        let record = json!({
            "title": draft.title,
            "description": draft.description,
            "subject": draft.subject,
            "file_path": "",
            "user_id": principal.id,
        });
        let row = self.store.insert(NOTES_TABLE, &record).await?;
        let inserted: Note = serde_json::from_value(row)?;
        let note_id = inserted.id.clone();
        self.state = IngestionState::Inserted {
            note_id: note_id.clone(),
        };

        // Step 2: the object key exists only now, derived from the
        // store-assigned id.
        let object_key = derive_object_key(&note_id, &file.file_name);
        self.state = IngestionState::Uploading {
            note_id: note_id.clone(),
            object_key: object_key.clone(),
        };

        let settings = UploadSettings {
            content_type: file.content_type.clone(),
            upsert: false,
            cache_control: Some(CACHE_CONTROL_SECONDS.to_string()),
        };
        if let Err(upload_error) = self
            .blobs
            .upload(NOTES_BUCKET, &object_key, &file.bytes, &settings)
            .await
        {
            self.compensate_insert(&note_id, &upload_error).await;
            return Err(upload_error);
        }

        // Step 3: patch the row with the final key. Failure here leaves
        // the blob durable and the row incomplete; see `repair`.
        self.state = IngestionState::Finalizing {
            note_id: note_id.clone(),
            object_key: object_key.clone(),
        };
        let patch = json!({ "file_path": object_key });
        let patched = self
            .store
            .update(NOTES_TABLE, &patch, &Filter::eq("id", note_id.as_str()))
            .await?;

        let note: Note = serde_json::from_value(patched)?;
        tracing::info!(note_id = %note.id, key = %note.file_path, "Note ingested");
        self.state = IngestionState::Committed { note: note.clone() };
        Ok(note)
    }

    /// Delete the metadata row inserted before a failed upload.
    ///
    /// A row must never persist durably with an empty `file_path`
    /// after a failed upload.
    async fn compensate_insert(&mut self, note_id: &NoteId, upload_error: &Error) {
        tracing::warn!(note_id = %note_id, "Upload failed, rolling back metadata row: {upload_error}");
        let filter = Filter::eq("id", note_id.as_str());
        if let Err(delete_error) = self.store.delete(NOTES_TABLE, &filter).await {
            tracing::error!(
                note_id = %note_id,
                "Rollback of metadata row failed, row is orphaned: {delete_error}"
            );
        }
        self.state = IngestionState::RolledBack {
            reason: upload_error.to_string(),
        };
    }

    /// Reconcile rows left with an empty `file_path`.
    ///
    /// Exactly one blob keyed by the row id: the finalize-gap case, the
    /// row is patched. No blob: the orphaned row is deleted. Several
    /// candidates: the row is reported and left untouched.
    pub async fn repair(&mut self) -> Result<RepairReport> {
        let rows = self
            .store
            .select(NOTES_TABLE, Some(&Filter::eq("file_path", "")), None)
            .await?;

        let mut report = RepairReport::default();
        for row in rows {
            let note: Note = serde_json::from_value(row)?;
            let candidates = self
                .blobs
                .list_objects(NOTES_BUCKET, note.id.as_str())
                .await?;

            match candidates.as_slice() {
                [] => {
                    self.store
                        .delete(NOTES_TABLE, &Filter::eq("id", note.id.as_str()))
                        .await?;
                    tracing::info!(note_id = %note.id, "Deleted orphaned row without blob");
                    report.deleted.push(note.id);
                }
                [key] => {
                    self.store
                        .update(
                            NOTES_TABLE,
                            &json!({ "file_path": key }),
                            &Filter::eq("id", note.id.as_str()),
                        )
                        .await?;
                    tracing::info!(note_id = %note.id, key = %key, "Patched incomplete row");
                    report.patched.push(note.id);
                }
                _ => {
                    tracing::warn!(
                        note_id = %note.id,
                        "Several candidate blobs, leaving row untouched"
                    );
                    report.skipped.push(note.id);
                }
            }
        }
        Ok(report)
    }
}

/// Storage key for a note's blob: the row id plus the original file's
/// extension. Files without an extension use the bare id.
#[must_use]
pub fn derive_object_key(note_id: &NoteId, file_name: &str) -> String {
    match file_name.trim().rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => {
            format!("{note_id}.{extension}")
        }
        _ => note_id.to_string(),
    }
}
