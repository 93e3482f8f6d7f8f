//! Note-sharing workflows.
//!
//! Each component owns one slice of the user-facing flow and talks to
//! the backend only through the injected collaborator traits. One
//! operation runs one sequential chain of awaited requests; the
//! components take `&mut self` so a second operation cannot start
//! while one is in flight.

mod catalog;
mod ingest;
mod profile;

pub use catalog::{DownloadedNote, NotesCatalog};
pub use ingest::{IngestionState, NoteIngestion, RepairReport, UploadFile};
pub use profile::{ProfileState, ProfileSync};

/// Bucket holding every uploaded note file.
pub const NOTES_BUCKET: &str = "notes";

/// Per-object size ceiling applied when the bucket is first created (50 MiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;
