//! studyshare-core - Core library for studyshare
//!
//! This crate contains the shared models, backend collaborator contracts,
//! and the note-sharing workflows (profile, catalog, ingestion) used by
//! all studyshare front-ends.

pub mod backend;
pub mod error;
pub mod models;
pub mod util;
pub mod workflows;

pub use error::{Error, Result};
pub use models::{Note, NoteId, Profile, ProfileId, Year};
