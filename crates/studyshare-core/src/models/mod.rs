//! Domain models shared by all studyshare workflows.

mod note;
mod profile;

pub use note::{Note, NoteDraft, NoteId};
pub use profile::{Profile, ProfileDraft, ProfileId, Year};
