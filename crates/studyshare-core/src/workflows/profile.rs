//! Profile load and create-or-update flow.

use chrono::Utc;
use serde_json::json;

use crate::backend::{Auth, Filter, Principal, TableStore};
use crate::models::{Profile, ProfileDraft};
use crate::{Error, Result};

const PROFILES_TABLE: &str = "profiles";

/// View state of the profile screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileState {
    /// No authenticated principal; profile flows are blocked.
    NoSession,
    /// Principal exists but owns no profile row yet.
    Creating,
    /// Loaded profile shown read-only.
    Viewing(Profile),
    /// Loaded profile open for edits.
    Editing(Profile),
}

/// Loads the current user's profile and saves edits with
/// upsert-on-first-save semantics.
pub struct ProfileSync<A, T> {
    auth: A,
    store: T,
    principal: Option<Principal>,
    profile: Option<Profile>,
    editing: bool,
}

impl<A: Auth, T: TableStore> ProfileSync<A, T> {
    pub fn new(auth: A, store: T) -> Self {
        Self {
            auth,
            store,
            principal: None,
            profile: None,
            editing: false,
        }
    }

    /// Current view state snapshot.
    #[must_use]
    pub fn state(&self) -> ProfileState {
        if self.principal.is_none() {
            return ProfileState::NoSession;
        }
        match (&self.profile, self.editing) {
            (Some(profile), true) => ProfileState::Editing(profile.clone()),
            (Some(profile), false) => ProfileState::Viewing(profile.clone()),
            (None, _) => ProfileState::Creating,
        }
    }

    /// Fetch the principal and their profile row.
    ///
    /// The first row returned for the user is treated as authoritative.
    /// A store error during load leaves the view in create mode so the
    /// user can still attempt a save; the error is surfaced to the
    /// caller for display.
    pub async fn load(&mut self) -> Result<ProfileState> {
        self.profile = None;
        self.editing = false;

        self.principal = self.auth.current_principal().await?;
        let Some(principal) = self.principal.clone() else {
            return Ok(ProfileState::NoSession);
        };

        let filter = Filter::eq("user_id", &principal.id);
        match self.store.select(PROFILES_TABLE, Some(&filter), None).await {
            Ok(rows) => {
                if let Some(row) = rows.into_iter().next() {
                    self.profile = Some(serde_json::from_value(row)?);
                } else {
                    self.editing = true;
                }
                Ok(self.state())
            }
            Err(error) => {
                // Fall back to create mode; the save path still works.
                tracing::warn!("Failed to load profile: {error}");
                self.editing = true;
                Err(error)
            }
        }
    }

    /// Switch a loaded profile into edit mode.
    pub fn edit(&mut self) {
        if self.profile.is_some() {
            self.editing = true;
        }
    }

    /// Persist the draft: one update when a profile is loaded, one
    /// insert otherwise. On success the in-memory profile is replaced
    /// with the returned row and edit mode ends; on failure nothing
    /// changes locally and the caller may retry.
    pub async fn save(&mut self, draft: &ProfileDraft) -> Result<Profile> {
        let principal = self.principal.clone().ok_or(Error::NoSession)?;
        draft.validate()?;

        let record = json!({
            "user_id": principal.id,
            "name": draft.name,
            "course": draft.course,
            "branch": draft.branch,
            "year": draft.year.as_number(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let saved = if let Some(profile) = &self.profile {
            let filter = Filter::eq("id", profile.id.as_str());
            self.store.update(PROFILES_TABLE, &record, &filter).await?
        } else {
            self.store.insert(PROFILES_TABLE, &record).await?
        };

        let profile: Profile = serde_json::from_value(saved)?;
        tracing::info!(profile_id = %profile.id, "Profile saved");
        self.profile = Some(profile.clone());
        self.editing = false;
        Ok(profile)
    }

    /// Loaded profile, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::models::Year;

    fn signed_in_backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.set_principal(Some(Principal {
            id: "u-1".to_string(),
            email: Some("u1@example.com".to_string()),
        }));
        backend
    }

    fn draft() -> ProfileDraft {
        ProfileDraft {
            name: "A".to_string(),
            course: "B".to_string(),
            branch: "C".to_string(),
            year: Year::Second,
        }
    }

    #[tokio::test]
    async fn load_without_session_reports_no_session() {
        let backend = InMemoryBackend::new();
        let mut sync = ProfileSync::new(backend.clone(), backend);

        let state = sync.load().await.unwrap();
        assert_eq!(state, ProfileState::NoSession);
    }

    #[tokio::test]
    async fn load_without_profile_enters_create_mode() {
        let backend = signed_in_backend();
        let mut sync = ProfileSync::new(backend.clone(), backend);

        let state = sync.load().await.unwrap();
        assert_eq!(state, ProfileState::Creating);
        assert!(sync.profile().is_none());
    }

    #[tokio::test]
    async fn first_save_issues_exactly_one_insert() {
        let backend = signed_in_backend();
        let mut sync = ProfileSync::new(backend.clone(), backend.clone());
        sync.load().await.unwrap();

        let profile = sync.save(&draft()).await.unwrap();

        assert_eq!(backend.op_count("insert"), 1);
        assert_eq!(backend.op_count("update"), 0);
        assert_eq!(profile.year.to_string(), "2nd Year");
        assert!(matches!(sync.state(), ProfileState::Viewing(_)));

        let rows = backend.rows("profiles");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name").unwrap(), "A");
        assert!(rows[0].get("updated_at").is_some());
    }

    #[tokio::test]
    async fn save_with_existing_profile_issues_exactly_one_update() {
        let backend = signed_in_backend();
        backend.seed_row(
            "profiles",
            json!({
                "id": "p-1",
                "user_id": "u-1",
                "name": "Old",
                "course": "B",
                "branch": "C",
                "year": 1
            }),
        );
        let mut sync = ProfileSync::new(backend.clone(), backend.clone());

        let state = sync.load().await.unwrap();
        assert!(matches!(state, ProfileState::Viewing(_)));

        sync.edit();
        let profile = sync.save(&draft()).await.unwrap();

        assert_eq!(backend.op_count("update"), 1);
        assert_eq!(backend.op_count("insert"), 0);
        assert_eq!(profile.id.as_str(), "p-1");
        assert_eq!(profile.name, "A");
        assert!(matches!(sync.state(), ProfileState::Viewing(_)));
    }

    #[tokio::test]
    async fn load_picks_first_row_when_several_exist() {
        let backend = signed_in_backend();
        backend.seed_row(
            "profiles",
            json!({"id": "p-1", "user_id": "u-1", "name": "First", "course": "B", "branch": "C", "year": 1}),
        );
        backend.seed_row(
            "profiles",
            json!({"id": "p-2", "user_id": "u-1", "name": "Second", "course": "B", "branch": "C", "year": 2}),
        );
        let mut sync = ProfileSync::new(backend.clone(), backend);

        sync.load().await.unwrap();
        assert_eq!(sync.profile().unwrap().id.as_str(), "p-1");
    }

    #[tokio::test]
    async fn failed_load_falls_back_to_create_mode() {
        let backend = signed_in_backend();
        backend.fail_next("select", "connection reset");
        let mut sync = ProfileSync::new(backend.clone(), backend);

        let error = sync.load().await.unwrap_err();
        assert!(error.to_string().contains("connection reset"));
        assert_eq!(sync.state(), ProfileState::Creating);
    }

    #[tokio::test]
    async fn save_validates_before_any_request() {
        let backend = signed_in_backend();
        let mut sync = ProfileSync::new(backend.clone(), backend.clone());
        sync.load().await.unwrap();

        let invalid = ProfileDraft {
            name: String::new(),
            ..draft()
        };
        let error = sync.save(&invalid).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        assert_eq!(backend.op_count("insert"), 0);
        assert_eq!(backend.op_count("update"), 0);
    }

    #[tokio::test]
    async fn failed_save_keeps_edit_mode() {
        let backend = signed_in_backend();
        backend.fail_next("insert", "row level security violation");
        let mut sync = ProfileSync::new(backend.clone(), backend);
        sync.load().await.unwrap();

        let error = sync.save(&draft()).await.unwrap_err();
        assert!(error.to_string().contains("row level security"));
        assert_eq!(sync.state(), ProfileState::Creating);
    }

    #[tokio::test]
    async fn save_without_session_is_rejected() {
        let backend = InMemoryBackend::new();
        let mut sync = ProfileSync::new(backend.clone(), backend);
        sync.load().await.unwrap();

        let error = sync.save(&draft()).await.unwrap_err();
        assert!(matches!(error, Error::NoSession));
    }
}
