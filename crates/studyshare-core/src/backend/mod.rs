//! Backend collaborator contracts.
//!
//! The three workflows talk to the outside world only through these
//! traits: an auth provider, a table store, and a blob store. Concrete
//! Supabase-backed clients live in [`supabase`]; in-memory fakes for
//! tests live in [`memory`].

pub mod memory;
pub mod supabase;

use serde_json::Value;

use crate::Result;

/// The authenticated identity performing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
}

/// A single column-equals-value predicate.
///
/// The only filter shape the workflows need; richer query languages
/// stay behind the store's own API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Result ordering by a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    #[must_use]
    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    #[must_use]
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }
}

/// Policy applied when creating a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSettings {
    /// Whether objects are publicly readable
    pub public: bool,
    /// Per-object size ceiling in bytes
    pub file_size_limit: Option<u64>,
}

/// Options applied to a single object upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSettings {
    pub content_type: Option<String>,
    /// Overwrite an existing object under the same key
    pub upsert: bool,
    /// Cache lifetime hint in seconds
    pub cache_control: Option<String>,
}

/// Identity provider contract.
#[allow(async_fn_in_trait)]
pub trait Auth {
    /// Returns the current principal, or `None` when no session exists.
    async fn current_principal(&self) -> Result<Option<Principal>>;
}

/// Relational table store contract.
///
/// Rows cross this boundary as dynamic JSON values and are converted
/// to typed entities immediately by the calling workflow.
#[allow(async_fn_in_trait)]
pub trait TableStore {
    /// Select rows, optionally filtered and ordered.
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
    ) -> Result<Vec<Value>>;

    /// Insert one record and return the stored row.
    async fn insert(&self, table: &str, record: &Value) -> Result<Value>;

    /// Patch rows matching the filter and return the updated row.
    async fn update(&self, table: &str, patch: &Value, filter: &Filter) -> Result<Value>;

    /// Delete rows matching the filter.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<()>;
}

/// Blob storage contract.
#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// List bucket names visible to the caller.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Create a bucket with the given policy.
    async fn create_bucket(&self, name: &str, settings: &BucketSettings) -> Result<()>;

    /// Upload object bytes under the given key.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        settings: &UploadSettings,
    ) -> Result<()>;

    /// Download object bytes and the content type reported by storage.
    async fn download(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, Option<String>)>;

    /// Remove the given objects. Missing keys are not an error.
    async fn remove(&self, bucket: &str, keys: &[String]) -> Result<()>;

    /// List object keys starting with the given prefix.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}
