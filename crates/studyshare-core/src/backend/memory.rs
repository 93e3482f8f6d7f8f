//! In-memory backend implementing all three collaborator contracts.
//!
//! Primarily for tests: workflows run against it unchanged, and the
//! harness can inject per-operation failures and inspect what the
//! workflows left behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::{
    Auth, BlobStore, BucketSettings, Filter, Order, Principal, TableStore, UploadSettings,
};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    principal: Option<Principal>,
    tables: HashMap<String, Vec<Value>>,
    buckets: HashMap<String, BucketSettings>,
    objects: HashMap<(String, String), Vec<u8>>,
    fail_next: HashMap<&'static str, String>,
    op_counts: HashMap<&'static str, usize>,
}

/// Shared-state in-memory backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the signed-in principal.
    pub fn set_principal(&self, principal: Option<Principal>) {
        self.inner.lock().expect("lock poisoned").principal = principal;
    }

    /// Make the next call of the named operation fail with `message`.
    ///
    /// Operation names match the trait method names ("insert",
    /// "update", "delete", "upload", "remove", ...). Store-side
    /// operations fail with `Error::Store`, storage-side ones with
    /// `Error::Storage`.
    pub fn fail_next(&self, operation: &'static str, message: impl Into<String>) {
        self.inner
            .lock()
            .expect("lock poisoned")
            .fail_next
            .insert(operation, message.into());
    }

    /// How many times the named operation ran (failed calls included).
    #[must_use]
    pub fn op_count(&self, operation: &str) -> usize {
        self.inner
            .lock()
            .expect("lock poisoned")
            .op_counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of the rows currently in a table.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .lock()
            .expect("lock poisoned")
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed a row directly, bypassing the trait surface.
    pub fn seed_row(&self, table: &str, row: Value) {
        self.inner
            .lock()
            .expect("lock poisoned")
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Seed a bucket directly.
    pub fn seed_bucket(&self, name: &str) {
        self.inner.lock().expect("lock poisoned").buckets.insert(
            name.to_string(),
            BucketSettings {
                public: false,
                file_size_limit: None,
            },
        );
    }

    /// Seed an object directly.
    pub fn seed_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.inner
            .lock()
            .expect("lock poisoned")
            .objects
            .insert((bucket.to_string(), key.to_string()), bytes);
    }

    /// Object keys currently stored in a bucket, sorted.
    #[must_use]
    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("lock poisoned");
        let mut keys: Vec<String> = inner
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn begin(
        &self,
        operation: &'static str,
        wrap: fn(String) -> Error,
    ) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        *inner.op_counts.entry(operation).or_insert(0) += 1;
        if let Some(message) = inner.fail_next.remove(operation) {
            return Err(wrap(message));
        }
        Ok(inner)
    }
}

impl Auth for InMemoryBackend {
    async fn current_principal(&self) -> Result<Option<Principal>> {
        let inner = self.begin("current_principal", Error::Store)?;
        Ok(inner.principal.clone())
    }
}

impl TableStore for InMemoryBackend {
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
    ) -> Result<Vec<Value>> {
        let inner = self.begin("select", Error::Store)?;
        let mut rows: Vec<Value> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filter.map_or(true, |filter| row_matches(row, filter)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let left = column_text(a, &order.column);
                let right = column_text(b, &order.column);
                if order.descending {
                    right.cmp(&left)
                } else {
                    left.cmp(&right)
                }
            });
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: &Value) -> Result<Value> {
        let mut inner = self.begin("insert", Error::Store)?;

        let mut row = record.clone();
        let fields = row
            .as_object_mut()
            .ok_or_else(|| Error::Store("insert payload must be an object".to_string()))?;
        if !fields.contains_key("id") {
            fields.insert("id".to_string(), Value::String(Uuid::now_v7().to_string()));
        }
        if !fields.contains_key("created_at") {
            fields.insert(
                "created_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }

        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, patch: &Value, filter: &Filter) -> Result<Value> {
        let mut inner = self.begin("update", Error::Store)?;

        let patch_fields = patch
            .as_object()
            .ok_or_else(|| Error::Store("update payload must be an object".to_string()))?;

        let mut updated = None;
        if let Some(rows) = inner.tables.get_mut(table) {
            for row in rows.iter_mut() {
                if !row_matches(row, filter) {
                    continue;
                }
                if let Some(fields) = row.as_object_mut() {
                    for (key, value) in patch_fields {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                updated.get_or_insert_with(|| row.clone());
            }
        }

        updated.ok_or_else(|| {
            Error::Store(format!(
                "update of '{table}' matched no rows for {} = {}",
                filter.column, filter.value
            ))
        })
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let mut inner = self.begin("delete", Error::Store)?;
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|row| !row_matches(row, filter));
        }
        Ok(())
    }
}

impl BlobStore for InMemoryBackend {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let inner = self.begin("list_buckets", Error::Storage)?;
        let mut names: Vec<String> = inner.buckets.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_bucket(&self, name: &str, settings: &BucketSettings) -> Result<()> {
        let mut inner = self.begin("create_bucket", Error::Storage)?;
        if inner.buckets.contains_key(name) {
            return Err(Error::Storage(format!("bucket '{name}' already exists")));
        }
        inner.buckets.insert(name.to_string(), settings.clone());
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        settings: &UploadSettings,
    ) -> Result<()> {
        let mut inner = self.begin("upload", Error::Storage)?;
        let Some(bucket_settings) = inner.buckets.get(bucket) else {
            return Err(Error::Storage(format!("bucket '{bucket}' not found")));
        };
        if let Some(limit) = bucket_settings.file_size_limit {
            if bytes.len() as u64 > limit {
                return Err(Error::Storage(
                    "The object exceeded the maximum allowed size".to_string(),
                ));
            }
        }

        let slot = (bucket.to_string(), key.to_string());
        if inner.objects.contains_key(&slot) && !settings.upsert {
            return Err(Error::Storage("The resource already exists".to_string()));
        }
        inner.objects.insert(slot, bytes.to_vec());
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, Option<String>)> {
        let inner = self.begin("download", Error::Storage)?;
        let bytes = inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::Storage(format!("Object not found: {bucket}/{key}")))?;
        Ok((bytes, None))
    }

    async fn remove(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let mut inner = self.begin("remove", Error::Storage)?;
        for key in keys {
            inner.objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let inner = self.begin("list_objects", Error::Storage)?;
        let mut keys: Vec<String> = inner
            .objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn row_matches(row: &Value, filter: &Filter) -> bool {
    column_text(row, &filter.column) == Some(filter.value.clone())
}

/// Column value as comparable text; numbers are stringified so the
/// same filter works for ids and integer columns.
fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn insert_assigns_id_and_created_at() {
        let backend = InMemoryBackend::new();
        let row = backend
            .insert("notes", &json!({"title": "T"}))
            .await
            .unwrap();

        assert!(row.get("id").and_then(Value::as_str).is_some());
        assert!(row.get("created_at").and_then(Value::as_str).is_some());
        assert_eq!(backend.rows("notes").len(), 1);
    }

    #[tokio::test]
    async fn select_filters_and_orders_rows() {
        let backend = InMemoryBackend::new();
        backend.seed_row("notes", json!({"id": "a", "created_at": "2024-01-01T00:00:00Z", "user_id": "u-1"}));
        backend.seed_row("notes", json!({"id": "b", "created_at": "2024-01-03T00:00:00Z", "user_id": "u-1"}));
        backend.seed_row("notes", json!({"id": "c", "created_at": "2024-01-02T00:00:00Z", "user_id": "u-2"}));

        let rows = backend
            .select(
                "notes",
                Some(&Filter::eq("user_id", "u-1")),
                Some(&Order::descending("created_at")),
            )
            .await
            .unwrap();

        let ids: Vec<&str> = rows
            .iter()
            .map(|row| row.get("id").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);

        let rows = backend
            .select(
                "notes",
                Some(&Filter::eq("user_id", "u-1")),
                Some(&Order::ascending("created_at")),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = rows
            .iter()
            .map(|row| row.get("id").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn upload_refuses_overwrite_without_upsert() {
        let backend = InMemoryBackend::new();
        backend.seed_bucket("notes");

        let settings = UploadSettings::default();
        backend
            .upload("notes", "a.pdf", b"one", &settings)
            .await
            .unwrap();
        let error = backend
            .upload("notes", "a.pdf", b"two", &settings)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let backend = InMemoryBackend::new();
        backend.seed_bucket("notes");
        backend.fail_next("upload", "size limit exceeded");

        let settings = UploadSettings::default();
        let error = backend
            .upload("notes", "a.pdf", b"x", &settings)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Storage(_)));
        assert!(error.to_string().contains("size limit exceeded"));

        backend
            .upload("notes", "a.pdf", b"x", &settings)
            .await
            .unwrap();
        assert_eq!(backend.op_count("upload"), 2);
    }
}
