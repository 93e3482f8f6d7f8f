//! Supabase-backed implementations of the collaborator contracts.
//!
//! One shared HTTP client serves the three service surfaces: GoTrue
//! (`/auth/v1`), PostgREST (`/rest/v1`), and Storage (`/storage/v1`).
//! Backend error messages are surfaced verbatim to the workflows.

use std::env;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::backend::{
    Auth, BlobStore, BucketSettings, Filter, Order, Principal, TableStore, UploadSettings,
};
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::{Error, Result};

const ENV_URL: &str = "SUPABASE_URL";
const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_ACCESS_TOKEN: &str = "SUPABASE_ACCESS_TOKEN";

/// Supabase project configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public anon key sent with every request
    pub anon_key: String,
    /// Access token of the signed-in user, when a session exists
    pub access_token: Option<String>,
}

impl SupabaseConfig {
    /// Load Supabase configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no Supabase variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }
}

/// Supabase client implementing all three collaborator contracts.
#[derive(Clone, Debug)]
pub struct SupabaseClient {
    config: SupabaseConfig,
    client: Client,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        if !is_http_url(&config.url) {
            return Err(Error::InvalidInput(
                "Supabase URL must include http:// or https://".to_string(),
            ));
        }
        if config.anon_key.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Supabase anon key must not be empty".to_string(),
            ));
        }

        let config = SupabaseConfig {
            url: config.url.trim().trim_end_matches('/').to_string(),
            ..config
        };
        Ok(Self {
            config,
            client: Client::builder().build()?,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.url)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{path}", self.config.url)
    }

    /// Attach the anon key and the strongest available bearer token.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.anon_key);
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    async fn expect_success(
        response: reqwest::Response,
        wrap: fn(String) -> Error,
    ) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(wrap(parse_api_error(status, &body)))
    }
}

impl Auth for SupabaseClient {
    async fn current_principal(&self) -> Result<Option<Principal>> {
        let Some(access_token) = &self.config.access_token else {
            return Ok(None);
        };

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.config.url))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let response = Self::expect_success(response, Error::Store).await?;
        let user = response.json::<SupabaseUser>().await?;
        Ok(Some(Principal {
            id: user.id,
            email: user.email,
        }))
    }
}

impl TableStore for SupabaseClient {
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
    ) -> Result<Vec<Value>> {
        let request = self
            .authorized(self.client.get(self.rest_url(table)))
            .query(&select_query(filter, order));

        let response = Self::expect_success(request.send().await?, Error::Store).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn insert(&self, table: &str, record: &Value) -> Result<Value> {
        let request = self
            .authorized(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(&[record]);

        let response = Self::expect_success(request.send().await?, Error::Store).await?;
        let mut rows = response.json::<Vec<Value>>().await?;
        if rows.is_empty() {
            return Err(Error::Store(format!(
                "insert into '{table}' returned no row"
            )));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(&self, table: &str, patch: &Value, filter: &Filter) -> Result<Value> {
        let request = self
            .authorized(self.client.patch(self.rest_url(table)))
            .query(&filter_query(filter))
            .header("Prefer", "return=representation")
            .json(patch);

        let response = Self::expect_success(request.send().await?, Error::Store).await?;
        let mut rows = response.json::<Vec<Value>>().await?;
        if rows.is_empty() {
            return Err(Error::Store(format!(
                "update of '{table}' matched no rows for {} = {}",
                filter.column, filter.value
            )));
        }
        Ok(rows.swap_remove(0))
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let request = self
            .authorized(self.client.delete(self.rest_url(table)))
            .query(&filter_query(filter));

        Self::expect_success(request.send().await?, Error::Store).await?;
        Ok(())
    }
}

impl BlobStore for SupabaseClient {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let request = self.authorized(self.client.get(self.storage_url("bucket")));
        let response = Self::expect_success(request.send().await?, Error::Storage).await?;
        let buckets = response.json::<Vec<BucketInfo>>().await?;
        Ok(buckets.into_iter().map(|bucket| bucket.name).collect())
    }

    async fn create_bucket(&self, name: &str, settings: &BucketSettings) -> Result<()> {
        let payload = serde_json::json!({
            "id": name,
            "name": name,
            "public": settings.public,
            "file_size_limit": settings.file_size_limit,
        });
        let request = self
            .authorized(self.client.post(self.storage_url("bucket")))
            .json(&payload);

        Self::expect_success(request.send().await?, Error::Storage).await?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        settings: &UploadSettings,
    ) -> Result<()> {
        let mut request = self
            .authorized(
                self.client
                    .post(self.storage_url(&object_path(bucket, key))),
            )
            .header("x-upsert", if settings.upsert { "true" } else { "false" });

        if let Some(content_type) = &settings.content_type {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(cache_control) = &settings.cache_control {
            request = request.header(reqwest::header::CACHE_CONTROL, cache_control.as_str());
        }

        Self::expect_success(request.body(bytes.to_vec()).send().await?, Error::Storage).await?;
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<(Vec<u8>, Option<String>)> {
        let request = self.authorized(
            self.client
                .get(self.storage_url(&object_path(bucket, key))),
        );

        let response = Self::expect_success(request.send().await?, Error::Storage).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }

    async fn remove(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let payload = serde_json::json!({ "prefixes": keys });
        let request = self
            .authorized(
                self.client
                    .delete(self.storage_url(&format!("object/{bucket}"))),
            )
            .json(&payload);

        Self::expect_success(request.send().await?, Error::Storage).await?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let payload = serde_json::json!({
            "prefix": "",
            "search": prefix,
            "limit": 100,
        });
        let request = self
            .authorized(
                self.client
                    .post(self.storage_url(&format!("object/list/{bucket}"))),
            )
            .json(&payload);

        let response = Self::expect_success(request.send().await?, Error::Storage).await?;
        let objects = response.json::<Vec<ObjectInfo>>().await?;
        Ok(objects
            .into_iter()
            .map(|object| object.name)
            .filter(|name| name.starts_with(prefix))
            .collect())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<SupabaseConfig>> {
    let url = normalize_text_option(lookup(ENV_URL));
    let anon_key = normalize_text_option(lookup(ENV_ANON_KEY));
    let access_token = normalize_text_option(lookup(ENV_ACCESS_TOKEN));

    if url.is_none() && anon_key.is_none() && access_token.is_none() {
        return Ok(None);
    }

    let mut missing = Vec::new();
    if url.is_none() {
        missing.push(ENV_URL);
    }
    if anon_key.is_none() {
        missing.push(ENV_ANON_KEY);
    }
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Supabase configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let url = url.expect("validated above");
    if !is_http_url(&url) {
        return Err(Error::InvalidInput(format!(
            "{ENV_URL} must include http:// or https://"
        )));
    }

    Ok(Some(SupabaseConfig {
        url: url.trim_end_matches('/').to_string(),
        anon_key: anon_key.expect("validated above"),
        access_token,
    }))
}

/// PostgREST query parameters for a select.
fn select_query(filter: Option<&Filter>, order: Option<&Order>) -> Vec<(String, String)> {
    let mut query = vec![("select".to_string(), "*".to_string())];
    if let Some(filter) = filter {
        query.extend(filter_query(filter));
    }
    if let Some(order) = order {
        let direction = if order.descending { "desc" } else { "asc" };
        query.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    query
}

fn filter_query(filter: &Filter) -> Vec<(String, String)> {
    vec![(filter.column.clone(), format!("eq.{}", filter.value))]
}

fn object_path(bucket: &str, key: &str) -> String {
    format!("object/{bucket}/{}", urlencoding::encode(key))
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BucketInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

/// Extract the backend's human-readable message from an error body.
fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
