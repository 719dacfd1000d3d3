//! Artifact fetching with a shared, de-duplicating cache
//!
//! Cache policy: entries are immutable for the lifetime of the process. There
//! is no TTL and no size bound; `clear()` is the only way to drop successful
//! entries. Requests are keyed by logical name (`dataset:<name>`,
//! `measure_info`, `datapackage`) rather than URL, so concurrent callers asking
//! for the same artifact share one in-flight fetch and see the same outcome. A
//! failed fetch is evicted once it resolves so the next request retries.

use super::manifest::{Granularity, Manifest};
use crate::lookup::dataset::DatasetLookup;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Cache key of the manifest
pub const DATAPACKAGE_KEY: &str = "datapackage";

/// Cache key of the measure-info document
pub const MEASURE_INFO_KEY: &str = "measure_info";

/// Fetch failure, cloneable so every waiter on a shared request gets a copy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Server answered with a non-success status
    #[error("Failed to fetch {url}: {status}")]
    Status { url: String, status: u16 },

    /// Connection, TLS or body transfer failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local artifact could not be read
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    /// Body was fetched but is not the expected JSON
    #[error("Failed to decode '{key}': {message}")]
    Decode { key: String, message: String },

    /// A key was requested as two different types
    #[error("Cached artifact '{0}' has a different type")]
    TypeMismatch(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => FetchError::Transport(err.to_string()),
        }
    }
}

/// Where artifact bytes come from
pub trait ArtifactSource: Send + Sync + 'static {
    /// Fetch one file of the published data directory
    fn fetch(&self, file: &str) -> BoxFuture<'static, Result<Vec<u8>, FetchError>>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Artifacts served over HTTP(S) at `<base_url><base_path>/data/<file>`
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    prefix: String,
}

impl HttpSource {
    pub fn new(base_url: &str, base_path: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, base_path)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, base_path: &str) -> Self {
        let base_path = base_path.trim_matches('/');
        let mut prefix = base_url.trim_end_matches('/').to_string();
        if !base_path.is_empty() {
            prefix.push('/');
            prefix.push_str(base_path);
        }
        prefix.push_str("/data");
        HttpSource { client, prefix }
    }

    pub fn url_for(&self, file: &str) -> String {
        format!("{}/{}", self.prefix, file)
    }
}

impl ArtifactSource for HttpSource {
    fn fetch(&self, file: &str) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let client = self.client.clone();
        let url = self.url_for(file);
        async move {
            tracing::debug!("GET {}", url);
            let response = client.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
            Ok(response.bytes().await?.to_vec())
        }
        .boxed()
    }

    fn describe(&self) -> String {
        self.prefix.clone()
    }
}

/// Artifacts read from a local output directory
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirSource { root: root.into() }
    }
}

impl ArtifactSource for DirSource {
    fn fetch(&self, file: &str) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let path = self.root.join(file);
        async move {
            tracing::debug!("Reading {}", path.display());
            tokio::fs::read(&path).await.map_err(|e| FetchError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        }
        .boxed()
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, FetchError>>>;

/// Process-lifetime cache of decoded artifacts, keyed by logical name
#[derive(Default)]
pub struct ArtifactCache {
    entries: Mutex<HashMap<String, SharedFetch>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing entry for `key`, or the one produced by `start`
    fn get_or_start<F>(&self, key: &str, start: F) -> SharedFetch
    where
        F: FnOnce() -> BoxFuture<'static, Result<CachedValue, FetchError>>,
    {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(key) {
            return existing.clone();
        }
        let shared = start().shared();
        entries.insert(key.to_string(), shared.clone());
        shared
    }

    /// Drop `key` if it still maps to this (failed) request
    fn evict(&self, key: &str, failed: &SharedFetch) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|current| current.ptr_eq(failed)) {
            entries.remove(key);
        }
    }

    /// True when `key` has resolved successfully
    pub fn is_ready(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .and_then(|shared| shared.peek().map(|outcome| outcome.is_ok()))
            .unwrap_or(false)
    }

    /// True when `key` is cached or in flight
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedFetch>> {
        // Entries stay valid if a holder panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Artifacts needed before the first render
#[derive(Clone)]
pub struct InitialData {
    pub district: Arc<DatasetLookup>,
    pub county: Arc<DatasetLookup>,
    pub measure_info: Arc<serde_json::Value>,
    pub manifest: Arc<Manifest>,
}

/// Typed loads through an injected cache
#[derive(Clone)]
pub struct ArtifactLoader {
    source: Arc<dyn ArtifactSource>,
    cache: Arc<ArtifactCache>,
}

impl ArtifactLoader {
    pub fn new(source: Arc<dyn ArtifactSource>, cache: Arc<ArtifactCache>) -> Self {
        ArtifactLoader { source, cache }
    }

    /// Loader with a cache of its own
    pub fn with_source(source: impl ArtifactSource) -> Self {
        Self::new(Arc::new(source), Arc::new(ArtifactCache::new()))
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn dataset_key(name: &str) -> String {
        format!("dataset:{}", name)
    }

    pub async fn load_dataset(&self, name: &str) -> Result<Arc<DatasetLookup>, FetchError> {
        self.load(&Self::dataset_key(name), &format!("{}.json", name))
            .await
    }

    pub async fn load_manifest(&self) -> Result<Arc<Manifest>, FetchError> {
        self.load(DATAPACKAGE_KEY, "datapackage.json").await
    }

    pub async fn load_measure_info(&self) -> Result<Arc<serde_json::Value>, FetchError> {
        self.load(MEASURE_INFO_KEY, "measure_info.json").await
    }

    /// District and county lookups, measure info and the manifest, concurrently
    ///
    /// Tract lookups are large and are loaded on demand.
    pub async fn load_initial(&self) -> Result<InitialData, FetchError> {
        let (district, county, measure_info, manifest) = futures::try_join!(
            self.load_dataset(Granularity::District.as_str()),
            self.load_dataset(Granularity::County.as_str()),
            self.load_measure_info(),
            self.load_manifest(),
        )?;
        Ok(InitialData {
            district,
            county,
            measure_info,
            manifest,
        })
    }

    pub fn is_dataset_cached(&self, name: &str) -> bool {
        self.cache.is_ready(&Self::dataset_key(name))
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    async fn load<T>(&self, key: &str, file: &str) -> Result<Arc<T>, FetchError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let shared = self.cache.get_or_start(key, || {
            tracing::debug!("Fetching '{}' from {}", key, self.source.describe());
            let fetch = self.source.fetch(file);
            let key = key.to_string();
            async move {
                let bytes = fetch.await?;
                let value: T = serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode {
                    key,
                    message: e.to_string(),
                })?;
                Ok(Arc::new(value) as CachedValue)
            }
            .boxed()
        });

        match shared.clone().await {
            Ok(value) => value
                .downcast::<T>()
                .map_err(|_| FetchError::TypeMismatch(key.to_string())),
            Err(err) => {
                tracing::warn!("Fetch of '{}' failed: {}", key, err);
                self.cache.evict(key, &shared);
                Err(err)
            }
        }
    }
}
