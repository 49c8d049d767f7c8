//! Pre-signed object storage
//!
//! The control plane hands out pre-signed URLs; this trait is the only
//! storage surface the packager sees. The HTTP implementation backs real
//! runs, the in-memory one backs tests.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// GET/PUT against pre-signed URLs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(&self, url: &str) -> Result<Option<Vec<u8>>>;

    /// Upload an object
    async fn put(&self, url: &str, bytes: Vec<u8>) -> Result<()>;
}

/// reqwest-backed store for pre-signed HTTP URLs
pub struct HttpObjectStore {
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpObjectStore {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Object download request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("Object download failed: HTTP {}", response.status()));
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read object body")?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, url: &str, bytes: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .await
            .context("Object upload request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Object upload failed: HTTP {}", response.status()));
        }
        Ok(())
    }
}

/// In-memory store keyed by URL, for tests
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, e.g. a previous cache manifest
    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(url.into(), bytes);
    }

    /// Snapshot of a stored object
    pub fn object(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(url).cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(url).cloned())
    }

    async fn put(&self, url: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects.lock().unwrap().insert(url.to_string(), bytes);
        Ok(())
    }
}
