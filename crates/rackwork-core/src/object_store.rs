// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object store for task logs, provisioning logs and rack terraform state.
//!
//! # Key layout
//!
//! ```text
//! jobs/{job_id}/tasks/{task_uuid}                             task log
//! organizations/{oid}/racks/{rid}/{installs|uninstalls|updates}/{id}
//!                                                             provisioning log
//! organizations/{oid}/racks/{rid}/state                       terraform state
//! ```
//!
//! Logs are only ever appended to. [`LogWriter`] binds a key to a store and
//! serializes appends from every clone of itself, so concurrent stdout/stderr
//! pumps land in the log in the order they were written.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Key/value blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Append bytes to an object, creating it when missing.
    async fn append(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Replace an object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read an object. Returns [`Error::ObjectNotFound`] when missing.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete an object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !clean {
            return Err(Error::Other(format!("invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn append(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        Self::ensure_parent(&path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        Self::ensure_parent(&path).await?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::ObjectNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Object content as UTF-8 (lossy), empty when missing.
    pub fn text(&self, key: &str) -> String {
        self.lock()
            .get(key)
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .unwrap_or_default()
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn append(&self, key: &str, data: &[u8]) -> Result<()> {
        self.lock()
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Append-only writer bound to one object key.
#[derive(Clone)]
pub struct LogWriter {
    sink: Option<Sink>,
}

#[derive(Clone)]
struct Sink {
    store: Arc<dyn ObjectStore>,
    key: String,
    order: Arc<tokio::sync::Mutex<()>>,
}

impl LogWriter {
    /// Writer appending to `key` in `store`.
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            sink: Some(Sink {
                store,
                key: key.into(),
                order: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    /// Writer that drops everything.
    pub fn discard() -> Self {
        Self { sink: None }
    }

    /// Key this writer appends to.
    pub fn key(&self) -> Option<&str> {
        self.sink.as_ref().map(|s| s.key.as_str())
    }

    /// Append raw bytes.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        if data.is_empty() {
            return Ok(());
        }
        let _order = sink.order.lock().await;
        sink.store.append(&sink.key, data).await
    }

    /// Append a string.
    pub async fn write_str(&self, s: &str) -> Result<()> {
        self.write(s.as_bytes()).await
    }

    /// Append a string followed by a newline.
    pub async fn writeln(&self, s: &str) -> Result<()> {
        self.write(format!("{}\n", s).as_bytes()).await
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("key", &self.key())
            .finish()
    }
}
