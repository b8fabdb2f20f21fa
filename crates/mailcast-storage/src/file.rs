//! File storage abstraction and JSON collections

use async_trait::async_trait;
use mailcast_common::config::StorageConfig;
use mailcast_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// File storage trait
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Atomically replace a file's contents
    async fn store(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Append bytes to a file, creating it if needed
    async fn append(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read a file, `None` if it does not exist
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if a file exists
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Local filesystem storage
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage instance from config
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Self::from_path(&config.data_dir)
    }

    /// Create a new local storage instance from a path
    pub fn from_path(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        info!(path = %path.display(), "Initialized local file storage");

        Ok(Self {
            base_path: path.to_path_buf(),
        })
    }

    /// Get full path for a relative path, with path traversal protection
    fn full_path(&self, path: &str) -> Result<PathBuf> {
        if path.contains("..") {
            return Err(Error::Storage(
                "Path traversal detected: '..' is not allowed".to_string(),
            ));
        }

        if path.starts_with('/') || path.starts_with('\\') {
            return Err(Error::Storage("Absolute paths are not allowed".to_string()));
        }

        Ok(self.base_path.join(path))
    }

    async fn ensure_parent_exists(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn store(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        self.ensure_parent_exists(&full_path).await?;

        // Write next to the target, then rename over it
        let tmp_path = full_path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create file: {}", e)))?;
        file.write_all(data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Storage(format!("Failed to flush file: {}", e)))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, &full_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::Storage(format!("Failed to replace file: {}", e)));
        }

        debug!(path = %path, size = data.len(), "Stored file");
        Ok(())
    }

    async fn append(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        self.ensure_parent_exists(&full_path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to open file for append: {}", e)))?;
        file.write_all(data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to append to file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("Failed to flush file: {}", e)))?;

        debug!(path = %path, size = data.len(), "Appended to file");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full_path = self.full_path(path)?;

        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read file: {}", e))),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;

        fs::remove_file(&full_path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to delete file: {}", e)))?;

        debug!(path = %path, "Deleted file");
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(full_path.exists())
    }
}

/// Records stored in a collection are addressed by id
pub trait Keyed {
    fn key(&self) -> Uuid;
}

/// A JSON array persisted as one file.
///
/// Writers are serialized by an in-process mutex; every mutation is a single
/// read-modify-write followed by an atomic replace of the file.
pub struct JsonCollection<T> {
    storage: Arc<dyn FileStorage>,
    file: String,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(storage: Arc<dyn FileStorage>, file: impl Into<String>) -> Self {
        Self {
            storage,
            file: file.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Load every record; a missing file is an empty collection
    pub async fn load(&self) -> Result<Vec<T>> {
        match self.storage.read(&self.file).await? {
            Some(data) if !data.is_empty() => serde_json::from_slice(&data).map_err(|e| {
                error!(file = %self.file, error = %e, "Corrupt collection file");
                Error::Storage(format!("Failed to parse {}: {}", self.file, e))
            }),
            _ => Ok(Vec::new()),
        }
    }

    /// Apply `f` to the records and persist the result.
    ///
    /// Nothing is written when `f` returns an error.
    pub async fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<T>) -> Result<R> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        let out = f(&mut items)?;
        let data = serde_json::to_vec_pretty(&items)?;
        self.storage.store(&self.file, &data).await?;
        Ok(out)
    }
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned + Send + Keyed + Clone,
{
    pub async fn find(&self, id: Uuid) -> Result<Option<T>> {
        Ok(self.load().await?.into_iter().find(|item| item.key() == id))
    }

    pub async fn insert(&self, item: T) -> Result<T> {
        self.update(move |items| {
            items.push(item.clone());
            Ok(item)
        })
        .await
    }

    /// Mutate one record in place, `NotFound` if absent
    pub async fn modify<F>(&self, id: Uuid, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()> + Send,
    {
        let what = what.to_string();
        self.update(move |items| {
            let item = items
                .iter_mut()
                .find(|item| item.key() == id)
                .ok_or_else(|| Error::NotFound(format!("{} {} not found", what, id)))?;
            f(item)?;
            Ok(item.clone())
        })
        .await
    }

    /// Remove one record, returning whether it existed
    pub async fn remove(&self, id: Uuid) -> Result<bool> {
        self.update(move |items| {
            let before = items.len();
            items.retain(|item| item.key() != id);
            Ok(items.len() != before)
        })
        .await
    }
}

/// An append-only log with one JSON record per line.
///
/// Appends never rewrite earlier records. A line that fails to parse (for
/// example a torn final write) is skipped on load.
pub struct JsonLines<T> {
    storage: Arc<dyn FileStorage>,
    file: String,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonLines<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(storage: Arc<dyn FileStorage>, file: impl Into<String>) -> Self {
        Self {
            storage,
            file: file.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub async fn append(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let _guard = self.lock.lock().await;
        self.storage.append(&self.file, &line).await
    }

    /// Every record in append order; a missing file is an empty log
    pub async fn load(&self) -> Result<Vec<T>> {
        let Some(data) = self.storage.read(&self.file).await? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for (number, line) in data.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(file = %self.file, line = number + 1, error = %e, "Skipping unreadable log line")
                }
            }
        }
        Ok(records)
    }
}
