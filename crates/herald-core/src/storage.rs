//! Storage layer for the users and schedule tables
//!
//! Each logical table is loaded once and rewritten in full after every
//! mutation. File writes go through a temporary file and a rename so a
//! concurrent reader never observes a partial table.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Error during YAML deserialization
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A whole-table persistence backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableStore<T: Send + Sync + 'static>: Send + Sync {
    /// Load the table, seeding an empty default on first run.
    async fn load(&self) -> Result<T, StorageError>;
    /// Overwrite the table with `data`.
    async fn save(&self, data: &T) -> Result<(), StorageError>;
}

/// JSON file backed table.
pub struct JsonFileTable<T> {
    path: PathBuf,
    _table: PhantomData<fn() -> T>,
}

impl<T> JsonFileTable<T> {
    /// Create a table stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _table: PhantomData,
        }
    }

    /// Location of the table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.path.display(), TEMP_FILE_SUFFIX))
    }
}

#[async_trait]
impl<T> TableStore<T> for JsonFileTable<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    async fn load(&self) -> Result<T, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(T::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Table {} not found, seeding empty default.", self.path.display());
                let seeded = T::default();
                self.save(&seeded).await?;
                Ok(seeded)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, data: &T) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory table, used for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryTable<T> {
    data: Mutex<T>,
}

impl<T> MemoryTable<T> {
    /// Create a table holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            data: Mutex::new(initial),
        }
    }
}

impl<T: Clone> MemoryTable<T> {
    /// Last saved snapshot.
    pub async fn snapshot(&self) -> T {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl<T> TableStore<T> for MemoryTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn load(&self) -> Result<T, StorageError> {
        Ok(self.data.lock().await.clone())
    }

    async fn save(&self, data: &T) -> Result<(), StorageError> {
        *self.data.lock().await = data.clone();
        Ok(())
    }
}
