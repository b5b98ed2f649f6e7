//! Shared settings store
//!
//! The durable key-value store shared by every context of the extension.
//! Reads and writes are asynchronous and may fail; every caller degrades to
//! the built-in default shortcut rather than blocking the feature.
//!
//! The only key used today is `customShortcut`.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::shortcut::ShortcutSpec;

/// Storage key holding the user's shortcut
pub const CUSTOM_SHORTCUT_KEY: &str = "customShortcut";

/// Values keyed by storage key
pub type StoredValues = Map<String, Value>;

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings data is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Settings store unavailable")]
    Unavailable,

    #[error("Refusing to store a shortcut without a key")]
    MissingKey,
}

/// Durable key-value store shared across contexts
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read the given keys; absent keys are simply missing from the result
    async fn get(&self, keys: &[&str]) -> Result<StoredValues, StorageError>;

    /// Merge the given values into the store
    async fn set(&self, values: StoredValues) -> Result<(), StorageError>;
}

/// Read the persisted custom shortcut, if any.
///
/// A stored spec with an empty key is treated as absent.
pub async fn load_custom_shortcut(
    store: &dyn SettingsStore,
) -> Result<Option<ShortcutSpec>, StorageError> {
    let mut values = store.get(&[CUSTOM_SHORTCUT_KEY]).await?;
    let Some(value) = values.remove(CUSTOM_SHORTCUT_KEY) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }

    let spec: ShortcutSpec = serde_json::from_value(value)?;
    Ok(spec.has_key().then(|| spec.normalized()))
}

/// Read the active shortcut, falling back to the built-in default on any failure
pub async fn effective_shortcut(store: &dyn SettingsStore) -> ShortcutSpec {
    match load_custom_shortcut(store).await {
        Ok(Some(spec)) => spec,
        Ok(None) => ShortcutSpec::default(),
        Err(e) => {
            tracing::warn!("Could not read custom shortcut, using default: {}", e);
            ShortcutSpec::default()
        }
    }
}

/// Persist the custom shortcut. A spec without a key is refused.
pub async fn save_custom_shortcut(
    store: &dyn SettingsStore,
    spec: &ShortcutSpec,
) -> Result<(), StorageError> {
    if !spec.has_key() {
        return Err(StorageError::MissingKey);
    }
    let mut values = StoredValues::new();
    values.insert(CUSTOM_SHORTCUT_KEY.to_string(), serde_json::to_value(spec)?);
    store.set(values).await
}

// =============================================================================
// File-backed store
// =============================================================================

/// JSON file store (~/.zenview/storage.json by default)
pub struct FileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<StoredValues, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(StoredValues::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredValues::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<StoredValues, StorageError> {
        let all = self.read_all().await?;
        Ok(all
            .into_iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .collect())
    }

    async fn set(&self, values: StoredValues) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.read_all().await?;
        all.extend(values);

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Write to a sibling file then rename so readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&all)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("Settings written to {:?}", self.path);
        Ok(())
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// In-memory store with switchable failures
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<StoredValues>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reads fail with `Unavailable`
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with `Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw value for a key, bypassing failure injection
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoredValues, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        let values = self.values.read();
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, values: StoredValues) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        self.values.write().extend(values);
        Ok(())
    }
}
