//! Usage: Local persistent key-value storage (named slots holding JSON values).
//!
//! `FileStorage` keeps every slot in a single JSON object on disk and rewrites it
//! atomically on each mutation. `MemoryStorage` is the in-process variant.

use crate::blocking;
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use futures_core::future::BoxFuture;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait KeyValueStorage: Send + Sync {
    /// Value stored under `key`, or `None` when the slot is empty.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, AppResult<Option<Value>>>;

    /// Overwrite the slot under `key`.
    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, AppResult<()>>;

    /// Remove the slot under `key`; removing an empty slot is a no-op.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, AppResult<()>>;
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    path: Arc<PathBuf>,
    // Serializes read-modify-write cycles within this process.
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    async fn mutate(
        &self,
        label: &'static str,
        f: impl FnOnce(&mut Map<String, Value>) -> bool + Send + 'static,
    ) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = Arc::clone(&self.path);
        blocking::run(label, move || -> AppResult<()> {
            let mut slots = read_slots(&path)?;
            if f(&mut slots) {
                write_slots(&path, &slots)?;
            }
            Ok(())
        })
        .await
    }
}

fn read_slots(path: &Path) -> AppResult<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("STORAGE_ERROR: failed to read {}: {e}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!(
            "STORAGE_ERROR: {} does not contain a json object",
            path.display()
        )
        .into()),
        Err(e) => Err(format!("STORAGE_ERROR: failed to parse {}: {e}", path.display()).into()),
    }
}

fn write_slots(path: &Path, slots: &Map<String, Value>) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("STORAGE_ERROR: failed to create {}: {e}", parent.display()))?;
    }

    let content = serde_json::to_vec_pretty(slots)
        .map_err(|e| format!("SYSTEM_ERROR: failed to serialize storage: {e}"))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("STORAGE_ERROR: failed to write temp storage file: {e}"))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(format!("STORAGE_ERROR: failed to finalize storage: {e}").into());
    }
    Ok(())
}

impl KeyValueStorage for FileStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, AppResult<Option<Value>>> {
        Box::pin(async move {
            let path = Arc::clone(&self.path);
            let key = key.to_string();
            blocking::run("storage_get", move || -> AppResult<Option<Value>> {
                Ok(read_slots(&path)?.remove(&key))
            })
            .await
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            let key = key.to_string();
            self.mutate("storage_set", move |slots| {
                slots.insert(key, value);
                true
            })
            .await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            let key = key.to_string();
            self.mutate("storage_remove", move |slots| slots.remove(&key).is_some())
                .await
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: Mutex<Map<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.slots.lock_or_recover().clone()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, AppResult<Option<Value>>> {
        let value = self.slots.lock_or_recover().get(key).cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, AppResult<()>> {
        self.slots.lock_or_recover().insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, AppResult<()>> {
        self.slots.lock_or_recover().remove(key);
        Box::pin(async { Ok(()) })
    }
}
