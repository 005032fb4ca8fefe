//! On-disk store set.
//!
//! Each store is a single JSON document `{name, entries}` in the storage
//! directory. Documents are rewritten whole through a temporary file and a
//! rename, so a reader never observes a half-written store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CacheStorage, EntryLog, Store};
use crate::error::StoreError;
use crate::models::{RequestKey, Response};

const DOCUMENT_EXTENSION: &str = "json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    name: String,
    #[serde(flatten)]
    log: EntryLog,
}

/// Persistent store set rooted at a directory.
///
/// All handles opened from one `DiskStorage` share a write lock, so
/// concurrent puts to different keys of the same store are not lost.
#[derive(Clone)]
pub struct DiskStorage {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DiskStorage {
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Arc::new(Mutex::new(())),
        })
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", escape_name(name), DOCUMENT_EXTENSION))
    }

    fn handle(&self, name: &str) -> Arc<dyn Store> {
        Arc::new(DiskStore {
            name: name.to_string(),
            path: self.document_path(name),
            lock: self.lock.clone(),
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Escape every byte outside `[A-Za-z0-9._-]` as `%XX`.
fn escape_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    escaped
}

fn read_document(path: &Path, name: &str) -> Result<StoreDocument, StoreError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
        name: name.to_string(),
        source,
    })
}

fn write_document(path: &Path, document: &StoreDocument) -> Result<(), StoreError> {
    let contents = serde_json::to_string(document).map_err(|source| StoreError::Corrupt {
        name: document.name.clone(),
        source,
    })?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub struct DiskStore {
    name: String,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DiskStore {
    /// Read the document, treating a deleted store as empty.
    fn load(&self) -> Result<StoreDocument, StoreError> {
        if !self.path.exists() {
            return Ok(StoreDocument {
                name: self.name.clone(),
                log: EntryLog::default(),
            });
        }
        read_document(&self.path, &self.name)
    }

    fn update<R>(&self, f: impl FnOnce(&mut EntryLog) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document = self.load()?;
        let result = f(&mut document.log);
        write_document(&self.path, &document)?;
        Ok(result)
    }

    fn read(&self) -> Result<EntryLog, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.log)
    }
}

#[async_trait]
impl Store for DiskStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<(), StoreError> {
        self.update(|log| log.put(key, response))
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool, StoreError> {
        self.update(|log| log.delete(key))
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError> {
        Ok(self.read()?.keys())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        let path = self.document_path(name);
        let _guard = self.guard();
        if !path.exists() {
            debug!(store = name, "Creating store document");
            write_document(
                &path,
                &StoreDocument {
                    name: name.to_string(),
                    log: EntryLog::default(),
                },
            )?;
        }
        Ok(self.handle(name))
    }

    async fn lookup(&self, name: &str) -> Result<Option<Arc<dyn Store>>, StoreError> {
        if self.document_path(name).exists() {
            Ok(Some(self.handle(name)))
        } else {
            Ok(None)
        }
    }

    async fn names(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.guard();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let file_name = path.display().to_string();
            match read_document(&path, &file_name) {
                Ok(document) => names.push(document.name),
                Err(e) => warn!(file = %file_name, error = %e, "Skipping unreadable store document"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.document_path(name);
        let _guard = self.guard();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.document_path(name).exists())
    }
}
