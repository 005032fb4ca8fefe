use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{CacheStorage, EntryLog, Store};
use crate::error::StoreError;
use crate::models::{RequestKey, Response};

/// In-process store set. Clone is cheap and clones share the same stores.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    stores: Arc<Mutex<BTreeMap<String, Arc<MemoryStore>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn stores(&self) -> MutexGuard<'_, BTreeMap<String, Arc<MemoryStore>>> {
        // A poisoned map is still structurally valid
        self.stores.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct MemoryStore {
    name: String,
    log: Mutex<EntryLog>,
}

impl MemoryStore {
    fn log(&self) -> MutexGuard<'_, EntryLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<Response>, StoreError> {
        Ok(self.log().get(key).cloned())
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<(), StoreError> {
        self.log().put(key, response);
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool, StoreError> {
        Ok(self.log().delete(key))
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StoreError> {
        Ok(self.log().keys())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.log().len())
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        let store: Arc<dyn Store> = self
            .stores()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryStore {
                    name: name.to_string(),
                    log: Mutex::new(EntryLog::default()),
                })
            })
            .clone();
        Ok(store)
    }

    async fn lookup(&self, name: &str) -> Result<Option<Arc<dyn Store>>, StoreError> {
        Ok(self
            .stores()
            .get(name)
            .map(|store| store.clone() as Arc<dyn Store>))
    }

    async fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.stores().keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.stores().remove(name).is_some())
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.stores().contains_key(name))
    }
}
