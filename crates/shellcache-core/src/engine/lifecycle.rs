//! Generation lifecycle: install (shell bootstrap) and activate (retirement
//! of older generations).
//!
//! Install must complete before activation runs, otherwise activation could
//! expose a half-populated shell store.

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};

use super::Engine;
use crate::error::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Parsed,
    Installing,
    /// Shell populated, waiting to take over.
    Installed,
    Activating,
    /// Intercepting requests.
    Activated,
    /// Install failed; the previous generation stays authoritative.
    Redundant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifecycle {
    pub state: LifecycleState,
    /// Take over without waiting for existing clients to go away.
    pub skip_waiting: bool,
    pub clients_claimed: bool,
}

impl Lifecycle {
    pub fn ready_to_activate(&self) -> bool {
        self.state == LifecycleState::Installed && self.skip_waiting
    }
}

impl Engine {
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle_mut()
    }

    fn set_state(&self, state: LifecycleState) {
        self.lifecycle_mut().state = state;
    }

    /// Install-phase hook: populate the shell store, then signal readiness to
    /// supersede the previous generation.
    pub async fn install(&self) -> Result<(), CacheError> {
        let tag = self.generation().tag().to_string();
        info!(generation = %tag, "Installing");
        self.set_state(LifecycleState::Installing);

        match self.bootstrap().await {
            Ok(count) => {
                info!(generation = %tag, resources = count, "Pre-cache complete");
                self.set_state(LifecycleState::Installed);
                self.skip_waiting();
                Ok(())
            }
            Err(e) => {
                error!(generation = %tag, error = %e, "Pre-cache failed");
                self.set_state(LifecycleState::Redundant);
                Err(e)
            }
        }
    }

    /// Fetch every shell resource and write them into the shell store.
    ///
    /// All-or-nothing: the store is only opened and written once every
    /// resource came back as a 200. Returns the number of resources written.
    pub async fn bootstrap(&self) -> Result<usize, CacheError> {
        let requests = self
            .config()
            .shell_urls
            .iter()
            .map(|url| self.resolve(url))
            .collect::<Result<Vec<_>, _>>()?;

        let fetches = requests.iter().map(|request| async move {
            let response =
                self.fetch_network(request)
                    .await
                    .map_err(|e| CacheError::Bootstrap {
                        url: request.url.to_string(),
                        reason: e.to_string(),
                    })?;
            if !response.is_cacheable() {
                return Err(CacheError::Bootstrap {
                    url: request.url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok::<_, CacheError>((request.key(), response))
        });
        let entries = try_join_all(fetches).await?;

        let shell = self.generation().shell_store();
        let store = self.storage().open(shell).await?;
        let count = entries.len();
        for (key, response) in entries {
            if let Err(e) = store.put(key, response.snapshot()).await {
                // No partial shell survives a failed install
                if let Err(cleanup) = self.storage().delete(shell).await {
                    warn!(store = %shell, error = %cleanup, "Failed to remove partial shell store");
                }
                return Err(e.into());
            }
        }
        Ok(count)
    }

    /// Activation-phase hook: delete older generations, then start
    /// controlling clients. Returns the names of the retired stores.
    ///
    /// Runs only once this generation's shell is complete: straight after a
    /// successful install, or in a fresh process when an earlier run already
    /// installed it. Otherwise nothing is touched and the previous generation
    /// stays authoritative.
    pub async fn activate(&self) -> Vec<String> {
        let tag = self.generation().tag().to_string();
        let ready = match self.lifecycle().state {
            LifecycleState::Installed => true,
            LifecycleState::Parsed => self.shell_installed().await,
            LifecycleState::Activated => {
                debug!(generation = %tag, "Already active");
                return Vec::new();
            }
            LifecycleState::Installing
            | LifecycleState::Activating
            | LifecycleState::Redundant => false,
        };
        if !ready {
            warn!(generation = %tag, state = ?self.lifecycle().state, "Shell not installed, refusing to activate");
            return Vec::new();
        }

        info!(generation = %tag, "Activating");
        self.set_state(LifecycleState::Activating);

        let retired = self.retire_stale_generations().await;
        self.claim_clients();
        self.set_state(LifecycleState::Activated);
        retired
    }

    /// Whether the current shell store exists. Install only ever leaves a
    /// complete one behind.
    async fn shell_installed(&self) -> bool {
        match self.storage().has(self.generation().shell_store()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Could not check for shell store");
                false
            }
        }
    }

    /// Delete every store of this family that is not the current shell or
    /// dynamic store. Best-effort: a failed delete is logged and skipped.
    pub async fn retire_stale_generations(&self) -> Vec<String> {
        let names = match self.storage().names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list stores for retirement");
                return Vec::new();
            }
        };

        let mut retired = Vec::new();
        for name in names.into_iter().filter(|n| self.generation().is_stale(n)) {
            info!(store = %name, "Deleting old store");
            match self.storage().delete(&name).await {
                Ok(_) => retired.push(name),
                Err(e) => warn!(store = %name, error = %e, "Failed to delete old store"),
            }
        }
        retired
    }

    pub fn skip_waiting(&self) {
        self.lifecycle_mut().skip_waiting = true;
    }

    fn claim_clients(&self) {
        info!("Claiming clients");
        self.lifecycle_mut().clients_claimed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::Interception;
    use crate::error::StoreError;
    use crate::models::{Request, RequestKey, Response};
    use crate::store::{CacheStorage, DiskStorage, MemoryStorage, Store};
    use crate::testing::{test_config, MockFetcher};

    /// Memory storage whose `fail_at`-th put (1-based, across all stores)
    /// fails with an I/O error.
    struct FailingStorage {
        inner: MemoryStorage,
        puts: Arc<AtomicUsize>,
        fail_at: usize,
    }

    struct FailingStore {
        inner: Arc<dyn Store>,
        puts: Arc<AtomicUsize>,
        fail_at: usize,
    }

    #[async_trait]
    impl Store for FailingStore {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn get(&self, key: &RequestKey) -> Result<Option<Response>, StoreError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: RequestKey, response: Response) -> Result<(), StoreError> {
            if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.put(key, response).await
        }

        async fn delete(&self, key: &RequestKey) -> Result<bool, StoreError> {
            self.inner.delete(key).await
        }

        async fn keys(&self) -> Result<Vec<RequestKey>, StoreError> {
            self.inner.keys().await
        }
    }

    #[async_trait]
    impl CacheStorage for FailingStorage {
        async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
            Ok(Arc::new(FailingStore {
                inner: self.inner.open(name).await?,
                puts: self.puts.clone(),
                fail_at: self.fail_at,
            }))
        }

        async fn lookup(&self, name: &str) -> Result<Option<Arc<dyn Store>>, StoreError> {
            self.inner.lookup(name).await
        }

        async fn names(&self) -> Result<Vec<String>, StoreError> {
            self.inner.names().await
        }

        async fn delete(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.delete(name).await
        }
    }

    fn engine_for(
        tag: &str,
        storage: &MemoryStorage,
        fetcher: &Arc<MockFetcher>,
    ) -> Engine {
        let config = EngineConfig {
            generation: tag.to_string(),
            ..test_config()
        };
        Engine::new(config, Arc::new(storage.clone()), fetcher.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_install_populates_shell() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());
        let engine = engine_for("v1", &storage, &fetcher);

        engine.install().await.unwrap();

        let lifecycle = engine.lifecycle();
        assert_eq!(lifecycle.state, LifecycleState::Installed);
        assert!(lifecycle.ready_to_activate());

        let shell = storage.lookup("school-schedule-v1").await.unwrap().unwrap();
        assert_eq!(shell.len().await.unwrap(), 3);
        let home = shell
            .get(&Request::get("https://app.example/").unwrap().key())
            .await
            .unwrap()
            .unwrap();
        assert!(home.cached_at.is_some());
    }

    #[tokio::test]
    async fn test_install_is_atomic() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());
        fetcher.set("https://app.example/index.html", 404, "missing");
        let engine = engine_for("v1", &storage, &fetcher);

        let err = engine.install().await.unwrap_err();
        assert!(matches!(err, CacheError::Bootstrap { .. }));
        assert_eq!(engine.lifecycle().state, LifecycleState::Redundant);
        // Nothing written, not even an empty shell store
        assert!(!storage.has("school-schedule-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_previous_generation() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());
        let old = engine_for("v1", &storage, &fetcher);
        old.install().await.unwrap();
        old.activate().await;

        fetcher.set_offline(true);
        let new = engine_for("v2", &storage, &fetcher);
        assert!(new.install().await.is_err());
        assert!(new.activate().await.is_empty());
        assert_ne!(new.lifecycle().state, LifecycleState::Activated);

        assert!(storage.has("school-schedule-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_upgrade_retires_previous_generation() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());

        let old = engine_for("v1", &storage, &fetcher);
        old.install().await.unwrap();
        old.activate().await;
        storage.open("school-schedule-dynamic-v1").await.unwrap();
        storage.open("unrelated-app-v1").await.unwrap();

        let new = engine_for("v2", &storage, &fetcher);
        new.install().await.unwrap();
        let mut retired = new.activate().await;
        retired.sort();

        assert_eq!(
            retired,
            vec![
                "school-schedule-dynamic-v1".to_string(),
                "school-schedule-v1".to_string()
            ]
        );
        let names = storage.names().await.unwrap();
        assert!(names.iter().all(|n| !n.ends_with("v1") || n == "unrelated-app-v1"));
        assert!(names.contains(&"unrelated-app-v1".to_string()));

        // The new shell holds exactly the configured shell resources
        let shell = storage.lookup("school-schedule-v2").await.unwrap().unwrap();
        let mut keys: Vec<String> = shell.keys().await.unwrap().into_iter().map(|k| k.url).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "https://app.example/".to_string(),
                "https://app.example/index.html".to_string(),
                "https://cdn.tailwindcss.com/".to_string(),
            ]
        );

        let lifecycle = new.lifecycle();
        assert_eq!(lifecycle.state, LifecycleState::Activated);
        assert!(lifecycle.clients_claimed);
    }

    #[tokio::test]
    async fn test_failed_shell_write_leaves_no_partial_store() {
        let memory = MemoryStorage::new();
        let storage = FailingStorage {
            inner: memory.clone(),
            puts: Arc::new(AtomicUsize::new(0)),
            fail_at: 2,
        };
        let engine = Engine::new(
            test_config(),
            Arc::new(storage),
            Arc::new(MockFetcher::with_shell()),
        )
        .unwrap();

        let err = engine.install().await.unwrap_err();
        assert!(matches!(err, CacheError::Store(_)));
        assert_eq!(engine.lifecycle().state, LifecycleState::Redundant);
        assert!(!memory.has("school-schedule-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_activate_before_install_keeps_previous_generation() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());
        let old = engine_for("v1", &storage, &fetcher);
        old.install().await.unwrap();
        old.activate().await;

        let new = engine_for("v2", &storage, &fetcher);
        assert!(new.activate().await.is_empty());
        assert_eq!(new.lifecycle().state, LifecycleState::Parsed);
        assert!(!new.lifecycle().clients_claimed);
        assert_eq!(storage.names().await.unwrap(), vec!["school-schedule-v1".to_string()]);

        // Still bypassing, so the old generation keeps serving
        let request = Request::get("https://app.example/index.html").unwrap();
        assert_eq!(new.handle_fetch(&request).await.unwrap(), Interception::Bypass);
    }

    #[tokio::test]
    async fn test_activate_while_installing_is_refused() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());
        let old = engine_for("v1", &storage, &fetcher);
        old.install().await.unwrap();
        old.activate().await;

        let new = engine_for("v2", &storage, &fetcher);
        new.set_state(LifecycleState::Installing);
        assert!(new.activate().await.is_empty());
        assert_eq!(new.lifecycle().state, LifecycleState::Installing);
        assert!(storage.has("school-schedule-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_fresh_engine_activates_previously_installed_generation() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());
        let first_run = engine_for("v1", &storage, &fetcher);
        first_run.install().await.unwrap();
        first_run.activate().await;

        // A later process on the same stores, without installing again
        let next_run = engine_for("v1", &storage, &fetcher);
        assert!(next_run.activate().await.is_empty());
        assert_eq!(next_run.lifecycle().state, LifecycleState::Activated);

        let request = Request::get("https://app.example/index.html").unwrap();
        fetcher.set_offline(true);
        match next_run.handle_fetch(&request).await.unwrap() {
            Interception::Respond(response) => assert_eq!(response.text(), "shell /index.html"),
            Interception::Bypass => panic!("expected the cached shell"),
        }
    }

    #[tokio::test]
    async fn test_activate_twice_is_noop() {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(MockFetcher::with_shell());
        let engine = engine_for("v1", &storage, &fetcher);
        engine.install().await.unwrap();
        engine.activate().await;

        storage.open("school-schedule-v0").await.unwrap();
        assert!(engine.activate().await.is_empty());
        assert!(storage.has("school-schedule-v0").await.unwrap());
    }

    #[tokio::test]
    async fn test_generation_bump_on_disk_without_install() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::with_shell());
        let open_engine = |tag: &str| {
            let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
            let config = EngineConfig {
                generation: tag.to_string(),
                ..test_config()
            };
            Engine::new(config, Arc::new(storage), fetcher.clone()).unwrap()
        };

        let v1 = open_engine("v1");
        v1.install().await.unwrap();
        v1.activate().await;

        // New process, config bumped to v2, install never ran
        let v2 = open_engine("v2");
        assert!(v2.activate().await.is_empty());
        assert_ne!(v2.lifecycle().state, LifecycleState::Activated);

        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        let shell = storage.lookup("school-schedule-v1").await.unwrap().unwrap();
        assert_eq!(shell.len().await.unwrap(), 3);
    }
}
