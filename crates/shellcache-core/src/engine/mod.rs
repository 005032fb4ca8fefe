//! The caching decision engine.
//!
//! `Engine` sits between an application and the network. The host calls it
//! from its lifecycle hooks (`install`, `activate`), from its request
//! interception hook (`handle_fetch`), from its message hook
//! (`handle_message`) and from its connectivity hook (`handle_sync`).
//!
//! Clone is cheap; all clones drive the same engine.

pub mod control;
pub mod generation;
pub mod lifecycle;
pub mod policy;
pub mod router;
pub mod sync;
pub mod trim;

mod tasks;

use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Url;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{CacheError, FetchError, StoreError};
use crate::fetch::Fetcher;
use crate::models::{Request, RequestKey, Response};
use crate::store::CacheStorage;

pub use control::{ControlMessage, MessageOutcome, MessageSource};
pub use generation::Generation;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use router::{RequestClass, Route, Router};
pub use trim::trim;

use tasks::BackgroundTasks;

/// Result of the interception hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not intercepted; the host lets the network handle it natively.
    Bypass,
    Respond(Response),
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    origin: Url,
    generation: Generation,
    router: Router,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: Mutex<Lifecycle>,
    tasks: BackgroundTasks,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CacheError> {
        config
            .validate()
            .map_err(|e| CacheError::Config(format!("{:#}", e)))?;
        let origin = Url::parse(&config.origin)
            .map_err(|e| CacheError::Config(format!("origin {}: {}", config.origin, e)))?;
        let router = Router::new(&config)?;
        let generation = Generation::new(&config.store_prefix, &config.generation);

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                origin,
                generation,
                router,
                storage,
                fetcher,
                lifecycle: Mutex::new(Lifecycle::default()),
                tasks: BackgroundTasks::default(),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn generation(&self) -> &Generation {
        &self.inner.generation
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.inner.storage
    }

    /// Interception hook: decide whether and how to answer one request.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Interception, CacheError> {
        if !request.is_get() {
            return Ok(Interception::Bypass);
        }
        if self.lifecycle().state != LifecycleState::Activated {
            debug!(url = %request.url, "Engine not active, bypassing");
            return Ok(Interception::Bypass);
        }
        let Some(route) = self.inner.router.classify(&self.inner.generation, request) else {
            return Ok(Interception::Bypass);
        };

        let response = match route.class {
            RequestClass::Api => self.serve_api(request, &route).await,
            RequestClass::DynamicAsset | RequestClass::Static => {
                self.serve_static(request, &route).await?
            }
        };
        Ok(Interception::Respond(response))
    }

    /// Wait for every outstanding background refresh.
    ///
    /// Nothing about the jobs' outcome is returned; it only guarantees they
    /// are no longer running.
    pub async fn settle(&self) {
        self.inner.tasks.settle().await;
    }

    pub fn pending_jobs(&self) -> usize {
        self.inner.tasks.pending()
    }

    fn lifecycle_mut(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve a possibly relative URL against the application origin.
    pub fn resolve(&self, url: &str) -> Result<Request, CacheError> {
        Request::get_relative(&self.inner.origin, url)
    }

    /// One network round trip under the configured timeout.
    pub(crate) async fn fetch_network(&self, request: &Request) -> Result<Response, FetchError> {
        let timeout = self.inner.config.fetch_timeout();
        match tokio::time::timeout(timeout, self.inner.fetcher.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.inner.config.fetch_timeout_secs)),
        }
    }

    /// Read an entry without creating the store. Store errors read as a miss.
    pub(crate) async fn cached(&self, store_name: &str, key: &RequestKey) -> Option<Response> {
        match self.read_entry(store_name, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(store = store_name, key = %key, error = %e, "Store read failed, treating as miss");
                None
            }
        }
    }

    async fn read_entry(
        &self,
        store_name: &str,
        key: &RequestKey,
    ) -> Result<Option<Response>, StoreError> {
        match self.inner.storage.lookup(store_name).await? {
            Some(store) => store.get(key).await,
            None => Ok(None),
        }
    }

    /// Persist a snapshot, creating the store if needed.
    pub(crate) async fn write_entry(
        &self,
        store_name: &str,
        key: RequestKey,
        response: &Response,
    ) -> Result<(), StoreError> {
        let store = self.inner.storage.open(store_name).await?;
        debug!(store = store.name(), key = %key, "Storing response");
        store.put(key, response.snapshot()).await
    }

    /// Persist a snapshot, then re-apply the bound if it went into the
    /// dynamic store.
    pub(crate) async fn store_response(
        &self,
        store_name: &str,
        key: RequestKey,
        response: &Response,
    ) -> Result<(), StoreError> {
        self.write_entry(store_name, key, response).await?;
        if store_name == self.inner.generation.dynamic_store() {
            trim(
                self.inner.storage.as_ref(),
                store_name,
                self.inner.config.max_dynamic_entries,
            )
            .await?;
        }
        Ok(())
    }

    /// Fetch and, on a 200, write through to `store_name`.
    ///
    /// A failed write is logged; the live response is still returned.
    pub(crate) async fn fetch_and_cache(
        &self,
        request: &Request,
        store_name: &str,
    ) -> Result<Response, FetchError> {
        let response = self.fetch_network(request).await?;
        if response.is_cacheable() {
            if let Err(e) = self.store_response(store_name, request.key(), &response).await {
                warn!(store = store_name, url = %request.url, error = %e, "Failed to cache response");
            }
        }
        Ok(response)
    }
}
