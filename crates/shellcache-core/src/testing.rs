//! Test helpers: a scripted fetcher and pre-built engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::engine::{Engine, Interception};
use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::models::{Request, Response};
use crate::store::MemoryStorage;

pub(crate) fn test_config() -> EngineConfig {
    EngineConfig {
        origin: "https://app.example".to_string(),
        generation: "v1".to_string(),
        shell_urls: vec![
            "/".to_string(),
            "/index.html".to_string(),
            "https://cdn.tailwindcss.com".to_string(),
        ],
        max_dynamic_entries: 3,
        fetch_timeout_secs: 1,
        ..EngineConfig::default()
    }
}

/// Fetcher answering from a URL table. Unknown URLs are 404s.
#[derive(Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    hang: AtomicBool,
}

impl MockFetcher {
    /// Serves the test shell and the events API.
    pub fn with_shell() -> Self {
        let fetcher = Self::default();
        for url in [
            "https://app.example/",
            "https://app.example/index.html",
            "https://cdn.tailwindcss.com/",
        ] {
            let path = url.trim_start_matches("https://app.example");
            fetcher.set(url, 200, &format!("shell {}", path));
        }
        fetcher.set("https://app.example/functions/api/events", 200, r#"{"events":[1]}"#);
        fetcher
    }

    pub fn set(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::new(status, body));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every fetch stall forever.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_insert(0) += 1;

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network("offline".to_string()));
        }
        let response = self.routes.lock().unwrap().get(&url).cloned();
        Ok(response.unwrap_or_else(|| Response::new(404, "not found")))
    }
}

pub(crate) async fn installed_engine() -> (Engine, MemoryStorage, Arc<MockFetcher>) {
    let storage = MemoryStorage::new();
    let fetcher = Arc::new(MockFetcher::with_shell());
    let engine = Engine::new(test_config(), Arc::new(storage.clone()), fetcher.clone()).unwrap();
    engine.install().await.unwrap();
    (engine, storage, fetcher)
}

pub(crate) async fn activated_engine() -> (Engine, MemoryStorage, Arc<MockFetcher>) {
    let (engine, storage, fetcher) = installed_engine().await;
    engine.activate().await;
    (engine, storage, fetcher)
}

/// Run a request through the interception hook, expecting a response.
pub(crate) async fn respond(engine: &Engine, request: &Request) -> Response {
    match engine.handle_fetch(request).await.unwrap() {
        Interception::Respond(response) => response,
        Interception::Bypass => panic!("{} was not intercepted", request.url),
    }
}
