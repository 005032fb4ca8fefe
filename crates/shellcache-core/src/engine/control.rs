//! Control channel: commands from the owning application.
//!
//! Every message is authenticated first. Only a client of the application's
//! own origin may command the engine; anything else is dropped without a
//! reply and without touching any store.

use futures::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{trim, Engine, LifecycleState};
use crate::models::Request;

/// Command envelope, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Take over open clients now instead of waiting for them to reload.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    /// Fetch and store each URL into the dynamic store.
    #[serde(rename = "CACHE_URLS")]
    CacheUrls { urls: Vec<String> },
    /// Delete every store this engine owns.
    #[serde(rename = "CLEAR_CACHE")]
    ClearCache,
}

impl ControlMessage {
    /// `None` for unknown or malformed envelopes.
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Identity of the client that posted a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSource {
    pub client_id: String,
    /// URL of the document the client is showing.
    pub url: String,
}

impl MessageSource {
    fn origin(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .map(|url| url.origin().ascii_serialization())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Sender failed authentication.
    Rejected,
    /// Unknown or malformed command.
    Ignored,
    Handled,
}

impl Engine {
    /// Message hook.
    pub async fn handle_message(
        &self,
        data: &serde_json::Value,
        source: Option<&MessageSource>,
    ) -> MessageOutcome {
        let client = source.map_or("none", |s| s.client_id.as_str());
        if !self.is_trusted(source) {
            // Dropped silently: no reply to an untrusted sender
            debug!(client, "Rejected control message from untrusted sender");
            return MessageOutcome::Rejected;
        }

        let Some(message) = ControlMessage::parse(data) else {
            debug!(client, "Ignoring unrecognized control message");
            return MessageOutcome::Ignored;
        };
        info!(client, command = ?message, "Control message");

        match message {
            ControlMessage::SkipWaiting => self.force_activate().await,
            ControlMessage::CacheUrls { urls } => {
                self.preload_urls(&urls).await;
            }
            ControlMessage::ClearCache => {
                self.clear_all().await;
            }
        }
        MessageOutcome::Handled
    }

    fn is_trusted(&self, source: Option<&MessageSource>) -> bool {
        source
            .and_then(MessageSource::origin)
            .is_some_and(|origin| origin == self.router().origin())
    }

    /// Skip the handoff delay; a waiting install is activated right away.
    pub async fn force_activate(&self) {
        self.skip_waiting();
        if self.lifecycle().state == LifecycleState::Installed {
            self.activate().await;
        }
    }

    /// Fetch every URL and store the 200s into the dynamic store, then trim
    /// once. Returns how many were stored.
    pub async fn preload_urls(&self, urls: &[String]) -> usize {
        let store_name = self.generation().dynamic_store().to_string();

        let requests: Vec<Request> = urls
            .iter()
            .filter_map(|url| match self.resolve(url) {
                Ok(request) => Some(request),
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping preload URL");
                    None
                }
            })
            .collect();

        let results = join_all(requests.iter().map(|request| self.preload_one(request, &store_name))).await;
        let stored = results.into_iter().filter(|ok| *ok).count();

        if let Err(e) = trim(
            self.storage().as_ref(),
            &store_name,
            self.config().max_dynamic_entries,
        )
        .await
        {
            warn!(store = %store_name, error = %e, "Failed to trim after preload");
        }
        info!(requested = urls.len(), stored, "Preload complete");
        stored
    }

    async fn preload_one(&self, request: &Request, store_name: &str) -> bool {
        let response = match self.fetch_network(request).await {
            Ok(response) if response.is_cacheable() => response,
            Ok(response) => {
                warn!(url = %request.url, status = response.status, "Preload got non-cacheable response");
                return false;
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Preload fetch failed");
                return false;
            }
        };

        match self.write_entry(store_name, request.key(), &response).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Preload store failed");
                false
            }
        }
    }

    /// Delete every store of this engine's family, current generation
    /// included. Returns the names deleted.
    pub async fn clear_all(&self) -> Vec<String> {
        let names = match self.storage().names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list stores to clear");
                return Vec::new();
            }
        };

        let mut cleared = Vec::new();
        for name in names.into_iter().filter(|n| self.generation().owns(n)) {
            match self.storage().delete(&name).await {
                Ok(_) => cleared.push(name),
                Err(e) => warn!(store = %name, error = %e, "Failed to delete store"),
            }
        }
        info!(stores = cleared.len(), "Cleared all stores");
        cleared
    }
}
