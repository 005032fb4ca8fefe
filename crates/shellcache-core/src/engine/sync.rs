//! Opportunistic refresh on connectivity signals.

use tracing::{debug, info, warn};

use super::Engine;

impl Engine {
    /// Connectivity hook. Refreshes the well-known API resource when `tag`
    /// is the configured sync tag; other tags are ignored. Returns whether
    /// the signal was for this engine.
    ///
    /// Nobody waits on the outcome: failures are logged and the cached copy
    /// stays authoritative.
    pub async fn handle_sync(&self, tag: &str) -> bool {
        if tag != self.config().sync_tag {
            debug!(tag, "Ignoring sync signal");
            return false;
        }

        let request = match self.resolve(&self.config().sync_endpoint) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Invalid sync endpoint");
                return true;
            }
        };

        let store_name = self.generation().dynamic_store().to_string();
        match self.fetch_and_cache(&request, &store_name).await {
            Ok(response) if response.is_cacheable() => {
                info!(url = %request.url, "Background sync refreshed API cache");
            }
            Ok(response) => {
                warn!(url = %request.url, status = response.status, "Background sync got non-cacheable response");
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Background sync failed");
            }
        }
        true
    }
}
