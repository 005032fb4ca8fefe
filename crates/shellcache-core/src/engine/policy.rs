//! Retrieval policies.
//!
//! - Static and dynamic-asset requests: stale-while-revalidate. A hit is
//!   returned at once and refreshed in the background; a miss is fetched and
//!   written through. A miss with no network is a hard failure.
//! - API requests: cache-first with background revalidation. A miss with no
//!   network falls back to any stale copy, and finally to a synthesized
//!   offline response. It never fails.

use tracing::{debug, error, info};

use super::router::Route;
use super::Engine;
use crate::error::CacheError;
use crate::models::{Request, Response};

impl Engine {
    pub async fn serve_static(&self, request: &Request, route: &Route) -> Result<Response, CacheError> {
        let key = request.key();

        if let Some(cached) = self.cached(&route.store, &key).await {
            debug!(url = %request.url, store = %route.store, "Cache hit");
            self.refresh_in_background(request.clone(), route.store.clone());
            return Ok(cached);
        }

        debug!(url = %request.url, "Cache miss, fetching");
        self.fetch_and_cache(request, &route.store)
            .await
            .map_err(|source| {
                error!(url = %request.url, error = %source, "Fetch failed");
                CacheError::Serve {
                    url: request.url.to_string(),
                    source,
                }
            })
    }

    pub async fn serve_api(&self, request: &Request, route: &Route) -> Response {
        let key = request.key();

        if let Some(cached) = self.cached(&route.store, &key).await {
            debug!(url = %request.url, "Serving API response from cache");
            self.refresh_in_background(request.clone(), route.store.clone());
            return cached;
        }

        debug!(url = %request.url, "No cache, fetching API from network");
        match self.fetch_and_cache(request, &route.store).await {
            Ok(response) => response,
            Err(e) => {
                error!(url = %request.url, error = %e, "API fetch failed");
                // A concurrent request may have cached it meanwhile
                if let Some(stale) = self.cached(&route.store, &key).await {
                    info!(url = %request.url, "Returning stale API cache");
                    return stale;
                }
                Response::offline()
            }
        }
    }

    /// Detached refresh of one entry. The caller never waits on it and never
    /// learns how it went.
    pub(crate) fn refresh_in_background(&self, request: Request, store_name: String) {
        let engine = self.clone();
        self.inner.tasks.spawn(async move {
            match engine.fetch_and_cache(&request, &store_name).await {
                Ok(response) if response.is_cacheable() => {
                    debug!(url = %request.url, "Background cache update complete");
                }
                Ok(response) => {
                    debug!(url = %request.url, status = response.status, "Background update not cacheable");
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Background update failed (offline?)");
                }
            }
        });
    }
}
