//! `Fetcher` backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use super::Fetcher;
use crate::error::FetchError;
use crate::models::{Request, Response};

/// HTTP fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", request.method, e)))?;

        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // Read the full body before handing out a snapshot
        let body = response.bytes().await?.to_vec();
        debug!(url = %request.url, status, bytes = body.len(), "Fetched");

        Ok(Response {
            status,
            headers,
            body,
            cached_at: None,
        })
    }
}
