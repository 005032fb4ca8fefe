//! Network fetch capability.
//!
//! A `Fetcher` turns a `Request` into a complete `Response` snapshot or fails.
//! Non-200 statuses are successful fetches; the engine simply never stores
//! them.

pub mod http;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{Request, Response};

pub use http::HttpFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
