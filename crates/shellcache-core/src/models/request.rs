use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// An outbound request seen by the interception hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
}

impl Request {
    pub fn new(method: &str, url: &str) -> Result<Self, CacheError> {
        let url = Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self {
            method: method.to_ascii_uppercase(),
            url,
        })
    }

    pub fn get(url: &str) -> Result<Self, CacheError> {
        Self::new("GET", url)
    }

    /// Build a GET request, resolving `url` against `base` when it is relative.
    pub fn get_relative(base: &Url, url: &str) -> Result<Self, CacheError> {
        let url = base
            .join(url)
            .map_err(|e| CacheError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self {
            method: "GET".to_string(),
            url,
        })
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// `scheme://host[:port]` of the request URL.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Identity of a store entry: method plus normalized URL.
///
/// Two requests with equal keys collide in a store, and the later write wins.
/// Normalization drops the fragment and relies on `Url` serialization for
/// scheme/host case, default ports and the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
