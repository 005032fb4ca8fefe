//! Request classification.
//!
//! Decides whether a request is intercepted at all, which retrieval policy
//! serves it and which store of the current generation holds it.

use regex::Regex;
use reqwest::Url;

use super::generation::Generation;
use crate::config::EngineConfig;
use crate::error::CacheError;
use crate::models::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Data endpoint: cache-first, always revalidated, stale fallback.
    Api,
    /// Webfonts and font hosts: bounded dynamic store.
    DynamicAsset,
    /// Everything else: shell store, stale-while-revalidate.
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub class: RequestClass,
    pub store: String,
}

pub struct Router {
    origin: String,
    allowed_prefixes: Vec<Url>,
    api_pattern: Regex,
    dynamic_patterns: Vec<Regex>,
}

impl Router {
    pub fn new(config: &EngineConfig) -> Result<Self, CacheError> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| CacheError::Config(format!("origin {}: {}", config.origin, e)))?
            .origin()
            .ascii_serialization();

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| CacheError::Config(format!("pattern {}: {}", pattern, e)))
        };

        Ok(Self {
            origin,
            allowed_prefixes: config
                .allowed_prefixes
                .iter()
                .map(|p| {
                    Url::parse(p)
                        .map_err(|e| CacheError::Config(format!("allowed prefix {}: {}", p, e)))
                })
                .collect::<Result<_, _>>()?,
            api_pattern: compile(&config.api_pattern)?,
            dynamic_patterns: config
                .dynamic_patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Same origin, or the origin of an allow-listed prefix with the request
    /// path at or below the prefix path.
    pub fn is_in_scope(&self, request: &Request) -> bool {
        request.origin() == self.origin
            || self.allowed_prefixes.iter().any(|prefix| {
                request.url.origin() == prefix.origin()
                    && path_is_under(request.url.path(), prefix.path())
            })
    }

    pub fn class_of(&self, request: &Request) -> RequestClass {
        if self.api_pattern.is_match(request.url.path()) {
            RequestClass::Api
        } else if self
            .dynamic_patterns
            .iter()
            .any(|p| p.is_match(request.url.as_str()))
        {
            RequestClass::DynamicAsset
        } else {
            RequestClass::Static
        }
    }

    /// `None` when the request is left to the network untouched.
    pub fn classify(&self, generation: &Generation, request: &Request) -> Option<Route> {
        if !self.is_in_scope(request) {
            return None;
        }
        let class = self.class_of(request);
        Some(Route {
            class,
            store: generation.store_for(class).to_string(),
        })
    }
}

/// `/lib` covers `/lib` and `/lib/x` but not `/library`.
fn path_is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
