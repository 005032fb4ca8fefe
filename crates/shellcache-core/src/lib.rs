//! Shellcache core library.
//!
//! A client-side resource cache engine that sits between a web application
//! and the network. It serves requests from named persistent stores when it
//! can, keeps those stores fresh in the background, bounds the dynamic store
//! and retires older store generations on upgrade.
//!
//! Hosts plug in their capabilities through the `CacheStorage` and `Fetcher`
//! traits and drive the `Engine` from their lifecycle, interception, message
//! and connectivity hooks.

pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod models;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::{
    ControlMessage, Engine, Generation, Interception, Lifecycle, LifecycleState, MessageOutcome,
    MessageSource, RequestClass, Route,
};
pub use error::{CacheError, FetchError, StoreError};
pub use fetch::{Fetcher, HttpFetcher};
pub use models::{Request, RequestKey, Response};
pub use store::{CacheStorage, DiskStorage, MemoryStorage, Store};
