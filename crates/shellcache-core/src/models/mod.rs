//! Request and response models shared by the engine and host adapters.
//!
//! - `Request`, `RequestKey`: an intercepted request and its store identity
//! - `Response`: an immutable response snapshot, as fetched or as stored

pub mod request;
pub mod response;

pub use request::{Request, RequestKey};
pub use response::Response;
