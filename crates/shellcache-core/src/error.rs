use thiserror::Error;

/// Failure of a single network fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(truncate_message(&err.to_string()))
    }
}

/// Failure reported by a persistent store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store document {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Engine-level failures that reach a host hook.
///
/// Refresh and retirement failures never show up here: they are absorbed and
/// only visible in the logs.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Shell bootstrap failed for {url}: {reason}")]
    Bootstrap { url: String, reason: String },

    #[error("No cached copy of {url} and the network fetch failed: {source}")]
    Serve {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Maximum length for error messages carried in errors
const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Truncate a message to avoid logging excessive data
fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_ERROR_MESSAGE_LENGTH {
        message.to_string()
    } else {
        let cut = (0..=MAX_ERROR_MESSAGE_LENGTH)
            .rev()
            .find(|&i| message.is_char_boundary(i))
            .unwrap_or(0);
        format!(
            "{}... (truncated, {} total bytes)",
            &message[..cut],
            message.len()
        )
    }
}
