use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status used for the synthesized offline API response.
const OFFLINE_STATUS: u16 = 503;

/// A complete response snapshot.
///
/// Responses are only ever built from a fully read body, so a stored entry can
/// never be partially written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Set when the snapshot is written into a store.
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            cached_at: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// The degraded answer for an API request with no network and no cached copy.
    pub fn offline() -> Self {
        let body = serde_json::json!({
            "error": "Offline - no cached data available",
            "offline": true,
        });
        Self::new(OFFLINE_STATUS, body.to_string()).with_header("Content-Type", "application/json")
    }

    /// Only plain 200 responses are stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }

    /// Copy stamped with the time it enters a store.
    pub(crate) fn snapshot(&self) -> Self {
        Self {
            cached_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Age of a stored snapshot in minutes, `None` for live responses.
    pub fn age_minutes(&self) -> Option<i64> {
        self.cached_at.map(|at| (Utc::now() - at).num_minutes().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_response() {
        let response = Response::offline();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body = response.json_body().unwrap();
        assert_eq!(body["offline"], serde_json::Value::Bool(true));
    }

    #[test]
    fn test_only_200_is_cacheable() {
        assert!(Response::new(200, "ok").is_cacheable());
        assert!(!Response::new(204, "").is_cacheable());
        assert!(!Response::new(404, "missing").is_cacheable());
    }

    #[test]
    fn test_snapshot_stamps_time() {
        let live = Response::new(200, "ok");
        assert_eq!(live.age_minutes(), None);
        let stored = live.snapshot();
        assert_eq!(stored.age_minutes(), Some(0));
        assert_eq!(stored.body, live.body);
    }
}
