//! Shared request/response types used by API-facing crates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
}

impl HealthCheckResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error body returned by every failing route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Query for `GET /api/fs/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
    /// Falls back to the server's configured default when absent.
    #[serde(default)]
    pub show_hidden: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

/// Query carrying a single path, used by preview and download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: usize,
}

impl Default for RecentQuery {
    fn default() -> Self {
        Self {
            limit: default_recent_limit(),
        }
    }
}

fn default_recent_limit() -> usize {
    30
}

/// Query for `GET /api/fs/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub base_path: String,
    /// Glob pattern.
    pub pattern: String,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_recursive() -> bool {
    true
}

fn default_max_depth() -> usize {
    10
}

fn default_max_results() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeResponse {
    pub path: Option<String>,
}

/// Returned by preview when the file may not be shown inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewBlockedResponse {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub download_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_ok_payload() {
        let response = HealthCheckResponse::ok();
        assert_eq!(response.status, "ok");
        assert!(!response.version.is_empty());
    }

    #[test]
    fn error_response_round_trip_json() {
        let response = ErrorResponse {
            error: "resource missing".to_string(),
            code: "NOT_FOUND".to_string(),
        };

        let json = serde_json::to_string(&response).expect("serialize error response");
        let decoded: ErrorResponse =
            serde_json::from_str(&json).expect("deserialize error response");

        assert_eq!(decoded, response);
    }

    #[test]
    fn search_query_defaults() {
        let query: SearchQuery = serde_json::from_str(r#"{"base_path":".","pattern":"*.rs"}"#)
            .expect("deserialize search query");
        assert!(query.recursive);
        assert!(!query.include_hidden);
        assert_eq!(query.max_depth, 10);
        assert_eq!(query.max_results, 100);
    }
}
