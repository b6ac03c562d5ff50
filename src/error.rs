//! Errors raised while talking to the Notion API.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Credential rejected or integration not shared with the resource.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Database or page id does not exist (or is invisible to the integration).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by Notion")]
    RateLimited { retry_after: Option<Duration> },

    /// Connectivity failure, timeout, 5xx or an edit conflict from the service.
    #[error("network error: {0}")]
    Network(String),

    /// A page returned by the store does not match the expected schema.
    #[error("malformed record {page_id}: {reason}")]
    Validation { page_id: String, reason: String },

    #[error("Notion API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl StoreError {
    pub fn validation(page_id: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            page_id: page_id.into(),
            reason: reason.into(),
        }
    }

    /// Errors worth retrying within the same run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited { .. } | StoreError::Network(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Auth(_) => "auth",
            StoreError::NotFound(_) => "not_found",
            StoreError::RateLimited { .. } => "rate_limited",
            StoreError::Network(_) => "network",
            StoreError::Validation { .. } => "validation",
            StoreError::Api { .. } => "api",
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_builder() {
            StoreError::Api {
                status: err.status().map(|s| s.as_u16()).unwrap_or_default(),
                code: if err.is_decode() {
                    "invalid_response".to_string()
                } else {
                    "invalid_request".to_string()
                },
                message: err.to_string(),
            }
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_and_network_are_transient() {
        assert!(StoreError::RateLimited { retry_after: None }.is_transient());
        assert!(StoreError::Network("reset".into()).is_transient());
        assert!(!StoreError::Auth("bad token".into()).is_transient());
        assert!(!StoreError::NotFound("db".into()).is_transient());
        assert!(!StoreError::validation("p1", "no date").is_transient());
        assert!(!StoreError::Api {
            status: 400,
            code: "validation_error".into(),
            message: "bad filter".into(),
        }
        .is_transient());
    }

    #[test]
    fn kinds_are_stable_labels() {
        assert_eq!(StoreError::Auth(String::new()).kind(), "auth");
        assert_eq!(
            StoreError::RateLimited { retry_after: None }.kind(),
            "rate_limited"
        );
    }
}
