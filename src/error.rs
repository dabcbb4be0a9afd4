//! Error types for docrag operations.
//!
//! [`Error`] is what every public registry, ingestion, and retrieval
//! operation returns. [`ProviderError`] carries the normalized failure
//! classes of remote and local provider calls.

use thiserror::Error;

/// Result alias for docrag operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, caught before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique-name collision on create
    #[error("{entity} '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    /// Store operation failed
    #[error("Database error: {0:#}")]
    Database(anyhow::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The Parser could not extract text from an upload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Upload extension outside the allow-list
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn duplicate(entity: &'static str, name: impl Into<String>) -> Self {
        Error::Duplicate {
            entity,
            name: name.into(),
        }
    }

    /// Short machine-readable code used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound { .. } => "not_found",
            Error::Duplicate { .. } => "duplicate",
            Error::Database(_) => "database",
            Error::Provider(e) => e.code(),
            Error::Parse(_) => "parse",
            Error::UnsupportedType(_) => "unsupported_type",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Database(err)
    }
}

/// Normalized outcome of a failed provider call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} requires an API key")]
    MissingCredential { provider: String },

    /// HTTP 401 (never includes key details)
    #[error("Invalid API key for {provider}")]
    InvalidCredential { provider: String },

    /// HTTP 403
    #[error("Access denied by {provider}: the key lacks permission")]
    AccessDenied { provider: String },

    /// HTTP 429
    #[error("Rate limited by {provider}, try again later")]
    RateLimited { provider: String },

    /// HTTP 5xx
    #[error("{provider} is unavailable (HTTP {status})")]
    Unavailable { provider: String, status: u16 },

    #[error("Connection to {provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// Socket or DNS failure
    #[error("Network error reaching {provider}: {message}. Check internet connection")]
    Network { provider: String, message: String },

    /// Any other non-2xx response
    #[error("{provider} error (HTTP {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// A response arrived but did not have the expected shape
    #[error("Unexpected response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::MissingCredential { .. } => "missing_credential",
            ProviderError::InvalidCredential { .. } => "invalid_credential",
            ProviderError::AccessDenied { .. } => "access_denied",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Unavailable { .. } => "provider_unavailable",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Network { .. } => "network",
            ProviderError::Api { .. } => "provider_error",
            ProviderError::InvalidResponse { .. } => "invalid_response",
            ProviderError::Unsupported { .. } => "unsupported",
        }
    }

    /// Map a non-2xx status (plus its already-extracted message) to a
    /// failure class.
    pub fn from_status(provider: &str, status: u16, message: String) -> Self {
        let provider = provider.to_string();
        match status {
            401 => ProviderError::InvalidCredential { provider },
            403 => ProviderError::AccessDenied { provider },
            429 => ProviderError::RateLimited { provider },
            500..=599 => ProviderError::Unavailable { provider, status },
            _ => ProviderError::Api {
                provider,
                status,
                message,
            },
        }
    }

    /// Classify a transport failure from `reqwest`.
    pub fn from_transport(provider: &str, err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: provider.to_string(),
                secs: timeout_secs,
            }
        } else if err.is_decode() {
            ProviderError::InvalidResponse {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else {
            ProviderError::Network {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let p = "openai";
        assert!(matches!(
            ProviderError::from_status(p, 401, String::new()),
            ProviderError::InvalidCredential { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(p, 403, String::new()),
            ProviderError::AccessDenied { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(p, 429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(p, 503, String::new()),
            ProviderError::Unavailable { status: 503, .. }
        ));
        match ProviderError::from_status(p, 404, "no such model".to_string()) {
            ProviderError::Api { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such model");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_message_is_distinct() {
        let timeout = ProviderError::Timeout {
            provider: "openai".to_string(),
            secs: 15,
        };
        let network = ProviderError::Network {
            provider: "openai".to_string(),
            message: "dns error".to_string(),
        };
        assert!(timeout.to_string().contains("timed out after 15s"));
        assert!(!timeout.to_string().contains("Check internet connection"));
        assert!(network.to_string().contains("Check internet connection"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::not_found("Provider", "x").code(), "not_found");
        assert_eq!(Error::duplicate("Collection", "x").code(), "duplicate");
        assert_eq!(
            Error::from(ProviderError::RateLimited {
                provider: "x".to_string()
            })
            .code(),
            "rate_limited"
        );
    }
}
