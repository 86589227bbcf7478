//! Error taxonomy for provider calls and resolution.

use super::capability::Capability;
use super::request::{Attempt, Skip};

/// How a provider failure should affect the credential that was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 429 or an equivalent quota signal.
    RateLimited,
    /// Connection failures, timeouts, 5xx responses.
    Transient,
    /// The credential was refused.
    Auth,
    /// The provider refused this input (content policy, invalid input).
    Rejected,
    /// The provider answered but had nothing for this input.
    Empty,
    /// Anything else that will not fix itself: bad request, malformed
    /// response, missing local engine.
    Permanent,
}

impl ErrorKind {
    /// Transient failures may succeed later with the same credential.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Transient)
    }

    /// Input-specific failures say nothing about the credential.
    pub fn is_input_specific(&self) -> bool {
        matches!(self, ErrorKind::Rejected | ErrorKind::Empty)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::Transient => "transient",
            ErrorKind::Auth => "auth",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Empty => "empty",
            ErrorKind::Permanent => "permanent",
        };
        f.write_str(s)
    }
}

/// Error returned by a provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("Credential rejected ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Content policy violation: {message}")]
    ContentPolicy { message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider returned no usable result")]
    EmptyResult,

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request is not supported by this provider: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Classify this error for the failure policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Http(e) => {
                if super::retry::is_transient_network_error(e) {
                    ErrorKind::Transient
                } else if e.is_decode() {
                    ErrorKind::Permanent
                } else {
                    match e.status().map(|s| s.as_u16()) {
                        Some(429) => ErrorKind::RateLimited,
                        Some(401) | Some(403) => ErrorKind::Auth,
                        Some(s) if s >= 500 => ErrorKind::Transient,
                        Some(_) => ErrorKind::Permanent,
                        // Redirect loops, builder errors and the like
                        None => ErrorKind::Transient,
                    }
                }
            }
            ProviderError::RateLimit { .. } => ErrorKind::RateLimited,
            ProviderError::Unauthorized { .. } => ErrorKind::Auth,
            ProviderError::ContentPolicy { .. } => ErrorKind::Rejected,
            ProviderError::Api { status, .. } => {
                if *status >= 500 {
                    ErrorKind::Transient
                } else if *status == 422 {
                    ErrorKind::Rejected
                } else {
                    ErrorKind::Permanent
                }
            }
            ProviderError::EmptyResult => ErrorKind::Empty,
            ProviderError::Malformed(_) => ErrorKind::Permanent,
            ProviderError::Timeout { .. } => ErrorKind::Transient,
            ProviderError::Io(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ErrorKind::Permanent
                } else {
                    ErrorKind::Transient
                }
            }
            ProviderError::Unsupported(_) => ErrorKind::Rejected,
        }
    }

    /// Retry-After hint in seconds, when the provider sent one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimit {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Terminal failure of a resolve call.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no provider order configured for {0}")]
    NoChain(Capability),

    #[error("all {capability} providers exhausted ({} attempted, {} skipped)", attempts.len(), skipped.len())]
    Exhausted {
        capability: Capability,
        /// Failed invocations, in provider order
        attempts: Vec<Attempt>,
        /// Providers passed over without an invocation
        skipped: Vec<Skip>,
    },
}

impl ResolveError {
    /// Providers that were actually invoked, in order.
    pub fn attempted_providers(&self) -> Vec<&str> {
        match self {
            ResolveError::NoChain(_) => Vec::new(),
            ResolveError::Exhausted { attempts, .. } => {
                attempts.iter().map(|a| a.provider.as_str()).collect()
            }
        }
    }
}
