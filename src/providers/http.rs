//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use futures_util::StreamExt;

use crate::fallback::retry::parse_retry_after;
use crate::fallback::{ProviderError, Secret};

/// Default timeout for HTTP requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest media file a download will accept (25 MiB).
pub const MAX_DOWNLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Keywords that indicate a content policy violation in error messages.
const CONTENT_POLICY_KEYWORDS: &[&str] = &[
    "content policy",
    "policy violation",
    "inappropriate",
    "not allowed",
    "prohibited",
    "blocked",
    "unsafe",
    "violates",
    "moderation",
    "nsfw",
    "safety",
];

/// Words that tie a 403 to the credential rather than the input.
const CREDENTIAL_KEYWORDS: &[&str] = &["key", "token", "credential", "account", "auth"];

/// Check if an error message indicates a content policy violation.
pub fn is_content_policy_error(error_text: &str) -> bool {
    let lower = error_text.to_lowercase();
    CONTENT_POLICY_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

fn mentions_credential(message: &str) -> bool {
    let lower = message.to_lowercase();
    CREDENTIAL_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Build the HTTP client shared by all adapters.
pub fn build_client() -> Result<reqwest::Client, ProviderError> {
    let client = reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .user_agent(concat!("shorts-relay/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// The secret for a keyed provider, or an auth error when none was leased.
pub fn require_secret(secret: Option<&Secret>) -> Result<&str, ProviderError> {
    secret
        .map(Secret::expose)
        .ok_or_else(|| ProviderError::Unauthorized {
            status: 0,
            message: "no API key supplied".to_string(),
        })
}

/// Join a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Pass successful responses through; map error statuses onto
/// `ProviderError` variants.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    if code == 429 {
        let retry_after_secs = parse_retry_after(&response);
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Rate limit exceeded".to_string());
        log::warn!("Rate limited. Retry-After: {:?} seconds", retry_after_secs);
        return Err(ProviderError::RateLimit {
            message,
            retry_after_secs,
        });
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    let rejected = match code {
        400 | 422 => is_content_policy_error(&message),
        403 => is_content_policy_error(&message) && !mentions_credential(&message),
        _ => false,
    };
    if rejected {
        log::warn!("Request rejected by content policy: {}", message);
        return Err(ProviderError::ContentPolicy { message });
    }

    if matches!(code, 401 | 403) {
        return Err(ProviderError::Unauthorized {
            status: code,
            message,
        });
    }

    Err(ProviderError::Api {
        status: code,
        message,
    })
}

/// Read a response body into memory, refusing bodies over `max_bytes`.
pub async fn read_capped(
    response: reqwest::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, ProviderError> {
    if let Some(len) = response.content_length() {
        if len as usize > max_bytes {
            return Err(ProviderError::Malformed(format!(
                "body of {} bytes exceeds limit of {}",
                len, max_bytes
            )));
        }
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > max_bytes {
            return Err(ProviderError::Malformed(format!(
                "body exceeds limit of {} bytes",
                max_bytes
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Download a media file found through a search or generation API.
pub async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, ProviderError> {
    log::debug!("Downloading {}", url);
    let response = check_status(client.get(url).send().await?).await?;
    let bytes = read_capped(response, MAX_DOWNLOAD_BYTES).await?;
    if bytes.is_empty() {
        return Err(ProviderError::EmptyResult);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_policy_keywords() {
        assert!(is_content_policy_error("Prompt violates our Content Policy"));
        assert!(is_content_policy_error("NSFW content detected"));
        assert!(!is_content_policy_error("invalid voice id"));
    }

    #[test]
    fn test_mentions_credential() {
        assert!(mentions_credential("API key blocked"));
        assert!(mentions_credential("Account suspended"));
        assert!(!mentions_credential("Prompt blocked by safety system"));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://a.b/", "/v1/x"), "https://a.b/v1/x");
        assert_eq!(join_url("https://a.b", "v1/x"), "https://a.b/v1/x");
    }

    #[test]
    fn test_require_secret() {
        assert!(matches!(
            require_secret(None),
            Err(ProviderError::Unauthorized { .. })
        ));
        let s = Secret::new("k");
        assert_eq!(require_secret(Some(&s)).unwrap(), "k");
    }

    #[test]
    fn test_build_client() {
        assert!(build_client().is_ok());
    }
}
