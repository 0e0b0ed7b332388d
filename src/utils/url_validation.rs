//! URL validation utilities for configured service endpoints
//!
//! Configuration mistakes here tend to surface minutes later as opaque
//! connection errors inside a live interview, so endpoints are checked
//! up front: they must parse, carry an allowed scheme, and name a host.

use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be one of {expected}, got: {actual}")]
    SchemeNotAllowed { expected: String, actual: String },

    #[error("URL must have a host")]
    MissingHost,
}

/// Validate a configured service endpoint URL
///
/// # Arguments
/// * `raw` - The URL string from configuration
/// * `allowed_schemes` - Accepted schemes, e.g. `&["ws", "wss"]`
pub fn validate_service_url(raw: &str, allowed_schemes: &[&str]) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw)?;

    if !allowed_schemes.contains(&url.scheme()) {
        return Err(UrlValidationError::SchemeNotAllowed {
            expected: allowed_schemes.join("/"),
            actual: url.scheme().to_string(),
        });
    }

    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}
