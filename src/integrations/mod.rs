//! Clients for third-party HTTP APIs.
//!
//! Both clients share the same conventions: a `reqwest::Client` with a request
//! timeout, a [`CircuitBreaker`](crate::circuit_breaker::CircuitBreaker) in
//! front of every call, and provider status codes folded into [`ServiceError`].

use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::config::AppConfig;
use crate::errors::ServiceError;

pub mod ai;
pub mod stripe;

pub use ai::{AiClient, DocumentReader, ImageUpload};
pub use stripe::{PaymentIntent, StripeClient};

const USER_AGENT: &str = concat!("retailos-api/", env!("CARGO_PKG_VERSION"));

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ServiceError::InternalError(format!("failed to build HTTP client: {}", e)))
}

pub(crate) fn breaker_config(config: &AppConfig) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: config.circuit_breaker_failure_threshold,
        timeout: Duration::from_secs(config.circuit_breaker_timeout_secs),
        ..CircuitBreakerConfig::default()
    }
}

/// Maps a non-success provider response onto a service error.
///
/// 401 and 429 pass through so callers can tell a bad key or quota problem
/// apart from an outage; everything else is a bad gateway.
pub(crate) fn provider_error(provider: &str, status: StatusCode, body: &str) -> ServiceError {
    warn!(provider, status = status.as_u16(), "provider call failed");
    match status {
        StatusCode::UNAUTHORIZED => {
            ServiceError::Unauthorized(format!("{} rejected the configured API key", provider))
        }
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimitExceeded,
        s if s.is_client_error() => {
            ServiceError::BadRequest(format!("{} rejected the request: {}", provider, snippet(body)))
        }
        _ => ServiceError::ExternalServiceError(format!(
            "{} returned {}: {}",
            provider,
            status.as_u16(),
            snippet(body)
        )),
    }
}

/// Transport-level failures (timeouts, refused connections)
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::ExternalServiceError(format!("{} timed out", provider))
    } else {
        ServiceError::ExternalServiceError(format!("{} unreachable: {}", provider, err))
    }
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
