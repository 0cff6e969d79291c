use reqwest::{Response, StatusCode};
use thiserror::Error;

use crate::traits::Provider;

/// Errors from a tracker client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} credential unavailable or rejected")]
    Unauthenticated(Provider),

    #[error("rate limited by tracker (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Api { status: 404, .. })
    }
}

/// Map a non-success response onto the error taxonomy.
pub(crate) async fn check_response(
    provider: Provider,
    resp: Response,
) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            tracing::warn!(%provider, ?retry_after, "tracker rate limit hit");
            Err(ApiError::RateLimited { retry_after })
        }
        StatusCode::UNAUTHORIZED => {
            tracing::warn!(%provider, "tracker rejected credential");
            Err(ApiError::Unauthenticated(provider))
        }
        _ => {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%provider, status = status.as_u16(), "tracker API error");
            Err(ApiError::Api {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

/// Deserialize a JSON body, reporting shape mismatches as `Parse`.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: Provider,
    resp: Response,
) -> Result<T, ApiError> {
    resp.json::<T>().await.map_err(|e| {
        tracing::warn!(%provider, error = %e, "unexpected tracker payload");
        ApiError::Parse(e.to_string())
    })
}
