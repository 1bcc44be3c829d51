use crate::grant::responses;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures talking to the external OIDC provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout after {0:?} while calling the provider")]
    Timeout(std::time::Duration),
    #[error("HTTP {status} from provider: {body}")]
    Http { status: StatusCode, body: String },
    #[error("Provider rejected the request: {error}")]
    Rejected {
        error: String,
        description: Option<String>,
    },
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("identity_provider needs base_url, or domain and region")]
    MissingBaseUrl,
}

impl ProviderError {
    pub fn from_reqwest(err: reqwest::Error, timeout: std::time::Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_decode() {
            ProviderError::InvalidJson(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Error tokens a polling device receives from `/token`.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DeviceGrantError {
    #[error("authorization_pending")]
    AuthorizationPending,
    #[error("slow_down")]
    SlowDown,
    #[error("expired_token")]
    ExpiredToken,
    #[error("access_denied")]
    AccessDenied,
}

impl DeviceGrantError {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceGrantError::AuthorizationPending => "authorization_pending",
            DeviceGrantError::SlowDown => "slow_down",
            DeviceGrantError::ExpiredToken => "expired_token",
            DeviceGrantError::AccessDenied => "access_denied",
        }
    }
}

impl IntoResponse for DeviceGrantError {
    fn into_response(self) -> Response {
        responses::json_error(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_grant_errors_use_rfc8628_tokens() {
        assert_eq!(DeviceGrantError::SlowDown.to_string(), "slow_down");
        assert_eq!(DeviceGrantError::AccessDenied.as_str(), "access_denied");
        assert_eq!(
            DeviceGrantError::ExpiredToken.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
