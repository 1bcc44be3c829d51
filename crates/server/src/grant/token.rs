//! `POST /token`: code issuance and device polling.

use crate::codes::random_string;
use crate::config::TokenSet;
use crate::entity::device_authorization::{DeviceStatus, Model};
use crate::error::DeviceGrantError;
use crate::grant::{DEFAULT_SCOPE, GRANT_TAG, GrantState, responses};
use crate::provider::{CodeExchange, ProviderTokens};
use crate::store::now_millis;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Attempts at drawing a user code no live record holds.
const USER_CODE_ATTEMPTS: usize = 5;

/// Parameters of `/token`, taken from the query string and/or a form body.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct TokenParams {
    /// Registered client identifier.
    pub client_id: Option<String>,
    /// Present when polling.
    pub device_code: Option<String>,
    /// Must be `urn:ietf:params:oauth:grant-type:device_code` when polling.
    pub grant_type: Option<String>,
    /// Requested scope; `openid` when omitted.
    pub scope: Option<String>,
}

impl TokenParams {
    /// Later pairs override earlier ones. Empty values are ignored, so they
    /// never clear a value given elsewhere.
    fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = TokenParams::default();
        for (key, value) in pairs {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "client_id" => &mut params.client_id,
                "device_code" => &mut params.device_code,
                "grant_type" => &mut params.grant_type,
                "scope" => &mut params.scope,
                _ => continue,
            };
            *slot = Some(value);
        }
        params
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    /// Minimum seconds between polls.
    pub interval: u64,
    /// Seconds until the codes expire.
    pub expires_in: u64,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Keep only the tokens the deployment hands out to devices.
    pub fn select(tokens: ProviderTokens, set: TokenSet) -> Self {
        Self {
            id_token: tokens.id_token.filter(|_| set.id),
            access_token: tokens.access_token.filter(|_| set.access),
            refresh_token: tokens.refresh_token.filter(|_| set.refresh),
            expires_in: tokens.expires_in,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GrantErrorBody {
    /// One of `authorization_pending`, `slow_down`, `expired_token`, `access_denied`
    pub error: String,
}

/// Token endpoint for the device authorization grant.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/token",
    tag = GRANT_TAG,
    operation_id = "Device Token",
    summary = "Issue device codes or poll for tokens",
    description = "Without `device_code` and `grant_type` this issues a new device/user code pair. \
                   With `device_code` and `grant_type=urn:ietf:params:oauth:grant-type:device_code` \
                   it polls the grant and returns tokens once the user has approved.\n\n\
                   Confidential clients authenticate with HTTP Basic.",
    params(TokenParams),
    request_body(content = TokenParams, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Codes issued, or tokens for an approved device", body = DeviceAuthorizationResponse),
        (status = 400, description = "Grant still pending, throttled, denied or expired", body = GrantErrorBody),
        (status = 401, description = "Unknown client or bad client credentials"),
        (status = 405, description = "Unsupported parameter combination")
    )
)]
pub async fn token(
    State(state): State<GrantState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    let params = if is_form {
        let form = url::form_urlencoded::parse(&body).into_owned();
        TokenParams::from_pairs(query.into_iter().chain(form))
    } else {
        TokenParams::from_pairs(query)
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let client_id = match state
        .clients
        .authenticate(params.client_id.as_deref(), authorization)
    {
        Ok(client) => client.id.clone(),
        Err(e) => {
            tracing::warn!(error = %e, "Client authentication failed on /token");
            return responses::empty(StatusCode::UNAUTHORIZED);
        }
    };

    match (params.device_code.as_deref(), params.grant_type.as_deref()) {
        (None, None) => issue_codes(&state, client_id, params.scope).await,
        (Some(device_code), Some(DEVICE_CODE_GRANT_TYPE)) => {
            poll(&state, &client_id, device_code, authorization).await
        }
        _ => {
            tracing::info!("POST /token with a valid client but missing device_code or grant_type");
            responses::empty(StatusCode::METHOD_NOT_ALLOWED)
        }
    }
}

#[tracing::instrument(skip(state, scope))]
async fn issue_codes(state: &GrantState, client_id: String, scope: Option<String>) -> Response {
    let settings = &state.settings;
    let user_code = match allocate_user_code(state).await {
        Ok(Some(code)) => code,
        Ok(None) => {
            tracing::error!("Could not draw an unused user code");
            return responses::empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(e) => {
            tracing::error!(error = %e, "Store error while allocating a user code");
            return responses::empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let device_code = random_string(settings.device_code_length, &settings.device_code_format);
    let scope = scope
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SCOPE.to_string());

    let record = Model {
        device_code,
        user_code,
        status: DeviceStatus::AuthorizationPending,
        client_id,
        scope,
        max_expiry: now_millis() + state.code_expiration_ms(),
        last_checked: None,
        authz_state: None,
        authz_verifier_code: None,
        authz_code: None,
        subject: None,
    };
    if let Err(e) = state.store.insert(&record).await {
        tracing::error!(error = %e, "Failed to store device authorization");
        return responses::empty(StatusCode::INTERNAL_SERVER_ERROR);
    }
    tracing::info!(client_id = %record.client_id, "Issued device authorization");

    let verification_uri_complete = match url::Url::parse(&state.verification_uri) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("code", &record.user_code);
            url.to_string()
        }
        Err(e) => {
            tracing::error!(error = %e, "verification_uri is not a valid URL");
            return responses::empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    responses::json(
        StatusCode::OK,
        &DeviceAuthorizationResponse {
            device_code: record.device_code,
            user_code: record.user_code,
            verification_uri: state.verification_uri.clone(),
            verification_uri_complete,
            interval: settings.polling_interval,
            expires_in: settings.code_expiration,
        },
    )
}

async fn allocate_user_code(state: &GrantState) -> Result<Option<String>, sea_orm::DbErr> {
    let settings = &state.settings;
    for _ in 0..USER_CODE_ATTEMPTS {
        let candidate = random_string(settings.user_code_length, &settings.user_code_format);
        if !state.store.user_code_in_use(&candidate).await? {
            return Ok(Some(candidate));
        }
        tracing::debug!("User code collision, drawing again");
    }
    Ok(None)
}

#[tracing::instrument(skip(state, device_code, authorization))]
async fn poll(
    state: &GrantState,
    client_id: &str,
    device_code: &str,
    authorization: Option<&str>,
) -> Response {
    let now = now_millis();
    let record = match state.store.get(device_code).await {
        Ok(Some(record)) => record,
        Ok(None) => return DeviceGrantError::ExpiredToken.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Store error while polling");
            return DeviceGrantError::ExpiredToken.into_response();
        }
    };

    if record.status == DeviceStatus::Expired {
        return DeviceGrantError::ExpiredToken.into_response();
    }
    if record.client_id != client_id {
        tracing::warn!(
            record_client = %record.client_id,
            "Device code presented by a different client"
        );
        return DeviceGrantError::ExpiredToken.into_response();
    }
    if record.is_expired_at(now) {
        if let Err(e) = state.store.mark_expired(device_code).await {
            tracing::warn!(error = %e, "Failed to mark device authorization expired");
        }
        return DeviceGrantError::ExpiredToken.into_response();
    }

    match state
        .store
        .try_record_poll(device_code, now, state.polling_interval_ms())
        .await
    {
        Ok(true) => {}
        Ok(false) => match state.store.touch_poll(device_code, now).await {
            Ok(true) => return DeviceGrantError::SlowDown.into_response(),
            Ok(false) => {
                tracing::info!("Device authorization removed while polling");
                return DeviceGrantError::ExpiredToken.into_response();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh last_checked");
                return DeviceGrantError::SlowDown.into_response();
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Store error while recording poll");
            return DeviceGrantError::ExpiredToken.into_response();
        }
    }

    match record.status {
        DeviceStatus::AuthorizationPending => DeviceGrantError::AuthorizationPending.into_response(),
        DeviceStatus::Denied => DeviceGrantError::AccessDenied.into_response(),
        DeviceStatus::Authorized => redeem(state, record, authorization).await,
        DeviceStatus::Expired => DeviceGrantError::ExpiredToken.into_response(),
    }
}

/// Exchange the stored authorization code for tokens. The record is claimed
/// first, so whatever the provider answers, the device code is spent.
async fn redeem(state: &GrantState, record: Model, authorization: Option<&str>) -> Response {
    let (Some(code), Some(verifier)) = (
        record.authz_code.as_deref(),
        record.authz_verifier_code.as_deref(),
    ) else {
        // Approved, but the provider has not called back yet.
        return DeviceGrantError::AuthorizationPending.into_response();
    };

    match state.store.consume(&record.device_code).await {
        Ok(true) => {}
        Ok(false) => return DeviceGrantError::ExpiredToken.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Store error while claiming device authorization");
            return DeviceGrantError::ExpiredToken.into_response();
        }
    }

    let exchange = CodeExchange {
        client_id: &record.client_id,
        scope: &record.scope,
        code,
        code_verifier: verifier,
        authorization,
    };
    match state.provider.exchange_code(exchange).await {
        Ok(tokens) => {
            tracing::info!(client_id = %record.client_id, "Issued tokens for device");
            responses::json(
                StatusCode::OK,
                &TokenResponse::select(tokens, state.settings.result_token_set),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Authorization code exchange failed");
            DeviceGrantError::ExpiredToken.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_values_override_query_values() {
        let params = TokenParams::from_pairs([
            ("client_id", "from-query"),
            ("scope", "openid"),
            ("client_id", "from-body"),
        ]);
        assert_eq!(params.client_id.as_deref(), Some("from-body"));
        assert_eq!(params.scope.as_deref(), Some("openid"));
        assert_eq!(params.device_code, None);
    }

    #[test]
    fn empty_values_are_absent() {
        let params = TokenParams::from_pairs([("device_code", ""), ("grant_type", "")]);
        assert_eq!(params.device_code, None);
        assert_eq!(params.grant_type, None);
    }

    #[test]
    fn empty_body_value_keeps_query_value() {
        let params = TokenParams::from_pairs([
            ("client_id", "tv-app"),
            ("scope", "openid profile"),
            ("client_id", ""),
            ("scope", ""),
        ]);
        assert_eq!(params.client_id.as_deref(), Some("tv-app"));
        assert_eq!(params.scope.as_deref(), Some("openid profile"));
    }

    #[test]
    fn token_set_filters_provider_tokens() {
        let tokens = ProviderTokens {
            id_token: Some("id".into()),
            access_token: Some("at".into()),
            refresh_token: Some("rt".into()),
            expires_in: Some(3600),
            token_type: Some("Bearer".into()),
        };
        let response = TokenResponse::select(tokens, TokenSet::default());
        assert_eq!(
            response,
            TokenResponse {
                id_token: None,
                access_token: Some("at".into()),
                refresh_token: Some("rt".into()),
                expires_in: Some(3600),
            }
        );
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("id_token").is_none());
    }
}
