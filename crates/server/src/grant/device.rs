//! `GET /device`: the end user's approval page.

use crate::codes::{Pkce, generate_state};
use crate::entity::device_authorization::{DeviceStatus, Model};
use crate::grant::{GRANT_TAG, GrantState, responses};
use crate::identity::{AuthenticatedUser, UpstreamIdentity};
use crate::store::now_millis;
use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Template)]
#[template(path = "device.html")]
struct DevicePage<'a> {
    username: &'a str,
    code: &'a str,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeviceQuery {
    /// The user code shown on the device.
    pub code: Option<String>,
    /// `true` to allow the device, `false` to deny it.
    pub authorize: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Allow,
    Deny,
}

impl Decision {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "true" => Some(Decision::Allow),
            "false" => Some(Decision::Deny),
            _ => None,
        }
    }
}

/// Approval page, and the target of its allow/deny buttons.
#[tracing::instrument(skip_all, fields(username = %identity.0.username))]
#[utoipa::path(
    get,
    path = "/device",
    tag = GRANT_TAG,
    operation_id = "Device Approval",
    summary = "Approve or deny a device",
    description = "Must be reached through the authenticating proxy, which injects the \
                   `x-amzn-oidc-accesstoken` and `x-amzn-oidc-data` headers.\n\n\
                   Without `code` and `authorize` this renders the approval form. With both, it \
                   records the decision; allowing redirects the browser to the identity provider.",
    params(DeviceQuery),
    responses(
        (status = 200, description = "Approval form, or denial acknowledged", body = String, content_type = "text/html"),
        (status = 302, description = "Redirect to the identity provider's authorize endpoint"),
        (status = 400, description = "User code expired or unknown, or the update failed", body = String, content_type = "text/html"),
        (status = 405, description = "Identity headers missing")
    )
)]
pub async fn device(
    State(state): State<GrantState>,
    identity: UpstreamIdentity,
    Query(query): Query<DeviceQuery>,
) -> Response {
    let UpstreamIdentity(user) = identity;
    let code = query.code.filter(|c| !c.is_empty());
    let authorize = query.authorize.filter(|a| !a.is_empty());

    match (code, authorize) {
        (Some(code), Some(authorize)) => decide(&state, &user, &code, &authorize).await,
        (code, _) => render_page(&user, code.as_deref().unwrap_or_default()),
    }
}

fn render_page(user: &AuthenticatedUser, code: &str) -> Response {
    let page = DevicePage {
        username: &user.username,
        code,
    };
    match page.render() {
        Ok(html) => responses::html(StatusCode::OK, html),
        Err(e) => {
            tracing::error!("Failed to render device template: {}", e);
            responses::html(StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}

async fn decide(
    state: &GrantState,
    user: &AuthenticatedUser,
    user_code: &str,
    authorize: &str,
) -> Response {
    let user_code = state.settings.user_code_format.normalize(user_code);
    let record = match state.store.find_by_user_code(&user_code).await {
        Ok(Some(record)) => record,
        Ok(None) => return responses::expired_page(),
        Err(e) => {
            tracing::error!(error = %e, "Store error while looking up user code");
            return responses::error_page();
        }
    };

    if record.status.is_terminal_for_user() {
        return responses::expired_page();
    }
    if record.is_expired_at(now_millis()) {
        if let Err(e) = state.store.mark_expired(&record.device_code).await {
            tracing::warn!(error = %e, "Failed to mark device authorization expired");
        }
        return responses::expired_page();
    }

    match Decision::parse(authorize) {
        Some(Decision::Allow) => allow(state, user, &record).await,
        Some(Decision::Deny) => deny(state, user, &record).await,
        None => {
            tracing::info!(authorize, "Unsupported authorization option");
            responses::error_page()
        }
    }
}

async fn deny(state: &GrantState, user: &AuthenticatedUser, record: &Model) -> Response {
    match state
        .store
        .record_decision(&record.device_code, DeviceStatus::Denied, &user.username)
        .await
    {
        Ok(true) => {
            tracing::info!(client_id = %record.client_id, "Device denied");
            responses::html(StatusCode::OK, responses::DENIED_PAGE)
        }
        Ok(false) => responses::expired_page(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to record denial");
            responses::error_page()
        }
    }
}

/// Record the approval, then start an authorization code + PKCE login at the provider.
async fn allow(state: &GrantState, user: &AuthenticatedUser, record: &Model) -> Response {
    match state
        .store
        .record_decision(&record.device_code, DeviceStatus::Authorized, &user.username)
        .await
    {
        Ok(true) => {}
        Ok(false) => return responses::expired_page(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to record approval");
            return responses::error_page();
        }
    }

    let pkce = Pkce::generate();
    let authz_state = generate_state();
    match state
        .store
        .assign_authorization_request(&record.device_code, &authz_state, &pkce.verifier)
        .await
    {
        Ok(true) => {}
        Ok(false) => return responses::error_page(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to store PKCE verifier");
            return responses::error_page();
        }
    }

    match state.provider.authorize_url(
        &record.client_id,
        &authz_state,
        &record.scope,
        &pkce.challenge,
    ) {
        Ok(url) => {
            tracing::info!(client_id = %record.client_id, "Device approved, redirecting to provider");
            responses::found(url.as_str())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to build authorize URL");
            responses::error_page()
        }
    }
}
