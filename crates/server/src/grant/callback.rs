//! `GET /callback`: the provider returns the authorization code here.

use crate::grant::{GRANT_TAG, GrantState, responses};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    /// Authorization code issued by the provider.
    pub code: Option<String>,
    /// The correlator sent with the authorize request.
    pub state: Option<String>,
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/callback",
    tag = GRANT_TAG,
    operation_id = "Provider Callback",
    summary = "Authorization code callback",
    description = "Binds the provider's authorization code to the device grant that started the \
                   login. Each `state` is accepted once.",
    params(CallbackQuery),
    responses(
        (status = 200, description = "Device authorized", body = String, content_type = "text/html"),
        (status = 400, description = "Unknown or already used state", body = String, content_type = "text/html"),
        (status = 405, description = "Missing code or state")
    )
)]
pub async fn callback(
    State(state): State<GrantState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let (Some(code), Some(authz_state)) = (
        query.code.filter(|c| !c.is_empty()),
        query.state.filter(|s| !s.is_empty()),
    ) else {
        tracing::info!("Call to /callback without code or state");
        return responses::empty(StatusCode::METHOD_NOT_ALLOWED);
    };

    let record = match state.store.find_by_state(&authz_state).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!("Callback state matches no pending authorization");
            return responses::error_page();
        }
        Err(e) => {
            tracing::error!(error = %e, "Store error while looking up callback state");
            return responses::error_page();
        }
    };

    match state
        .store
        .store_authorization_code(&record.device_code, &authz_state, &code)
        .await
    {
        Ok(true) => {
            tracing::info!(client_id = %record.client_id, "Authorization code received");
            responses::html(StatusCode::OK, responses::AUTHORIZED_PAGE)
        }
        Ok(false) => {
            tracing::warn!("Callback state was already used");
            responses::error_page()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to store authorization code");
            responses::error_page()
        }
    }
}
