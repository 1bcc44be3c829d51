//! Device Authorization Grant endpoints.
//!
//! ## Endpoints
//!
//! - `POST /token` - issue a device/user code pair, or poll for tokens
//! - `GET /device` - end-user approval page and allow/deny decisions
//! - `GET /callback` - authorization code return from the OIDC provider
//!
//! The flow: a device obtains codes from `/token`, the user enters the user code
//! on `/device` and approves, the browser is sent through the provider's
//! authorization code + PKCE login, the provider returns to `/callback`, and the
//! device's next poll redeems the stored code for tokens.

pub mod callback;
pub mod device;
pub mod responses;
mod state;
pub mod token;

pub use state::GrantState;

use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for device grant endpoints
pub const GRANT_TAG: &str = "Device Grant";

/// Scope recorded when the client does not ask for one.
pub const DEFAULT_SCOPE: &str = "openid";

pub fn router(state: GrantState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(token::token))
        .routes(routes!(device::device))
        .routes(routes!(callback::callback))
        .with_state(state)
}
