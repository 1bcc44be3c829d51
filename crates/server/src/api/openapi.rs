//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::grant::GRANT_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Documents HTTP Basic client authentication on `/token`.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let basic = HttpBuilder::new()
                .scheme(HttpAuthScheme::Basic)
                .description(Some(
                    "Confidential clients send `client_id:client_secret` as HTTP Basic credentials.",
                ))
                .build();
            components.add_security_scheme("ClientBasic", SecurityScheme::Http(basic));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Device Grant Broker API",
        version = "1.0.0",
        description = "OAuth 2.0 Device Authorization Grant (RFC 8628) in front of an external OIDC provider."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = GRANT_TAG, description = "Device authorization grant endpoints")
    )
)]
pub struct ApiDoc;
