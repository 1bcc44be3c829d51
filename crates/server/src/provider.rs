//! Client for the external OIDC provider's authorization code endpoints.

use crate::config::AppConfig;
use crate::error::ProviderError;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Token endpoint response. Every token is optional; which ones come back depends
/// on the scopes and the provider's client configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProviderTokens {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Parameters of an authorization code redemption.
#[derive(Debug)]
pub struct CodeExchange<'a> {
    pub client_id: &'a str,
    pub scope: &'a str,
    pub code: &'a str,
    pub code_verifier: &'a str,
    /// The polling client's own `Authorization` header, forwarded verbatim.
    pub authorization: Option<&'a str>,
}

#[derive(Clone, Debug)]
pub struct OidcProvider {
    http: reqwest::Client,
    base_url: String,
    redirect_uri: String,
    identity_provider_hint: Option<String>,
    timeout: Duration,
}

impl OidcProvider {
    pub fn new(
        base_url: impl Into<String>,
        redirect_uri: impl Into<String>,
        identity_provider_hint: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            redirect_uri: redirect_uri.into(),
            identity_provider_hint,
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let idp = &config.identity_provider;
        let base_url = idp
            .resolved_base_url()
            .ok_or(ProviderError::MissingBaseUrl)?;
        Self::new(
            base_url,
            config.callback_uri(),
            idp.identity_provider_hint.clone(),
            Duration::from_secs(idp.request_timeout.max(1)),
        )
    }

    /// Authorization code + PKCE request the end user's browser is sent to.
    pub fn authorize_url(
        &self,
        client_id: &str,
        state: &str,
        scope: &str,
        code_challenge: &str,
    ) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/oauth2/authorize", self.base_url))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("state", state)
                .append_pair("scope", scope)
                .append_pair("code_challenge_method", "S256")
                .append_pair("code_challenge", code_challenge);
            if let Some(hint) = &self.identity_provider_hint {
                query.append_pair("identity_provider", hint);
            }
        }
        Ok(url)
    }

    /// Redeem an authorization code at the provider's token endpoint.
    #[tracing::instrument(skip_all, fields(client_id = %exchange.client_id))]
    pub async fn exchange_code(
        &self,
        exchange: CodeExchange<'_>,
    ) -> Result<ProviderTokens, ProviderError> {
        let url = format!("{}/oauth2/token", self.base_url);
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", exchange.client_id),
            ("scope", exchange.scope),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", exchange.code),
            ("code_verifier", exchange.code_verifier),
        ];
        let mut request = self.http.post(&url).form(&form);
        if let Some(authorization) = exchange.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        if !status.is_success() {
            if let Ok(ProviderErrorBody {
                error: Some(error),
                error_description,
            }) = serde_json::from_str::<ProviderErrorBody>(&body)
            {
                return Err(ProviderError::Rejected {
                    error,
                    description: error_description,
                });
            }
            return Err(ProviderError::Http { status, body });
        }

        if let Ok(ProviderErrorBody {
            error: Some(error),
            error_description,
        }) = serde_json::from_str::<ProviderErrorBody>(&body)
        {
            return Err(ProviderError::Rejected {
                error,
                description: error_description,
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::InvalidJson(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn provider(hint: Option<&str>) -> OidcProvider {
        OidcProvider::new(
            "https://tenant.auth.eu-west-1.amazoncognito.com/",
            "https://device.example.com/callback",
            hint.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn missing_base_url_is_a_configuration_error() {
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: "127.0.0.1:0".into(),
            verification_base_url: "https://device.example.com".into(),
            device_grant: Default::default(),
            identity_provider: Default::default(),
            clients: Vec::new(),
            cleanup: Default::default(),
        };
        assert!(matches!(
            OidcProvider::from_config(&config),
            Err(ProviderError::MissingBaseUrl)
        ));
    }

    #[test]
    fn authorize_url_carries_pkce_parameters() {
        let url = provider(None)
            .authorize_url("tv-app", "st4te", "openid profile", "chall")
            .unwrap();
        assert_eq!(url.path(), "/oauth2/authorize");
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "tv-app");
        assert_eq!(query["redirect_uri"], "https://device.example.com/callback");
        assert_eq!(query["state"], "st4te");
        assert_eq!(query["scope"], "openid profile");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["code_challenge"], "chall");
        assert!(!query.contains_key("identity_provider"));
    }

    #[test]
    fn authorize_url_appends_identity_provider_hint() {
        let url = provider(Some("COGNITO"))
            .authorize_url("tv-app", "s", "openid", "c")
            .unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["identity_provider"], "COGNITO");
        assert!(url.as_str().contains("redirect_uri=https%3A%2F%2Fdevice.example.com%2Fcallback"));
    }
}
