//! Directory of OAuth clients allowed to start a device grant.

use crate::config::ClientConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientAuthError {
    #[error("client_id is missing")]
    MissingClientId,
    #[error("unknown client '{0}'")]
    UnknownClient(String),
    #[error("authorization header is not valid HTTP Basic")]
    MalformedHeader,
    #[error("authorization header names a different client")]
    ClientMismatch,
    #[error("invalid client secret")]
    InvalidSecret,
    #[error("confidential client must authenticate")]
    SecretRequired,
}

#[derive(Clone, Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, ClientConfig>,
}

impl ClientRegistry {
    pub fn new(clients: &[ClientConfig]) -> Self {
        Self {
            clients: clients
                .iter()
                .map(|client| (client.id.clone(), client.clone()))
                .collect(),
        }
    }

    pub fn get(&self, client_id: &str) -> Option<&ClientConfig> {
        self.clients.get(client_id)
    }

    /// Authenticate a client, optionally with its raw `Authorization` header.
    ///
    /// A client registered with a secret must present matching HTTP Basic
    /// credentials. A public client may omit the header, but if it sends one the
    /// header must still name the same client.
    pub fn authenticate(
        &self,
        client_id: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<&ClientConfig, ClientAuthError> {
        let client_id = client_id
            .filter(|id| !id.is_empty())
            .ok_or(ClientAuthError::MissingClientId)?;
        let client = self
            .get(client_id)
            .ok_or_else(|| ClientAuthError::UnknownClient(client_id.to_string()))?;
        let registered_secret = client.secret.as_deref().filter(|s| !s.is_empty());

        let Some(header) = authorization else {
            return match registered_secret {
                Some(_) => Err(ClientAuthError::SecretRequired),
                None => Ok(client),
            };
        };

        let (header_id, header_secret) =
            parse_basic(header).ok_or(ClientAuthError::MalformedHeader)?;
        if header_id != client_id {
            return Err(ClientAuthError::ClientMismatch);
        }
        match registered_secret {
            Some(expected) if constant_time_eq(expected.as_bytes(), header_secret.as_bytes()) => {
                Ok(client)
            }
            _ => Err(ClientAuthError::InvalidSecret),
        }
    }
}

/// Split `Basic base64(id:secret)` into its parts.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let creds = String::from_utf8(decoded).ok()?;
    let (id, secret) = creds.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(&[
            ClientConfig {
                id: "tv-app".into(),
                secret: None,
                name: Some("Living room TV".into()),
            },
            ClientConfig {
                id: "cli".into(),
                secret: Some("s3cret".into()),
                name: None,
            },
        ])
    }

    fn basic(id: &str, secret: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
    }

    #[test]
    fn public_client_without_header() {
        let registry = registry();
        assert_eq!(registry.authenticate(Some("tv-app"), None).unwrap().id, "tv-app");
    }

    #[test]
    fn missing_or_unknown_client() {
        let registry = registry();
        assert_eq!(
            registry.authenticate(None, None),
            Err(ClientAuthError::MissingClientId)
        );
        assert_eq!(
            registry.authenticate(Some(""), None),
            Err(ClientAuthError::MissingClientId)
        );
        assert_eq!(
            registry.authenticate(Some("nope"), None),
            Err(ClientAuthError::UnknownClient("nope".into()))
        );
    }

    #[test]
    fn confidential_client_needs_matching_secret() {
        let registry = registry();
        assert_eq!(
            registry.authenticate(Some("cli"), None),
            Err(ClientAuthError::SecretRequired)
        );
        assert_eq!(
            registry.authenticate(Some("cli"), Some(&basic("cli", "wrong"))),
            Err(ClientAuthError::InvalidSecret)
        );
        assert_eq!(
            registry.authenticate(Some("cli"), Some(&basic("tv-app", "s3cret"))),
            Err(ClientAuthError::ClientMismatch)
        );
        assert!(
            registry
                .authenticate(Some("cli"), Some(&basic("cli", "s3cret")))
                .is_ok()
        );
    }

    #[test]
    fn public_client_cannot_use_secret() {
        let registry = registry();
        assert_eq!(
            registry.authenticate(Some("tv-app"), Some(&basic("tv-app", "anything"))),
            Err(ClientAuthError::InvalidSecret)
        );
    }

    #[test]
    fn rejects_non_basic_schemes() {
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
        assert_eq!(
            parse_basic(&basic("a", "b:c")),
            Some(("a".to_string(), "b:c".to_string()))
        );
    }
}
