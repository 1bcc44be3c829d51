use crate::clients::ClientRegistry;
use crate::config::{AppConfig, DeviceGrantConfig};
use crate::error::ProviderError;
use crate::provider::OidcProvider;
use crate::store::RegistrationStore;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Everything the grant handlers need, built once at startup and cloned per request.
#[derive(Clone)]
pub struct GrantState {
    pub store: RegistrationStore,
    pub provider: OidcProvider,
    pub clients: Arc<ClientRegistry>,
    pub settings: Arc<DeviceGrantConfig>,
    /// Absolute URL of the `/device` approval page.
    pub verification_uri: String,
}

impl GrantState {
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            store: RegistrationStore::new(db),
            provider: OidcProvider::from_config(config)?,
            clients: Arc::new(ClientRegistry::new(&config.clients)),
            settings: Arc::new(config.device_grant.clone()),
            verification_uri: config.verification_uri(),
        })
    }

    pub fn polling_interval_ms(&self) -> i64 {
        self.settings.polling_interval as i64 * 1000
    }

    pub fn code_expiration_ms(&self) -> i64 {
        self.settings.code_expiration as i64 * 1000
    }
}
