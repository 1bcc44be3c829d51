use crate::codes::{CharClass, CodeFormat};
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Device grant protocol knobs. All durations are in seconds.
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceGrantConfig {
    #[serde(default = "default_code_expiration")]
    pub code_expiration: u64,
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default = "default_device_code_length")]
    pub device_code_length: usize,
    #[serde(default = "default_device_code_format")]
    pub device_code_format: CodeFormat,
    #[serde(default = "default_user_code_length")]
    pub user_code_length: usize,
    #[serde(default = "default_user_code_format")]
    pub user_code_format: CodeFormat,
    #[serde(default)]
    pub result_token_set: TokenSet,
}

impl Default for DeviceGrantConfig {
    fn default() -> Self {
        Self {
            code_expiration: default_code_expiration(),
            polling_interval: default_polling_interval(),
            device_code_length: default_device_code_length(),
            device_code_format: default_device_code_format(),
            user_code_length: default_user_code_length(),
            user_code_format: default_user_code_format(),
            result_token_set: TokenSet::default(),
        }
    }
}

fn default_code_expiration() -> u64 {
    1800
}

fn default_polling_interval() -> u64 {
    5
}

fn default_device_code_length() -> usize {
    64
}

fn default_device_code_format() -> CodeFormat {
    CodeFormat::new(&[
        CharClass::Digits,
        CharClass::Lowercase,
        CharClass::Uppercase,
    ])
}

fn default_user_code_length() -> usize {
    8
}

fn default_user_code_format() -> CodeFormat {
    CodeFormat::new(&[CharClass::Digits, CharClass::UppercaseUnambiguous])
}

/// Where the external OIDC provider lives.
///
/// Either `base_url` is given directly, or it is derived from a Cognito style
/// `domain` + `region` pair.
#[derive(Clone, Debug, Deserialize)]
pub struct IdentityProviderConfig {
    pub base_url: Option<String>,
    pub domain: Option<String>,
    pub region: Option<String>,
    /// Appended as `identity_provider=` to the authorize redirect when set.
    pub identity_provider_hint: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            domain: None,
            region: None,
            identity_provider_hint: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl IdentityProviderConfig {
    pub fn resolved_base_url(&self) -> Option<String> {
        if let Some(url) = &self.base_url {
            return Some(url.trim_end_matches('/').to_string());
        }
        match (&self.domain, &self.region) {
            (Some(domain), Some(region)) => {
                Some(format!("https://{domain}.auth.{region}.amazoncognito.com"))
            }
            _ => None,
        }
    }
}

/// An OAuth client registered with the provider. A client with a secret is
/// confidential and must authenticate with HTTP Basic.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub id: String,
    pub secret: Option<String>,
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cleanup_interval")]
    pub interval: u64,
    /// How long an expired record stays queryable before it is deleted.
    #[serde(default = "default_visibility_window")]
    pub visibility_window: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
            interval: default_cleanup_interval(),
            visibility_window: default_visibility_window(),
        }
    }
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_visibility_window() -> u64 {
    1800
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Public base URL of this service, used for `/device` and `/callback` links.
    pub verification_base_url: String,
    #[serde(default)]
    pub device_grant: DeviceGrantConfig,
    #[serde(default)]
    pub identity_provider: IdentityProviderConfig,
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl AppConfig {
    pub fn verification_uri(&self) -> String {
        format!("{}/device", self.verification_base_url.trim_end_matches('/'))
    }

    /// The fixed redirect URI handed to the provider. It must be registered
    /// there as an allowed callback for every client in `clients`.
    pub fn callback_uri(&self) -> String {
        format!(
            "{}/callback",
            self.verification_base_url.trim_end_matches('/')
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let grant = &self.device_grant;
        if grant.code_expiration == 0 {
            return Err(ConfigError::Validation(
                "device_grant.code_expiration must be > 0".into(),
            ));
        }
        if grant.polling_interval == 0 {
            return Err(ConfigError::Validation(
                "device_grant.polling_interval must be > 0".into(),
            ));
        }
        if grant.device_code_length == 0 || grant.user_code_length == 0 {
            return Err(ConfigError::Validation(
                "device_grant code lengths must be > 0".into(),
            ));
        }
        if url::Url::parse(&self.verification_base_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "verification_base_url is not a valid URL: {}",
                self.verification_base_url
            )));
        }
        match self.identity_provider.resolved_base_url() {
            Some(base) if url::Url::parse(&base).is_ok() => {}
            Some(base) => {
                return Err(ConfigError::Validation(format!(
                    "identity_provider base URL is not a valid URL: {base}"
                )));
            }
            None => {
                return Err(ConfigError::Validation(
                    "identity_provider needs either base_url or domain + region".into(),
                ));
            }
        }
        if self.clients.iter().any(|c| c.id.is_empty()) {
            return Err(ConfigError::Validation("clients[].id must not be empty".into()));
        }
        Ok(())
    }
}

/// Which provider tokens are handed back to the device, e.g. `ID+ACCESS+REFRESH`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TokenSet {
    pub id: bool,
    pub access: bool,
    pub refresh: bool,
}

impl Default for TokenSet {
    fn default() -> Self {
        Self {
            id: false,
            access: true,
            refresh: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenSetError {
    #[error("unknown token type '{0}' (expected ID, ACCESS or REFRESH)")]
    Unknown(String),
    #[error("token set is empty")]
    Empty,
}

impl FromStr for TokenSet {
    type Err = TokenSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = TokenSet {
            id: false,
            access: false,
            refresh: false,
        };
        for part in s.split('+').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_ascii_uppercase().as_str() {
                "ID" => set.id = true,
                "ACCESS" => set.access = true,
                "REFRESH" => set.refresh = true,
                _ => return Err(TokenSetError::Unknown(part.to_string())),
            }
        }
        if !(set.id || set.access || set.refresh) {
            return Err(TokenSetError::Empty);
        }
        Ok(set)
    }
}

impl TryFrom<String> for TokenSet {
    type Error = TokenSetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any variable matching the key path separated by double underscores
/// (e.g. `DEVICE_GRANT__POLLING_INTERVAL`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
