use config::Config;
use device_grant_broker::config::{AppConfig, ConfigError, TokenSet};
use std::env;
use std::fs;

fn from_yaml(yaml: &str) -> Result<AppConfig, config::ConfigError> {
    Config::builder()
        .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
        .build()
        .expect("Failed to build config")
        .try_deserialize()
}

#[test]
fn test_minimal_config_uses_defaults() {
    let yaml_content = r##"
database_url: "sqlite::memory:"
verification_base_url: "https://device.example.com/"
identity_provider:
  domain: "tenant"
  region: "eu-west-1"
"##;

    let app_config = from_yaml(yaml_content).expect("Failed to deserialize app config");
    app_config.validate().expect("valid config");

    assert_eq!(app_config.listen_addr, "0.0.0.0:8080");
    assert_eq!(app_config.device_grant.code_expiration, 1800);
    assert_eq!(app_config.device_grant.polling_interval, 5);
    assert_eq!(app_config.device_grant.device_code_length, 64);
    assert_eq!(app_config.device_grant.user_code_length, 8);
    assert_eq!(app_config.device_grant.result_token_set, TokenSet::default());
    assert_eq!(app_config.identity_provider.request_timeout, 10);
    assert!(app_config.clients.is_empty());
    assert!(app_config.cleanup.enabled);
    assert_eq!(app_config.cleanup.interval, 3600);
    assert_eq!(app_config.cleanup.visibility_window, 1800);
    assert_eq!(
        app_config.verification_uri(),
        "https://device.example.com/device"
    );
    assert_eq!(
        app_config.callback_uri(),
        "https://device.example.com/callback"
    );
}

#[test]
fn test_full_config_deserialization() {
    let yaml_content = r##"
database_url: "postgres://localhost/devices"
listen_addr: "127.0.0.1:3000"
verification_base_url: "https://device.example.com"
device_grant:
  code_expiration: 600
  polling_interval: 10
  device_code_format: "digit+lowercase"
  user_code_length: 6
  user_code_format: "#B"
  result_token_set: "ID+ACCESS"
identity_provider:
  base_url: "https://login.example.com"
  identity_provider_hint: "Google"
clients:
  - id: "tv-app"
    name: "TV"
  - id: "cli"
    secret: "s3cret"
cleanup:
  enabled: false
"##;

    let app_config = from_yaml(yaml_content).expect("Failed to deserialize app config");
    app_config.validate().expect("valid config");

    let grant = &app_config.device_grant;
    assert_eq!(grant.code_expiration, 600);
    assert_eq!(grant.polling_interval, 10);
    assert_eq!(grant.device_code_format.alphabet().len(), 36);
    assert_eq!(grant.user_code_length, 6);
    assert_eq!(
        grant.result_token_set,
        TokenSet {
            id: true,
            access: true,
            refresh: false
        }
    );
    assert_eq!(
        app_config.identity_provider.resolved_base_url().as_deref(),
        Some("https://login.example.com")
    );
    assert_eq!(app_config.clients.len(), 2);
    assert_eq!(app_config.clients[1].secret.as_deref(), Some("s3cret"));
    assert!(!app_config.cleanup.enabled);
}

#[test]
fn test_invalid_formats_are_rejected() {
    let bad_format = r##"
database_url: "sqlite::memory:"
verification_base_url: "https://device.example.com"
device_grant:
  user_code_format: "#Q"
"##;
    assert!(from_yaml(bad_format).is_err());

    let bad_token_set = r##"
database_url: "sqlite::memory:"
verification_base_url: "https://device.example.com"
device_grant:
  result_token_set: "ACCESS+SESSION"
"##;
    assert!(from_yaml(bad_token_set).is_err());
}

#[test]
fn test_validation_failures() {
    let no_provider = r##"
database_url: "sqlite::memory:"
verification_base_url: "https://device.example.com"
"##;
    let app_config = from_yaml(no_provider).expect("deserializes");
    assert!(matches!(
        app_config.validate(),
        Err(ConfigError::Validation(_))
    ));

    let zero_interval = r##"
database_url: "sqlite::memory:"
verification_base_url: "https://device.example.com"
device_grant:
  polling_interval: 0
identity_provider:
  base_url: "https://login.example.com"
"##;
    let app_config = from_yaml(zero_interval).expect("deserializes");
    assert!(matches!(
        app_config.validate(),
        Err(ConfigError::Validation(_))
    ));

    let bad_base = r##"
database_url: "sqlite::memory:"
verification_base_url: "not a url"
identity_provider:
  base_url: "https://login.example.com"
"##;
    let app_config = from_yaml(bad_base).expect("deserializes");
    assert!(app_config.validate().is_err());
}

#[test]
fn test_config_partial_structure() {
    let invalid_yaml = r##"
listen_addr: "0.0.0.0:8080"
# Missing database_url and verification_base_url
"##;
    assert!(
        from_yaml(invalid_yaml).is_err(),
        "Should fail when required fields are missing"
    );
}

#[test]
fn test_config_with_environment_variables() {
    let temp_dir = env::temp_dir();
    let config_path = temp_dir.join("device_grant_test_config.yaml");
    let config_content = r##"
database_url: "postgres://file/test"
verification_base_url: "https://file.example.com"
device_grant:
  polling_interval: 5
identity_provider:
  base_url: "https://login.example.com"
"##;
    fs::write(&config_path, config_content).expect("Failed to write temp config");

    unsafe {
        env::set_var("DGBTEST__DATABASE_URL", "postgres://env/test");
        env::set_var("DGBTEST__DEVICE_GRANT__POLLING_INTERVAL", "15");

        let config = Config::builder()
            .add_source(config::File::from(config_path.clone()))
            .add_source(
                config::Environment::default()
                    .prefix("DGBTEST")
                    .separator("__"),
            )
            .build()
            .expect("Failed to build config");

        let app_config: AppConfig = config.try_deserialize().expect("Failed to deserialize");

        assert_eq!(app_config.database_url, "postgres://env/test");
        assert_eq!(app_config.device_grant.polling_interval, 15);
        assert_eq!(app_config.verification_base_url, "https://file.example.com");

        env::remove_var("DGBTEST__DATABASE_URL");
        env::remove_var("DGBTEST__DEVICE_GRANT__POLLING_INTERVAL");
        let _ = fs::remove_file(config_path);
    }
}
