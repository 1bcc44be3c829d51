//! OAuth 2.0 Device Authorization Grant broker.
//!
//! Issues device and user codes, lets an authenticated end user approve or deny
//! a device, runs the authorization code + PKCE login against an external OIDC
//! provider on the user's behalf, and hands the resulting tokens to the polling
//! device.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod cleanup;
pub mod clients;
pub mod codes;
pub mod config;
pub mod entity;
pub mod error;
pub mod grant;
pub mod identity;
pub mod provider;
pub mod store;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}
