//! Device authorization entity - one row per device grant attempt.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a device grant.
///
/// Transitions only move forward: `authorization_pending` to `authorized`,
/// `denied` or `expired`, and `authorized` to `expired` once tokens are issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[sea_orm(string_value = "authorization_pending")]
    AuthorizationPending,
    #[sea_orm(string_value = "authorized")]
    Authorized,
    #[sea_orm(string_value = "denied")]
    Denied,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl DeviceStatus {
    pub fn is_terminal_for_user(self) -> bool {
        !matches!(self, DeviceStatus::AuthorizationPending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device_authorization")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub device_code: String,
    pub user_code: String,
    pub status: DeviceStatus,
    pub client_id: String,
    pub scope: String,
    /// Absolute deadline, epoch milliseconds.
    pub max_expiry: i64,
    /// Last accepted or throttled poll, epoch milliseconds. `None` until the first poll.
    pub last_checked: Option<i64>,
    pub authz_state: Option<String>,
    pub authz_verifier_code: Option<String>,
    pub authz_code: Option<String>,
    pub subject: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Lazy expiry: a record past its deadline is expired whatever its stored status says.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.status == DeviceStatus::Expired || now_ms > self.max_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: DeviceStatus, max_expiry: i64) -> Model {
        Model {
            device_code: "dc".into(),
            user_code: "UC".into(),
            status,
            client_id: "client".into(),
            scope: "openid".into(),
            max_expiry,
            last_checked: None,
            authz_state: None,
            authz_verifier_code: None,
            authz_code: None,
            subject: None,
        }
    }

    #[test]
    fn past_deadline_is_expired_regardless_of_status() {
        assert!(record(DeviceStatus::AuthorizationPending, 1_000).is_expired_at(1_001));
        assert!(!record(DeviceStatus::AuthorizationPending, 1_000).is_expired_at(1_000));
        assert!(record(DeviceStatus::Expired, 5_000).is_expired_at(1_000));
    }

    #[test]
    fn only_pending_is_open_for_a_decision() {
        assert!(!DeviceStatus::AuthorizationPending.is_terminal_for_user());
        assert!(DeviceStatus::Authorized.is_terminal_for_user());
        assert!(DeviceStatus::Denied.is_terminal_for_user());
        assert!(DeviceStatus::Expired.is_terminal_for_user());
    }
}
