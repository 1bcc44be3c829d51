//! Registration store for device authorization records.
//!
//! Every mutation is a single conditional statement against one row, so
//! concurrent requests and the cleanup sweeper coordinate through the database
//! alone. A conditional update that matches no row means another actor got
//! there first; callers treat that as a lost race, not as an error.

use crate::entity::device_authorization::{ActiveModel, Column, DeviceStatus, Entity, Model};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, sea_query::Expr,
};
use std::sync::Arc;
use time::OffsetDateTime;

/// Current wall clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Clone, Debug)]
pub struct RegistrationStore {
    db: Arc<DatabaseConnection>,
}

impl RegistrationStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    #[tracing::instrument(skip_all, fields(client_id = %record.client_id))]
    pub async fn insert(&self, record: &Model) -> Result<(), DbErr> {
        let active = ActiveModel {
            device_code: Set(record.device_code.clone()),
            user_code: Set(record.user_code.clone()),
            status: Set(record.status),
            client_id: Set(record.client_id.clone()),
            scope: Set(record.scope.clone()),
            max_expiry: Set(record.max_expiry),
            last_checked: Set(record.last_checked),
            authz_state: Set(record.authz_state.clone()),
            authz_verifier_code: Set(record.authz_verifier_code.clone()),
            authz_code: Set(record.authz_code.clone()),
            subject: Set(record.subject.clone()),
        };
        active.insert(self.connection()).await?;
        Ok(())
    }

    pub async fn get(&self, device_code: &str) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(device_code)
            .one(self.connection())
            .await
    }

    /// Whether a live (not yet expired) record already holds `user_code`.
    pub async fn user_code_in_use(&self, user_code: &str) -> Result<bool, DbErr> {
        let count = Entity::find()
            .filter(Column::UserCode.eq(user_code))
            .filter(Column::Status.ne(DeviceStatus::Expired))
            .count(self.connection())
            .await?;
        Ok(count > 0)
    }

    /// Resolve a user code to its live record. Zero or several matches yield `None`.
    pub async fn find_by_user_code(&self, user_code: &str) -> Result<Option<Model>, DbErr> {
        self.find_unique(
            Condition::all()
                .add(Column::UserCode.eq(user_code))
                .add(Column::Status.ne(DeviceStatus::Expired)),
        )
        .await
    }

    /// Resolve a provider callback `state`. Zero or several matches yield `None`.
    pub async fn find_by_state(&self, state: &str) -> Result<Option<Model>, DbErr> {
        self.find_unique(Condition::all().add(Column::AuthzState.eq(state)))
            .await
    }

    async fn find_unique(&self, condition: Condition) -> Result<Option<Model>, DbErr> {
        let mut rows = Entity::find()
            .filter(condition)
            .limit(2)
            .all(self.connection())
            .await?;
        if rows.len() == 1 {
            Ok(rows.pop())
        } else {
            if rows.len() > 1 {
                tracing::warn!("ambiguous device authorization lookup, refusing to pick one");
            }
            Ok(None)
        }
    }

    /// Idempotent; marking an expired record again is a no-op.
    pub async fn mark_expired(&self, device_code: &str) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(DeviceStatus::Expired))
            .filter(Column::DeviceCode.eq(device_code))
            .exec(self.connection())
            .await?;
        Ok(())
    }

    /// Record a poll only if the polling interval has elapsed since the last one.
    ///
    /// Returns `false` when the client polled too early (or the record vanished).
    pub async fn try_record_poll(
        &self,
        device_code: &str,
        now_ms: i64,
        interval_ms: i64,
    ) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::LastChecked, Expr::value(now_ms))
            .filter(Column::DeviceCode.eq(device_code))
            .filter(
                Condition::any()
                    .add(Column::LastChecked.is_null())
                    .add(Column::LastChecked.lt(now_ms - interval_ms)),
            )
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Unconditionally stamp `last_checked`, restarting the interval for an eager client.
    ///
    /// Returns `false` if the record no longer exists.
    pub async fn touch_poll(&self, device_code: &str, now_ms: i64) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::LastChecked, Expr::value(now_ms))
            .filter(Column::DeviceCode.eq(device_code))
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Move a pending record to `authorized` or `denied` on behalf of `subject`.
    ///
    /// Returns `false` if the record was no longer pending.
    pub async fn record_decision(
        &self,
        device_code: &str,
        decision: DeviceStatus,
        subject: &str,
    ) -> Result<bool, DbErr> {
        debug_assert!(matches!(
            decision,
            DeviceStatus::Authorized | DeviceStatus::Denied
        ));
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(decision))
            .col_expr(Column::Subject, Expr::value(subject))
            .filter(Column::DeviceCode.eq(device_code))
            .filter(Column::Status.eq(DeviceStatus::AuthorizationPending))
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Attach the PKCE verifier and `state` of the authorization code request
    /// about to be sent to the provider.
    pub async fn assign_authorization_request(
        &self,
        device_code: &str,
        state: &str,
        verifier: &str,
    ) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::AuthzState, Expr::value(state))
            .col_expr(Column::AuthzVerifierCode, Expr::value(verifier))
            .filter(Column::DeviceCode.eq(device_code))
            .filter(Column::Status.eq(DeviceStatus::Authorized))
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Store the provider's authorization code for the record bound to `state`.
    ///
    /// Consumes the state: it is cleared in the same statement, so a replayed
    /// callback finds nothing. Returns `false` if the state was already used.
    pub async fn store_authorization_code(
        &self,
        device_code: &str,
        state: &str,
        code: &str,
    ) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::AuthzCode, Expr::value(code))
            .col_expr(Column::AuthzState, Expr::value(Option::<String>::None))
            .filter(Column::DeviceCode.eq(device_code))
            .filter(Column::AuthzState.eq(state))
            .filter(Column::AuthzCode.is_null())
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Claim an authorized record for token issuance by expiring it.
    ///
    /// Exactly one caller gets `true`; the device code is single use from here on.
    pub async fn consume(&self, device_code: &str) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(DeviceStatus::Expired))
            .filter(Column::DeviceCode.eq(device_code))
            .filter(Column::Status.eq(DeviceStatus::Authorized))
            .filter(Column::AuthzCode.is_not_null())
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Records the sweeper may have to act on: already expired, or past their deadline.
    pub async fn scan_expired_candidates(&self, now_ms: i64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(
                Condition::any()
                    .add(Column::Status.eq(DeviceStatus::Expired))
                    .add(Column::MaxExpiry.lt(now_ms)),
            )
            .all(self.connection())
            .await
    }

    /// Delete the record if its deadline lies before `cutoff_ms`.
    pub async fn delete_if_past(
        &self,
        device_code: &str,
        cutoff_ms: i64,
    ) -> Result<bool, DbErr> {
        let result = Entity::delete_many()
            .filter(Column::DeviceCode.eq(device_code))
            .filter(Column::MaxExpiry.lt(cutoff_ms))
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Mark the record expired if it is past its deadline and not expired yet.
    pub async fn expire_if_past(&self, device_code: &str, now_ms: i64) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(DeviceStatus::Expired))
            .filter(Column::DeviceCode.eq(device_code))
            .filter(Column::Status.ne(DeviceStatus::Expired))
            .filter(Column::MaxExpiry.lt(now_ms))
            .exec(self.connection())
            .await?;
        Ok(result.rows_affected == 1)
    }
}
