//! Creates the device authorization table and its two lookup indexes.
//!
//! One row per device grant attempt, keyed by `device_code`. Secondary lookups
//! go through `user_code` (approval page) and `authz_state` (provider callback).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeviceAuthorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceAuthorization::DeviceCode)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::UserCode)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::Status)
                            .string()
                            .not_null()
                            .default("authorization_pending"),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::Scope)
                            .text()
                            .not_null()
                            .default("openid"),
                    )
                    // epoch milliseconds
                    .col(
                        ColumnDef::new(DeviceAuthorization::MaxExpiry)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::LastChecked)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::AuthzState)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::AuthzVerifierCode)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceAuthorization::AuthzCode)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(DeviceAuthorization::Subject).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_authorization_user_code")
                    .table(DeviceAuthorization::Table)
                    .col(DeviceAuthorization::UserCode)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_device_authorization_authz_state")
                    .table(DeviceAuthorization::Table)
                    .col(DeviceAuthorization::AuthzState)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // The sweeper scans by deadline.
        manager
            .create_index(
                Index::create()
                    .name("idx_device_authorization_max_expiry")
                    .table(DeviceAuthorization::Table)
                    .col(DeviceAuthorization::MaxExpiry)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(DeviceAuthorization::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum DeviceAuthorization {
    Table,
    DeviceCode,
    UserCode,
    Status,
    ClientId,
    Scope,
    MaxExpiry,
    LastChecked,
    AuthzState,
    AuthzVerifierCode,
    AuthzCode,
    Subject,
}
