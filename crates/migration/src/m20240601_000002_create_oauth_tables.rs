//! OAuth2 tables.
//!
//! - oauth_clients: registered API consumers (secret stored hashed, soft-deleted)
//! - oauth_authorization_codes: single-use codes, short-lived
//! - oauth_tokens: issued access/refresh tokens, kept for revocation

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OauthClients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthClients::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OauthClients::Secret)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(OauthClients::Name).string().not_null())
                    .col(
                        ColumnDef::new(OauthClients::Domain)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(OauthClients::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(OauthClients::Scopes)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OauthClients::GrantTypes)
                            .text()
                            .not_null()
                            .default("authorization_code client_credentials"),
                    )
                    .col(
                        ColumnDef::new(OauthClients::RedirectUri)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OauthClients::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OauthClients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthClients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OauthAuthorizationCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::UserId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::Scope)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::RedirectUri)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::CodeChallenge)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::CodeChallengeMethod)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorizationCodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OauthTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthTokens::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OauthTokens::ClientId).string().not_null())
                    .col(ColumnDef::new(OauthTokens::UserId).integer().null())
                    .col(
                        ColumnDef::new(OauthTokens::AccessToken)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::RefreshToken)
                            .text()
                            .null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::Scope)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::RefreshExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_clients_user_id")
                    .table(OauthClients::Table)
                    .col(OauthClients::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_authorization_codes_expires_at")
                    .table(OauthAuthorizationCodes::Table)
                    .col(OauthAuthorizationCodes::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_tokens_client_id")
                    .table(OauthTokens::Table)
                    .col(OauthTokens::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_oauth_tokens_client_id").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_authorization_codes_expires_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_oauth_clients_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(OauthTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthAuthorizationCodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthClients::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OauthClients {
    Table,
    Id,
    Secret,
    Name,
    Domain,
    UserId,
    Scopes,
    GrantTypes,
    RedirectUri,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OauthAuthorizationCodes {
    Table,
    Code,
    ClientId,
    UserId,
    Scope,
    RedirectUri,
    CodeChallenge,
    CodeChallengeMethod,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OauthTokens {
    Table,
    Id,
    ClientId,
    UserId,
    AccessToken,
    RefreshToken,
    Scope,
    ExpiresAt,
    RefreshExpiresAt,
    RevokedAt,
    CreatedAt,
    UpdatedAt,
}
