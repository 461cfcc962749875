//! SeaORM-backed credential store.

use super::{CredentialStore, NewUser, StoreError};
use crate::entity::{oauth_authorization, oauth_client, oauth_token, user};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, sea_query::Expr,
};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
pub struct DatabaseStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for DatabaseStore {
    async fn find_user(&self, id: i32) -> Result<Option<user::Model>, StoreError> {
        Ok(user::Entity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<user::Model, StoreError> {
        let now = OffsetDateTime::now_utc();
        let user = user::ActiveModel {
            id: NotSet,
            email: Set(new_user.email),
            password_hash: Set(new_user.password_hash),
            name: Set(new_user.name),
            role: Set(new_user.role),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(user.insert(self.db.as_ref()).await?)
    }

    async fn update_user_role(&self, id: i32, role: &str) -> Result<bool, StoreError> {
        let result = user::Entity::update_many()
            .col_expr(user::Column::Role, Expr::value(role))
            .col_expr(user::Column::UpdatedAt, Expr::value(OffsetDateTime::now_utc()))
            .filter(user::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn find_client(&self, id: &str) -> Result<Option<oauth_client::Model>, StoreError> {
        Ok(oauth_client::Entity::find_by_id(id)
            .filter(oauth_client::Column::DeletedAt.is_null())
            .one(self.db.as_ref())
            .await?)
    }

    async fn create_client(
        &self,
        client: oauth_client::Model,
    ) -> Result<oauth_client::Model, StoreError> {
        let active = oauth_client::ActiveModel {
            id: Set(client.id),
            secret: Set(client.secret),
            name: Set(client.name),
            domain: Set(client.domain),
            user_id: Set(client.user_id),
            scopes: Set(client.scopes),
            grant_types: Set(client.grant_types),
            redirect_uri: Set(client.redirect_uri),
            deleted_at: Set(client.deleted_at),
            created_at: Set(client.created_at),
            updated_at: Set(client.updated_at),
        };
        Ok(active.insert(self.db.as_ref()).await?)
    }

    async fn list_clients(&self, owner_id: i32) -> Result<Vec<oauth_client::Model>, StoreError> {
        Ok(oauth_client::Entity::find()
            .filter(oauth_client::Column::UserId.eq(owner_id))
            .filter(oauth_client::Column::DeletedAt.is_null())
            .order_by_asc(oauth_client::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    async fn soft_delete_client(&self, id: &str, owner_id: i32) -> Result<bool, StoreError> {
        let now = OffsetDateTime::now_utc();
        let result = oauth_client::Entity::update_many()
            .col_expr(oauth_client::Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(oauth_client::Column::UpdatedAt, Expr::value(now))
            .filter(oauth_client::Column::Id.eq(id))
            .filter(oauth_client::Column::UserId.eq(owner_id))
            .filter(oauth_client::Column::DeletedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn insert_authorization_code(
        &self,
        code: oauth_authorization::Model,
    ) -> Result<(), StoreError> {
        let active = oauth_authorization::ActiveModel {
            code: Set(code.code),
            client_id: Set(code.client_id),
            user_id: Set(code.user_id),
            scope: Set(code.scope),
            redirect_uri: Set(code.redirect_uri),
            code_challenge: Set(code.code_challenge),
            code_challenge_method: Set(code.code_challenge_method),
            expires_at: Set(code.expires_at),
            created_at: Set(code.created_at),
        };
        active.insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn find_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<oauth_authorization::Model>, StoreError> {
        Ok(oauth_authorization::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?)
    }

    async fn consume_authorization_code(&self, code: &str) -> Result<bool, StoreError> {
        // A single DELETE is atomic; only one redeemer sees the row go away
        let result = oauth_authorization::Entity::delete_by_id(code)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn delete_expired_authorization_codes(
        &self,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let result = oauth_authorization::Entity::delete_many()
            .filter(oauth_authorization::Column::ExpiresAt.lt(now))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn insert_token(&self, token: oauth_token::Model) -> Result<(), StoreError> {
        let active = oauth_token::ActiveModel {
            id: Set(token.id),
            client_id: Set(token.client_id),
            user_id: Set(token.user_id),
            access_token: Set(token.access_token),
            refresh_token: Set(token.refresh_token),
            scope: Set(token.scope),
            expires_at: Set(token.expires_at),
            refresh_expires_at: Set(token.refresh_expires_at),
            revoked_at: Set(token.revoked_at),
            created_at: Set(token.created_at),
            updated_at: Set(token.updated_at),
        };
        active.insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn find_token(&self, token: &str) -> Result<Option<oauth_token::Model>, StoreError> {
        Ok(oauth_token::Entity::find()
            .filter(
                oauth_token::Column::AccessToken
                    .eq(token)
                    .or(oauth_token::Column::RefreshToken.eq(token)),
            )
            .one(self.db.as_ref())
            .await?)
    }

    async fn revoke_token(&self, id: &str, at: OffsetDateTime) -> Result<(), StoreError> {
        oauth_token::Entity::update_many()
            .col_expr(oauth_token::Column::RevokedAt, Expr::value(Some(at)))
            .col_expr(oauth_token::Column::UpdatedAt, Expr::value(at))
            .filter(oauth_token::Column::Id.eq(id))
            .filter(oauth_token::Column::RevokedAt.is_null())
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
