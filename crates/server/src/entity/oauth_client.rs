//! OAuth2 Client entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Argon2 hash of the client secret; empty for public clients
    #[serde(skip_serializing)]
    pub secret: String,
    pub name: String,
    pub domain: String,
    /// Owning user
    pub user_id: i32,
    /// Space-separated list of allowed scopes
    pub scopes: String,
    /// Space-separated list of allowed grant types
    pub grant_types: String,
    pub redirect_uri: String,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    Owner,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Public clients have no secret and may only use the authorization code flow.
    pub fn is_public(&self) -> bool {
        self.secret.is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Parse scopes from space-separated string
    pub fn scopes_list(&self) -> Vec<String> {
        self.scopes.split_whitespace().map(String::from).collect()
    }

    /// Parse grant types from space-separated string
    pub fn grant_types_list(&self) -> Vec<String> {
        self.grant_types
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Exact match only, no prefix or wildcard logic.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        !self.redirect_uri.is_empty() && self.redirect_uri == uri
    }

    /// Keep the requested scopes this client is allowed to use.
    ///
    /// Falls back to all of the client's scopes when nothing was requested
    /// or none of the requested scopes are allowed.
    pub fn negotiate_scope(&self, requested: Option<&str>) -> String {
        let allowed = self.scopes_list();
        let validated: Vec<&str> = requested
            .unwrap_or_default()
            .split_whitespace()
            .filter(|s| allowed.iter().any(|a| a == s))
            .collect();
        if validated.is_empty() {
            self.scopes.clone()
        } else {
            validated.join(" ")
        }
    }
}
