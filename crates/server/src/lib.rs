//! A pizza catalogue service with its own OAuth2 authorization server.
//!
//! Callers authenticate either with a local login token or with an OAuth2
//! access token issued by this service; both are HMAC-signed JWTs sharing one
//! server-held secret.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}
