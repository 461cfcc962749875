//! Fixtures shared by unit tests.

use crate::config::{AppConfig, JwtConfig, OAuth2Config};
use crate::entity::{oauth_client, user};
use crate::oauth2::password::hash_secret;
use crate::store::{CredentialStore, NewUser};
use time::OffsetDateTime;

pub const TEST_SECRET: &str = "test-secret-test-secret-test-secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        jwt: JwtConfig {
            secret: TEST_SECRET.into(),
            algorithm: "HS256".into(),
            access_token_lifetime: 3600,
            refresh_token_lifetime: 86400,
            login_token_lifetime: 3600,
        },
        oauth2: OAuth2Config::default(),
    }
}

pub async fn seed_user(store: &dyn CredentialStore, email: &str, role: &str) -> user::Model {
    store
        .create_user(NewUser {
            email: email.into(),
            password_hash: hash_secret("password").unwrap(),
            name: "Test User".into(),
            role: role.into(),
        })
        .await
        .unwrap()
}

/// `secret: None` registers a public client.
pub async fn seed_client(
    store: &dyn CredentialStore,
    id: &str,
    secret: Option<&str>,
    owner_id: i32,
    redirect_uri: &str,
) -> oauth_client::Model {
    let now = OffsetDateTime::now_utc();
    store
        .create_client(oauth_client::Model {
            id: id.into(),
            secret: secret.map(|s| hash_secret(s).unwrap()).unwrap_or_default(),
            name: format!("Client {id}"),
            domain: "app.example.com".into(),
            user_id: owner_id,
            scopes: "read write".into(),
            grant_types: "authorization_code client_credentials".into(),
            redirect_uri: redirect_uri.into(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap()
}
