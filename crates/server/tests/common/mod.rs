//! Shared setup for the integration tests.
//!
//! Every test gets its own in-memory SQLite database, migrated with the
//! `migration` crate, behind the full application router.

#![allow(dead_code)]

use axum::http::HeaderValue;
use axum_test::TestServer;
use migration::{Migrator, MigratorTrait};
use pizza_server::{
    AppResources,
    api::build_router,
    config::{AppConfig, JwtConfig, OAuth2Config},
    entity::{oauth_client, user},
    oauth2::{OAuth2State, hash_secret},
    store::{CredentialStore, DatabaseStore, NewUser},
};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use time::OffsetDateTime;

pub const JWT_SECRET: &str = "integration-secret-integration-secret";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<DatabaseStore>,
    pub state: OAuth2State,
    pub db: Arc<DatabaseConnection>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        jwt: JwtConfig {
            secret: JWT_SECRET.into(),
            algorithm: "HS256".into(),
            access_token_lifetime: 3600,
            refresh_token_lifetime: 86400,
            login_token_lifetime: 3600,
        },
        oauth2: OAuth2Config {
            issuer_url: "http://localhost:8080".into(),
            ..OAuth2Config::default()
        },
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: AppConfig) -> TestApp {
    let db = Database::connect(&config.database_url)
        .await
        .expect("connect");
    Migrator::up(&db, None).await.expect("run migrations");

    let db = Arc::new(db);
    let config = Arc::new(config);
    let store = Arc::new(DatabaseStore::new(db.clone()));
    let state = OAuth2State::new(store.clone(), config.clone()).expect("oauth2 state");
    let resources = AppResources {
        db: db.clone(),
        config,
    };

    let server = TestServer::new(build_router(resources, state.clone())).expect("create test server");
    TestApp {
        server,
        store,
        state,
        db,
    }
}

pub async fn create_user(store: &DatabaseStore, email: &str, role: &str) -> user::Model {
    store
        .create_user(NewUser {
            email: email.into(),
            password_hash: hash_secret(PASSWORD).expect("hash password"),
            name: "Test User".into(),
            role: role.into(),
        })
        .await
        .expect("create user")
}

/// `secret: None` registers a public client.
pub async fn create_client(
    store: &DatabaseStore,
    id: &str,
    secret: Option<&str>,
    owner_id: i32,
) -> oauth_client::Model {
    let now = OffsetDateTime::now_utc();
    store
        .create_client(oauth_client::Model {
            id: id.into(),
            secret: secret
                .map(|s| hash_secret(s).expect("hash secret"))
                .unwrap_or_default(),
            name: format!("Client {id}"),
            domain: "app.example.com".into(),
            user_id: owner_id,
            scopes: "read write".into(),
            grant_types: "authorization_code client_credentials".into(),
            redirect_uri: REDIRECT_URI.into(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("create client")
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("header value")
}

/// Log in through the API and return the local login token.
pub async fn login(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/auth/login")
        .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["token"].as_str().expect("token").to_string()
}

/// Run the client_credentials grant and return the access token.
pub async fn client_credentials_token(server: &TestServer, id: &str, secret: &str) -> String {
    let response = server
        .post("/oauth/token")
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", id),
            ("client_secret", secret),
        ])
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["access_token"].as_str().expect("access_token").to_string()
}

/// Pull a query parameter out of a redirect `Location` header, which may be
/// relative.
pub fn query_param(location: &str, name: &str) -> Option<String> {
    let url = url::Url::parse("http://localhost").ok()?.join(location).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
