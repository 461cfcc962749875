//! Local account endpoints.
//!
//! - `POST /register` - Create an account
//! - `POST /login` - Exchange email and password for a local login token
//! - `GET /me` - Identity of the current bearer token
//!
//! Login tokens carry `uid`, `role`, `iat` and `exp` but no audience, which is
//! how the authentication middleware tells them apart from OAuth2 tokens.

use crate::api::auth::{AuthContext, Authenticated, require_auth};
use crate::entity::user::{self, DEFAULT_ROLE};
use crate::error::ApiError;
use crate::oauth2::OAuth2State;
use crate::oauth2::codec::Claims;
use crate::oauth2::password::{hash_secret, verify_secret};
use crate::store::{NewUser, StoreError};
use axum::{Json, extract::State, http::StatusCode, middleware};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const ACCOUNT_TAG: &str = "Accounts";

const MIN_PASSWORD_LENGTH: usize = 8;

/// Creates the account router. Mount under `/auth`.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(me))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .routes(routes!(register))
        .routes(routes!(login))
        .with_state(state)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

impl From<user::Model> for UserInfo {
    fn from(user: user::Model) -> Self {
        Self {
            role: user.effective_role().to_string(),
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create a local account with the default role.
#[tracing::instrument(skip(state, request))]
#[utoipa::path(
    post,
    path = "/register",
    tag = ACCOUNT_TAG,
    operation_id = "Register",
    summary = "Create a local account",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserInfo),
        (status = 400, description = "Invalid email or password too short", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError),
    )
)]
async fn register(
    State(state): State<OAuth2State>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserInfo>), ApiError> {
    let email = normalize_email(&request.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("a valid email is required"));
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let password_hash = hash_secret(&request.password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::server_error()
    })?;

    let user = state
        .store
        .create_user(NewUser {
            email,
            password_hash,
            name: request.name.trim().to_string(),
            role: DEFAULT_ROLE.to_string(),
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::conflict("email_taken"),
            other => ApiError::from(other),
        })?;

    tracing::info!(user_id = user.id, "Account registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Log in with email and password.
#[tracing::instrument(skip(state, request))]
#[utoipa::path(
    post,
    path = "/login",
    tag = ACCOUNT_TAG,
    operation_id = "Login",
    summary = "Obtain a local login token",
    description = "Returns a bearer token usable on every protected route and as the \
                   resource owner session for `/oauth/authorize`.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Unknown email, wrong password or inactive account", body = ApiError),
    )
)]
async fn login(
    State(state): State<OAuth2State>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .store
        .find_user_by_email(&normalize_email(&request.email))
        .await?
        .filter(|user| user.active && verify_secret(&user.password_hash, &request.password))
        .ok_or_else(|| {
            tracing::debug!("Login rejected");
            ApiError::invalid_credentials()
        })?;

    let lifetime = state.config.jwt.login_token_lifetime;
    let now = OffsetDateTime::now_utc();
    let claims = Claims {
        exp: (now + Duration::seconds(lifetime)).unix_timestamp(),
        iat: Some(now.unix_timestamp()),
        uid: Some(user.id),
        role: Some(user.effective_role().to_string()),
        ..Default::default()
    };
    let token = state.codec.sign(&claims).map_err(|e| {
        tracing::error!(error = %e, "Failed to sign login token");
        ApiError::server_error()
    })?;

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: lifetime,
    }))
}

/// Identity attached to the current request.
#[tracing::instrument(skip(auth), fields(user_id = auth.user_id))]
#[utoipa::path(
    get,
    path = "/me",
    tag = ACCOUNT_TAG,
    operation_id = "Current Identity",
    summary = "Show who the bearer token belongs to",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Identity and authentication mode", body = AuthContext),
        (status = 401, description = "Missing or invalid token", body = ApiError),
    )
)]
async fn me(Authenticated(auth): Authenticated) -> Json<AuthContext> {
    Json(auth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
