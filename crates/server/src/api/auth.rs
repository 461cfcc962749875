//! Dual-mode bearer authentication.
//!
//! A bearer token is first read as an OAuth2 access token (audience + subject),
//! then as a local login token (numeric `uid` + `role`). Both kinds are signed
//! with the same secret, so a single verification feeds both readings.

use crate::entity::user::DEFAULT_ROLE;
use crate::error::ApiError;
use crate::oauth2::OAuth2State;
use crate::oauth2::codec::Claims;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const ROLE_ADMIN: &str = "admin";

/// How the request was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[serde(rename = "oauth2")]
    OAuth2,
    Local,
}

/// Identity attached to the request by [`require_auth`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthContext {
    pub user_id: i32,
    pub role: String,
    pub mode: AuthMode,
    /// Audience of an OAuth2 token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Fails with 403 `insufficient_role` unless the caller holds `role`.
    pub fn require_role(&self, role: &str) -> Result<(), ApiError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(ApiError::insufficient_role(role))
        }
    }
}

/// Read claims as an OAuth2 access token: audience and subject are required.
pub fn oauth2_identity(claims: &Claims) -> Option<AuthContext> {
    let client_id = claims.aud.as_deref().filter(|aud| !aud.is_empty())?;
    let user_id = claims
        .sub
        .as_deref()
        .and_then(|sub| sub.parse().ok())
        .or(claims.uid)?;
    Some(AuthContext {
        user_id,
        role: claims
            .role
            .clone()
            .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        mode: AuthMode::OAuth2,
        client_id: Some(client_id.to_string()),
        scopes: claims.scopes(),
    })
}

/// Read claims as a local login token: numeric `uid` and `role` are required.
pub fn local_identity(claims: &Claims) -> Option<AuthContext> {
    let user_id = claims.user_id()?;
    let role = claims.role.clone()?;
    Some(AuthContext {
        user_id,
        role,
        mode: AuthMode::Local,
        client_id: None,
        scopes: Vec::new(),
    })
}

/// Pull the raw token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(ApiError::authorization_header_required)?;
    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(ApiError::invalid_authorization_header_format)
}

/// Verify `token` and resolve the caller's identity.
pub async fn authenticate(state: &OAuth2State, token: &str) -> Result<AuthContext, ApiError> {
    let claims = state.codec.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        ApiError::invalid_token()
    })?;

    if claims.is_refresh_token() {
        tracing::debug!("Refresh token presented as bearer token");
        return Err(ApiError::invalid_token());
    }

    if let Some(context) = oauth2_identity(&claims) {
        let record = state.store.find_token(token).await.map_err(ApiError::from)?;
        if record.is_some_and(|r| r.is_revoked()) {
            tracing::debug!(client_id = ?context.client_id, "Revoked OAuth2 token presented");
            return Err(ApiError::invalid_token());
        }
        return Ok(context);
    }

    local_identity(&claims).ok_or_else(|| {
        tracing::debug!("Token carries neither an OAuth2 nor a local identity");
        ApiError::invalid_token()
    })
}

/// Middleware guarding protected routes.
///
/// On success the [`AuthContext`] is stored in the request extensions; on
/// failure no downstream handler runs.
pub async fn require_auth(
    State(state): State<OAuth2State>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?.to_owned();
    let context = authenticate(&state, &token).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Extractor for handlers behind [`require_auth`].
///
/// ```ignore
/// async fn handler(Authenticated(auth): Authenticated) -> impl IntoResponse {
///     format!("Hello, user {}", auth.user_id)
/// }
/// ```
pub struct Authenticated(pub AuthContext);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Absence means the route was mounted without the middleware
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(ApiError::authorization_header_required)
    }
}

/// Like [`Authenticated`], but only admits callers with the `admin` role.
pub struct AdminOnly(pub AuthContext);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(context) = Authenticated::from_request_parts(parts, state).await?;
        context.require_role(ROLE_ADMIN)?;
        Ok(AdminOnly(context))
    }
}
