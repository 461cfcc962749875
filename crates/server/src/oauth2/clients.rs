//! OAuth2 client registration endpoints.
//!
//! Clients belong to the user who registered them. The plaintext secret is
//! only ever returned by the create call.

use crate::api::auth::{Authenticated, require_auth};
use crate::entity::oauth_client;
use crate::error::ApiError;
use crate::oauth2::grant::{GRANT_AUTHORIZATION_CODE, GRANT_CLIENT_CREDENTIALS};
use crate::oauth2::password::{generate_token, hash_secret};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    middleware,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

const DEFAULT_SCOPES: &str = "read";

/// Creates the client registration router. Every route requires a bearer token.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_client, list_clients))
        .routes(routes!(delete_client))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateClientRequest {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    /// Exact redirect URI used by the authorization code flow
    #[serde(default)]
    pub redirect_uri: String,
    /// Space-separated scopes, defaults to "read"
    pub scopes: Option<String>,
    /// Space-separated grant types
    pub grant_types: Option<String>,
    /// Public clients get no secret and can only use the authorization code flow
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientInfo {
    pub client_id: String,
    pub name: String,
    pub domain: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub grant_types: String,
    pub public: bool,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

impl From<oauth_client::Model> for ClientInfo {
    fn from(client: oauth_client::Model) -> Self {
        Self {
            public: client.is_public(),
            client_id: client.id,
            name: client.name,
            domain: client.domain,
            redirect_uri: client.redirect_uri,
            scopes: client.scopes,
            grant_types: client.grant_types,
            created_at: client.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedClient {
    #[serde(flatten)]
    pub client: ClientInfo,
    /// Shown once, never retrievable again. Absent for public clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

fn normalize_grant_types(requested: Option<&str>, public: bool) -> Result<String, ApiError> {
    let default = if public {
        GRANT_AUTHORIZATION_CODE.to_string()
    } else {
        format!("{GRANT_AUTHORIZATION_CODE} {GRANT_CLIENT_CREDENTIALS}")
    };
    let Some(requested) = requested.filter(|r| !r.trim().is_empty()) else {
        return Ok(default);
    };

    let mut grant_types: Vec<&str> = Vec::new();
    for grant in requested.split_whitespace() {
        match grant {
            GRANT_AUTHORIZATION_CODE => {}
            GRANT_CLIENT_CREDENTIALS if public => {
                return Err(ApiError::bad_request(
                    "public clients cannot use client_credentials",
                ));
            }
            GRANT_CLIENT_CREDENTIALS => {}
            other => {
                return Err(ApiError::bad_request(format!(
                    "unsupported grant type: {other}"
                )));
            }
        }
        if !grant_types.contains(&grant) {
            grant_types.push(grant);
        }
    }
    Ok(grant_types.join(" "))
}

/// Register a new OAuth2 client owned by the caller.
#[tracing::instrument(skip(state, auth, request), fields(user_id = auth.user_id))]
#[utoipa::path(
    post,
    path = "/oauth/clients",
    tag = OAUTH2_TAG,
    operation_id = "Create OAuth2 Client",
    summary = "Register an OAuth2 client",
    description = "Creates a client owned by the authenticated user. The response carries the \
                   plaintext `client_secret`, which cannot be retrieved later.",
    request_body = CreateClientRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Client created", body = CreatedClient),
        (status = 400, description = "Invalid name, redirect URI or grant types", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
    )
)]
pub async fn create_client(
    State(state): State<OAuth2State>,
    Authenticated(auth): Authenticated,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<CreatedClient>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if !request.redirect_uri.is_empty() && Url::parse(&request.redirect_uri).is_err() {
        return Err(ApiError::bad_request("redirect_uri must be an absolute URL"));
    }
    let grant_types = normalize_grant_types(request.grant_types.as_deref(), request.public)?;
    let scopes = request
        .scopes
        .as_deref()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SCOPES.to_string());

    let (plain_secret, secret_hash) = if request.public {
        (None, String::new())
    } else {
        let secret = generate_token().map_err(|e| {
            tracing::error!(error = %e, "Failed to generate client secret");
            ApiError::server_error()
        })?;
        let hash = hash_secret(&secret).map_err(|e| {
            tracing::error!(error = %e, "Failed to hash client secret");
            ApiError::server_error()
        })?;
        (Some(secret), hash)
    };

    let now = OffsetDateTime::now_utc();
    let client = state
        .store
        .create_client(oauth_client::Model {
            id: uuid::Uuid::new_v4().to_string(),
            secret: secret_hash,
            name: name.to_string(),
            domain: request.domain,
            user_id: auth.user_id,
            scopes,
            grant_types,
            redirect_uri: request.redirect_uri,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::info!(client_id = %client.id, "OAuth2 client registered");
    Ok((
        StatusCode::CREATED,
        Json(CreatedClient {
            client: client.into(),
            client_secret: plain_secret,
        }),
    ))
}

/// List the caller's clients.
#[tracing::instrument(skip(state, auth), fields(user_id = auth.user_id))]
#[utoipa::path(
    get,
    path = "/oauth/clients",
    tag = OAUTH2_TAG,
    operation_id = "List OAuth2 Clients",
    summary = "List the caller's OAuth2 clients",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Clients owned by the caller", body = Vec<ClientInfo>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
    )
)]
pub async fn list_clients(
    State(state): State<OAuth2State>,
    Authenticated(auth): Authenticated,
) -> Result<Json<Vec<ClientInfo>>, ApiError> {
    let clients = state.store.list_clients(auth.user_id).await?;
    Ok(Json(clients.into_iter().map(ClientInfo::from).collect()))
}

/// Soft-delete one of the caller's clients.
#[tracing::instrument(skip(state, auth), fields(user_id = auth.user_id))]
#[utoipa::path(
    delete,
    path = "/oauth/clients/{id}",
    tag = OAUTH2_TAG,
    operation_id = "Delete OAuth2 Client",
    summary = "Delete an OAuth2 client",
    params(("id" = String, Path, description = "Client identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Client deleted"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "No such client owned by the caller", body = ApiError),
    )
)]
pub async fn delete_client(
    State(state): State<OAuth2State>,
    Authenticated(auth): Authenticated,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.soft_delete_client(&id, auth.user_id).await? {
        tracing::info!(client_id = %id, "OAuth2 client deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_type_defaults() {
        assert_eq!(
            normalize_grant_types(None, false).unwrap(),
            "authorization_code client_credentials"
        );
        assert_eq!(
            normalize_grant_types(Some("  "), true).unwrap(),
            "authorization_code"
        );
    }

    #[test]
    fn test_grant_type_validation() {
        assert_eq!(
            normalize_grant_types(Some("client_credentials client_credentials"), false).unwrap(),
            "client_credentials"
        );
        assert!(normalize_grant_types(Some("client_credentials"), true).is_err());
        assert!(normalize_grant_types(Some("password"), false).is_err());
    }
}
