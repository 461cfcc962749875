//! OAuth2 HTTP endpoints.
//!
//! - `GET /oauth/authorize` - authorization endpoint (front channel)
//! - `POST /oauth/token` - token endpoint
//! - `POST /oauth/revoke` - token revocation (RFC 7009)
//! - `GET /.well-known/oauth-authorization-server` - metadata document (RFC 8414)

use crate::api::auth::{AuthMode, authenticate, bearer_token};
use crate::error::{ErrorKind, ErrorResponse, OAuthError};
use crate::oauth2::code::PkceChallenge;
use crate::oauth2::grant::{
    GRANT_AUTHORIZATION_CODE, GRANT_CLIENT_CREDENTIALS, TokenRequest, TokenResponse,
};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{
        OriginalUri, Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(revoke))
        .routes(routes!(authorization_server_metadata))
        .with_state(state)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Only "code" is supported; defaults to "code" when omitted
    pub response_type: Option<String>,
    /// Missing or empty values are answered with `invalid_client`
    pub client_id: Option<String>,
    /// Must equal the client's registered redirect URI when present
    pub redirect_uri: Option<String>,
    /// Space-separated list of requested scopes
    pub scope: Option<String>,
    /// Opaque value echoed back on the redirect
    pub state: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE method: "S256" or "plain"
    pub code_challenge_method: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: String,
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

/// OAuth2 Authorization endpoint.
///
/// Resource owners prove who they are with a local login token. Without one
/// they are sent to the login page, which returns them here afterwards.
#[tracing::instrument(skip_all, fields(client_id))]
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Authorization code flow front channel",
    description = "Validates the client and redirect URI, then either redirects a logged-out \
                   resource owner to the login page (with a `return_to` parameter pointing back \
                   here) or issues an authorization code and redirects to the client's \
                   `redirect_uri` with `code` and `state`.",
    params(
        ("response_type" = Option<String>, Query, description = "Must be `code` when present."),
        ("client_id" = String, Query, description = "The client identifier issued during client registration."),
        ("redirect_uri" = Option<String>, Query, description = "Must exactly match the client's registered redirect URI."),
        ("scope" = Option<String>, Query, description = "Space-separated requested scopes. Unknown scopes are dropped."),
        ("state" = Option<String>, Query, description = "Opaque value returned unchanged in the redirect."),
        ("code_challenge" = Option<String>, Query, description = "PKCE code challenge."),
        ("code_challenge_method" = Option<String>, Query, description = "PKCE method, `S256` or `plain`."),
    ),
    security((), ("bearer_auth" = [])),
    responses(
        (status = 303, description = "Redirect to the login page or back to the client with a code"),
        (status = 400, description = "Missing or unknown client, mismatched redirect URI, unsupported response type or malformed query", body = ErrorResponse),
        (status = 500, description = "Store failure while authenticating the resource owner", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    params: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Malformed authorize query");
            return OAuthError::InvalidRequest("malformed authorization request").into_response();
        }
    };
    let Some(client_id) = params.client_id.as_deref().filter(|id| !id.is_empty()) else {
        return OAuthError::InvalidClient.into_response_with_status(StatusCode::BAD_REQUEST);
    };
    tracing::Span::current().record("client_id", client_id);

    let client = match state.store.find_client(client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => return OAuthError::InvalidClient.into_response_with_status(StatusCode::BAD_REQUEST),
        Err(e) => return OAuthError::from(e).into_response(),
    };

    let requested_redirect = params.redirect_uri.as_deref().unwrap_or_default();
    if !requested_redirect.is_empty() && !client.is_redirect_uri_allowed(requested_redirect) {
        return OAuthError::InvalidRedirectUri.into_response();
    }
    let redirect_uri = if requested_redirect.is_empty() {
        client.redirect_uri.clone()
    } else {
        requested_redirect.to_string()
    };
    let Ok(mut target) = Url::parse(&redirect_uri) else {
        return OAuthError::InvalidRedirectUri.into_response();
    };

    if params
        .response_type
        .as_deref()
        .is_some_and(|response_type| response_type != "code")
    {
        return OAuthError::UnsupportedResponseType.into_response();
    }

    let owner = match bearer_token(&headers) {
        Ok(token) => match authenticate(&state, token).await {
            Ok(context) => Some(context).filter(|context| context.mode == AuthMode::Local),
            Err(e) if e.kind() == ErrorKind::Internal => {
                tracing::error!(error = %e.error, "Could not authenticate resource owner");
                return OAuthError::Internal(e.error).into_response();
            }
            Err(e) => {
                tracing::debug!(error = %e.error, "Resource owner token not accepted");
                None
            }
        },
        Err(_) => None,
    };
    let Some(owner) = owner else {
        tracing::debug!("No logged-in resource owner, redirecting to login");
        let return_to = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        return Redirect::to(&login_redirect(&state.config.oauth2.login_url, return_to))
            .into_response();
    };

    let pkce = params.code_challenge.map(|challenge| PkceChallenge {
        challenge,
        method: params.code_challenge_method,
    });
    let code = match state
        .codes
        .issue(
            &client.id,
            owner.user_id,
            params.scope.as_deref(),
            requested_redirect,
            pkce,
        )
        .await
    {
        Ok(code) => code,
        Err(OAuthError::InvalidClient) => {
            return OAuthError::InvalidClient.into_response_with_status(StatusCode::BAD_REQUEST);
        }
        Err(e) => return e.into_response(),
    };

    {
        let mut query = target.query_pairs_mut();
        query.append_pair("code", &code);
        if let Some(client_state) = params.state.as_deref() {
            query.append_pair("state", client_state);
        }
    }

    tracing::info!(user_id = owner.user_id, "Authorization code issued");
    Redirect::to(target.as_str()).into_response()
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip_all, fields(grant_type))]
#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange client credentials or an authorization code for an access token",
    description = "**Supported grant types:**\n\
                   - `client_credentials`: requires `client_id` and `client_secret`\n\
                   - `authorization_code`: requires `code` and `client_id`, plus `client_secret` for confidential clients\n\n\
                   Client credentials may also be sent with HTTP Basic authentication.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid request, invalid grant, expired code or unsupported grant type", body = ErrorResponse),
        (status = 401, description = "Unknown client or bad client credentials", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let Form(mut params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Malformed token request");
            return OAuthError::InvalidRequest("malformed token request").into_response();
        }
    };
    tracing::Span::current().record("grant_type", params.grant_type.as_str());

    if let Some((client_id, client_secret)) = basic_client_credentials(&headers) {
        params.client_id = Some(client_id);
        params.client_secret = Some(client_secret);
    }

    match state.dispatcher.dispatch(params).await {
        Ok(response) => (
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
            Json(response),
        )
            .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Token request rejected");
            e.into_response()
        }
    }
}

/// Token revocation endpoint (RFC 7009).
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Marks the token revoked. Always answers 200, whether or not the token was known.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Body is not a form", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    params: Result<Form<RevokeRequest>, FormRejection>,
) -> Response {
    let Ok(Form(params)) = params else {
        return OAuthError::InvalidRequest("malformed revocation request").into_response();
    };
    if params.token.is_empty() {
        return StatusCode::OK.into_response();
    }

    match state.store.find_token(&params.token).await {
        Ok(Some(record)) if !record.is_revoked() => {
            if let Err(e) = state
                .store
                .revoke_token(&record.id, OffsetDateTime::now_utc())
                .await
            {
                tracing::error!(error = %e, "Failed to revoke token");
            } else {
                tracing::info!(client_id = %record.client_id, "Token revoked");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Store error during token revocation"),
    }

    StatusCode::OK.into_response()
}

/// Authorization server metadata (RFC 8414).
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Server Metadata",
    summary = "Authorization server metadata",
    responses(
        (status = 200, description = "Metadata document", body = AuthorizationServerMetadata),
    )
)]
pub async fn authorization_server_metadata(
    State(state): State<OAuth2State>,
) -> Json<AuthorizationServerMetadata> {
    let issuer = state.config.oauth2.issuer_url.trim_end_matches('/');
    Json(AuthorizationServerMetadata {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{issuer}/oauth/authorize"),
        token_endpoint: format!("{issuer}/oauth/token"),
        revocation_endpoint: format!("{issuer}/oauth/revoke"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            GRANT_AUTHORIZATION_CODE.to_string(),
            GRANT_CLIENT_CREDENTIALS.to_string(),
        ],
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
            "none".to_string(),
        ],
        code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
    })
}

/// `client_id:client_secret` from an HTTP Basic `Authorization` header.
fn basic_client_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    // RFC 6749 2.3.1: both parts are form-urlencoded before encoding
    let id = urlencoding::decode(id).ok()?.into_owned();
    let secret = urlencoding::decode(secret).ok()?.into_owned();
    Some((id, secret))
}

fn login_redirect(login_url: &str, return_to: &str) -> String {
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!(
        "{login_url}{separator}return_to={}",
        urlencoding::encode(return_to)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_basic_client_credentials() {
        let mut headers = HeaderMap::new();
        assert!(basic_client_credentials(&headers).is_none());

        let encoded = base64::engine::general_purpose::STANDARD.encode("c1:s%3A1");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        assert_eq!(
            basic_client_credentials(&headers),
            Some(("c1".to_string(), "s:1".to_string()))
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert!(basic_client_credentials(&headers).is_none());
    }

    #[test]
    fn test_login_redirect() {
        assert_eq!(
            login_redirect("/auth/login", "/oauth/authorize?client_id=c1&state=xyz"),
            "/auth/login?return_to=%2Foauth%2Fauthorize%3Fclient_id%3Dc1%26state%3Dxyz"
        );
        assert_eq!(
            login_redirect("https://login.example.com/?lang=en", "/x"),
            "https://login.example.com/?lang=en&return_to=%2Fx"
        );
    }
}
