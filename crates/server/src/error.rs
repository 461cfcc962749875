//! Error vocabulary shared by the OAuth2 server, the auth middleware and the
//! REST endpoints.
//!
//! Every failure is classified into an [`ErrorKind`] and rendered as a fixed
//! JSON body. Internal causes are logged, never returned.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::oauth2::codec::TokenError;
use crate::store::StoreError;

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unauthenticated request
    Client,
    /// Unknown entity
    NotFound,
    /// Duplicate unique key
    Conflict,
    /// Code or token past validity
    Expired,
    /// Store or signing failure
    Internal,
}

/// Errors produced by the OAuth2 token and authorize flows.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("unknown client or bad client credentials")]
    InvalidClient,
    #[error("redirect_uri does not match the registered one")]
    InvalidRedirectUri,
    #[error("invalid grant: {0}")]
    InvalidGrant(&'static str),
    #[error("authorization code expired")]
    CodeExpired,
    #[error("unsupported grant type")]
    UnsupportedGrantType,
    #[error("unsupported response type")]
    UnsupportedResponseType,
    #[error("no subject available for token")]
    MissingSubject,
    #[error("user {0} does not exist")]
    UnknownUser(i32),
    #[error("internal error: {0}")]
    Internal(String),
}

impl OAuthError {
    /// The RFC 6749 style error code sent to the client.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidRedirectUri => "invalid_redirect_uri",
            OAuthError::InvalidGrant(_) | OAuthError::MissingSubject | OAuthError::UnknownUser(_) => {
                "invalid_grant"
            }
            OAuthError::CodeExpired => "code_expired",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::Internal(_) => "server_error",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OAuthError::UnknownUser(_) => ErrorKind::NotFound,
            OAuthError::CodeExpired => ErrorKind::Expired,
            OAuthError::Internal(_) => ErrorKind::Internal,
            _ => ErrorKind::Client,
        }
    }

    /// Status code used by the token endpoint.
    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Render with an explicit status; the body is always `{"error": <code>}`.
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        if let OAuthError::Internal(ref cause) = self {
            tracing::error!(error = %cause, "OAuth2 request failed");
        }
        (status, Json(ErrorResponse::new(self.error_code()))).into_response()
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        self.into_response_with_status(status)
    }
}

impl From<StoreError> for OAuthError {
    fn from(e: StoreError) -> Self {
        OAuthError::Internal(e.to_string())
    }
}

impl From<TokenError> for OAuthError {
    fn from(e: TokenError) -> Self {
        OAuthError::Internal(e.to_string())
    }
}

/// Body of every OAuth2 error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Error type for the REST surface and the authentication middleware.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code (e.g., "invalid_token", "not_found")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ApiError {
    fn code(error: &str) -> Self {
        Self {
            error: error.to_string(),
            error_description: None,
        }
    }

    pub fn authorization_header_required() -> Self {
        Self::code("authorization_header_required")
    }

    pub fn invalid_authorization_header_format() -> Self {
        Self::code("invalid_authorization_header_format")
    }

    pub fn invalid_token() -> Self {
        Self::code("invalid_token")
    }

    pub fn invalid_credentials() -> Self {
        Self::code("invalid_credentials")
    }

    pub fn insufficient_role(required_role: &str) -> Self {
        Self {
            error: "insufficient_role".to_string(),
            error_description: Some(format!("Requires the '{required_role}' role")),
        }
    }

    pub fn not_found() -> Self {
        Self::code("not_found")
    }

    pub fn conflict(error: &str) -> Self {
        Self::code(error)
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self {
            error: "bad_request".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn server_error() -> Self {
        Self::code("server_error")
    }

    pub fn kind(&self) -> ErrorKind {
        match self.error.as_str() {
            "not_found" => ErrorKind::NotFound,
            "email_taken" | "name_taken" | "conflict" => ErrorKind::Conflict,
            "server_error" => ErrorKind::Internal,
            _ => ErrorKind::Client,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "authorization_header_required"
            | "invalid_authorization_header_format"
            | "invalid_token"
            | "invalid_credentials" => StatusCode::UNAUTHORIZED,
            "insufficient_role" => StatusCode::FORBIDDEN,
            "bad_request" => StatusCode::BAD_REQUEST,
            _ => match self.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Client | ErrorKind::Expired => StatusCode::BAD_REQUEST,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => ApiError::conflict("conflict"),
            StoreError::Database(cause) => {
                tracing::error!(error = %cause, "Store operation failed");
                ApiError::server_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_statuses() {
        assert_eq!(OAuthError::InvalidClient.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            OAuthError::InvalidGrant("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(OAuthError::CodeExpired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OAuthError::UnsupportedGrantType.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OAuthError::Internal("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_oauth_error_codes_and_kinds() {
        assert_eq!(OAuthError::CodeExpired.error_code(), "code_expired");
        assert_eq!(OAuthError::CodeExpired.kind(), ErrorKind::Expired);
        assert_eq!(OAuthError::UnknownUser(7).error_code(), "invalid_grant");
        assert_eq!(OAuthError::UnknownUser(7).kind(), ErrorKind::NotFound);
        assert_eq!(
            OAuthError::InvalidRedirectUri.error_code(),
            "invalid_redirect_uri"
        );
        assert_eq!(
            OAuthError::Internal("secret detail".into()).error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (ApiError::authorization_header_required(), StatusCode::UNAUTHORIZED),
            (
                ApiError::invalid_authorization_header_format(),
                StatusCode::UNAUTHORIZED,
            ),
            (ApiError::invalid_token(), StatusCode::UNAUTHORIZED),
            (ApiError::invalid_credentials(), StatusCode::UNAUTHORIZED),
            (ApiError::insufficient_role("admin"), StatusCode::FORBIDDEN),
            (ApiError::not_found(), StatusCode::NOT_FOUND),
            (ApiError::conflict("email_taken"), StatusCode::CONFLICT),
            (ApiError::bad_request("nope"), StatusCode::BAD_REQUEST),
            (ApiError::server_error(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
