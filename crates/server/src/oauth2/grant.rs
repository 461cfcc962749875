//! Token endpoint grant handling.

use crate::entity::oauth_client;
use crate::error::OAuthError;
use crate::oauth2::code::{AuthorizationCodes, RedeemRequest};
use crate::oauth2::generator::{GeneratedTokens, TokenGenerator};
use crate::oauth2::password::verify_secret;
use crate::store::CredentialStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// Form body accepted by the token endpoint.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// `client_credentials` or `authorization_code`
    #[serde(default)]
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    /// PKCE verifier matching the challenge sent to the authorize endpoint
    pub code_verifier: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl From<GeneratedTokens> for TokenResponse {
    fn from(tokens: GeneratedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token,
            scope: tokens.scope,
        }
    }
}

#[derive(Clone)]
pub struct GrantDispatcher {
    store: Arc<dyn CredentialStore>,
    codes: AuthorizationCodes,
    generator: TokenGenerator,
    issue_refresh_tokens: bool,
}

impl GrantDispatcher {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codes: AuthorizationCodes,
        generator: TokenGenerator,
        issue_refresh_tokens: bool,
    ) -> Self {
        Self {
            store,
            codes,
            generator,
            issue_refresh_tokens,
        }
    }

    #[tracing::instrument(skip_all, fields(grant_type = %request.grant_type))]
    pub async fn dispatch(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        match request.grant_type.as_str() {
            GRANT_CLIENT_CREDENTIALS => self.client_credentials(request).await,
            GRANT_AUTHORIZATION_CODE => self.authorization_code(request).await,
            other => {
                tracing::debug!(grant_type = other, "Rejected unsupported grant type");
                Err(OAuthError::UnsupportedGrantType)
            }
        }
    }

    async fn client_credentials(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let (Some(client_id), Some(secret)) = (request.client_id, request.client_secret) else {
            return Err(OAuthError::InvalidClient);
        };
        let client = self.authenticate_client(&client_id, Some(&secret)).await?;
        // Public clients have nothing to prove here
        if client.is_public() {
            return Err(OAuthError::InvalidClient);
        }

        let tokens = self
            .generator
            .generate(&client.id, None, &client.scopes, false)
            .await?;
        Ok(tokens.into())
    }

    async fn authorization_code(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .ok_or(OAuthError::InvalidRequest("code is required"))?;
        let client_id = request
            .client_id
            .ok_or(OAuthError::InvalidRequest("client_id is required"))?;

        let grant = self
            .codes
            .redeem(&RedeemRequest {
                code,
                client_id: client_id.clone(),
                redirect_uri: request.redirect_uri,
                code_verifier: request.code_verifier,
            })
            .await?;

        let client = self
            .authenticate_client(&client_id, request.client_secret.as_deref())
            .await?;

        let tokens = self
            .generator
            .generate(
                &client.id,
                Some(grant.user_id),
                &grant.scope,
                self.issue_refresh_tokens,
            )
            .await?;
        Ok(tokens.into())
    }

    /// Look the client up and check its secret. Public clients pass without one.
    async fn authenticate_client(
        &self,
        client_id: &str,
        secret: Option<&str>,
    ) -> Result<oauth_client::Model, OAuthError> {
        let client = self
            .store
            .find_client(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        if client.is_public() {
            return Ok(client);
        }
        match secret {
            Some(secret) if verify_secret(&client.secret, secret) => Ok(client),
            _ => {
                tracing::warn!(client_id, "Client authentication failed");
                Err(OAuthError::InvalidClient)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::codec::TokenCodec;
    use crate::store::MemoryStore;
    use crate::testing::{TEST_SECRET, seed_client, seed_user};
    use jsonwebtoken::Algorithm;

    struct Fixture {
        dispatcher: GrantDispatcher,
        codes: AuthorizationCodes,
        codec: TokenCodec,
        user_id: i32,
    }

    async fn fixture(issue_refresh_tokens: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(store.as_ref(), "owner@example.com", "admin").await;
        seed_client(
            store.as_ref(),
            "c1",
            Some("s1"),
            user.id,
            "https://app.example.com/cb",
        )
        .await;
        seed_client(
            store.as_ref(),
            "spa",
            None,
            user.id,
            "https://spa.example.com/cb",
        )
        .await;

        let codec = TokenCodec::new(TEST_SECRET.as_bytes(), Algorithm::HS256);
        let codes = AuthorizationCodes::new(store.clone(), 600);
        let generator = TokenGenerator::new(store.clone(), codec.clone(), 3600, 86400);
        Fixture {
            dispatcher: GrantDispatcher::new(store, codes.clone(), generator, issue_refresh_tokens),
            codes,
            codec,
            user_id: user.id,
        }
    }

    fn client_credentials(id: &str, secret: &str) -> TokenRequest {
        TokenRequest {
            grant_type: GRANT_CLIENT_CREDENTIALS.into(),
            client_id: Some(id.into()),
            client_secret: Some(secret.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_client_credentials() {
        let f = fixture(false).await;
        let response = f
            .dispatcher
            .dispatch(client_credentials("c1", "s1"))
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.scope, "read write");
        let claims = f.codec.verify(&response.access_token).unwrap();
        assert_eq!(claims.aud.as_deref(), Some("c1"));
        assert_eq!(claims.uid, Some(f.user_id));
    }

    #[tokio::test]
    async fn test_client_credentials_rejects_bad_clients() {
        let f = fixture(false).await;

        for request in [
            client_credentials("c1", "wrong"),
            client_credentials("unknown", "s1"),
            client_credentials("spa", ""),
            TokenRequest {
                grant_type: GRANT_CLIENT_CREDENTIALS.into(),
                client_id: Some("c1".into()),
                ..Default::default()
            },
        ] {
            let err = f.dispatcher.dispatch(request).await.unwrap_err();
            assert!(matches!(err, OAuthError::InvalidClient));
        }
    }

    #[tokio::test]
    async fn test_authorization_code_grant() {
        let f = fixture(true).await;
        let code = f
            .codes
            .issue("c1", f.user_id, Some("read"), "", None)
            .await
            .unwrap();

        let request = TokenRequest {
            grant_type: GRANT_AUTHORIZATION_CODE.into(),
            client_id: Some("c1".into()),
            client_secret: Some("s1".into()),
            code: Some(code),
            ..Default::default()
        };
        let response = f.dispatcher.dispatch(request.clone()).await.unwrap();
        assert_eq!(response.scope, "read");
        assert!(response.refresh_token.is_some());

        let err = f.dispatcher.dispatch(request).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_authorization_code_bad_secret_after_redeem() {
        let f = fixture(false).await;
        let code = f.codes.issue("c1", f.user_id, None, "", None).await.unwrap();

        let err = f
            .dispatcher
            .dispatch(TokenRequest {
                grant_type: GRANT_AUTHORIZATION_CODE.into(),
                client_id: Some("c1".into()),
                client_secret: Some("wrong".into()),
                code: Some(code),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidClient));
    }

    #[tokio::test]
    async fn test_public_client_code_grant() {
        let f = fixture(false).await;
        let code = f.codes.issue("spa", f.user_id, None, "", None).await.unwrap();

        let response = f
            .dispatcher
            .dispatch(TokenRequest {
                grant_type: GRANT_AUTHORIZATION_CODE.into(),
                client_id: Some("spa".into()),
                code: Some(code),
                ..Default::default()
            })
            .await
            .unwrap();
        let claims = f.codec.verify(&response.access_token).unwrap();
        assert_eq!(claims.aud.as_deref(), Some("spa"));
    }

    #[tokio::test]
    async fn test_unsupported_grant_type() {
        let f = fixture(false).await;
        let err = f
            .dispatcher
            .dispatch(TokenRequest {
                grant_type: "password".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::UnsupportedGrantType));
    }
}
