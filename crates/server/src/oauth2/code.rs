//! Authorization code issuance and single-use redemption.

use crate::entity::oauth_authorization;
use crate::error::OAuthError;
use crate::oauth2::password::generate_token;
use crate::store::CredentialStore;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub const PKCE_METHOD_S256: &str = "S256";
pub const PKCE_METHOD_PLAIN: &str = "plain";

/// PKCE parameters captured at the authorize step.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub challenge: String,
    pub method: Option<String>,
}

/// What the token endpoint presents when exchanging a code.
#[derive(Debug, Clone, Default)]
pub struct RedeemRequest {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Clone)]
pub struct AuthorizationCodes {
    store: Arc<dyn CredentialStore>,
    lifetime: Duration,
}

impl AuthorizationCodes {
    pub fn new(store: Arc<dyn CredentialStore>, lifetime_secs: i64) -> Self {
        Self {
            store,
            lifetime: Duration::seconds(lifetime_secs),
        }
    }

    /// Issue a code bound to `client_id` and `user_id`.
    ///
    /// An empty `redirect_uri` binds the code to the client's registered URI.
    #[tracing::instrument(skip(self, pkce))]
    pub async fn issue(
        &self,
        client_id: &str,
        user_id: i32,
        scope: Option<&str>,
        redirect_uri: &str,
        pkce: Option<PkceChallenge>,
    ) -> Result<String, OAuthError> {
        let client = self
            .store
            .find_client(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        if !redirect_uri.is_empty() && !client.is_redirect_uri_allowed(redirect_uri) {
            return Err(OAuthError::InvalidRedirectUri);
        }
        let redirect_uri = if redirect_uri.is_empty() {
            client.redirect_uri.clone()
        } else {
            redirect_uri.to_string()
        };

        let (code_challenge, code_challenge_method) = match pkce {
            Some(PkceChallenge { challenge, method }) => {
                let method = method.unwrap_or_else(|| PKCE_METHOD_PLAIN.to_string());
                if method != PKCE_METHOD_S256 && method != PKCE_METHOD_PLAIN {
                    return Err(OAuthError::InvalidRequest(
                        "unsupported code_challenge_method",
                    ));
                }
                (Some(challenge), Some(method))
            }
            None => (None, None),
        };

        let scope = client.negotiate_scope(scope);
        let code = generate_token().map_err(|e| OAuthError::Internal(e.to_string()))?;
        let now = OffsetDateTime::now_utc();
        self.store
            .insert_authorization_code(oauth_authorization::Model {
                code: code.clone(),
                client_id: client.id,
                user_id,
                scope,
                redirect_uri,
                code_challenge,
                code_challenge_method,
                expires_at: now + self.lifetime,
                created_at: now,
            })
            .await?;

        tracing::debug!(client_id, user_id, "Issued authorization code");
        Ok(code)
    }

    /// Redeem a code exactly once.
    ///
    /// Lookup, validation and deletion form one unit: of several concurrent
    /// redeemers only the one whose delete removes the row succeeds.
    #[tracing::instrument(skip_all, fields(client_id = %request.client_id))]
    pub async fn redeem(
        &self,
        request: &RedeemRequest,
    ) -> Result<oauth_authorization::Model, OAuthError> {
        let grant = self
            .store
            .find_authorization_code(&request.code)
            .await?
            .ok_or(OAuthError::InvalidGrant("unknown authorization code"))?;

        if grant.is_expired_at(OffsetDateTime::now_utc()) {
            self.store.consume_authorization_code(&grant.code).await?;
            return Err(OAuthError::CodeExpired);
        }

        if grant.client_id != request.client_id {
            return Err(OAuthError::InvalidGrant("code was issued to another client"));
        }

        if let Some(redirect_uri) = request.redirect_uri.as_deref()
            && !redirect_uri.is_empty()
            && redirect_uri != grant.redirect_uri
        {
            return Err(OAuthError::InvalidGrant("redirect_uri mismatch"));
        }

        if grant.code_challenge.is_some() {
            let verifier = request
                .code_verifier
                .as_deref()
                .ok_or(OAuthError::InvalidRequest("code_verifier is required"))?;
            if !grant.verify_pkce(verifier) {
                return Err(OAuthError::InvalidGrant("PKCE verification failed"));
            }
        }

        if !self.store.consume_authorization_code(&grant.code).await? {
            return Err(OAuthError::InvalidGrant("authorization code already used"));
        }

        Ok(grant)
    }

    /// Drop codes that expired before now. Called by the background reaper.
    pub async fn purge_expired(&self) -> Result<u64, OAuthError> {
        Ok(self
            .store
            .delete_expired_authorization_codes(OffsetDateTime::now_utc())
            .await?)
    }
}
