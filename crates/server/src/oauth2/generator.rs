//! Access and refresh token generation.

use crate::entity::oauth_token;
use crate::error::OAuthError;
use crate::oauth2::codec::{Claims, REFRESH_TOKEN_TYPE, TokenCodec};
use crate::store::CredentialStore;
use serde_json::Value;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Tokens handed back to the grant dispatcher.
#[derive(Debug, Clone)]
pub struct GeneratedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub scope: String,
}

#[derive(Clone)]
pub struct TokenGenerator {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    access_lifetime: i64,
    refresh_lifetime: i64,
}

impl TokenGenerator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: TokenCodec,
        access_lifetime: i64,
        refresh_lifetime: i64,
    ) -> Self {
        Self {
            store,
            codec,
            access_lifetime,
            refresh_lifetime,
        }
    }

    /// Sign tokens for `client_id`.
    ///
    /// Without an explicit user the client's owner is the subject. The role
    /// claim is read from the store on every call, so a role change takes
    /// effect on the next issuance.
    #[tracing::instrument(skip(self))]
    pub async fn generate(
        &self,
        client_id: &str,
        user_id: Option<i32>,
        scope: &str,
        want_refresh: bool,
    ) -> Result<GeneratedTokens, OAuthError> {
        let subject = match user_id {
            Some(id) => id,
            None => {
                let client = self
                    .store
                    .find_client(client_id)
                    .await?
                    .ok_or(OAuthError::InvalidClient)?;
                if client.user_id <= 0 {
                    return Err(OAuthError::MissingSubject);
                }
                client.user_id
            }
        };

        let user = self
            .store
            .find_user(subject)
            .await?
            .ok_or(OAuthError::UnknownUser(subject))?;
        let role = user.effective_role().to_string();

        let now = OffsetDateTime::now_utc();
        let access_jti = uuid::Uuid::new_v4().to_string();
        let access_claims = Claims {
            exp: (now + Duration::seconds(self.access_lifetime)).unix_timestamp(),
            iat: Some(now.unix_timestamp()),
            sub: Some(subject.to_string()),
            uid: Some(subject),
            aud: Some(client_id.to_string()),
            role: Some(role),
            scope: (!scope.is_empty()).then(|| scope.to_string()),
            jti: Some(access_jti.clone()),
            ..Default::default()
        };
        let access_token = self.codec.sign(&access_claims)?;

        let (refresh_token, refresh_expires_at) = if want_refresh {
            let expires_at = now + Duration::seconds(self.refresh_lifetime);
            let mut refresh_claims = Claims {
                exp: expires_at.unix_timestamp(),
                iat: Some(now.unix_timestamp()),
                sub: Some(subject.to_string()),
                uid: Some(subject),
                aud: Some(client_id.to_string()),
                jti: Some(uuid::Uuid::new_v4().to_string()),
                typ: Some(REFRESH_TOKEN_TYPE.to_string()),
                ..Default::default()
            };
            refresh_claims
                .extra
                .insert("ati".into(), Value::String(access_jti.clone()));
            (Some(self.codec.sign(&refresh_claims)?), Some(expires_at))
        } else {
            (None, None)
        };

        self.store
            .insert_token(oauth_token::Model {
                id: access_jti,
                client_id: client_id.to_string(),
                user_id,
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
                scope: scope.to_string(),
                expires_at: now + Duration::seconds(self.access_lifetime),
                refresh_expires_at,
                revoked_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(client_id, subject, "Issued access token");
        Ok(GeneratedTokens {
            access_token,
            refresh_token,
            expires_in: self.access_lifetime,
            scope: scope.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::entity::user::DEFAULT_ROLE;
    use crate::testing::{TEST_SECRET, seed_client, seed_user};
    use jsonwebtoken::Algorithm;

    fn codec() -> TokenCodec {
        TokenCodec::new(TEST_SECRET.as_bytes(), Algorithm::HS256)
    }

    fn generator(store: Arc<MemoryStore>) -> TokenGenerator {
        TokenGenerator::new(store, codec(), 3600, 86400)
    }

    #[tokio::test]
    async fn test_client_credentials_subject_is_owner() {
        let store = Arc::new(MemoryStore::new());
        let owner = seed_user(store.as_ref(), "owner@example.com", "admin").await;
        seed_client(store.as_ref(), "c1", Some("s1"), owner.id, "").await;

        let tokens = generator(store.clone())
            .generate("c1", None, "read write", false)
            .await
            .unwrap();
        assert!(tokens.refresh_token.is_none());
        assert_eq!(tokens.expires_in, 3600);

        let claims = codec().verify(&tokens.access_token).unwrap();
        assert_eq!(claims.aud.as_deref(), Some("c1"));
        assert_eq!(claims.uid, Some(owner.id));
        assert_eq!(claims.sub, Some(owner.id.to_string()));
        assert_eq!(claims.role.as_deref(), Some("admin"));
        assert_eq!(claims.scope.as_deref(), Some("read write"));

        let record = store.find_token(&tokens.access_token).await.unwrap().unwrap();
        assert_eq!(record.user_id, None);
        assert_eq!(record.client_id, "c1");
    }

    #[tokio::test]
    async fn test_role_is_read_fresh() {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(store.as_ref(), "u@example.com", "user").await;
        seed_client(store.as_ref(), "c1", Some("s1"), user.id, "").await;
        let generator = generator(store.clone());

        let before = generator.generate("c1", Some(user.id), "", false).await.unwrap();
        store.update_user_role(user.id, "admin").await.unwrap();
        let after = generator.generate("c1", Some(user.id), "", false).await.unwrap();

        let before = codec().verify(&before.access_token).unwrap();
        let after = codec().verify(&after.access_token).unwrap();
        assert_eq!(before.role.as_deref(), Some("user"));
        assert_eq!(after.role.as_deref(), Some("admin"));
        // Empty scope is left out of the claims
        assert!(after.scope.is_none());
    }

    #[tokio::test]
    async fn test_blank_role_defaults_to_user() {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(store.as_ref(), "u@example.com", "").await;
        seed_client(store.as_ref(), "c1", Some("s1"), user.id, "").await;

        let tokens = generator(store)
            .generate("c1", Some(user.id), "read", false)
            .await
            .unwrap();
        let claims = codec().verify(&tokens.access_token).unwrap();
        assert_eq!(claims.role.as_deref(), Some(DEFAULT_ROLE));
    }

    #[tokio::test]
    async fn test_missing_subject_and_unknown_user() {
        let store = Arc::new(MemoryStore::new());
        seed_client(store.as_ref(), "orphan", Some("s1"), 0, "").await;
        let generator = generator(store);

        let err = generator.generate("orphan", None, "", false).await.unwrap_err();
        assert!(matches!(err, OAuthError::MissingSubject));

        let err = generator.generate("orphan", Some(99), "", false).await.unwrap_err();
        assert!(matches!(err, OAuthError::UnknownUser(99)));
    }

    #[tokio::test]
    async fn test_refresh_token_binds_access_token() {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(store.as_ref(), "u@example.com", "user").await;
        seed_client(store.as_ref(), "c1", Some("s1"), user.id, "").await;

        let tokens = generator(store.clone())
            .generate("c1", Some(user.id), "read", true)
            .await
            .unwrap();
        let refresh = tokens.refresh_token.expect("refresh token requested");

        let access = codec().verify(&tokens.access_token).unwrap();
        let refresh_claims = codec().verify(&refresh).unwrap();
        assert!(refresh_claims.is_refresh_token());
        assert!(refresh_claims.exp > access.exp);
        assert_eq!(
            refresh_claims.extra.get("ati").and_then(Value::as_str),
            access.jti.as_deref()
        );

        let record = store.find_token(&refresh).await.unwrap().unwrap();
        assert_eq!(record.user_id, Some(user.id));
        assert_eq!(Some(record.id), access.jti);
    }
}
