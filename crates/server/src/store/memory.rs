//! In-memory credential store.

use super::{CredentialStore, NewUser, StoreError};
use crate::entity::{oauth_authorization, oauth_client, oauth_token, user};
use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use time::OffsetDateTime;

#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<i32, user::Model>>,
    /// email -> user id, doubles as the unique index
    emails: Arc<DashMap<String, i32>>,
    next_user_id: Arc<AtomicI32>,
    clients: Arc<DashMap<String, oauth_client::Model>>,
    codes: Arc<DashMap<String, oauth_authorization::Model>>,
    /// keyed by token row id
    tokens: Arc<DashMap<String, oauth_token::Model>>,
    /// access or refresh token -> row id, the unique index for both columns
    token_index: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve_token(&self, token: &str, id: &str) -> Result<(), StoreError> {
        match self.token_index.entry(token.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Conflict("token already issued".into())),
            Entry::Vacant(slot) => {
                slot.insert(id.to_string());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user(&self, id: i32) -> Result<Option<user::Model>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>, StoreError> {
        let Some(id) = self.emails.get(email).map(|id| *id) else {
            return Ok(None);
        };
        self.find_user(id).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<user::Model, StoreError> {
        let id = match self.emails.entry(new_user.email.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "email {} already registered",
                    new_user.email
                )));
            }
            Entry::Vacant(slot) => {
                let id = self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(id);
                id
            }
        };

        let now = OffsetDateTime::now_utc();
        let user = user::Model {
            id,
            email: new_user.email,
            password_hash: new_user.password_hash,
            name: new_user.name,
            role: new_user.role,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_user_role(&self, id: i32, role: &str) -> Result<bool, StoreError> {
        match self.users.get_mut(&id) {
            Some(mut user) => {
                user.role = role.to_string();
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_client(&self, id: &str) -> Result<Option<oauth_client::Model>, StoreError> {
        Ok(self
            .clients
            .get(id)
            .filter(|c| !c.is_deleted())
            .map(|c| c.clone()))
    }

    async fn create_client(
        &self,
        client: oauth_client::Model,
    ) -> Result<oauth_client::Model, StoreError> {
        match self.clients.entry(client.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "client {} already exists",
                client.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(client)
            }
        }
    }

    async fn list_clients(&self, owner_id: i32) -> Result<Vec<oauth_client::Model>, StoreError> {
        let mut clients: Vec<_> = self
            .clients
            .iter()
            .filter(|c| c.user_id == owner_id && !c.is_deleted())
            .map(|c| c.clone())
            .collect();
        clients.sort_by_key(|c| c.created_at);
        Ok(clients)
    }

    async fn soft_delete_client(&self, id: &str, owner_id: i32) -> Result<bool, StoreError> {
        match self.clients.get_mut(id) {
            Some(mut client) if client.user_id == owner_id && !client.is_deleted() => {
                let now = OffsetDateTime::now_utc();
                client.deleted_at = Some(now);
                client.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_authorization_code(
        &self,
        code: oauth_authorization::Model,
    ) -> Result<(), StoreError> {
        match self.codes.entry(code.code.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict("authorization code collision".into())),
            Entry::Vacant(slot) => {
                slot.insert(code);
                Ok(())
            }
        }
    }

    async fn find_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<oauth_authorization::Model>, StoreError> {
        Ok(self.codes.get(code).map(|c| c.clone()))
    }

    async fn consume_authorization_code(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.codes.remove(code).is_some())
    }

    async fn delete_expired_authorization_codes(
        &self,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let before = self.codes.len();
        self.codes.retain(|_, c| c.expires_at >= now);
        Ok(before.saturating_sub(self.codes.len()) as u64)
    }

    async fn insert_token(&self, token: oauth_token::Model) -> Result<(), StoreError> {
        self.reserve_token(&token.access_token, &token.id)?;
        if let Some(refresh_token) = token.refresh_token.as_deref()
            && let Err(e) = self.reserve_token(refresh_token, &token.id)
        {
            self.token_index.remove(&token.access_token);
            return Err(e);
        }
        self.tokens.insert(token.id.clone(), token);
        Ok(())
    }

    async fn find_token(&self, token: &str) -> Result<Option<oauth_token::Model>, StoreError> {
        let Some(id) = self.token_index.get(token).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.tokens.get(&id).map(|t| t.clone()))
    }

    async fn revoke_token(&self, id: &str, at: OffsetDateTime) -> Result<(), StoreError> {
        if let Some(mut token) = self.tokens.get_mut(id)
            && token.revoked_at.is_none()
        {
            token.revoked_at = Some(at);
            token.updated_at = at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "hash".into(),
            name: "Test".into(),
            role: "user".into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let store = MemoryStore::new();
        let first = store.create_user(new_user("a@example.com")).await.unwrap();
        assert_eq!(first.id, 1);

        let err = store
            .create_user(new_user("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let second = store.create_user(new_user("b@example.com")).await.unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(
            store
                .find_user_by_email("b@example.com")
                .await
                .unwrap()
                .map(|u| u.id),
            Some(2)
        );
    }

    fn new_token(id: &str, access_token: &str, refresh_token: Option<&str>) -> oauth_token::Model {
        let now = OffsetDateTime::now_utc();
        oauth_token::Model {
            id: id.into(),
            client_id: "c1".into(),
            user_id: None,
            access_token: access_token.into(),
            refresh_token: refresh_token.map(Into::into),
            scope: "read".into(),
            expires_at: now + time::Duration::hours(1),
            refresh_expires_at: None,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_access_token_is_conflict() {
        let store = MemoryStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert_token(new_token(&format!("row-{i}"), "same-access", None))
                        .await
                })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => inserted += 1,
                Err(e) => assert!(matches!(e, StoreError::Conflict(_))),
            }
        }
        assert_eq!(inserted, 1);
        assert!(store.find_token("same-access").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_refresh_token_releases_access_token() {
        let store = MemoryStore::new();
        store
            .insert_token(new_token("t1", "access-1", Some("refresh-1")))
            .await
            .unwrap();

        let err = store
            .insert_token(new_token("t2", "access-2", Some("refresh-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_token("access-2").await.unwrap().is_none());

        // The access token of the rejected row is free again
        store
            .insert_token(new_token("t3", "access-2", Some("refresh-3")))
            .await
            .unwrap();
        let found = store.find_token("refresh-3").await.unwrap().unwrap();
        assert_eq!(found.id, "t3");
    }

    #[tokio::test]
    async fn test_consume_code_only_once() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();
        store
            .insert_authorization_code(oauth_authorization::Model {
                code: "abc".into(),
                client_id: "c1".into(),
                user_id: 1,
                scope: String::new(),
                redirect_uri: String::new(),
                code_challenge: None,
                code_challenge_method: None,
                expires_at: now + time::Duration::minutes(10),
                created_at: now,
            })
            .await
            .unwrap();

        assert!(store.consume_authorization_code("abc").await.unwrap());
        assert!(!store.consume_authorization_code("abc").await.unwrap());
        assert!(store.find_authorization_code("abc").await.unwrap().is_none());
    }
}
