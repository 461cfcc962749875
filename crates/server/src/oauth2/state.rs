//! OAuth2 state management.
//!
//! Bundles the components the OAuth2 endpoints and the authentication
//! middleware share. Built once at startup; every field is cheap to clone.

use crate::config::{AppConfig, ConfigError};
use crate::oauth2::code::AuthorizationCodes;
use crate::oauth2::codec::TokenCodec;
use crate::oauth2::generator::TokenGenerator;
use crate::oauth2::grant::GrantDispatcher;
use crate::store::CredentialStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct OAuth2State {
    pub store: Arc<dyn CredentialStore>,
    pub codec: TokenCodec,
    pub codes: AuthorizationCodes,
    pub dispatcher: GrantDispatcher,
    pub config: Arc<AppConfig>,
}

impl OAuth2State {
    pub fn new(store: Arc<dyn CredentialStore>, config: Arc<AppConfig>) -> Result<Self, ConfigError> {
        let codec = TokenCodec::new(
            config.jwt.secret.as_bytes(),
            config.jwt.signing_algorithm()?,
        );
        let codes = AuthorizationCodes::new(store.clone(), config.oauth2.code_lifetime);
        let generator = TokenGenerator::new(
            store.clone(),
            codec.clone(),
            config.jwt.access_token_lifetime,
            config.jwt.refresh_token_lifetime,
        );
        let dispatcher = GrantDispatcher::new(
            store.clone(),
            codes.clone(),
            generator,
            config.oauth2.issue_refresh_tokens,
        );

        Ok(Self {
            store,
            codec,
            codes,
            dispatcher,
            config,
        })
    }
}
