//! OAuth2 Authorization Server module.
//!
//! ## Supported Flows
//!
//! - Client Credentials
//! - Authorization Code, optionally with PKCE
//!
//! ## Endpoints
//!
//! - `GET /oauth/authorize` - Authorization endpoint
//! - `POST /oauth/token` - Token endpoint
//! - `POST /oauth/revoke` - Token revocation
//! - `GET|POST /oauth/clients`, `DELETE /oauth/clients/{id}` - Client registration
//! - `GET /.well-known/oauth-authorization-server` - Server metadata

pub mod clients;
pub mod code;
pub mod codec;
pub mod endpoints;
pub mod generator;
pub mod grant;
pub mod password;
mod state;

pub use endpoints::router;
pub use password::{generate_token, hash_secret, verify_secret};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
