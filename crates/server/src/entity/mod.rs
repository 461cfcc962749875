pub mod oauth_authorization;
pub mod oauth_client;
pub mod oauth_token;
pub mod pizza;
pub mod user;
