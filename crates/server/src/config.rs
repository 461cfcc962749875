use jsonwebtoken::Algorithm;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Token signing configuration shared by local login tokens and OAuth2 tokens.
#[derive(Clone, Debug, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret. Read-only after startup.
    pub secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    /// Local login token lifetime in seconds
    #[serde(default = "default_login_token_lifetime")]
    pub login_token_lifetime: i64,
}

impl JwtConfig {
    /// The configured HMAC algorithm. Only the HS family is accepted.
    pub fn signing_algorithm(&self) -> Result<Algorithm, ConfigError> {
        match self.algorithm.to_ascii_uppercase().as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            other => Err(ConfigError::Validation(format!(
                "jwt.algorithm must be one of HS256, HS384, HS512 (got {other})"
            ))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Base URL advertised in the discovery document
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,
    /// Where the authorize endpoint sends resource owners that are not logged in
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Authorization code lifetime in seconds
    #[serde(default = "default_code_lifetime")]
    pub code_lifetime: i64,
    /// Also hand out a refresh token for the authorization_code grant
    #[serde(default)]
    pub issue_refresh_tokens: bool,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            issuer_url: default_issuer_url(),
            login_url: default_login_url(),
            code_lifetime: default_code_lifetime(),
            issue_refresh_tokens: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub oauth2: OAuth2Config,
}

impl AppConfig {
    /// Checks the invariants the rest of the service relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::Validation(
                "jwt.secret must be at least 32 bytes".into(),
            ));
        }
        self.jwt.signing_algorithm()?;
        if self.jwt.access_token_lifetime <= 0
            || self.jwt.refresh_token_lifetime <= 0
            || self.jwt.login_token_lifetime <= 0
        {
            return Err(ConfigError::Validation(
                "jwt token lifetimes must be > 0".into(),
            ));
        }
        if self.oauth2.code_lifetime <= 0 {
            return Err(ConfigError::Validation(
                "oauth2.code_lifetime must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_algorithm() -> String {
    "HS256".into()
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 7
}

fn default_login_token_lifetime() -> i64 {
    86400
}

fn default_issuer_url() -> String {
    "http://localhost:8080".into()
}

fn default_login_url() -> String {
    "/auth/login".into()
}

fn default_code_lifetime() -> i64 {
    600
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `JWT__SECRET`) overrides the file value. A `.env` file is
/// loaded first when present.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};

    let _ = dotenvy::dotenv();

    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_secret(secret: &str) -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            jwt: JwtConfig {
                secret: secret.into(),
                algorithm: default_algorithm(),
                access_token_lifetime: 3600,
                refresh_token_lifetime: 7200,
                login_token_lifetime: 3600,
            },
            oauth2: OAuth2Config::default(),
        }
    }

    #[test]
    fn accepts_valid_config() {
        let cfg = config_with_secret("0123456789abcdef0123456789abcdef");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.jwt.signing_algorithm().unwrap(), Algorithm::HS256);
    }

    #[test]
    fn rejects_short_secret() {
        let cfg = config_with_secret("too-short");
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_non_hmac_algorithm() {
        let mut cfg = config_with_secret("0123456789abcdef0123456789abcdef");
        cfg.jwt.algorithm = "RS256".into();
        assert!(cfg.validate().is_err());

        cfg.jwt.algorithm = "hs512".into();
        assert_eq!(cfg.jwt.signing_algorithm().unwrap(), Algorithm::HS512);
    }

    #[test]
    fn rejects_zero_code_lifetime() {
        let mut cfg = config_with_secret("0123456789abcdef0123456789abcdef");
        cfg.oauth2.code_lifetime = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oauth2_defaults() {
        let defaults = OAuth2Config::default();
        assert_eq!(defaults.code_lifetime, 600);
        assert_eq!(defaults.login_url, "/auth/login");
        assert!(!defaults.issue_refresh_tokens);
    }
}
