//! Server configuration: TOML file + environment overrides.
//!
//! Secrets (token signing key, Cloudinary credentials) are never required to
//! live in the config file — environment variables override whatever the file
//! contains, so deployments can keep `classlog.toml` checked in and inject
//! credentials at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default bind host.
const DEFAULT_HOST: &str = "127.0.0.1";
/// Default bind port.
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deployment environment. Error responses include stack detail only
    /// when this is not "production".
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. Created on first start.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC secret for bearer token signatures.
    /// Env override: `CLASSLOG_TOKEN_SECRET`.
    pub token_secret: String,
    /// Token lifetime in days.
    pub token_ttl_days: u32,
}

/// Hosted media storage (Cloudinary) credentials.
///
/// Env overrides: `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`,
/// `CLOUDINARY_API_SECRET`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            environment: "development".into(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("classlog.db"),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_ttl_days: 30,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

impl Config {
    /// Load configuration. A missing file is not an error — defaults plus
    /// environment overrides are enough for development.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", p.display()))?
            }
            None => {
                let default_path = Path::new("classlog.toml");
                if default_path.exists() {
                    let raw = std::fs::read_to_string(default_path)
                        .context("Failed to read classlog.toml")?;
                    toml::from_str(&raw).context("Failed to parse classlog.toml")?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CLASSLOG_HOST") {
            if !v.is_empty() {
                self.server.host = v;
            }
        }
        if let Ok(v) = std::env::var("CLASSLOG_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("CLASSLOG_ENV") {
            if !v.is_empty() {
                self.server.environment = v;
            }
        }
        if let Ok(v) = std::env::var("CLASSLOG_DB_PATH") {
            if !v.is_empty() {
                self.database.path = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("CLASSLOG_TOKEN_SECRET") {
            if !v.is_empty() {
                self.auth.token_secret = v;
            }
        }
        if let Ok(v) = std::env::var("CLOUDINARY_CLOUD_NAME") {
            if !v.is_empty() {
                self.media.cloud_name = v;
            }
        }
        if let Ok(v) = std::env::var("CLOUDINARY_API_KEY") {
            if !v.is_empty() {
                self.media.api_key = v;
            }
        }
        if let Ok(v) = std::env::var("CLOUDINARY_API_SECRET") {
            if !v.is_empty() {
                self.media.api_secret = v;
            }
        }
    }

    /// True when error responses may carry stack detail.
    pub fn expose_error_detail(&self) -> bool {
        self.server.environment != "production"
    }

    /// Whether the media relay has full credentials.
    pub fn media_configured(&self) -> bool {
        !self.media.cloud_name.is_empty()
            && !self.media.api_key.is_empty()
            && !self.media.api_secret.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_development() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert!(config.expose_error_detail());
        assert!(!config.media_configured());
    }

    #[test]
    fn parses_full_toml() {
        let raw = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            environment = "production"

            [database]
            path = "/var/lib/classlog/data.db"

            [auth]
            token_secret = "super-secret"
            token_ttl_days = 7

            [media]
            cloud_name = "demo"
            api_key = "key"
            api_secret = "secret"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.expose_error_detail());
        assert_eq!(config.auth.token_ttl_days, 7);
        assert!(config.media_configured());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let raw = r#"
            [server]
            port = 9000
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.auth.token_ttl_days, 30);
    }
}
