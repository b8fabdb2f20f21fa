//! Configuration for Mailcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `MAILCAST__API__PORT=9090`
pub const ENV_PREFIX: &str = "MAILCAST";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Campaign sending configuration
    #[serde(default)]
    pub sending: SendingConfig,

    /// OAuth mail provider configuration
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Externally reachable base URL, used to build tracking links
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: default_public_url(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the JSON collections
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Campaign sending configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingConfig {
    /// Maximum queue items processed per pipeline run
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Background worker tick interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Ceiling for provider connectivity tests in seconds
    #[serde(default = "default_provider_test_timeout")]
    pub provider_test_timeout_secs: u64,

    /// Fallback sender when neither campaign nor provider specify one
    #[serde(default = "default_from")]
    pub default_from: String,
}

impl Default for SendingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            provider_test_timeout_secs: default_provider_test_timeout(),
            default_from: default_from(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_interval() -> u64 {
    30
}

fn default_provider_test_timeout() -> u64 {
    15
}

fn default_from() -> String {
    "noreply@localhost.localdomain".to_string()
}

/// OAuth mail provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client id
    pub client_id: Option<String>,

    /// OAuth client secret
    pub client_secret: Option<String>,

    /// Callback registered with the OAuth client, required for the connect flow
    pub redirect_uri: Option<String>,

    /// Authorization endpoint users are sent to when connecting a mailbox
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Token endpoint for code exchange and refresh
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Endpoint returning the connected account's email and name
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,

    /// Scopes requested during authorization
    #[serde(default = "default_oauth_scopes")]
    pub scopes: Vec<String>,

    /// Gmail REST API base URL
    #[serde(default = "default_gmail_api_base")]
    pub gmail_api_base: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
            scopes: default_oauth_scopes(),
            gmail_api_base: default_gmail_api_base(),
        }
    }
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_userinfo_url() -> String {
    "https://www.googleapis.com/oauth2/v2/userinfo".to_string()
}

fn default_oauth_scopes() -> Vec<String> {
    [
        "https://www.googleapis.com/auth/gmail.send",
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/userinfo.email",
        "https://www.googleapis.com/auth/userinfo.profile",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file, then apply environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        Self::build(Some(path))
    }

    /// Load configuration from the first default location found.
    ///
    /// Falls back to defaults plus environment overrides when no file exists.
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/mailcast/config.toml"),
        ];

        let found = paths.iter().find(|p| p.exists());
        Self::build(found.map(PathBuf::as_path))
    }

    fn build(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(crate::Error::Configuration(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Toml),
            );
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::Error::Configuration(format!("Failed to load config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Configuration(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.public_url, "http://localhost:8080");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.sending.batch_size, 10);
        assert_eq!(config.sending.provider_test_timeout_secs, 15);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
public_url = "https://mail.example.com"

[storage]
data_dir = "/data/mailcast"

[sending]
batch_size = 25

[oauth]
client_id = "client"
redirect_uri = "https://mail.example.com/api/v1/oauth/callback"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.public_url, "https://mail.example.com");
        assert_eq!(config.storage.data_dir, PathBuf::from("/data/mailcast"));
        assert_eq!(config.sending.batch_size, 25);
        assert_eq!(config.sending.poll_interval_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.oauth.redirect_uri.as_deref(),
            Some("https://mail.example.com/api/v1/oauth/callback")
        );
        assert_eq!(config.oauth.auth_url, "https://accounts.google.com/o/oauth2/v2/auth");
        assert_eq!(config.oauth.scopes.len(), 4);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[api]\nport = 9191").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.api.port, 9191);
        assert_eq!(config.sending.batch_size, 10);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = Config::from_file(Path::new("/nonexistent/mailcast.toml")).unwrap_err();
        assert!(matches!(err, crate::Error::Configuration(_)));
    }
}
