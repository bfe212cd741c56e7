//! Configuration management for chatkv
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file,
//! environment variables, command-line flags.

use crate::error::{ChatKvError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure for chatkv
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Command proxy connection
    #[serde(default)]
    pub store: StoreConfig,
    /// Data limits and TTLs
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Bootstrap admin account
    #[serde(default)]
    pub admin: AdminConfig,
    /// Settings for `chatkv serve`
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Where the HTTP command proxy lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Proxy endpoint; every command is POSTed here
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,
}

fn default_store_url() -> String {
    "http://localhost:8001/".to_string()
}

fn default_store_timeout() -> u64 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            timeout_seconds: default_store_timeout(),
        }
    }
}

/// Limits applied by the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Response cache TTL in seconds
    #[serde(default = "default_chat_cache_ttl")]
    pub chat_cache_ttl: u64,

    /// Rate-limit window in seconds
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window: u64,

    /// Requests allowed per window
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: i64,

    /// Sessions a user may hold before the oldest is evicted
    #[serde(default = "default_max_chats_per_user")]
    pub max_chats_per_user: usize,

    /// Registrations refused once this many users await approval
    #[serde(default = "default_max_pending_users")]
    pub max_pending_users: usize,

    /// First value of `user_id_counter`; the first user gets start + 1
    #[serde(default = "default_user_id_counter_start")]
    pub user_id_counter_start: i64,

    /// Default trailing message window
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
}

fn default_chat_cache_ttl() -> u64 {
    1800
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_rate_limit_max() -> i64 {
    10
}

fn default_max_chats_per_user() -> usize {
    1
}

fn default_max_pending_users() -> usize {
    2
}

fn default_user_id_counter_start() -> i64 {
    1000
}

fn default_chat_history_limit() -> usize {
    10
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            chat_cache_ttl: default_chat_cache_ttl(),
            rate_limit_window: default_rate_limit_window(),
            rate_limit_max: default_rate_limit_max(),
            max_chats_per_user: default_max_chats_per_user(),
            max_pending_users: default_max_pending_users(),
            user_id_counter_start: default_user_id_counter_start(),
            chat_history_limit: default_chat_history_limit(),
        }
    }
}

/// Bootstrap admin account, created or repaired at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,

    #[serde(default = "default_admin_password")]
    pub password: String,

    /// Fixed id for the admin record (not drawn from the counter)
    #[serde(default = "default_admin_user_id")]
    pub user_id: String,

    /// Appended to every password before hashing
    #[serde(default = "default_password_salt")]
    pub password_salt: String,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

fn default_admin_user_id() -> String {
    "admin".to_string()
}

pub(crate) fn default_password_salt() -> String {
    "devstral_salt_2024".to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
            user_id: default_admin_user_id(),
            password_salt: default_password_salt(),
        }
    }
}

/// `chatkv serve` settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_bind")]
    pub bind: String,
}

fn default_proxy_bind() -> String {
    "127.0.0.1:8001".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_proxy_bind(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns [`ChatKvError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatKvError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatKvError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("CHATKV_STORE_URL") {
            tracing::debug!(url = %url, "Env override: CHATKV_STORE_URL");
            self.store.url = url;
        }
        env_override("CHATKV_STORE_TIMEOUT", &mut self.store.timeout_seconds);

        env_override("CHAT_CACHE_TTL", &mut self.limits.chat_cache_ttl);
        env_override("RATE_LIMIT_WINDOW", &mut self.limits.rate_limit_window);
        env_override("RATE_LIMIT_MAX", &mut self.limits.rate_limit_max);
        env_override("MAX_CHATS_PER_USER", &mut self.limits.max_chats_per_user);
        env_override("MAX_PENDING_USERS", &mut self.limits.max_pending_users);
        env_override(
            "USER_ID_COUNTER_START",
            &mut self.limits.user_id_counter_start,
        );
        env_override("CHAT_HISTORY_LIMIT", &mut self.limits.chat_history_limit);

        if let Ok(username) = std::env::var("CHATKV_ADMIN_USERNAME") {
            self.admin.username = username;
        }
        if let Ok(password) = std::env::var("CHATKV_ADMIN_PASSWORD") {
            self.admin.password = password;
        }

        if let Ok(bind) = std::env::var("CHATKV_PROXY_BIND") {
            self.proxy.bind = bind;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(url) = &cli.store_url {
            tracing::debug!(url = %url, "CLI override: --store-url");
            self.store.url = url.clone();
        }
        if let crate::cli::Commands::Serve {
            bind: Some(bind), ..
        } = &cli.command
        {
            self.proxy.bind = bind.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ChatKvError::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.store.url).map_err(|e| {
            ChatKvError::Config(format!("store.url '{}' is invalid: {}", self.store.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatKvError::Config(format!(
                "store.url must use http or https, got '{}'",
                url.scheme()
            ))
            .into());
        }

        if self.store.timeout_seconds == 0 {
            return Err(ChatKvError::Config(
                "store.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        let limits = [
            ("chat_cache_ttl", self.limits.chat_cache_ttl as i64),
            ("rate_limit_window", self.limits.rate_limit_window as i64),
            ("rate_limit_max", self.limits.rate_limit_max),
            ("max_chats_per_user", self.limits.max_chats_per_user as i64),
            ("max_pending_users", self.limits.max_pending_users as i64),
            ("user_id_counter_start", self.limits.user_id_counter_start),
            ("chat_history_limit", self.limits.chat_history_limit as i64),
        ];
        for (name, value) in limits {
            if value <= 0 {
                return Err(ChatKvError::Config(format!(
                    "limits.{} must be greater than 0",
                    name
                ))
                .into());
            }
        }

        if self.admin.username.trim().is_empty() {
            return Err(
                ChatKvError::Config("admin.username cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}

/// Overwrite `target` with the parsed value of env var `name`, if set.
fn env_override<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => {
                *target = value;
                tracing::debug!("Env override: {}", name);
            }
            Err(_) => tracing::warn!("Invalid {}: {}", name, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.url, "http://localhost:8001/");
        assert_eq!(config.limits.chat_cache_ttl, 1800);
        assert_eq!(config.limits.rate_limit_window, 60);
        assert_eq!(config.limits.max_chats_per_user, 1);
        assert_eq!(config.limits.max_pending_users, 2);
        assert_eq!(config.limits.user_id_counter_start, 1000);
        assert_eq!(config.limits.chat_history_limit, 10);
        assert_eq!(config.admin.password_salt, "devstral_salt_2024");
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_relative_url() {
        let mut config = Config::default();
        config.store.url = "localhost:8001".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_non_http_scheme() {
        let mut config = Config::default();
        config.store.url = "redis://localhost:6379".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_limit() {
        let mut config = Config::default();
        config.limits.max_chats_per_user = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_chats_per_user"));
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.store.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_admin() {
        let mut config = Config::default();
        config.admin.username = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limits:\n  max_chats_per_user: 3\n").unwrap();

        let config = Config::load(file.path().to_str().unwrap(), &Cli::default()).unwrap();
        assert_eq!(config.limits.max_chats_per_user, 3);
        assert_eq!(config.limits.chat_history_limit, 10);
        assert_eq!(config.store.url, "http://localhost:8001/");
    }

    #[test]
    #[serial]
    fn test_unparseable_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limits: [not, a, map").unwrap();

        let err = Config::load(file.path().to_str().unwrap(), &Cli::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatKvError>(),
            Some(ChatKvError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides_limits() {
        std::env::set_var("MAX_CHATS_PER_USER", "4");
        std::env::set_var("CHAT_HISTORY_LIMIT", "not-a-number");
        std::env::set_var("CHATKV_STORE_URL", "http://proxy.internal:9000/");

        let config = Config::load("/nonexistent/config.yaml", &Cli::default()).unwrap();

        std::env::remove_var("MAX_CHATS_PER_USER");
        std::env::remove_var("CHAT_HISTORY_LIMIT");
        std::env::remove_var("CHATKV_STORE_URL");

        assert_eq!(config.limits.max_chats_per_user, 4);
        assert_eq!(config.limits.chat_history_limit, 10);
        assert_eq!(config.store.url, "http://proxy.internal:9000/");
    }

    #[test]
    #[serial]
    fn test_cli_store_url_beats_env() {
        std::env::set_var("CHATKV_STORE_URL", "http://from-env:1/");
        let cli = Cli {
            store_url: Some("http://from-cli:2/".to_string()),
            ..Cli::default()
        };

        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();
        std::env::remove_var("CHATKV_STORE_URL");

        assert_eq!(config.store.url, "http://from-cli:2/");
    }
}
