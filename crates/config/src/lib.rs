//! Environment-variable configuration loading and validation for vaultgate.
//!
//! All configuration is environment-only (no TOML file layer) — see the spec
//! table this mirrors. Every setting is validated once, at startup;
//! [`AppConfig::from_env`] returns a [`ConfigError`] rather than panicking so
//! the CLI binary can log a clean message and abort the process.

use std::path::PathBuf;

/// Resolved, validated application configuration.
///
/// Secret fields (`jwt_secret`, `federated_client_secret`) are redacted by
/// the `Debug` impl below — never logged in full.
#[derive(Clone)]
pub struct AppConfig {
    pub vault_path: PathBuf,
    pub remote_url: String,
    pub branch: String,
    pub user_name: String,
    pub user_email: String,
    pub sync_interval_seconds: u64,
    pub debounce_seconds: u64,
    pub port: u16,
    pub jwt_secret: String,
    pub server_url: String,
    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
    pub federated_client_id: String,
    pub federated_client_secret: String,
    pub allowed_users: Vec<String>,
    pub trust_proxy: bool,
    pub max_sessions: usize,
}

fn redact(s: &str) -> &'static str {
    if s.is_empty() { "[empty]" } else { "[REDACTED]" }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("vault_path", &self.vault_path)
            .field("remote_url", &self.remote_url)
            .field("branch", &self.branch)
            .field("user_name", &self.user_name)
            .field("user_email", &self.user_email)
            .field("sync_interval_seconds", &self.sync_interval_seconds)
            .field("debounce_seconds", &self.debounce_seconds)
            .field("port", &self.port)
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("server_url", &self.server_url)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("federated_client_id", &self.federated_client_id)
            .field("federated_client_secret", &redact(&self.federated_client_secret))
            .field("allowed_users", &self.allowed_users)
            .field("trust_proxy", &self.trust_proxy)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

/// Allowlist of environment variable names whose values must never be
/// handed to a subprocess — reused by `vaultgate-vcs` when sanitizing the
/// child process environment (spec §4.11).
pub const SECRET_ENV_VARS: &[&str] = &["JWT_SECRET", "FEDERATED_CLIENT_SECRET"];

impl AppConfig {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vault_path = require_env("VAULT_PATH")?;
        let vault_path = PathBuf::from(&vault_path);
        if !vault_path.is_absolute() {
            return Err(ConfigError::Invalid {
                key: "VAULT_PATH",
                reason: "must be an absolute path".into(),
            });
        }

        let remote_url = require_plain("REMOTE_URL")?;
        let branch = require_plain("BRANCH")?;
        let user_name = require_plain("USER_NAME")?;
        let user_email = require_plain("USER_EMAIL")?;

        let sync_interval_seconds = require_nonneg_int("SYNC_INTERVAL_SECONDS")?;
        let debounce_seconds = require_nonneg_int("DEBOUNCE_SECONDS")?;

        let port_raw = require_env("PORT")?;
        let port: u16 = port_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "PORT",
            reason: "must be an integer between 1 and 65535".into(),
        })?;
        if port == 0 {
            return Err(ConfigError::Invalid {
                key: "PORT",
                reason: "must be between 1 and 65535".into(),
            });
        }

        let jwt_secret = require_env("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: "must be at least 32 characters".into(),
            });
        }

        let server_url_raw = require_env("SERVER_URL")?;
        let parsed = url::Url::parse(&server_url_raw).map_err(|_| ConfigError::Invalid {
            key: "SERVER_URL",
            reason: "must be an absolute URL".into(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                key: "SERVER_URL",
                reason: "must be an absolute URL".into(),
            });
        }
        let server_url = server_url_raw.trim_end_matches('/').to_string();

        let access_token_ttl = require_positive_int("ACCESS_TOKEN_TTL")?;
        let refresh_token_ttl = require_positive_int("REFRESH_TOKEN_TTL")?;

        let federated_client_id = require_plain("FEDERATED_CLIENT_ID")?;
        let federated_client_secret = require_env("FEDERATED_CLIENT_SECRET")?;
        if federated_client_secret.is_empty() {
            return Err(ConfigError::Invalid {
                key: "FEDERATED_CLIENT_SECRET",
                reason: "must not be empty".into(),
            });
        }

        let allowed_users_raw = require_env("ALLOWED_USERS")?;
        let allowed_users: Vec<String> = allowed_users_raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if allowed_users.is_empty() {
            return Err(ConfigError::Invalid {
                key: "ALLOWED_USERS",
                reason: "must contain at least one entry".into(),
            });
        }

        let trust_proxy_raw = require_env("TRUST_PROXY")?;
        let trust_proxy = parse_bool(&trust_proxy_raw).ok_or(ConfigError::Invalid {
            key: "TRUST_PROXY",
            reason: "must be a boolean (true/false)".into(),
        })?;

        let max_sessions = require_positive_int("MAX_SESSIONS")? as usize;

        tracing::info!(port, %server_url, max_sessions, "configuration loaded");

        Ok(Self {
            vault_path,
            remote_url,
            branch,
            user_name,
            user_email,
            sync_interval_seconds,
            debounce_seconds,
            port,
            jwt_secret,
            server_url,
            access_token_ttl,
            refresh_token_ttl,
            federated_client_id,
            federated_client_secret,
            allowed_users,
            trust_proxy,
            max_sessions,
        })
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn require_env(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing { key })
}

/// Non-empty, no leading `-`, no control characters — the shared constraint
/// for `REMOTE_URL`, `BRANCH`, `USER_NAME`, `USER_EMAIL`, `FEDERATED_CLIENT_ID`.
fn require_plain(key: &'static str) -> Result<String, ConfigError> {
    let value = require_env(key)?;
    if value.is_empty() {
        return Err(ConfigError::Invalid {
            key,
            reason: "must not be empty".into(),
        });
    }
    if value.starts_with('-') {
        return Err(ConfigError::Invalid {
            key,
            reason: "must not begin with '-'".into(),
        });
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Invalid {
            key,
            reason: "must not contain control characters".into(),
        });
    }
    Ok(value)
}

fn require_nonneg_int(key: &'static str) -> Result<u64, ConfigError> {
    let raw = require_env(key)?;
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: "must be a non-negative integer".into(),
    })
}

fn require_positive_int(key: &'static str) -> Result<u64, ConfigError> {
    let value = require_nonneg_int(key)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be a positive integer".into(),
        });
    }
    Ok(value)
}

/// Configuration errors. A non-empty `ValidationError`-equivalent variant
/// always aborts the process at startup — never surfaced over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {key}")]
    Missing { key: &'static str },

    #[error("invalid value for {key}: {reason}")]
    Invalid {
        key: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_valid_env() {
        unsafe {
            std::env::set_var("VAULT_PATH", "/tmp/vault");
            std::env::set_var("REMOTE_URL", "git@example.com:vault.git");
            std::env::set_var("BRANCH", "main");
            std::env::set_var("USER_NAME", "vaultgate");
            std::env::set_var("USER_EMAIL", "vaultgate@example.com");
            std::env::set_var("SYNC_INTERVAL_SECONDS", "60");
            std::env::set_var("DEBOUNCE_SECONDS", "10");
            std::env::set_var("PORT", "8080");
            std::env::set_var("JWT_SECRET", "a".repeat(32));
            std::env::set_var("SERVER_URL", "https://vault.example.com/");
            std::env::set_var("ACCESS_TOKEN_TTL", "3600");
            std::env::set_var("REFRESH_TOKEN_TTL", "2592000");
            std::env::set_var("FEDERATED_CLIENT_ID", "client-123");
            std::env::set_var("FEDERATED_CLIENT_SECRET", "shh");
            std::env::set_var("ALLOWED_USERS", "Alice, BOB");
            std::env::set_var("TRUST_PROXY", "true");
            std::env::set_var("MAX_SESSIONS", "100");
        }
    }

    #[test]
    fn valid_env_loads_and_normalizes() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_valid_env();
        let config = AppConfig::from_env().expect("valid config");
        assert_eq!(config.server_url, "https://vault.example.com");
        assert_eq!(config.allowed_users, vec!["alice", "bob"]);
        assert_eq!(config.port, 8080);
        assert!(config.trust_proxy);
    }

    #[test]
    fn short_jwt_secret_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_valid_env();
        unsafe {
            std::env::set_var("JWT_SECRET", "too-short");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_SECRET", .. }));
    }

    #[test]
    fn relative_vault_path_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_valid_env();
        unsafe {
            std::env::set_var("VAULT_PATH", "relative/path");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "VAULT_PATH", .. }));
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_valid_env();
        unsafe {
            std::env::remove_var("ALLOWED_USERS");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "ALLOWED_USERS" }));
        unsafe {
            std::env::set_var("ALLOWED_USERS", "alice");
        }
    }

    #[test]
    fn zero_port_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_valid_env();
        unsafe {
            std::env::set_var("PORT", "0");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        unsafe {
            std::env::set_var("PORT", "8080");
        }
    }
}
