use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::github::client::DEFAULT_API_BASE;
use crate::github::visibility::{DEFAULT_READ_TTL_SECS, DEFAULT_WRITE_TTL_SECS};
use crate::security::path::DEFAULT_ALLOWED_ROOTS;

/// Environment variable that points at an alternate config file
pub const CONFIG_PATH_ENV: &str = "JIB_GATEWAY_CONFIG";

/// Overrides `policy.private_repo_mode` when set
pub const PRIVATE_MODE_ENV: &str = "PRIVATE_REPO_MODE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    DirectoryNotFound,

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub paths: PathsConfig,
    pub policy: PolicyConfig,
    pub github: GitHubConfig,
    pub git: GitConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub secret_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    pub allowed_roots: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PolicyConfig {
    pub private_repo_mode: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    pub api_base: String,
    pub token_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
    pub visibility_read_ttl_secs: i64,
    pub visibility_write_ttl_secs: i64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::DirectoryNotFound)?;
        Ok(PathBuf::from(home).join(".config").join("jib-gateway"))
    }

    /// Get the config file path, honouring `JIB_GATEWAY_CONFIG`
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Ok(Self::config_dir()?.join("config.toml")),
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        config.validate()?;

        Ok(config)
    }

    /// Load from the default location, or defaults when there is no file
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default_config());
        }
        Self::load_from(&path)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        // Validate before saving
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        // Set permissions to 600 (owner read/write only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            server: ServerConfig {
                listen_addr: "0.0.0.0:9847".to_string(),
            },
            auth: AuthConfig {
                secret_env: "JIB_GATEWAY_SECRET".to_string(),
                secret: None,
            },
            paths: PathsConfig {
                allowed_roots: DEFAULT_ALLOWED_ROOTS.iter().map(PathBuf::from).collect(),
            },
            policy: PolicyConfig {
                private_repo_mode: false,
            },
            github: GitHubConfig {
                api_base: DEFAULT_API_BASE.to_string(),
                token_env: "GITHUB_TOKEN".to_string(),
                token_file: None,
                visibility_read_ttl_secs: DEFAULT_READ_TTL_SECS,
                visibility_write_ttl_secs: DEFAULT_WRITE_TTL_SECS,
                request_timeout_secs: 10,
            },
            git: GitConfig {
                timeout_seconds: 300,
            },
            audit: AuditConfig {
                enabled: true,
                log_path: None,
            },
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "listen_addr is not a socket address: {}",
                self.server.listen_addr
            )));
        }

        if self.paths.allowed_roots.is_empty() {
            return Err(ConfigError::InvalidValue(
                "allowed_roots must contain at least one directory".to_string(),
            ));
        }

        if let Some(root) = self.paths.allowed_roots.iter().find(|r| !r.is_absolute()) {
            return Err(ConfigError::InvalidValue(format!(
                "allowed_roots entries must be absolute: {}",
                root.display()
            )));
        }

        if !self.github.api_base.starts_with("https://") && !self.github.api_base.starts_with("http://") {
            return Err(ConfigError::InvalidValue(format!(
                "api_base must be an http(s) URL: {}",
                self.github.api_base
            )));
        }

        if self.github.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        // Validate git timeout
        if self.git.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidValue(self.server.listen_addr.clone()))
    }

    /// Get the session secret from environment variable or config
    pub fn session_secret(&self) -> Option<String> {
        // First try environment variable
        if let Ok(secret) = std::env::var(&self.auth.secret_env) {
            if !secret.is_empty() {
                return Some(secret);
            }
        }

        // Fall back to config file if present
        self.auth.secret.clone().filter(|s| !s.is_empty())
    }

    /// Whether private repo mode is on, after the environment override
    pub fn private_repo_mode(&self) -> bool {
        match std::env::var(PRIVATE_MODE_ENV) {
            Ok(value) => parse_flag(&value).unwrap_or(self.policy.private_repo_mode),
            Err(_) => self.policy.private_repo_mode,
        }
    }

    pub fn audit_log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.audit.log_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("audit.log")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
