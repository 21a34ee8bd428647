pub mod settings;

pub use settings::{
    AuditConfig, AuthConfig, Config, ConfigError, GitConfig, GitHubConfig, PathsConfig,
    PolicyConfig, ServerConfig,
};
