//! HTTP surface of the gateway
//!
//! Handlers only sequence the checks in `security` and `github` and hand the
//! result to the executor; they make no allow/deny decisions of their own.

pub mod handlers;
pub mod response;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use chrono::TimeDelta;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::config::{Config, ConfigError};
use crate::git::executor::CommandExecutor;
use crate::github::client::VisibilityApi;
use crate::github::policy::PrivateRepoPolicy;
use crate::github::token::TokenSource;
use crate::github::visibility::RepoVisibilityChecker;
use crate::security::gh_api::GhApiPathValidator;
use crate::security::path::PathValidator;
use crate::security::validator::ArgumentValidator;

pub use response::ApiResponse;
pub use session::{Session, SessionValidator, SharedSecretValidator};

/// Variables passed through from the gateway's own environment to git/gh
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "TZ"];

/// Everything a request handler needs, shared across requests
pub struct GatewayState {
    pub paths: PathValidator,
    pub args: ArgumentValidator,
    pub gh_api: GhApiPathValidator,
    pub policy: Arc<PrivateRepoPolicy>,
    pub tokens: Arc<dyn TokenSource>,
    pub executor: Arc<dyn CommandExecutor>,
    pub sessions: Arc<dyn SessionValidator>,
    pub audit: Option<AuditLogger>,
    /// Environment every child process starts from
    pub base_env: HashMap<String, String>,
}

impl GatewayState {
    /// Wire up the gateway from configuration and its external collaborators
    pub fn from_config(
        config: &Config,
        api: Arc<dyn VisibilityApi>,
        tokens: Arc<dyn TokenSource>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self, ConfigError> {
        let checker = RepoVisibilityChecker::new(api, tokens.clone())
            .with_ttls(
                TimeDelta::seconds(config.github.visibility_read_ttl_secs),
                TimeDelta::seconds(config.github.visibility_write_ttl_secs),
            )
            .with_lookup_timeout(Duration::from_secs(config.github.request_timeout_secs));

        let private_mode = config.private_repo_mode();
        info!(private_mode, "private repo policy configured");

        let secret = config.session_secret();
        if secret.is_none() {
            warn!(
                env = %config.auth.secret_env,
                "no session secret configured; every request will be rejected"
            );
        }

        let audit = if config.audit.enabled {
            Some(AuditLogger::with_path(config.audit_log_path()?)?)
        } else {
            None
        };

        Ok(Self {
            paths: PathValidator::new(&config.paths.allowed_roots),
            args: ArgumentValidator::new(),
            gh_api: GhApiPathValidator::new(),
            policy: Arc::new(PrivateRepoPolicy::new(private_mode, Arc::new(checker))),
            tokens,
            executor,
            sessions: Arc::new(SharedSecretValidator::new(secret)),
            audit,
            base_env: inherited_env(),
        })
    }
}

/// The subset of the gateway's environment children are allowed to see
pub fn inherited_env() -> HashMap<String, String> {
    PASSTHROUGH_ENV
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
        .collect()
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/git/execute", post(handlers::git_execute))
        .route("/api/v1/git/push", post(handlers::git_push))
        .route("/api/v1/git/fetch", post(handlers::git_fetch))
        .route("/api/v1/git/ls-remote", post(handlers::git_ls_remote))
        .route("/api/v1/gh/api", post(handlers::gh_api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
