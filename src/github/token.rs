use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

/// Source of GitHub access tokens
///
/// Tokens are minted and refreshed elsewhere; the gateway only reads the
/// current one. `None` means no usable token right now.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn get_token(&self) -> Option<String>;
}

/// Reads the token from an environment variable, then from a file the
/// refresher keeps up to date
#[derive(Debug, Clone)]
pub struct EnvFileTokenSource {
    env_var: String,
    file: Option<PathBuf>,
}

impl EnvFileTokenSource {
    pub fn new(env_var: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            env_var: env_var.into(),
            file,
        }
    }
}

#[async_trait]
impl TokenSource for EnvFileTokenSource {
    async fn get_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(&self.env_var) {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }

        let file = self.file.as_ref()?;
        match tokio::fs::read_to_string(file).await {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) => {
                debug!(path = %file.display(), error = %e, "token file unavailable");
                None
            }
        }
    }
}

/// Fixed token, mostly for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct StaticTokenSource(Option<String>);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn empty() -> Self {
        Self(None)
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn get_token(&self) -> Option<String> {
        self.0.clone()
    }
}
