#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use jib_gateway::audit::AuditLogger;
use jib_gateway::gateway::{GatewayState, SharedSecretValidator, router};
use jib_gateway::git::{CommandExecutor, CommandOutput, CommandRequest, ExecutorError};
use jib_gateway::github::{
    GitHubError, PrivateRepoPolicy, RepoVisibilityChecker, StaticTokenSource, Visibility,
    VisibilityApi,
};
use jib_gateway::security::{ArgumentValidator, GhApiPathValidator, PathValidator};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "test-secret";
pub const CONTAINER: &str = "jib-test-container";
pub const GITHUB_TOKEN: &str = "ghs_test_token";

/// Records every command instead of running it
pub struct MockExecutor {
    remote_url: String,
    push_urls: Option<String>,
    stdout: String,
    requests: Mutex<Vec<CommandRequest>>,
    askpass_seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl MockExecutor {
    pub fn new(remote_url: &str, stdout: &str) -> Self {
        Self {
            remote_url: remote_url.to_string(),
            push_urls: None,
            stdout: stdout.to_string(),
            requests: Mutex::new(Vec::new()),
            askpass_seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer `remote get-url --push` with these lines instead of the fetch URL
    pub fn with_push_urls(mut self, push_urls: &[&str]) -> Self {
        self.push_urls = Some(push_urls.join("\n"));
        self
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Askpass helpers seen during execution, and whether each existed then
    pub fn askpass_seen(&self) -> Vec<(PathBuf, bool)> {
        self.askpass_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, request: CommandRequest) -> Result<CommandOutput, ExecutorError> {
        if let Some(askpass) = request.env.get("GIT_ASKPASS") {
            let path = PathBuf::from(askpass);
            let exists = path.exists();
            self.askpass_seen.lock().unwrap().push((path, exists));
        }

        let stdout = if request.args.first().map(String::as_str) == Some("remote") {
            match &self.push_urls {
                Some(push_urls) if request.args.iter().any(|arg| arg == "--push") => {
                    format!("{}\n", push_urls)
                }
                _ => format!("{}\n", self.remote_url),
            }
        } else {
            self.stdout.clone()
        };

        self.requests.lock().unwrap().push(request);
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: 0,
            success: true,
        })
    }
}

/// Upstream with one default visibility and per-repository overrides.
/// A `None` default fails the lookup.
pub struct VisibilityTable {
    pub default: Option<Visibility>,
    pub overrides: HashMap<String, Visibility>,
}

#[async_trait]
impl VisibilityApi for VisibilityTable {
    async fn fetch_visibility(
        &self,
        owner: &str,
        repo: &str,
        _token: &str,
    ) -> Result<Option<Visibility>, GitHubError> {
        let key = format!("{}/{}", owner, repo).to_lowercase();
        match self.overrides.get(&key).copied().or(self.default) {
            Some(v) => Ok(Some(v)),
            None => Err(GitHubError::Status(502)),
        }
    }
}

/// Values set for `key` through `GIT_CONFIG_COUNT`/`KEY_i`/`VALUE_i`
pub fn git_config(env: &HashMap<String, String>, key: &str) -> Vec<String> {
    let count: usize = env
        .get("GIT_CONFIG_COUNT")
        .map(|count| count.parse().unwrap())
        .unwrap_or(0);
    (0..count)
        .filter(|i| env[&format!("GIT_CONFIG_KEY_{}", i)] == key)
        .map(|i| env[&format!("GIT_CONFIG_VALUE_{}", i)].clone())
        .collect()
}

pub struct TestGateway {
    pub root: TempDir,
    pub repos: PathBuf,
    pub repo: PathBuf,
    pub executor: Arc<MockExecutor>,
    pub audit_path: PathBuf,
    pub app: Router,
}

pub struct GatewayOptions {
    pub private_mode: bool,
    pub visibility: Option<Visibility>,
    pub visibility_overrides: Vec<(&'static str, Visibility)>,
    pub remote_url: String,
    pub push_urls: Option<Vec<&'static str>>,
    pub stdout: String,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            private_mode: false,
            visibility: Some(Visibility::Private),
            visibility_overrides: Vec::new(),
            remote_url: "git@github.com:acme/widgets.git".to_string(),
            push_urls: None,
            stdout: "ok\n".to_string(),
        }
    }
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with_options(GatewayOptions::default())
    }

    pub fn private_mode(visibility: Option<Visibility>) -> Self {
        Self::with_options(GatewayOptions {
            private_mode: true,
            visibility,
            ..GatewayOptions::default()
        })
    }

    pub fn with_options(options: GatewayOptions) -> Self {
        let root = TempDir::new().unwrap();
        let repos = root.path().join("repos");
        let repo = repos.join("project");
        fs::create_dir_all(&repo).unwrap();
        let audit_path = root.path().join("audit.log");

        let mut executor = MockExecutor::new(&options.remote_url, &options.stdout);
        if let Some(push_urls) = &options.push_urls {
            executor = executor.with_push_urls(push_urls);
        }
        let executor = Arc::new(executor);

        let tokens = Arc::new(StaticTokenSource::new(GITHUB_TOKEN));
        let upstream = VisibilityTable {
            default: options.visibility,
            overrides: options
                .visibility_overrides
                .iter()
                .map(|(repo, visibility)| (repo.to_lowercase(), *visibility))
                .collect(),
        };
        let checker = RepoVisibilityChecker::new(Arc::new(upstream), tokens.clone());

        let state = GatewayState {
            paths: PathValidator::new([repos.as_path(), Path::new("/home/jib/repos")]),
            args: ArgumentValidator::new(),
            gh_api: GhApiPathValidator::new(),
            policy: Arc::new(PrivateRepoPolicy::new(options.private_mode, Arc::new(checker))),
            tokens,
            executor: executor.clone(),
            sessions: Arc::new(SharedSecretValidator::new(Some(SECRET.to_string()))),
            audit: Some(AuditLogger::with_path(&audit_path).unwrap()),
            base_env: Default::default(),
        };

        let repo = fs::canonicalize(&repo).unwrap();
        let repos = fs::canonicalize(&repos).unwrap();

        Self {
            root,
            repos,
            repo,
            executor,
            audit_path,
            app: router(Arc::new(state)),
        }
    }

    pub fn repo_str(&self) -> String {
        self.repo.display().to_string()
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", SECRET))
            .header("x-container-id", CONTAINER)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_raw(&self, uri: &str, body: &str, auth: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = auth {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub fn audit_log(&self) -> String {
        fs::read_to_string(&self.audit_path).unwrap_or_default()
    }
}
