use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::GatewayState;
use super::response::ApiResponse;
use super::session::Session;
use crate::audit::AuditEntry;
use crate::error::{GatewayError, GatewayResult};
use crate::git::credential::{CredentialHelper, create_credential_helper};
use crate::git::executor::{CommandOutput, CommandRequest};
use crate::git::url::{parse_github_repo, ssh_to_https};
use crate::github::policy::{AccessDecision, PrivateRepoPolicy};
use crate::security::gh_api::{GhApiTarget, HttpMethod};
use crate::security::path::{PathValidator, REPOS_PARENT_HINT};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env-only git config applied to every git command. Hooks and fsmonitor
/// programs configured inside the container must not run on the gateway host.
const HARDENED_GIT_CONFIG: &[(&str, &str)] = &[
    ("core.hooksPath", "/dev/null"),
    ("core.fsmonitor", "false"),
];

/// Added for network operations: SSH GitHub remotes are fetched over HTTPS
/// so the askpass token applies, and no inherited credential helper is
/// consulted.
const NETWORK_GIT_CONFIG: &[(&str, &str)] = &[
    ("url.https://github.com/.insteadOf", "git@github.com:"),
    ("url.https://github.com/.insteadOf", "ssh://git@github.com/"),
    ("credential.helper", ""),
];

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct GitExecuteRequest {
    pub repo_path: Option<String>,
    pub operation: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkRequest {
    pub repo_path: Option<String>,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct GhApiRequest {
    pub path: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub body: Option<Value>,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

/// GET /api/v1/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: VERSION,
    })
}

/// POST /api/v1/git/execute
pub async fn git_execute(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<ApiResponse> {
    let session = authenticate(&state, &headers)?;
    let request: GitExecuteRequest = parse_body(&body)?;

    let operation = request.operation.clone().unwrap_or_default();
    let prepared = prepare_execute(&state, &request);
    audit(
        &state,
        &session,
        request.repo_path.as_deref(),
        &operation,
        &display_args(&request.args),
        prepared.as_ref().map(|_| ()),
    )
    .await;

    let output = state.executor.execute(prepared?).await?;
    Ok(command_response(&operation, output, None))
}

/// POST /api/v1/git/push
pub async fn git_push(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<ApiResponse> {
    run_network(state, headers, body, "push").await
}

/// POST /api/v1/git/fetch
pub async fn git_fetch(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<ApiResponse> {
    run_network(state, headers, body, "fetch").await
}

/// POST /api/v1/git/ls-remote
pub async fn git_ls_remote(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<ApiResponse> {
    run_network(state, headers, body, "ls-remote").await
}

/// POST /api/v1/gh/api
pub async fn gh_api(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<ApiResponse> {
    let session = authenticate(&state, &headers)?;
    let request: GhApiRequest = parse_body(&body)?;

    let operation = format!("gh-api {}", request.method.to_ascii_uppercase());
    let prepared = prepare_gh_api(&state, &request).await;
    audit(
        &state,
        &session,
        request.path.as_deref(),
        &operation,
        &[],
        prepared.as_ref().map(|_| ()),
    )
    .await;

    let output = state.executor.execute(prepared?).await?;

    // gh prints the response body; hand JSON back as JSON
    let response = serde_json::from_str::<Value>(&output.stdout)
        .unwrap_or_else(|_| Value::String(output.stdout.clone()));
    let message = if output.success {
        "gh api request completed".to_string()
    } else {
        format!("gh api request failed with exit code {}", output.exit_code)
    };

    Ok(ApiResponse::new(
        output.success,
        message,
        Some(json!({
            "response": response,
            "stderr": output.stderr,
            "exit_code": output.exit_code,
        })),
    ))
}

fn authenticate(state: &GatewayState, headers: &HeaderMap) -> GatewayResult<Session> {
    let (valid, session) = state.sessions.validate_session_for_request(headers);
    if !valid {
        warn!("rejected request with invalid session");
        return Err(GatewayError::Unauthenticated(
            "Authentication required. Provide Authorization: Bearer <secret> or X-API-Key header."
                .to_string(),
        ));
    }
    Ok(session.unwrap_or_default())
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> GatewayResult<T> {
    if body.is_empty() {
        return Err(GatewayError::malformed("Request body is required"));
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::malformed(format!("Invalid request body: {}", e)))
}

/// Path checks shared by every repository endpoint
fn check_repo_path(paths: &PathValidator, raw: Option<&str>) -> GatewayResult<PathBuf> {
    if let Some(raw) = raw {
        if paths.is_repos_parent_directory(raw) {
            return Err(GatewayError::ambiguous(
                format!(
                    "repo_path '{}' is the directory that holds repositories, not itself a git repository",
                    raw
                ),
                REPOS_PARENT_HINT,
            ));
        }
    }
    Ok(paths.validate_repo_path(raw)?)
}

fn prepare_execute(state: &GatewayState, request: &GitExecuteRequest) -> GatewayResult<CommandRequest> {
    let repo_path = check_repo_path(&state.paths, request.repo_path.as_deref())?;

    let operation = match request.operation.as_deref().map(str::trim) {
        Some(op) if !op.is_empty() => op,
        _ => return Err(GatewayError::malformed("operation is required")),
    };

    if state
        .args
        .policy(operation)
        .is_some_and(|policy| policy.is_network_operation)
    {
        return Err(GatewayError::ambiguous(
            format!("'{}' is a network operation and has its own endpoint", operation),
            format!("Use POST /api/v1/git/{}", operation),
        ));
    }

    let args = state.args.validate(operation, &request.args)?;

    Ok(CommandRequest::git(std::iter::once(operation.to_string()).chain(args))
        .current_dir(repo_path)
        .envs(local_env(&state.base_env)))
}

struct PreparedNetwork {
    command: CommandRequest,
    helper: Option<CredentialHelper>,
    remote_urls: Vec<String>,
}

async fn run_network(
    state: Arc<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
    operation: &'static str,
) -> GatewayResult<ApiResponse> {
    let session = authenticate(&state, &headers)?;
    let request: NetworkRequest = parse_body(&body)?;

    let prepared = prepare_network(&state, &request, operation).await;
    audit(
        &state,
        &session,
        request.repo_path.as_deref(),
        operation,
        &display_args(&request.args),
        prepared.as_ref().map(|_| ()),
    )
    .await;
    let PreparedNetwork {
        command,
        helper,
        remote_urls,
    } = prepared?;

    let output = state.executor.execute(command).await;
    // Removed whether or not the command ran
    drop(helper);
    let output = output?;

    Ok(command_response(
        operation,
        output,
        Some(json!({ "remote": request.remote, "remote_urls": remote_urls })),
    ))
}

async fn prepare_network(
    state: &GatewayState,
    request: &NetworkRequest,
    operation: &'static str,
) -> GatewayResult<PreparedNetwork> {
    let repo_path = check_repo_path(&state.paths, request.repo_path.as_deref())?;
    let args = state.args.validate(operation, &request.args)?;

    let remote = request.remote.trim();
    if !is_valid_remote_name(remote) {
        return Err(GatewayError::malformed(format!(
            "Invalid remote name '{}'",
            request.remote
        )));
    }

    // Every URL git may contact must pass; a push goes to all push URLs
    let remote_urls = resolve_remote_urls(state, &repo_path, remote, operation).await?;
    let mut all_github = true;
    for remote_url in &remote_urls {
        let repository = parse_github_repo(remote_url);
        all_github &= repository.is_some();
        let (owner, repo) = match &repository {
            Some((owner, repo)) => (Some(owner.as_str()), Some(repo.as_str())),
            None => (None, None),
        };

        let decision = match operation {
            "push" => state.policy.check_push(owner, repo).await,
            _ => state.policy.check_fetch(owner, repo).await,
        };
        if !decision.allowed {
            return Err(decision.into());
        }
    }

    let mut command_args = vec![operation.to_string(), remote.to_string()];
    command_args.extend(args);

    let env = network_env(&state.base_env);
    // The askpass helper answers any host, so only GitHub destinations get it
    let token = if all_github {
        state.tokens.get_token().await
    } else {
        None
    };
    let (helper, env) = match token {
        Some(token) => {
            let (helper, env) = create_credential_helper(&token, &env).map_err(|e| {
                error!(error = %e, "failed to create credential helper");
                GatewayError::Internal("Failed to prepare git credentials".to_string())
            })?;
            (Some(helper), env)
        }
        None => {
            warn!(operation, ?remote_urls, "running network operation without credentials");
            (None, env)
        }
    };

    Ok(PreparedNetwork {
        command: CommandRequest::git(command_args)
            .current_dir(repo_path)
            .envs(env),
        helper,
        remote_urls,
    })
}

/// URLs the operation will contact, as git itself resolves them.
///
/// Push uses `--push` so `remote.<name>.pushurl` and `pushInsteadOf` are
/// honored. The network config is applied so URL rewrites match the real run.
async fn resolve_remote_urls(
    state: &GatewayState,
    repo_path: &Path,
    remote: &str,
    operation: &str,
) -> GatewayResult<Vec<String>> {
    let mut args = vec!["remote", "get-url", "--all"];
    if operation == "push" {
        args.push("--push");
    }
    args.push(remote);

    let command = CommandRequest::git(args)
        .current_dir(repo_path)
        .envs(network_env(&state.base_env));
    let output = state.executor.execute(command).await?;

    let urls = parse_remote_urls(&output.stdout);
    if !output.success || urls.is_empty() {
        return Err(GatewayError::malformed(format!(
            "Remote '{}' is not configured for this repository",
            remote
        )));
    }
    Ok(urls)
}

fn parse_remote_urls(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ssh_to_https)
        .collect()
}

/// `[A-Za-z0-9._-]+`, and never something git would read as an option
fn is_valid_remote_name(remote: &str) -> bool {
    !remote.is_empty()
        && !remote.starts_with('-')
        && remote
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

async fn prepare_gh_api(state: &GatewayState, request: &GhApiRequest) -> GatewayResult<CommandRequest> {
    let target = state
        .gh_api
        .validate(request.path.as_deref().unwrap_or_default(), &request.method)?;

    if request.body.is_some() && target.method == HttpMethod::Get {
        return Err(GatewayError::malformed(
            "A request body is only accepted for POST and PATCH",
        ));
    }

    if let Some((owner, repo)) = &target.repository {
        let decision = check_gh_api_access(&state.policy, &target, owner, repo).await;
        if !decision.allowed {
            return Err(decision.into());
        }
    }

    let token = state.tokens.get_token().await.ok_or_else(|| {
        warn!("no GitHub token available for gh api");
        GatewayError::Internal("GitHub token is not available".to_string())
    })?;

    let mut args = vec![
        "api".to_string(),
        "--method".to_string(),
        target.method.as_str().to_string(),
        target.path.clone(),
    ];

    let mut env = state.base_env.clone();
    env.insert("GH_TOKEN".to_string(), token);
    env.insert("GH_PROMPT_DISABLED".to_string(), "1".to_string());
    env.insert("GH_NO_UPDATE_NOTIFIER".to_string(), "1".to_string());

    let command = match &request.body {
        Some(body) => {
            args.extend(["--input".to_string(), "-".to_string()]);
            CommandRequest::gh(args).envs(env).stdin(body.to_string())
        }
        None => CommandRequest::gh(args).envs(env),
    };

    Ok(command)
}

/// Pick the repository check that matches what the API call does
async fn check_gh_api_access(
    policy: &PrivateRepoPolicy,
    target: &GhApiTarget,
    owner: &str,
    repo: &str,
) -> AccessDecision {
    let (owner, repo) = (Some(owner), Some(repo));
    match target.method {
        HttpMethod::Get => policy.check_repository_access("read", owner, repo, false).await,
        HttpMethod::Post if target.pattern.ends_with("/pulls") => {
            policy.check_pr_create(owner, repo).await
        }
        HttpMethod::Post if target.pattern.ends_with("/comments") => {
            policy.check_pr_comment(owner, repo).await
        }
        _ if target.pattern.contains("/issues") => policy.check_issue(owner, repo).await,
        _ => policy.check_gh_execute(owner, repo).await,
    }
}

fn local_env(base: &HashMap<String, String>) -> HashMap<String, String> {
    git_env(base, HARDENED_GIT_CONFIG.iter())
}

fn network_env(base: &HashMap<String, String>) -> HashMap<String, String> {
    git_env(base, HARDENED_GIT_CONFIG.iter().chain(NETWORK_GIT_CONFIG))
}

/// `base` plus `GIT_CONFIG_COUNT`/`KEY_i`/`VALUE_i`; env config outranks
/// every config file in the repository
fn git_env<'a>(
    base: &HashMap<String, String>,
    config: impl Iterator<Item = &'a (&'a str, &'a str)>,
) -> HashMap<String, String> {
    let mut env = base.clone();
    env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());

    let mut count = 0;
    for (i, (key, value)) in config.enumerate() {
        env.insert(format!("GIT_CONFIG_KEY_{}", i), key.to_string());
        env.insert(format!("GIT_CONFIG_VALUE_{}", i), value.to_string());
        count = i + 1;
    }
    env.insert("GIT_CONFIG_COUNT".to_string(), count.to_string());
    env
}

fn command_response(operation: &str, output: CommandOutput, extra: Option<Value>) -> ApiResponse {
    let message = if output.success {
        format!("git {} completed", operation)
    } else {
        format!("git {} failed with exit code {}", operation, output.exit_code)
    };

    let mut data = json!({
        "stdout": output.stdout,
        "stderr": output.stderr,
        "exit_code": output.exit_code,
    });
    if let (Some(Value::Object(extra)), Value::Object(map)) = (extra, &mut data) {
        map.extend(extra);
    }

    ApiResponse::new(output.success, message, Some(data))
}

fn display_args(args: &[Value]) -> Vec<String> {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

async fn audit(
    state: &GatewayState,
    session: &Session,
    repo_path: Option<&str>,
    operation: &str,
    args: &[String],
    outcome: Result<(), &GatewayError>,
) {
    let container = session.container_id.as_deref();
    let reason = match outcome {
        Ok(()) => {
            info!(container, operation, repo_path, "request allowed");
            "validated".to_string()
        }
        Err(err) => {
            warn!(container, operation, repo_path, error = %err, "request denied");
            err.to_string()
        }
    };

    if let Some(logger) = &state.audit {
        logger
            .record(AuditEntry {
                container,
                repo_path: repo_path.unwrap_or("-"),
                allowed: outcome.is_ok(),
                operation,
                args,
                reason: &reason,
            })
            .await;
    }
}
