//! Private-repository access policy
//!
//! When private mode is on, a container may only reach private or internal
//! repositories. The branch order below is the whole contract:
//! disabled → allow; owner/repo missing → deny; visibility unknown → deny;
//! public → deny; private/internal → allow.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::github::visibility::{RepoVisibilityChecker, Visibility};

/// Outcome of an access check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl AccessDecision {
    fn allow(reason: impl Into<String>, visibility: Option<Visibility>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            visibility,
            details: None,
        }
    }

    fn deny(reason: impl Into<String>, visibility: Option<Visibility>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            visibility,
            details: None,
        }
    }

    fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }
}

pub struct PrivateRepoPolicy {
    enabled: bool,
    checker: Arc<RepoVisibilityChecker>,
}

impl PrivateRepoPolicy {
    pub fn new(enabled: bool, checker: Arc<RepoVisibilityChecker>) -> Self {
        Self { enabled, checker }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn checker(&self) -> &Arc<RepoVisibilityChecker> {
        &self.checker
    }

    pub async fn check_repository_access(
        &self,
        operation: &str,
        owner: Option<&str>,
        repo: Option<&str>,
        for_write: bool,
    ) -> AccessDecision {
        if !self.enabled {
            return AccessDecision::allow("Private repo mode is disabled; policy not enforced", None);
        }

        let (owner, repo) = match (non_empty(owner), non_empty(repo)) {
            (Some(owner), Some(repo)) => (owner, repo),
            _ => {
                warn!(operation, "private repo policy: repository could not be identified");
                return AccessDecision::deny(
                    format!(
                        "Cannot {}: repository owner and name could not be determined",
                        operation
                    ),
                    None,
                );
            }
        };

        let visibility = self.checker.get_visibility(owner, repo, for_write).await;

        let decision = match visibility {
            None => AccessDecision::deny(
                format!(
                    "Cannot {} {}/{}: repository visibility could not be verified",
                    operation, owner, repo
                ),
                None,
            ),
            Some(Visibility::Public) => AccessDecision::deny(
                format!(
                    "Cannot {} {}/{}: private repo mode only allows private or internal repositories",
                    operation, owner, repo
                ),
                visibility,
            )
            .with_detail(
                "hint",
                json!("This gateway is restricted to private repositories. Use a private fork or ask an operator to disable private repo mode."),
            ),
            Some(v) => AccessDecision::allow(
                format!("Repository {}/{} is {}", owner, repo, v),
                visibility,
            ),
        };

        if decision.allowed {
            debug!(operation, owner, repo, ?visibility, "private repo policy: allowed");
        } else {
            warn!(operation, owner, repo, ?visibility, "private repo policy: denied");
        }

        decision
    }

    pub async fn check_push(&self, owner: Option<&str>, repo: Option<&str>) -> AccessDecision {
        self.check_repository_access("push", owner, repo, true).await
    }

    pub async fn check_fetch(&self, owner: Option<&str>, repo: Option<&str>) -> AccessDecision {
        self.check_repository_access("fetch", owner, repo, false).await
    }

    pub async fn check_clone(&self, owner: Option<&str>, repo: Option<&str>) -> AccessDecision {
        self.check_repository_access("clone", owner, repo, false).await
    }

    pub async fn check_pr_create(&self, owner: Option<&str>, repo: Option<&str>) -> AccessDecision {
        self.check_repository_access("create pull request", owner, repo, true)
            .await
    }

    pub async fn check_pr_comment(&self, owner: Option<&str>, repo: Option<&str>) -> AccessDecision {
        self.check_repository_access("comment", owner, repo, true).await
    }

    pub async fn check_issue(&self, owner: Option<&str>, repo: Option<&str>) -> AccessDecision {
        self.check_repository_access("modify issue", owner, repo, true)
            .await
    }

    pub async fn check_gh_execute(&self, owner: Option<&str>, repo: Option<&str>) -> AccessDecision {
        self.check_repository_access("run gh command", owner, repo, true)
            .await
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
