use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::security::flags::{flag_base, is_blocked_flag, normalize_flag_for};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Git operation not allowed: unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("Invalid argument type at position {index}: arguments must be strings")]
    InvalidArgumentType { index: usize },

    #[error(
        "Invalid numeric flag '{flag}' for '{operation}': numeric flags are only supported by 'log' (use --max-count=N)"
    )]
    NumericFlag { flag: String, operation: String },

    #[error("Flag '{0}' is blocked and not allowed for any operation")]
    BlockedFlag(String),

    #[error("Flag '{flag}' is not allowed for '{operation}'")]
    FlagNotAllowed { flag: String, operation: String },

    #[error("Refspec '{0}' forces an update and is not allowed; use --force-with-lease")]
    ForceRefspec(String),

    #[error("Refspec '{0}' deletes a remote ref and is not allowed")]
    DeleteRefspec(String),
}

impl ValidationError {
    /// Mistakes an honest caller makes, as opposed to attempts to get around the allowlist
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ValidationError::InvalidArgumentType { .. } | ValidationError::NumericFlag { .. }
        )
    }
}

/// Per-operation allowlist entry
#[derive(Debug, Clone)]
pub struct OperationPolicy {
    pub name: &'static str,
    pub allowed_flags: HashSet<&'static str>,
    pub is_network_operation: bool,
}

impl OperationPolicy {
    pub fn new(name: &'static str, allowed_flags: &[&'static str], is_network_operation: bool) -> Self {
        Self {
            name,
            allowed_flags: allowed_flags.iter().copied().collect(),
            is_network_operation,
        }
    }

    pub fn allows(&self, flag: &str) -> bool {
        self.allowed_flags.contains(flag)
    }
}

/// Allowlist of git operations and the flags each one accepts
///
/// Flags are listed in canonical form: the long form when the short flag has
/// a mapping, otherwise the short flag itself. An operation with an empty list
/// accepts no flags at all. Adding an entry requires security review.
const GIT_OPERATIONS: &[(&str, bool, &[&str])] = &[
    // Read operations
    (
        "status",
        false,
        &[
            "--short", "--branch", "--porcelain", "--long", "--verbose", "--untracked-files",
            "--ignored", "--ahead-behind", "--no-ahead-behind", "--show-stash", "--renames",
            "--no-renames", "-z",
        ],
    ),
    (
        "log",
        false,
        &[
            "--oneline", "--max-count", "--graph", "--all", "--decorate", "--no-decorate",
            "--stat", "--shortstat", "--name-only", "--name-status", "--patch", "--format",
            "--pretty", "--abbrev-commit", "--author", "--since", "--until", "--after",
            "--before", "--grep", "--first-parent", "--no-merges", "--merges", "--reverse",
            "--follow", "--date", "--skip", "--branches", "--remotes", "--tags",
            "--left-right", "--cherry-pick", "--source", "--color", "--no-color",
        ],
    ),
    (
        "diff",
        false,
        &[
            "--stat", "--shortstat", "--numstat", "--name-only", "--name-status", "--cached",
            "--staged", "--patch", "--no-patch", "--unified", "--word-diff", "--color",
            "--no-color", "--ignore-space-change", "--ignore-all-space", "--diff-filter",
            "--quiet", "--exit-code", "--check", "--merge-base", "--no-renames",
            "--find-renames", "--minimal",
        ],
    ),
    (
        "show",
        false,
        &[
            "--stat", "--shortstat", "--name-only", "--name-status", "--format", "--pretty",
            "--oneline", "--no-patch", "--patch", "--abbrev-commit", "--quiet", "--color",
            "--no-color",
        ],
    ),
    (
        "branch",
        false,
        &[
            "--list", "--all", "--remotes", "--verbose", "--delete", "--force", "-D", "--move",
            "--show-current", "--contains", "--merged", "--no-merged", "--sort",
            "--set-upstream-to", "--unset-upstream", "--track", "--no-track", "--format",
        ],
    ),
    (
        "rev-parse",
        false,
        &[
            "--abbrev-ref", "--short", "--verify", "--quiet", "--show-toplevel",
            "--show-prefix", "--show-cdup", "--is-inside-work-tree", "--is-bare-repository",
            "--symbolic-full-name",
        ],
    ),
    ("rev-list", false, &[
        "--count", "--max-count", "--all", "--reverse", "--left-right", "--first-parent",
        "--no-merges", "--since", "--until",
    ]),
    ("remote", false, &["--verbose"]),
    ("show-ref", false, &["--heads", "--tags", "--verify", "--hash", "--quiet"]),
    ("merge-base", false, &["--is-ancestor", "--all", "--fork-point"]),
    ("ls-files", false, &[
        "--cached", "--deleted", "--modified", "--others", "--ignored", "--exclude-standard",
        "--stage", "--unmerged", "--error-unmatch", "--full-name",
    ]),
    ("blame", false, &["--porcelain", "--line-porcelain", "-L", "-w", "--show-email", "--date"]),
    ("describe", false, &[
        "--tags", "--all", "--always", "--abbrev", "--long", "--dirty", "--exact-match",
        "--match", "--contains",
    ]),
    ("grep", false, &[
        "--line-number", "--ignore-case", "--count", "--files-with-matches", "--word-regexp",
        "--extended-regexp", "--fixed-strings", "--cached",
    ]),
    // Write operations
    ("add", false, &[
        "--all", "--update", "--dry-run", "--verbose", "--force", "--intent-to-add",
        "--renormalize",
    ]),
    ("commit", false, &[
        "--message", "--all", "--amend", "--no-edit", "--signoff", "--allow-empty",
        "--allow-empty-message", "--author", "--date", "--fixup", "--squash", "--no-verify",
        "--quiet", "--verbose",
    ]),
    ("checkout", false, &["-b", "-B", "--force", "--quiet", "--track", "--no-track", "--detach", "--orphan"]),
    ("switch", false, &[
        "--create", "--force-create", "--detach", "--discard-changes", "--track", "--no-track",
        "--quiet", "--orphan",
    ]),
    ("restore", false, &["--staged", "--worktree", "--source", "--quiet", "--ours", "--theirs"]),
    ("reset", false, &["--soft", "--mixed", "--hard", "--keep", "--merge", "--quiet"]),
    ("stash", false, &["--message", "--include-untracked", "--keep-index", "--staged", "--quiet"]),
    ("merge", false, &[
        "--no-ff", "--ff-only", "--ff", "--squash", "--no-commit", "--message", "--abort",
        "--continue", "--no-edit", "--quiet", "--verbose",
    ]),
    ("rebase", false, &[
        "--continue", "--abort", "--skip", "--onto", "--quiet", "--verbose", "--keep-empty",
        "--rebase-merges",
    ]),
    ("cherry-pick", false, &[
        "--continue", "--abort", "--skip", "--quit", "--no-commit", "--signoff", "--mainline",
        "--allow-empty",
    ]),
    ("tag", false, &[
        "--list", "--annotate", "--message", "--delete", "--force", "--sort", "--contains",
        "--points-at", "--format",
    ]),
    // Network operations: dedicated endpoints with credentials and repo policy
    ("fetch", true, &[
        "--all", "--prune", "--prune-tags", "--tags", "--no-tags", "--depth", "--unshallow",
        "--shallow-since", "--quiet", "--verbose", "--force", "--dry-run",
    ]),
    ("push", true, &[
        "--force-with-lease", "--set-upstream", "--dry-run", "--tags", "--follow-tags",
        "--atomic", "--porcelain", "--quiet", "--verbose",
    ]),
    ("ls-remote", true, &["--heads", "--tags", "--refs", "--quiet", "--symref", "--sort"]),
];

static DEFAULT_VALIDATOR: LazyLock<ArgumentValidator> = LazyLock::new(ArgumentValidator::new);

pub struct ArgumentValidator {
    policies: HashMap<&'static str, OperationPolicy>,
}

impl ArgumentValidator {
    pub fn new() -> Self {
        let policies = GIT_OPERATIONS
            .iter()
            .map(|(name, network, flags)| OperationPolicy::new(*name, flags, *network));
        Self::with_policies(policies)
    }

    /// Build a validator over a custom operation table
    pub fn with_policies<I>(policies: I) -> Self
    where
        I: IntoIterator<Item = OperationPolicy>,
    {
        Self {
            policies: policies.into_iter().map(|p| (p.name, p)).collect(),
        }
    }

    pub fn policy(&self, operation: &str) -> Option<&OperationPolicy> {
        self.policies.get(operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationPolicy> {
        self.policies.values()
    }

    /// Validate raw JSON arguments, rejecting anything that is not a string
    pub fn validate(&self, operation: &str, args: &[Value]) -> Result<Vec<String>, ValidationError> {
        let policy = self.require_policy(operation)?;

        args.iter()
            .enumerate()
            .map(|(index, arg)| {
                let arg = arg
                    .as_str()
                    .ok_or(ValidationError::InvalidArgumentType { index })?;
                Self::check_arg(policy, arg)
            })
            .collect()
    }

    /// Validate arguments that are already known to be strings
    pub fn validate_strs<S: AsRef<str>>(
        &self,
        operation: &str,
        args: &[S],
    ) -> Result<Vec<String>, ValidationError> {
        let policy = self.require_policy(operation)?;
        args.iter()
            .map(|arg| Self::check_arg(policy, arg.as_ref()))
            .collect()
    }

    fn require_policy(&self, operation: &str) -> Result<&OperationPolicy, ValidationError> {
        self.policies
            .get(operation)
            .ok_or_else(|| ValidationError::UnknownOperation(operation.to_string()))
    }

    /// Check one argument and return its normalized form
    fn check_arg(policy: &OperationPolicy, arg: &str) -> Result<String, ValidationError> {
        // A leading '+' on a push refspec is --force in disguise
        if policy.name == "push" && arg.starts_with('+') {
            return Err(ValidationError::ForceRefspec(arg.to_string()));
        }

        // An empty source (":branch") deletes the remote branch
        if policy.name == "push" && arg.starts_with(':') {
            return Err(ValidationError::DeleteRefspec(arg.to_string()));
        }

        // End-of-options separator and positionals are not flag-checked
        if arg == "--" || !arg.starts_with('-') {
            return Ok(arg.to_string());
        }

        if let Some(count) = numeric_flag_value(arg) {
            if policy.name == "log" {
                return Ok(format!("--max-count={}", count));
            }
            return Err(ValidationError::NumericFlag {
                flag: arg.to_string(),
                operation: policy.name.to_string(),
            });
        }

        let normalized = normalize_flag_for(policy.name, arg);
        let base = flag_base(&normalized);

        if is_blocked_flag(base) || is_blocked_flag(arg) {
            return Err(ValidationError::BlockedFlag(arg.to_string()));
        }

        if !policy.allows(base) {
            return Err(ValidationError::FlagNotAllowed {
                flag: arg.to_string(),
                operation: policy.name.to_string(),
            });
        }

        debug!(operation = policy.name, flag = %normalized, "flag allowed");
        Ok(normalized)
    }
}

impl Default for ArgumentValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// `-N` where N is all digits
fn numeric_flag_value(arg: &str) -> Option<&str> {
    let digits = arg.strip_prefix('-')?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

/// Validate arguments against the built-in operation table
pub fn validate_git_args(operation: &str, args: &[Value]) -> Result<Vec<String>, ValidationError> {
    DEFAULT_VALIDATOR.validate(operation, args)
}

/// Look up an operation in the built-in table
pub fn operation_policy(operation: &str) -> Option<&'static OperationPolicy> {
    DEFAULT_VALIDATOR.policy(operation)
}

/// Names of every operation in the built-in table
pub fn allowed_operations() -> Vec<&'static str> {
    GIT_OPERATIONS.iter().map(|(name, _, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::flags::BLOCKED_GIT_FLAGS;
    use serde_json::json;

    fn strs(args: &[&str]) -> Vec<Value> {
        args.iter().map(|a| json!(a)).collect()
    }

    #[test]
    fn test_validate_simple_args() {
        let result = validate_git_args("status", &strs(&["--short"]));
        assert_eq!(result.unwrap(), vec!["--short"]);
    }

    #[test]
    fn test_unknown_operation() {
        let result = validate_git_args("filter-branch", &[]);
        assert!(matches!(
            result.unwrap_err(),
            ValidationError::UnknownOperation(_)
        ));
    }

    #[test]
    fn test_unknown_operation_message() {
        let err = validate_git_args("gc", &[]).unwrap_err();
        assert!(err.to_string().contains("unknown operation"));
    }

    #[test]
    fn test_nested_argument_rejected() {
        let result = validate_git_args("log", &[json!("--oneline"), json!(["--exec", "sh"])]);
        assert_eq!(
            result.unwrap_err(),
            ValidationError::InvalidArgumentType { index: 1 }
        );

        let result = validate_git_args("log", &[json!({"flag": "--oneline"})]);
        assert!(result.unwrap_err().to_string().contains("Invalid argument type"));

        let result = validate_git_args("log", &[json!(5)]);
        assert!(matches!(
            result.unwrap_err(),
            ValidationError::InvalidArgumentType { .. }
        ));
    }

    #[test]
    fn test_positional_args_pass_through() {
        let result = validate_git_args("checkout", &strs(&["-b", "feature/x", "origin/main"]));
        assert_eq!(result.unwrap(), vec!["-b", "feature/x", "origin/main"]);
    }

    #[test]
    fn test_separator_allowed_for_every_operation() {
        let validator = ArgumentValidator::new();
        for policy in validator.operations() {
            let result = validator.validate(policy.name, &strs(&["--"]));
            assert!(result.is_ok(), "'--' rejected for {}", policy.name);
        }
    }

    #[test]
    fn test_numeric_flag_on_log() {
        let result = validate_git_args("log", &strs(&["-5"]));
        assert_eq!(result.unwrap(), vec!["--max-count=5"]);

        let result = validate_git_args("log", &strs(&["--oneline", "-10"]));
        assert_eq!(result.unwrap(), vec!["--oneline", "--max-count=10"]);
    }

    #[test]
    fn test_numeric_flag_elsewhere() {
        let err = validate_git_args("status", &strs(&["-5"])).unwrap_err();
        assert!(err.to_string().contains("numeric flag"));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_log_n_is_max_count() {
        let result = validate_git_args("log", &strs(&["-n", "3"]));
        assert_eq!(result.unwrap(), vec!["--max-count", "3"]);
    }

    #[test]
    fn test_short_flag_normalized() {
        let result = validate_git_args("commit", &strs(&["-m", "fix: typo"]));
        assert_eq!(result.unwrap(), vec!["--message", "fix: typo"]);

        let result = validate_git_args("push", &strs(&["-u", "origin", "main"]));
        assert_eq!(result.unwrap(), vec!["--set-upstream", "origin", "main"]);
    }

    #[test]
    fn test_flag_with_value() {
        let result = validate_git_args("log", &strs(&["--format=%H %s"]));
        assert_eq!(result.unwrap(), vec!["--format=%H %s"]);
    }

    #[test]
    fn test_blocked_flags() {
        let result = validate_git_args("fetch", &strs(&["--upload-pack=/tmp/x"]));
        assert!(matches!(result.unwrap_err(), ValidationError::BlockedFlag(_)));

        let result = validate_git_args("status", &strs(&["-c"]));
        assert!(matches!(result.unwrap_err(), ValidationError::BlockedFlag(_)));

        let result = validate_git_args("rebase", &strs(&["--EXEC=sh"]));
        assert!(matches!(result.unwrap_err(), ValidationError::BlockedFlag(_)));
    }

    #[test]
    fn test_blocked_message() {
        let err = validate_git_args("log", &strs(&["--output=/etc/passwd"])).unwrap_err();
        assert!(err.to_string().contains("blocked"));
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn test_unlisted_flag_rejected() {
        let result = validate_git_args("status", &strs(&["--oneline"]));
        assert!(matches!(
            result.unwrap_err(),
            ValidationError::FlagNotAllowed { .. }
        ));

        // -f maps to --force, which push does not allow
        let result = validate_git_args("push", &strs(&["-f"]));
        assert!(matches!(
            result.unwrap_err(),
            ValidationError::FlagNotAllowed { .. }
        ));
    }

    #[test]
    fn test_combined_short_flags_rejected() {
        let result = validate_git_args("branch", &strs(&["-av"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_operation_without_flags_accepts_none() {
        let validator = ArgumentValidator::with_policies([OperationPolicy::new("gc", &[], false)]);
        assert!(validator.validate_strs("gc", &["--aggressive"]).is_err());
        assert!(validator.validate_strs("gc", &["--"]).is_ok());
    }

    #[test]
    fn test_blocklist_wins_over_allowlist() {
        let validator = ArgumentValidator::with_policies([OperationPolicy::new(
            "fetch",
            &["--upload-pack", "-c", "--all"],
            true,
        )]);

        for flag in ["--upload-pack=evil", "-c", "-C"] {
            let result = validator.validate_strs("fetch", &[flag]);
            assert!(
                matches!(result, Err(ValidationError::BlockedFlag(_))),
                "{} should be blocked",
                flag
            );
        }
        assert!(validator.validate_strs("fetch", &["--all"]).is_ok());
    }

    #[test]
    fn test_no_operation_allows_a_blocked_flag() {
        let validator = ArgumentValidator::new();
        for policy in validator.operations() {
            for flag in BLOCKED_GIT_FLAGS {
                let result = validator.validate_strs(policy.name, &[*flag]);
                assert!(result.is_err(), "{} accepted {}", policy.name, flag);
            }
        }
    }

    #[test]
    fn test_network_operations() {
        for op in ["push", "fetch", "ls-remote"] {
            assert!(operation_policy(op).unwrap().is_network_operation);
        }
        assert!(!operation_policy("status").unwrap().is_network_operation);
    }

    #[test]
    fn test_force_refspec_rejected_for_push() {
        let validator = ArgumentValidator::new();
        assert_eq!(
            validator.validate_strs("push", &["+main:main"]),
            Err(ValidationError::ForceRefspec("+main:main".to_string()))
        );
        assert!(validator.validate_strs("push", &["main:main"]).is_ok());
        assert!(validator.validate_strs("fetch", &["+refs/heads/*:refs/remotes/origin/*"]).is_ok());
    }

    #[test]
    fn test_delete_refspec_rejected_for_push() {
        let validator = ArgumentValidator::new();
        assert_eq!(
            validator.validate_strs("push", &[":main"]),
            Err(ValidationError::DeleteRefspec(":main".to_string()))
        );
        assert_eq!(
            validator.validate_strs("push", &["--", ":refs/tags/v1"]),
            Err(ValidationError::DeleteRefspec(":refs/tags/v1".to_string()))
        );
        assert!(!ValidationError::DeleteRefspec(":main".to_string()).is_malformed());
        assert!(validator.validate_strs("push", &["HEAD:main"]).is_ok());
        assert!(validator.validate_strs("fetch", &["main:refs/remotes/origin/main"]).is_ok());
    }
}
