//! Request validation for the git gateway
//!
//! Everything in here is a pure decision: no process is spawned and no
//! network call is made. A request reaches the executor only after its path
//! and arguments have both passed.

pub mod flags;
pub mod gh_api;
pub mod path;
pub mod validator;

pub use flags::{BLOCKED_GIT_FLAGS, normalize_flag, normalize_flag_for};
pub use gh_api::{GhApiAllowRule, GhApiError, GhApiPathValidator, GhApiTarget, HttpMethod, validate_gh_api_path};
pub use path::{DEFAULT_ALLOWED_ROOTS, PathValidationError, PathValidator, REPOS_PARENT_HINT};
pub use validator::{
    ArgumentValidator, OperationPolicy, ValidationError, allowed_operations, operation_policy,
    validate_git_args,
};
