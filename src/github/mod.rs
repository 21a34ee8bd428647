pub mod client;
pub mod policy;
pub mod token;
pub mod visibility;

pub use client::{DEFAULT_API_BASE, GitHubClient, GitHubError, VisibilityApi};
pub use policy::{AccessDecision, PrivateRepoPolicy};
pub use token::{EnvFileTokenSource, StaticTokenSource, TokenSource};
pub use visibility::{CachedVisibility, RepoVisibilityChecker, Visibility};
