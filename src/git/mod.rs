pub mod credential;
pub mod executor;
pub mod url;

// Re-export commonly used types
pub use credential::{
    ASKPASS_USERNAME, CredentialHelper, cleanup_credential_helper, create_credential_helper,
};
pub use executor::{
    CommandExecutor, CommandOutput, CommandRequest, ExecutorError, ProcessExecutor, Program,
};
pub use url::{parse_github_repo, ssh_to_https};
