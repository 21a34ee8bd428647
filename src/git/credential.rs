//! Single-use askpass helpers
//!
//! Git asks `GIT_ASKPASS` for credentials instead of prompting. The helper
//! script written here answers from `GIT_USERNAME` / `GIT_PASSWORD` in its own
//! environment, so the token never appears in argv or on disk. The helper is
//! owned by a guard that deletes it when dropped.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Username GitHub expects when an installation token is used as a password
pub const ASKPASS_USERNAME: &str = "x-access-token";

const ASKPASS_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
    Username*) printf '%s\n' "$GIT_USERNAME" ;;
    *) printf '%s\n' "$GIT_PASSWORD" ;;
esac
"#;

/// Guard over a generated askpass script; the file is removed on drop
#[derive(Debug)]
pub struct CredentialHelper {
    path: PathBuf,
    armed: bool,
}

impl CredentialHelper {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the helper now rather than at end of scope
    pub fn cleanup(mut self) {
        self.armed = false;
        cleanup_credential_helper(Some(&self.path));
    }
}

impl Drop for CredentialHelper {
    fn drop(&mut self) {
        if self.armed {
            cleanup_credential_helper(Some(&self.path));
        }
    }
}

/// Write an askpass helper and return it with a copy of `base_env` wired to use it
pub fn create_credential_helper(
    token: &str,
    base_env: &HashMap<String, String>,
) -> io::Result<(CredentialHelper, HashMap<String, String>)> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("jib-askpass-").suffix(".sh");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o700));
    }

    let mut file = builder.tempfile()?;
    file.write_all(ASKPASS_SCRIPT.as_bytes())?;
    file.flush()?;

    // Close the handle before git tries to exec the script (ETXTBSY otherwise)
    let path = file.into_temp_path().keep()?;
    let helper = CredentialHelper { path, armed: true };

    let mut env = base_env.clone();
    env.insert(
        "GIT_ASKPASS".to_string(),
        helper.path.to_string_lossy().into_owned(),
    );
    env.insert("GIT_USERNAME".to_string(), ASKPASS_USERNAME.to_string());
    env.insert("GIT_PASSWORD".to_string(), token.to_string());
    env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());

    debug!(path = %helper.path.display(), "created credential helper");
    Ok((helper, env))
}

/// Delete a helper script; missing files and `None` are fine
pub fn cleanup_credential_helper(path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };

    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed credential helper"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove credential helper"),
    }
}
