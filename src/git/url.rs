const GITHUB_HTTPS: &str = "https://github.com/";
const SSH_SCP_PREFIX: &str = "git@github.com:";
const SSH_URL_PREFIX: &str = "ssh://git@github.com/";

/// Rewrite a GitHub SSH remote as HTTPS so token auth applies
///
/// `git@github.com:owner/repo(.git)` and `ssh://git@github.com/owner/repo(.git)`
/// become `https://github.com/owner/repo.git`. Anything else, including URLs
/// that are already HTTPS, is returned unchanged.
pub fn ssh_to_https(url: &str) -> String {
    let url = url.trim();
    let path = url
        .strip_prefix(SSH_SCP_PREFIX)
        .or_else(|| url.strip_prefix(SSH_URL_PREFIX));

    match path {
        Some(path) => {
            let path = path.trim_end_matches('/');
            let path = path.strip_suffix(".git").unwrap_or(path);
            format!("{}{}.git", GITHUB_HTTPS, path)
        }
        None => url.to_string(),
    }
}

/// Extract `(owner, repo)` from a GitHub remote URL in any common form
pub fn parse_github_repo(url: &str) -> Option<(String, String)> {
    let https = ssh_to_https(url);
    let path = https
        .strip_prefix(GITHUB_HTTPS)
        .or_else(|| https.strip_prefix("http://github.com/"))?;

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut parts = path.split('/');
    let owner = parts.next()?;
    let repo = parts.next()?;
    if parts.next().is_some() || !is_github_name(owner) || !is_github_name(repo) {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}

fn is_github_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}
