//! Allowlist for proxied GitHub REST API calls
//!
//! Each rule pairs a path shape with the methods permitted on it. GET is
//! permitted on every listed shape; POST and PATCH only where a rule says so;
//! DELETE never.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GhApiError {
    #[error("API path is required")]
    MissingPath,

    #[error("API path not in allowlist: {0}")]
    PathNotAllowed(String),

    #[error("HTTP method {method} not allowed for API path: {path}")]
    MethodNotAllowed { method: String, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    /// `{owner}`, `{repo}`, `{branch}`: a GitHub name
    Name,
    /// `{number}`: digits only
    Number,
    /// `{sha}`: hex digits
    Sha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
}

impl HttpMethod {
    fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// One allowlisted path shape and the mutations it accepts on top of GET
#[derive(Debug, Clone)]
pub struct GhApiAllowRule {
    pub pattern: &'static str,
    pub mutations: &'static [HttpMethod],
    segments: Vec<Segment>,
}

impl GhApiAllowRule {
    fn new(pattern: &'static str, mutations: &'static [HttpMethod]) -> Self {
        let segments = pattern
            .split('/')
            .map(|part| match part {
                "{number}" => Segment::Number,
                "{sha}" => Segment::Sha,
                p if p.starts_with('{') && p.ends_with('}') => Segment::Name,
                p => Segment::Literal(p),
            })
            .collect();

        Self {
            pattern,
            mutations,
            segments,
        }
    }

    fn matches(&self, parts: &[&str]) -> bool {
        self.segments.len() == parts.len()
            && self
                .segments
                .iter()
                .zip(parts)
                .all(|(segment, part)| segment_matches(*segment, part))
    }

    pub fn permits(&self, method: HttpMethod) -> bool {
        method == HttpMethod::Get || self.mutations.contains(&method)
    }
}

fn segment_matches(segment: Segment, part: &str) -> bool {
    match segment {
        Segment::Literal(lit) => lit == part,
        Segment::Number => !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()),
        Segment::Sha => {
            (7..=40).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_hexdigit())
        }
        Segment::Name => {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
    }
}

const READ_ONLY: &[HttpMethod] = &[];
const CREATE: &[HttpMethod] = &[HttpMethod::Post];
const UPDATE: &[HttpMethod] = &[HttpMethod::Patch];

fn default_rules() -> Vec<GhApiAllowRule> {
    [
        ("user", READ_ONLY),
        ("repos/{owner}/{repo}", READ_ONLY),
        ("repos/{owner}/{repo}/branches", READ_ONLY),
        ("repos/{owner}/{repo}/branches/{branch}", READ_ONLY),
        ("repos/{owner}/{repo}/commits", READ_ONLY),
        ("repos/{owner}/{repo}/commits/{sha}", READ_ONLY),
        ("repos/{owner}/{repo}/commits/{sha}/check-runs", READ_ONLY),
        ("repos/{owner}/{repo}/commits/{sha}/status", READ_ONLY),
        ("repos/{owner}/{repo}/pulls", CREATE),
        ("repos/{owner}/{repo}/pulls/{number}", UPDATE),
        ("repos/{owner}/{repo}/pulls/{number}/comments", CREATE),
        ("repos/{owner}/{repo}/pulls/{number}/reviews", READ_ONLY),
        ("repos/{owner}/{repo}/pulls/{number}/files", READ_ONLY),
        ("repos/{owner}/{repo}/pulls/{number}/commits", READ_ONLY),
        ("repos/{owner}/{repo}/issues", CREATE),
        ("repos/{owner}/{repo}/issues/{number}", UPDATE),
        ("repos/{owner}/{repo}/issues/{number}/comments", CREATE),
        ("repos/{owner}/{repo}/actions/runs", READ_ONLY),
        ("repos/{owner}/{repo}/actions/runs/{number}", READ_ONLY),
        ("repos/{owner}/{repo}/actions/runs/{number}/jobs", READ_ONLY),
    ]
    .into_iter()
    .map(|(pattern, mutations)| GhApiAllowRule::new(pattern, mutations))
    .collect()
}

/// A validated API call, ready to proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhApiTarget {
    /// Path without leading slash, query string preserved
    pub path: String,
    pub method: HttpMethod,
    pub pattern: &'static str,
    /// `(owner, repo)` when the path addresses a repository
    pub repository: Option<(String, String)>,
}

impl GhApiTarget {
    pub fn is_write(&self) -> bool {
        self.method != HttpMethod::Get
    }
}

#[derive(Debug, Clone)]
pub struct GhApiPathValidator {
    rules: Vec<GhApiAllowRule>,
}

impl GhApiPathValidator {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn rules(&self) -> &[GhApiAllowRule] {
        &self.rules
    }

    /// Check a path/method pair against the allowlist
    pub fn validate(&self, path: &str, method: &str) -> Result<GhApiTarget, GhApiError> {
        let path = path.trim();
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return Err(GhApiError::MissingPath);
        }

        // Query strings only narrow a read; the path alone decides the shape
        let route = path.split_once('?').map_or(path, |(route, _)| route);
        let parts: Vec<&str> = route.split('/').collect();

        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matches(&parts))
            .ok_or_else(|| GhApiError::PathNotAllowed(path.to_string()))?;

        let method_not_allowed = || GhApiError::MethodNotAllowed {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
        };
        let parsed = HttpMethod::parse(method).ok_or_else(method_not_allowed)?;
        if !rule.permits(parsed) {
            return Err(method_not_allowed());
        }

        let repository = match parts.as_slice() {
            ["repos", owner, repo, ..] => Some((owner.to_string(), repo.to_string())),
            _ => None,
        };

        Ok(GhApiTarget {
            path: path.to_string(),
            method: parsed,
            pattern: rule.pattern,
            repository,
        })
    }
}

impl Default for GhApiPathValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate against the built-in allowlist
pub fn validate_gh_api_path(path: &str, method: &str) -> Result<GhApiTarget, GhApiError> {
    GhApiPathValidator::new().validate(path, method)
}
