//! Repository path containment
//!
//! Every `repo_path` a container sends is resolved to its canonical form
//! (symlinks followed, `.` and `..` collapsed) and must land strictly inside
//! one of the configured roots. Resolution is lenient about components that
//! do not exist yet, the same way `realpath -m` is, so a traversal through a
//! missing directory is still judged by where it ends up.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Default roots a container may operate in
pub const DEFAULT_ALLOWED_ROOTS: &[&str] = &[
    "/home/jib/repos",
    "/home/jib/.jib-worktrees",
    "/home/jib/worktrees",
];

/// Shown when a caller targets a root directory instead of a repository in it
pub const REPOS_PARENT_HINT: &str =
    "Use the path of a repository inside this directory, e.g. /home/jib/repos/<repo-name>";

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathValidationError {
    #[error("repo_path is required")]
    Required,

    #[error("Invalid repo_path: path could not be resolved")]
    Unresolvable,

    #[error("repo_path '{path}' is not within allowed directories: {allowed}")]
    OutsideAllowedRoots { path: String, allowed: String },
}

#[derive(Debug, Clone)]
pub struct PathValidator {
    roots: Vec<PathBuf>,
}

impl PathValidator {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|root| {
                let root = root.as_ref();
                resolve_path(root).unwrap_or_else(|e| {
                    warn!(root = %root.display(), error = %e, "could not resolve allowed root");
                    root.to_path_buf()
                })
            })
            .collect();

        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve `path` and confirm it is strictly inside an allowed root
    ///
    /// Returns the canonical path, which is what callers should hand to the
    /// executor.
    pub fn validate_repo_path(&self, path: Option<&str>) -> Result<PathBuf, PathValidationError> {
        let raw = match path {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(PathValidationError::Required),
        };

        let canonical = resolve_path(Path::new(raw)).map_err(|e| {
            warn!(path = raw, error = %e, "failed to resolve repo_path");
            PathValidationError::Unresolvable
        })?;

        let contained = self
            .roots
            .iter()
            .any(|root| canonical != *root && canonical.starts_with(root));

        if !contained {
            return Err(PathValidationError::OutsideAllowedRoots {
                path: raw.to_string(),
                allowed: self.allowed_display(),
            });
        }

        Ok(canonical)
    }

    /// Whether `path` is one of the allowed roots itself
    ///
    /// The roots hold repositories but are not repositories, so this is
    /// almost always a caller mistake worth a specific message.
    pub fn is_repos_parent_directory(&self, path: &str) -> bool {
        if path.trim().is_empty() {
            return false;
        }
        match resolve_path(Path::new(path)) {
            Ok(canonical) => self.roots.iter().any(|root| canonical == *root),
            Err(_) => false,
        }
    }

    fn allowed_display(&self) -> String {
        self.roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for PathValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_ROOTS)
    }
}

enum Segment {
    Root,
    Parent,
    Name(OsString),
}

fn segments(path: &Path) -> Vec<Segment> {
    path.components()
        .filter_map(|c| match c {
            Component::RootDir | Component::Prefix(_) => Some(Segment::Root),
            Component::CurDir => None,
            Component::ParentDir => Some(Segment::Parent),
            Component::Normal(name) => Some(Segment::Name(name.to_os_string())),
        })
        .collect()
}

/// Canonicalize a path without requiring it to exist
///
/// Existing components are checked for symlinks and followed; missing
/// components are appended as-is. Errors other than "not found" (permission
/// denied, symlink loops) are returned.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // Stack of segments still to process, next one on top
    let mut pending: Vec<Segment> = segments(&absolute);
    pending.reverse();

    let mut resolved = PathBuf::from("/");
    let mut hops = 0;

    while let Some(segment) = pending.pop() {
        match segment {
            Segment::Root => resolved = PathBuf::from("/"),
            Segment::Parent => {
                resolved.pop();
            }
            Segment::Name(name) => {
                let candidate = resolved.join(&name);
                match std::fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(io::Error::other("too many levels of symbolic links"));
                        }
                        let target = std::fs::read_link(&candidate)?;
                        // Relative targets resolve against the link's directory,
                        // which is `resolved` as it stands
                        let mut target_segments = segments(&target);
                        target_segments.reverse();
                        pending.extend(target_segments);
                    }
                    Ok(_) => resolved = candidate,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => resolved = candidate,
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(resolved)
}
