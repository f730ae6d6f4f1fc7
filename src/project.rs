//! Project identity resolution.
//!
//! Every worktree of one repository must share registry state, so the project
//! identifier is the canonical absolute path of the *parent* repository root,
//! never the worktree's own path. For a plain checkout the two coincide.
//!
//! Resolution is pure filesystem inspection: walk upward to the first `.git`
//! entry, then decide between main repository (`.git` is a directory) and
//! worktree (`.git` is a file pointing into `<repo>/.git/worktrees/<name>`).
//! git2 is deliberately not used here: a half-deleted parent repository must
//! still produce a precise error rather than a generic open failure.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::errors::ProjectError;

/// Marker file used by the non-git fallback resolver.
const CONFIG_MARKER: &str = "config.toml";

/// Directory dual keeps its state in, relative to the project root.
pub const DUAL_DIR: &str = ".dual";

/// Resolve the project identity for `start`.
///
/// Walks upward to the enclosing git root. A main repository is its own
/// identity; a worktree resolves to its parent repository. When no git root
/// exists at all, a directory carrying `.dual/config.toml` is accepted as a
/// degraded, non-git identity.
pub fn resolve_project_identity(start: &Path) -> Result<PathBuf, ProjectError> {
    if let Some(git_root) = find_git_root(start) {
        return match worktree_parent(&git_root) {
            Ok(parent) => Ok(canonical_best_effort(parent)),
            // Main repository, submodule, or an unparseable `.git` file: the
            // git root itself is the identity.
            Err(ProjectError::NotAWorktree { .. }) => Ok(canonical_best_effort(git_root)),
            Err(err) => Err(err),
        };
    }

    if let Some(marker_root) = find_marker_root(start) {
        tracing::warn!(
            "no git repository found above {}; using {} as a non-git project root",
            start.display(),
            marker_root.display()
        );
        return Ok(canonical_best_effort(marker_root));
    }

    Err(ProjectError::NotAGitRepository {
        start: start.to_path_buf(),
    })
}

/// Walk upward from `start` to the first directory containing a `.git` entry
/// (file or directory).
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| fs::symlink_metadata(dir.join(".git")).is_ok())
        .map(Path::to_path_buf)
}

/// Resolve the parent repository root of a worktree at `git_root`.
///
/// Returns `NotAWorktree` when `git_root` is a main repository (`.git` is a
/// directory), when the `.git` file does not parse as `gitdir: <path>`, or
/// when the referenced path has no `worktrees` segment (a submodule). The
/// caller decides whether that is an error or just "use the root itself".
pub fn worktree_parent(git_root: &Path) -> Result<PathBuf, ProjectError> {
    let dotgit = git_root.join(".git");
    let meta = fs::symlink_metadata(&dotgit).map_err(|source| ProjectError::GitFileUnreadable {
        path: dotgit.clone(),
        source,
    })?;

    if meta.is_dir() {
        return Err(ProjectError::NotAWorktree {
            path: git_root.to_path_buf(),
        });
    }

    let contents = fs::read_to_string(&dotgit).map_err(|source| ProjectError::GitFileUnreadable {
        path: dotgit.clone(),
        source,
    })?;

    let Some(gitdir) = parse_gitdir(&contents) else {
        return Err(ProjectError::NotAWorktree {
            path: git_root.to_path_buf(),
        });
    };

    // git writes relative gitdir paths for portable worktrees; anchor them at
    // the directory holding the `.git` file.
    let gitdir = if gitdir.is_absolute() {
        gitdir
    } else {
        git_root.join(gitdir)
    };

    // A worktree's internal directory lives under `<repo>/.git/worktrees/`.
    // Submodule `.git` files point elsewhere (`<super>/.git/modules/...`).
    let is_worktree = gitdir
        .components()
        .any(|c| matches!(c, Component::Normal(seg) if seg == "worktrees"));
    if !is_worktree {
        return Err(ProjectError::NotAWorktree {
            path: git_root.to_path_buf(),
        });
    }

    // `<repo>/.git/worktrees/<name>` -> `<repo>`
    let parent = gitdir
        .ancestors()
        .nth(3)
        .map(Path::to_path_buf)
        .ok_or_else(|| ProjectError::NotAWorktree {
            path: git_root.to_path_buf(),
        })?;

    if !parent.exists() {
        return Err(ProjectError::ParentRepositoryNotFound {
            parent,
            worktree: git_root.to_path_buf(),
        });
    }

    Ok(parent)
}

/// Extract the target of a `gitdir: <path>` line.
fn parse_gitdir(contents: &str) -> Option<PathBuf> {
    let line = contents.lines().next()?;
    let path = line.strip_prefix("gitdir:")?.trim();
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Fallback for non-git projects: walk upward for a `.dual/config.toml`.
fn find_marker_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DUAL_DIR).join(CONFIG_MARKER).is_file())
        .map(Path::to_path_buf)
}

/// Symlink resolution is best-effort: a path that cannot be canonicalized
/// (already deleted, permission trouble) is returned as-is.
fn canonical_best_effort(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}
