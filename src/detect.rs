//! Context-name detection.
//!
//! The default context name is the current git branch of the working copy, so
//! `dual context create` and `dual port` do the right thing without flags.
//! Anything that is not a normal branch checkout (detached HEAD, unborn
//! branch, no repository at all) falls back to the literal name `default`.

use std::path::{Path, PathBuf};

use git2::Repository;

/// Name used when no branch can be determined.
pub const DEFAULT_CONTEXT: &str = "default";

/// Current branch name at `dir`, or `default`.
pub fn detect_context_name(dir: &Path) -> String {
    let Ok(repo) = Repository::discover(dir) else {
        return DEFAULT_CONTEXT.to_string();
    };
    repo.head()
        .ok()
        .filter(|head| head.is_branch())
        .and_then(|head| head.shorthand().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CONTEXT.to_string())
}

/// Root of the working copy containing `dir`, if it is inside a git repo.
/// This is the worktree's own root, not the parent repository.
pub fn workdir_root(dir: &Path) -> Option<PathBuf> {
    Repository::discover(dir)
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
}
