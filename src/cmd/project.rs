//! Project initialization — `dual init`.

use anyhow::{Context, Result};
use std::path::Path;

use dual::dual_config::{config_path, dual_dir};
use dual::errors::ProjectError;
use dual::project::resolve_project_identity;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    // Inside a repo, initialize at the shared project root (the parent
    // repository for a worktree). Outside one, the directory itself becomes
    // a non-git project: the config file we write is its marker.
    let root = match resolve_project_identity(project_dir) {
        Ok(identity) => identity,
        Err(ProjectError::NotAGitRepository { .. }) => {
            println!("No git repository found; initializing a non-git project here.");
            project_dir.to_path_buf()
        }
        Err(err) => return Err(err.into()),
    };

    let dir = dual_dir(&root);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let config = config_path(&root);
    if config.exists() {
        println!("dual project already initialized at {}", dir.display());
        return Ok(());
    }

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    std::fs::write(&config, default_config_template(&name))
        .with_context(|| format!("Failed to write {}", config.display()))?;

    // The registry and lock are per-machine state; keep them out of git.
    std::fs::write(
        dir.join(".gitignore"),
        "registry.json\nregistry.json.tmp\nregistry.lock\n",
    )
    .with_context(|| format!("Failed to write {}", dir.join(".gitignore").display()))?;

    println!("Initialized dual project in {}", dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Declare your services in {}", config.display());
    println!("  2. Reserve a port block:  dual context create");
    println!("  3. Look up a port:        dual port <service>");
    Ok(())
}

/// Default `.dual/config.toml` written by `dual init` and
/// `dual config init`.
pub(crate) fn default_config_template(name: &str) -> String {
    format!(
        r#"# dual project configuration
[project]
name = "{name}"

[defaults]
base_port = 4100
port_increment = 100
lock_timeout_secs = 5

# Each service gets basePort + <alphabetical rank> + 1 in every context.
#
# [services.api]
# command = "cargo run --bin api"
#
# [services.web]
# command = "npm run dev"

# Lifecycle hooks (events: post_create, pre_remove, pre_run):
#
# [[hooks]]
# event = "post_create"
# command = "./scripts/seed-db.sh"
# timeout_secs = 60
"#
    )
}
