//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                              |
//! |-----------|-----------------------------------------------|
//! | `project` | `Init`                                        |
//! | `context` | `Context {Create, List, Show, Remove}`        |
//! | `port`    | `Port`, `Ports`                               |
//! | `env`     | `Env {Set, Unset, List}`                      |
//! | `run`     | `Run`                                         |
//! | `config`  | `Config`                                      |
//! | `status`  | `Status`                                      |

pub mod config;
pub mod context;
pub mod env;
pub mod port;
pub mod project;
pub mod run;
pub mod status;

pub use config::cmd_config;
pub use context::{cmd_context_create, cmd_context_list, cmd_context_remove, cmd_context_show};
pub use env::{cmd_env_list, cmd_env_set, cmd_env_unset};
pub use port::{cmd_port, cmd_ports};
pub use project::cmd_init;
pub use run::cmd_run;
pub use status::cmd_status;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use dual::dual_config::DualToml;
use dual::project::resolve_project_identity;

/// Resolve the project identity and load its configuration.
///
/// Identity resolution maps a worktree to its parent repository, so the
/// config and registry read here are the ones shared by every working copy
/// of the project.
pub(crate) fn open_project(project_dir: &Path) -> Result<(PathBuf, DualToml)> {
    let identity = resolve_project_identity(project_dir).with_context(|| {
        format!(
            "Failed to resolve project identity for {}",
            project_dir.display()
        )
    })?;
    let config = DualToml::load_or_default(&identity)?;
    Ok((identity, config))
}

/// Context name from the flag, or detected from the current git branch.
pub(crate) fn context_or_detected(project_dir: &Path, flag: Option<&str>) -> String {
    match flag {
        Some(name) => name.to_string(),
        None => dual::detect::detect_context_name(project_dir),
    }
}
