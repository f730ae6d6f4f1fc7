//! Lifecycle hooks.
//!
//! Hooks let a project run its own commands at the points where dual changes
//! or uses a context:
//!
//! - `post_create` — after a context was created and persisted
//! - `pre_remove`  — before a context is deleted; a failure aborts removal
//! - `pre_run`     — before `dual run` spawns a service; a failure aborts
//!
//! Hooks are `[[hooks]]` tables in `.dual/config.toml` (see
//! [`crate::dual_config`]). Each is executed through `sh -c` in the working
//! copy, with the event details exposed as `DUAL_EVENT`, `DUAL_PROJECT`,
//! `DUAL_CONTEXT`, and for `pre_run` additionally `DUAL_SERVICE` and
//! `DUAL_PORT`. A `pre_*` hook exiting non-zero blocks the operation;
//! `post_*` failures only warn.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

/// Points in the context lifecycle a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    PostCreate,
    PreRemove,
    PreRun,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PostCreate => "post_create",
            HookEvent::PreRemove => "pre_remove",
            HookEvent::PreRun => "pre_run",
        }
    }

    /// `pre_*` events gate the operation; `post_*` events are advisory.
    pub fn is_blocking(&self) -> bool {
        matches!(self, HookEvent::PreRemove | HookEvent::PreRun)
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[[hooks]]` table from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookDefinition {
    /// Event this hook fires on
    pub event: HookEvent,
    /// Shell command, run via `sh -c`
    pub command: String,
    /// Kill the hook after this many seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Runtime details handed to hooks through the environment.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub event: HookEvent,
    pub project: &'a str,
    pub context: &'a str,
    pub service: Option<&'a str>,
    pub port: Option<u16>,
}

/// Run every hook registered for `ctx.event`, in configuration order.
///
/// Returns an error only when a blocking hook fails or times out; advisory
/// hook failures are logged and skipped.
pub async fn run_hooks(
    hooks: &[HookDefinition],
    ctx: &HookContext<'_>,
    workdir: &Path,
) -> Result<()> {
    for hook in hooks.iter().filter(|h| h.event == ctx.event) {
        let outcome = run_one(hook, ctx, workdir).await;
        match outcome {
            Ok(()) => {}
            Err(err) if ctx.event.is_blocking() => {
                return Err(err.context(format!("{} hook failed: {}", ctx.event, hook.command)));
            }
            Err(err) => {
                tracing::warn!("{} hook '{}' failed: {err:#}", ctx.event, hook.command);
            }
        }
    }
    Ok(())
}

async fn run_one(hook: &HookDefinition, ctx: &HookContext<'_>, workdir: &Path) -> Result<()> {
    tracing::debug!(
        "running {} hook: {} (timeout {}s)",
        hook.event,
        hook.command,
        hook.timeout_secs
    );

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&hook.command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .env("DUAL_EVENT", ctx.event.as_str())
        .env("DUAL_PROJECT", ctx.project)
        .env("DUAL_CONTEXT", ctx.context);
    if let Some(service) = ctx.service {
        cmd.env("DUAL_SERVICE", service);
    }
    if let Some(port) = ctx.port {
        cmd.env("DUAL_PORT", port.to_string());
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn hook command: {}", hook.command))?;

    let status = match timeout(Duration::from_secs(hook.timeout_secs), child.wait()).await {
        Ok(status) => status.context("Failed to wait for hook command")?,
        Err(_) => {
            let _ = child.kill().await;
            bail!("hook timed out after {} seconds", hook.timeout_secs);
        }
    };

    if !status.success() {
        bail!("hook exited with {}", status.code().unwrap_or(-1));
    }
    Ok(())
}
