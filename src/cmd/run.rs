//! Service runner — `dual run <service>`.
//!
//! Computes the service's port for the current context, builds the layered
//! environment, fires `pre_run` hooks, and execs the configured command via
//! `sh -c` in the working copy. The registry lock is released before anything
//! is spawned; long-running services must not block other dual commands.

use anyhow::{Context as _, Result, bail};
use console::style;
use std::path::Path;

use dual::detect;
use dual::envfile::merged_env;
use dual::errors::{PortError, RegistryError};
use dual::hooks::{HookContext, HookEvent, run_hooks};
use dual::ports::calculate_port;
use dual::registry::{Registry, identity_key};

use super::{context_or_detected, open_project};

pub async fn cmd_run(project_dir: &Path, context: Option<&str>, service: &str) -> Result<i32> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let context = context_or_detected(project_dir, context);

    let Some(service_cfg) = config.services.get(service) else {
        let configured = config.service_names();
        if configured.is_empty() {
            bail!(
                "Service '{service}' is not configured. \
                 Add a [services.{service}] table to .dual/config.toml"
            );
        }
        bail!(
            "Service '{service}' is not configured. Configured services: {}",
            configured.join(", ")
        );
    };
    let Some(command) = service_cfg.command.clone() else {
        bail!(
            "Service '{service}' has no command. \
             Add command = \"...\" to its [services.{service}] table"
        );
    };

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let services = config.service_names();
    let port = match calculate_port(&services, &registry, &identity, &context, service) {
        Ok(port) => port,
        Err(PortError::Registry(
            RegistryError::ContextNotFound { .. } | RegistryError::ProjectNotFound { .. },
        )) => {
            bail!(
                "Context '{context}' has no reserved ports yet. \
                 Create it with: dual context create {context}"
            );
        }
        Err(err) => return Err(err.into()),
    };
    let ctx = registry.get_context(&key, &context)?;
    registry.close();

    let workdir = detect::workdir_root(project_dir)
        .unwrap_or_else(|| project_dir.to_path_buf());
    let env = merged_env(&workdir, &context, &ctx, service, port)?;

    let hook_ctx = HookContext {
        event: HookEvent::PreRun,
        project: &key,
        context: &context,
        service: Some(service),
        port: Some(port),
    };
    run_hooks(&config.hooks, &hook_ctx, &workdir).await?;

    eprintln!(
        "{} {service} in context '{context}' on port {port}",
        style("Starting").bold().green()
    );

    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .current_dir(&workdir)
        .envs(&env)
        .status()
        .await
        .with_context(|| format!("Failed to spawn service command: {command}"))?;

    Ok(status.code().unwrap_or(1))
}
