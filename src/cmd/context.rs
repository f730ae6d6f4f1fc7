//! Context management commands — `dual context`.

use anyhow::{Context as _, Result, bail};
use console::style;
use std::path::Path;

use dual::detect;
use dual::errors::RegistryError;
use dual::hooks::{HookContext, HookEvent, run_hooks};
use dual::ports;
use dual::registry::{Context, Registry, identity_key};

use super::{context_or_detected, open_project};

fn not_found_hint(name: &str) -> String {
    format!("Context '{name}' not found. Create it with: dual context create {name}")
}

pub async fn cmd_context_create(
    project_dir: &Path,
    name: Option<&str>,
    base_port: Option<u32>,
) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let name = match name {
        Some(name) => name.to_string(),
        None => detect::detect_context_name(project_dir),
    };
    let workdir = detect::workdir_root(project_dir)
        .unwrap_or_else(|| project_dir.to_path_buf());
    let workdir = workdir.canonicalize().unwrap_or(workdir);

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;

    let base = match base_port {
        Some(requested) => {
            let requested = ports::validate_base_port(requested)?;
            // The allocator enforces uniqueness for automatic assignment;
            // explicit ports get the same check here, before persisting.
            for (project, entry) in registry.all_projects()? {
                for (other, ctx) in entry.contexts {
                    if ctx.base_port == requested {
                        bail!(
                            "Base port {requested} is already reserved by context '{other}' \
                             of project {project}"
                        );
                    }
                }
            }
            requested
        }
        None => registry
            .find_next_available_port(config.defaults.base_port, config.defaults.port_increment)?,
    };

    match registry.create_context(&key, &name, Context::new(Some(workdir.clone()), base)) {
        Ok(()) => {}
        Err(RegistryError::ContextExists { .. }) => {
            bail!(
                "Context '{name}' already exists for this project. \
                 See it with: dual context show {name}"
            );
        }
        Err(err) => return Err(err.into()),
    }
    registry.save()?;
    registry.close();

    // Hooks run outside the lock so a hook invoking dual cannot deadlock.
    let hook_ctx = HookContext {
        event: HookEvent::PostCreate,
        project: &key,
        context: &name,
        service: None,
        port: None,
    };
    run_hooks(&config.hooks, &hook_ctx, &workdir).await?;

    let last = u32::from(base) + u32::from(config.defaults.port_increment) - 1;
    println!(
        "Created context {} with ports {}-{} (services start at {})",
        style(&name).bold(),
        base,
        last,
        u32::from(base) + 1
    );
    Ok(())
}

pub fn cmd_context_list(project_dir: &Path) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let current = detect::detect_context_name(project_dir);

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let contexts = registry.list_contexts(&key)?;
    registry.close();

    if contexts.is_empty() {
        println!("No contexts registered for {key}");
        println!();
        println!("Reserve a port block for the current branch with:");
        println!("  dual context create");
        return Ok(());
    }

    println!("Contexts of {key}");
    println!();
    for (name, ctx) in &contexts {
        let marker = if *name == current { "*" } else { " " };
        let path = ctx
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "{} {:<24} {:>6}  {}  {}",
            marker,
            style(name).bold(),
            ctx.base_port,
            ctx.created.format("%Y-%m-%d"),
            style(path).dim()
        );
    }
    println!();
    println!("{} context(s); * marks the current branch", contexts.len());
    Ok(())
}

pub fn cmd_context_show(project_dir: &Path, name: Option<&str>) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let name = context_or_detected(project_dir, name);

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let ctx = match registry.get_context(&key, &name) {
        Ok(ctx) => ctx,
        Err(RegistryError::ContextNotFound { .. } | RegistryError::ProjectNotFound { .. }) => {
            bail!(not_found_hint(&name));
        }
        Err(err) => return Err(err.into()),
    };

    println!("Context {}", style(&name).bold());
    println!("  created:   {}", ctx.created.to_rfc3339());
    if let Some(path) = &ctx.path {
        println!("  path:      {}", path.display());
    }
    println!("  base port: {}", ctx.base_port);

    let services = config.service_names();
    if !services.is_empty() {
        println!("  ports:");
        let all = ports::calculate_all_ports(&services, &registry, &identity, &name)?;
        for (service, port) in all {
            println!("    {service:<20} {port}");
        }
    }
    registry.close();

    let global_count = ctx.env_overrides.len() + ctx.env_overrides_v2.global.len();
    let service_count: usize = ctx
        .env_overrides_v2
        .services
        .values()
        .map(|m| m.len())
        .sum();
    if global_count + service_count > 0 {
        println!(
            "  overrides: {global_count} global, {service_count} per-service \
             (dual env list shows them)"
        );
    }
    Ok(())
}

pub async fn cmd_context_remove(project_dir: &Path, name: Option<&str>, force: bool) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let name = context_or_detected(project_dir, name);

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let ctx = match registry.get_context(&key, &name) {
        Ok(ctx) => ctx,
        Err(RegistryError::ContextNotFound { .. } | RegistryError::ProjectNotFound { .. }) => {
            bail!(not_found_hint(&name));
        }
        Err(err) => return Err(err.into()),
    };
    registry.close();

    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Remove context '{name}' and free base port {}?",
                ctx.base_port
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation (use --force in scripts)")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let workdir = ctx
        .path
        .clone()
        .filter(|p| p.exists())
        .unwrap_or_else(|| project_dir.to_path_buf());
    let hook_ctx = HookContext {
        event: HookEvent::PreRemove,
        project: &key,
        context: &name,
        service: None,
        port: None,
    };
    run_hooks(&config.hooks, &hook_ctx, &workdir).await?;

    // Reacquire: the lock was not held across the confirmation prompt or the
    // hooks, so the context may have raced away in the meantime.
    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    match registry.delete_context(&key, &name) {
        Ok(removed) => {
            registry.save()?;
            registry.close();
            println!(
                "Removed context {} (base port {} is free again)",
                style(&name).bold(),
                removed.base_port
            );
            Ok(())
        }
        Err(RegistryError::ContextNotFound { .. } | RegistryError::ProjectNotFound { .. }) => {
            bail!("Context '{name}' was already removed by another command");
        }
        Err(err) => Err(err.into()),
    }
}
