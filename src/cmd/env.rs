//! Environment-override commands — `dual env`.
//!
//! Overrides live in the registry, not in dotenv files, so they follow the
//! context rather than the checkout. Global overrides go to the flat map;
//! `--service` writes the structured per-service form.

use anyhow::{Result, bail};
use console::style;
use std::path::Path;

use dual::errors::RegistryError;
use dual::registry::{Registry, identity_key};

use super::{context_or_detected, open_project};

fn parse_assignment(assignment: &str) -> Result<(&str, &str)> {
    match assignment.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("Expected KEY=VALUE, got '{assignment}'"),
    }
}

fn ensure_context(registry: &Registry, key: &str, name: &str) -> Result<()> {
    if !registry.context_exists(key, name)? {
        bail!("Context '{name}' not found. Create it with: dual context create {name}");
    }
    Ok(())
}

pub fn cmd_env_set(
    project_dir: &Path,
    context: Option<&str>,
    assignment: &str,
    service: Option<&str>,
) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let context = context_or_detected(project_dir, context);
    let (var, value) = parse_assignment(assignment)?;

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    ensure_context(&registry, &key, &context)?;
    match service {
        Some(service) => {
            registry.set_service_env_override(&key, &context, service, var, value)?;
        }
        None => registry.set_env_override(&key, &context, var, value)?,
    }
    registry.save()?;
    registry.close();

    match service {
        Some(service) => println!("Set {var} for service '{service}' in context '{context}'"),
        None => println!("Set {var} for context '{context}'"),
    }
    Ok(())
}

pub fn cmd_env_unset(
    project_dir: &Path,
    context: Option<&str>,
    var: &str,
    service: Option<&str>,
) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let context = context_or_detected(project_dir, context);

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    ensure_context(&registry, &key, &context)?;
    let removed = match service {
        Some(service) => registry.unset_service_env_override(&key, &context, service, var)?,
        None => registry.unset_env_override(&key, &context, var)?,
    };
    if removed {
        registry.save()?;
    }
    registry.close();

    if removed {
        println!("Unset {var} in context '{context}'");
    } else {
        println!("{var} was not set in context '{context}'; nothing to do");
    }
    Ok(())
}

pub fn cmd_env_list(project_dir: &Path, context: Option<&str>) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);
    let context = context_or_detected(project_dir, context);

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let ctx = match registry.get_context(&key, &context) {
        Ok(ctx) => ctx,
        Err(RegistryError::ContextNotFound { .. } | RegistryError::ProjectNotFound { .. }) => {
            bail!("Context '{context}' not found. Create it with: dual context create {context}");
        }
        Err(err) => return Err(err.into()),
    };
    registry.close();

    let total = ctx.env_overrides.len()
        + ctx.env_overrides_v2.global.len()
        + ctx
            .env_overrides_v2
            .services
            .values()
            .map(|m| m.len())
            .sum::<usize>();
    if total == 0 {
        println!("No overrides for context '{context}'");
        println!();
        println!("Set one with:");
        println!("  dual env set KEY=VALUE [--service <name>]");
        return Ok(());
    }

    println!("Overrides for context {}", style(&context).bold());
    if !ctx.env_overrides.is_empty() || !ctx.env_overrides_v2.global.is_empty() {
        println!();
        println!("  [global]");
        for (var, value) in &ctx.env_overrides {
            println!("  {var}={value}");
        }
        for (var, value) in &ctx.env_overrides_v2.global {
            println!("  {var}={value}");
        }
    }
    for (service, vars) in &ctx.env_overrides_v2.services {
        println!();
        println!("  [service {service}]");
        for (var, value) in vars {
            println!("  {var}={value}");
        }
    }
    Ok(())
}
