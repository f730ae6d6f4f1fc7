//! Port lookup commands — `dual port` and `dual ports`.
//!
//! `dual port <service>` prints the bare number so it can be substituted
//! into scripts: `curl localhost:$(dual port api)/health`.

use anyhow::{Result, bail};
use std::path::Path;

use dual::errors::{PortError, RegistryError};
use dual::ports::{calculate_all_ports, calculate_port};
use dual::registry::Registry;

use super::{context_or_detected, open_project};

fn explain(err: PortError, context: &str, services: &[String]) -> anyhow::Error {
    match err {
        PortError::ServiceNotFound { name } => {
            if services.is_empty() {
                anyhow::anyhow!(
                    "Service '{name}' is not configured. \
                     Add a [services.{name}] table to .dual/config.toml"
                )
            } else {
                anyhow::anyhow!(
                    "Service '{name}' is not configured. Configured services: {}",
                    services.join(", ")
                )
            }
        }
        PortError::Registry(
            RegistryError::ContextNotFound { .. } | RegistryError::ProjectNotFound { .. },
        ) => anyhow::anyhow!(
            "Context '{context}' has no reserved ports yet. \
             Create it with: dual context create {context}"
        ),
        other => other.into(),
    }
}

pub fn cmd_port(project_dir: &Path, context: Option<&str>, service: &str) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let context = context_or_detected(project_dir, context);
    let services = config.service_names();

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let port = calculate_port(&services, &registry, &identity, &context, service)
        .map_err(|err| explain(err, &context, &services))?;
    registry.close();

    println!("{port}");
    Ok(())
}

pub fn cmd_ports(project_dir: &Path, context: Option<&str>) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let context = context_or_detected(project_dir, context);
    let services = config.service_names();
    if services.is_empty() {
        bail!(
            "No services configured. \
             Add [services.<name>] tables to .dual/config.toml first"
        );
    }

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let all = calculate_all_ports(&services, &registry, &identity, &context)
        .map_err(|err| explain(err, &context, &services))?;
    registry.close();

    for (service, port) in all {
        println!("{service:<20} {port}");
    }
    Ok(())
}
