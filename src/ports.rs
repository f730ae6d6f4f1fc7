//! Port allocation engine.
//!
//! Each context owns an exclusive block of `PORT_INCREMENT` contiguous ports
//! starting at its `basePort`. Within the block, services are numbered by the
//! lexicographic rank of their name: `port = basePort + rank + 1`. Nothing is
//! persisted per service, so the same configuration and registry state always
//! produce the same port, across any number of process restarts.

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::PortError;
use crate::registry::Registry;

/// First base port the allocator probes.
pub const DEFAULT_BASE_PORT: u16 = 4100;

/// Block size reserved per context.
pub const PORT_INCREMENT: u16 = 100;

/// Lowest base port accepted from explicit user input (below this sit the
/// privileged ports).
pub const MIN_BASE_PORT: u16 = 1024;

/// Zero-based rank of `service` among the configured service names, sorted
/// lexicographically.
fn service_index(services: &[String], service: &str) -> Result<usize, PortError> {
    let mut sorted: Vec<&str> = services.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted
        .iter()
        .position(|name| *name == service)
        .ok_or_else(|| PortError::ServiceNotFound {
            name: service.to_string(),
        })
}

/// Deterministic port for one service of one context.
pub fn calculate_port(
    services: &[String],
    registry: &Registry,
    identity: &Path,
    context: &str,
    service: &str,
) -> Result<u16, PortError> {
    let index = service_index(services, service)?;
    let ctx = registry.get_context(&crate::registry::identity_key(identity), context)?;
    let port = u32::from(ctx.base_port) + index as u32 + 1;
    u16::try_from(port).map_err(|_| PortError::InvalidBasePort { port })
}

/// Ports for every configured service of one context.
pub fn calculate_all_ports(
    services: &[String],
    registry: &Registry,
    identity: &Path,
    context: &str,
) -> Result<BTreeMap<String, u16>, PortError> {
    services
        .iter()
        .map(|name| {
            calculate_port(services, registry, identity, context, name)
                .map(|port| (name.clone(), port))
        })
        .collect()
}

/// Validate an explicitly supplied base port before it is persisted.
pub fn validate_base_port(port: u32) -> Result<u16, PortError> {
    let in_range = port >= u32::from(MIN_BASE_PORT) && port <= u32::from(u16::MAX);
    if !in_range {
        return Err(PortError::InvalidBasePort { port });
    }
    Ok(port as u16)
}
