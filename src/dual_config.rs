//! Project configuration for dual.
//!
//! This module reads `.dual/config.toml`. It supports:
//! - Project-level settings with sensible defaults
//! - Allocator defaults (base port, block size, lock timeout)
//! - The named-service set the port engine indexes into
//! - Lifecycle hook definitions
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-app"
//!
//! [defaults]
//! base_port = 4100
//! port_increment = 100
//! lock_timeout_secs = 5
//!
//! [services.api]
//! command = "cargo run --bin api"
//!
//! [services.web]
//! command = "npm run dev"
//!
//! [[hooks]]
//! event = "post_create"
//! command = "./scripts/seed-db.sh"
//! timeout_secs = 60
//! ```

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hooks::HookDefinition;
use crate::project::DUAL_DIR;

/// Configuration file name under `.dual/`.
pub const CONFIG_FILE: &str = "config.toml";

/// The `.dual` state directory of a project.
pub fn dual_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(DUAL_DIR)
}

/// Path of the configuration file for a project.
pub fn config_path(project_dir: &Path) -> PathBuf {
    dual_dir(project_dir).join(CONFIG_FILE)
}

/// Project-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (optional, defaults to the directory name)
    #[serde(default)]
    pub name: Option<String>,
}

/// Allocator and locking defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// First base port the allocator probes
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Contiguous ports reserved per context
    #[serde(default = "default_port_increment")]
    pub port_increment: u16,
    /// Seconds to wait for the registry lock before giving up
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_base_port() -> u16 {
    crate::ports::DEFAULT_BASE_PORT
}

fn default_port_increment() -> u16 {
    crate::ports::PORT_INCREMENT
}

fn default_lock_timeout_secs() -> u64 {
    5
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            base_port: default_base_port(),
            port_increment: default_port_increment(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl DefaultsSection {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// One named service of the project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Command `dual run` executes for this service (via `sh -c`)
    #[serde(default)]
    pub command: Option<String>,
}

/// Parsed `.dual/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DualToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub hooks: Vec<HookDefinition>,
}

impl DualToml {
    /// Load from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load the project's config, falling back to defaults when the file
    /// does not exist. A present-but-broken file is still an error; silently
    /// ignoring it would reassign ports.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let path = config_path(project_dir);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Configured service names, sorted. This is the ordered set the port
    /// engine ranks against.
    pub fn service_names(&self) -> Vec<String> {
        // BTreeMap iteration is already lexicographic.
        self.services.keys().cloned().collect()
    }

    /// Non-fatal configuration problems, for `dual config validate`.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.base_port < crate::ports::MIN_BASE_PORT {
            warnings.push(format!(
                "defaults.base_port = {} is below {} and will collide with privileged ports",
                self.defaults.base_port,
                crate::ports::MIN_BASE_PORT
            ));
        }
        if self.defaults.port_increment == 0 {
            warnings.push("defaults.port_increment = 0 would hand every context the same block".into());
        } else if self.services.len() >= usize::from(self.defaults.port_increment) {
            warnings.push(format!(
                "{} services configured but each context only reserves {} ports; \
                 service ports would spill into the next context's block",
                self.services.len(),
                self.defaults.port_increment
            ));
        }
        if self.services.is_empty() {
            warnings.push(
                "no [services.<name>] tables configured; 'dual port' and 'dual run' need at least one"
                    .into(),
            );
        }
        if self.defaults.lock_timeout_secs == 0 {
            warnings.push("defaults.lock_timeout_secs = 0 makes every contended command fail immediately".into());
        }

        warnings
    }
}
