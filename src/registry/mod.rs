//! The context registry: durable, process-shared record of which context
//! (branch/worktree) owns which port range.
//!
//! The registry is a JSON file at `<project>/.dual/registry.json`, guarded by
//! an advisory lock file next to it. `Registry::load` acquires the lock and
//! reads the file; mutators work purely in memory; `save` serializes and
//! atomically renames a temp file over the canonical path; `close` (or drop)
//! releases the lock. Batching several mutations into one `save` gives one
//! atomic on-disk update.
//!
//! Two processes racing through the read-modify-write cycle are totally
//! ordered by the file lock. Within one process, an `RwLock` makes the in-memory structure
//! safe to share across tasks; it does not widen the cross-process critical
//! section.
//!
//! File format (camelCase field names, human-inspectable):
//!
//! ```json
//! {
//!   "projects": {
//!     "/home/me/app": {
//!       "contexts": {
//!         "feature-x": {
//!           "created": "2026-05-11T09:30:00Z",
//!           "path": "/home/me/app-feature-x",
//!           "basePort": 4200,
//!           "envOverrides": { "DEBUG": "1" },
//!           "envOverridesV2": {
//!             "global": { "LOG_LEVEL": "debug" },
//!             "services": { "api": { "WORKERS": "2" } }
//!           }
//!         }
//!       }
//!     }
//!   }
//! }
//! ```

pub mod lock;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;
use crate::project::DUAL_DIR;

pub use lock::{DEFAULT_LOCK_TIMEOUT, FileLock};

/// Registry file name under `.dual/`.
pub const REGISTRY_FILE: &str = "registry.json";

/// Lock file name under `.dual/`.
pub const LOCK_FILE: &str = "registry.lock";

/// Structured per-service overrides, alongside the flat legacy map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvOverridesV2 {
    /// Overrides applied to every service of the context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub global: BTreeMap<String, String>,
    /// Overrides applied to a single named service, on top of the globals.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: BTreeMap<String, BTreeMap<String, String>>,
}

impl EnvOverridesV2 {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.services.is_empty()
    }
}

/// One isolated working copy of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Set once at creation, immutable thereafter.
    pub created: DateTime<Utc>,
    /// Worktree root; advisory, for display and health checks only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// First port of this context's exclusive range. Assigned once, never
    /// recomputed.
    #[serde(rename = "basePort")]
    pub base_port: u16,
    /// Flat legacy override map; treated as global.
    #[serde(
        rename = "envOverrides",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub env_overrides: BTreeMap<String, String>,
    /// Structured overrides. May coexist with the flat map.
    #[serde(
        rename = "envOverridesV2",
        default,
        skip_serializing_if = "EnvOverridesV2::is_empty"
    )]
    pub env_overrides_v2: EnvOverridesV2,
}

impl Context {
    /// A fresh context rooted at `path` with an assigned base port.
    pub fn new(path: Option<PathBuf>, base_port: u16) -> Self {
        Self {
            created: Utc::now(),
            path,
            base_port,
            env_overrides: BTreeMap::new(),
            env_overrides_v2: EnvOverridesV2::default(),
        }
    }
}

/// All contexts of one project. Empty projects are pruned, not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub contexts: BTreeMap<String, Context>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryData {
    #[serde(default)]
    projects: BTreeMap<String, Project>,
}

/// The registry key for a resolved project identity.
pub fn identity_key(identity: &Path) -> String {
    identity.to_string_lossy().into_owned()
}

/// Handle to a loaded registry. Holds the cross-process lock until `close`
/// or drop.
#[derive(Debug)]
pub struct Registry {
    registry_path: PathBuf,
    data: RwLock<RegistryData>,
    lock: Option<FileLock>,
}

impl Registry {
    /// Load the registry for `identity`, acquiring its file lock with the
    /// default timeout.
    pub fn load(identity: &Path) -> Result<Self, RegistryError> {
        Self::load_with_timeout(identity, DEFAULT_LOCK_TIMEOUT)
    }

    /// Load with an explicit lock-acquisition timeout.
    ///
    /// A missing file yields an empty registry with the lock held ("about to
    /// create"). An unparseable file is treated as corrupted: warn and start
    /// empty, so the next `save` self-heals it.
    pub fn load_with_timeout(identity: &Path, timeout: Duration) -> Result<Self, RegistryError> {
        let dir = identity.join(DUAL_DIR);
        let lock = FileLock::acquire(&dir.join(LOCK_FILE), timeout)?;
        let registry_path = dir.join(REGISTRY_FILE);

        let data = match fs::read_to_string(&registry_path) {
            Ok(raw) => match serde_json::from_str::<RegistryData>(&raw) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(
                        "registry at {} is corrupted ({err}); continuing with an empty registry",
                        registry_path.display()
                    );
                    RegistryData::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => RegistryData::default(),
            Err(err) => return Err(RegistryError::Io(err)),
        };

        Ok(Self {
            registry_path,
            data: RwLock::new(data),
            lock: Some(lock),
        })
    }

    /// Path of the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.registry_path
    }

    /// Persist the in-memory state.
    ///
    /// Writes to `registry.json.tmp` in the same directory and atomically
    /// renames it over the canonical file, so no reader ever observes a
    /// partial write. On failure the temp file is removed and the canonical
    /// file is left untouched. Valid only while the load lock is held.
    pub fn save(&self) -> Result<(), RegistryError> {
        if self.lock.is_none() {
            return Err(RegistryError::Closed);
        }

        let json = {
            let data = self.data.read().map_err(|_| RegistryError::MutexPoisoned)?;
            let mut json = serde_json::to_string_pretty(&*data)
                .map_err(|err| RegistryError::Io(io::Error::other(err)))?;
            json.push('\n');
            json
        };

        let tmp_path = self.registry_path.with_extension("json.tmp");
        if let Err(source) = fs::write(&tmp_path, &json) {
            let _ = fs::remove_file(&tmp_path);
            return Err(RegistryError::WriteFailed {
                path: self.registry_path.clone(),
                source,
            });
        }
        if let Err(source) = fs::rename(&tmp_path, &self.registry_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(RegistryError::WriteFailed {
                path: self.registry_path.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Release the cross-process lock. Queries keep working on the in-memory
    /// snapshot; `save` is rejected afterwards. A second close is a no-op.
    pub fn close(&mut self) {
        self.lock.take();
    }

    // ---- mutators (in-memory only; `save` persists) ----

    /// Register a new context. Fails if the name already exists for the
    /// project.
    pub fn create_context(
        &self,
        project: &str,
        name: &str,
        context: Context,
    ) -> Result<(), RegistryError> {
        let mut data = self.data.write().map_err(|_| RegistryError::MutexPoisoned)?;
        let entry = data.projects.entry(project.to_string()).or_default();
        if entry.contexts.contains_key(name) {
            return Err(RegistryError::ContextExists {
                identity: project.to_string(),
                name: name.to_string(),
            });
        }
        entry.contexts.insert(name.to_string(), context);
        Ok(())
    }

    /// Delete a context, pruning the project entry if it becomes empty.
    /// Returns the removed context.
    pub fn delete_context(&self, project: &str, name: &str) -> Result<Context, RegistryError> {
        let mut data = self.data.write().map_err(|_| RegistryError::MutexPoisoned)?;
        let entry = data
            .projects
            .get_mut(project)
            .ok_or_else(|| RegistryError::ProjectNotFound {
                identity: project.to_string(),
            })?;
        let removed = entry
            .contexts
            .remove(name)
            .ok_or_else(|| RegistryError::ContextNotFound {
                identity: project.to_string(),
                name: name.to_string(),
            })?;
        if entry.contexts.is_empty() {
            data.projects.remove(project);
        }
        Ok(removed)
    }

    /// Update the advisory worktree path of a context.
    pub fn set_context_path(
        &self,
        project: &str,
        name: &str,
        path: Option<PathBuf>,
    ) -> Result<(), RegistryError> {
        self.with_context_mut(project, name, |ctx| ctx.path = path)
    }

    /// Set a global (flat-map) override. Last write wins.
    pub fn set_env_override(
        &self,
        project: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), RegistryError> {
        self.with_context_mut(project, name, |ctx| {
            ctx.env_overrides.insert(key.to_string(), value.to_string());
        })
    }

    /// Remove a global override. Returns whether the key was present,
    /// checking both the flat map and the structured globals.
    pub fn unset_env_override(
        &self,
        project: &str,
        name: &str,
        key: &str,
    ) -> Result<bool, RegistryError> {
        self.with_context_mut(project, name, |ctx| {
            let flat = ctx.env_overrides.remove(key).is_some();
            let v2 = ctx.env_overrides_v2.global.remove(key).is_some();
            flat || v2
        })
    }

    /// Set a per-service override in the structured form.
    pub fn set_service_env_override(
        &self,
        project: &str,
        name: &str,
        service: &str,
        key: &str,
        value: &str,
    ) -> Result<(), RegistryError> {
        self.with_context_mut(project, name, |ctx| {
            ctx.env_overrides_v2
                .services
                .entry(service.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
        })
    }

    /// Remove a per-service override. Empty service maps are pruned.
    pub fn unset_service_env_override(
        &self,
        project: &str,
        name: &str,
        service: &str,
        key: &str,
    ) -> Result<bool, RegistryError> {
        self.with_context_mut(project, name, |ctx| {
            let Some(map) = ctx.env_overrides_v2.services.get_mut(service) else {
                return false;
            };
            let removed = map.remove(key).is_some();
            if map.is_empty() {
                ctx.env_overrides_v2.services.remove(service);
            }
            removed
        })
    }

    fn with_context_mut<T>(
        &self,
        project: &str,
        name: &str,
        f: impl FnOnce(&mut Context) -> T,
    ) -> Result<T, RegistryError> {
        let mut data = self.data.write().map_err(|_| RegistryError::MutexPoisoned)?;
        let entry = data
            .projects
            .get_mut(project)
            .ok_or_else(|| RegistryError::ProjectNotFound {
                identity: project.to_string(),
            })?;
        let ctx = entry
            .contexts
            .get_mut(name)
            .ok_or_else(|| RegistryError::ContextNotFound {
                identity: project.to_string(),
                name: name.to_string(),
            })?;
        Ok(f(ctx))
    }

    // ---- queries (copy-out; never touch the file or the file lock) ----

    /// Fetch a context by name.
    pub fn get_context(&self, project: &str, name: &str) -> Result<Context, RegistryError> {
        let data = self.data.read().map_err(|_| RegistryError::MutexPoisoned)?;
        let entry = data
            .projects
            .get(project)
            .ok_or_else(|| RegistryError::ProjectNotFound {
                identity: project.to_string(),
            })?;
        entry
            .contexts
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ContextNotFound {
                identity: project.to_string(),
                name: name.to_string(),
            })
    }

    /// All contexts of a project, sorted by name. A project with no registry
    /// entry simply has no contexts yet.
    pub fn list_contexts(&self, project: &str) -> Result<Vec<(String, Context)>, RegistryError> {
        let data = self.data.read().map_err(|_| RegistryError::MutexPoisoned)?;
        Ok(data
            .projects
            .get(project)
            .map(|entry| {
                entry
                    .contexts
                    .iter()
                    .map(|(name, ctx)| (name.clone(), ctx.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn context_exists(&self, project: &str, name: &str) -> Result<bool, RegistryError> {
        let data = self.data.read().map_err(|_| RegistryError::MutexPoisoned)?;
        Ok(data
            .projects
            .get(project)
            .is_some_and(|entry| entry.contexts.contains_key(name)))
    }

    /// Copy of the full project map, for status reporting.
    pub fn all_projects(&self) -> Result<BTreeMap<String, Project>, RegistryError> {
        let data = self.data.read().map_err(|_| RegistryError::MutexPoisoned)?;
        Ok(data.projects.clone())
    }

    /// First base port in the progression `start, start+increment, …` not
    /// used by any context of any project in this registry.
    ///
    /// Every context thereby owns a block of `increment` contiguous ports,
    /// which bounds how many services a project can configure before its
    /// block would run into the next one.
    pub fn find_next_available_port(
        &self,
        start: u16,
        increment: u16,
    ) -> Result<u16, RegistryError> {
        let data = self.data.read().map_err(|_| RegistryError::MutexPoisoned)?;
        let used: BTreeSet<u16> = data
            .projects
            .values()
            .flat_map(|p| p.contexts.values().map(|c| c.base_port))
            .collect();
        let mut candidate = u32::from(start);
        while candidate <= u32::from(u16::MAX) {
            let port = candidate as u16;
            if !used.contains(&port) {
                return Ok(port);
            }
            candidate += u32::from(increment);
        }
        Err(RegistryError::PortSpaceExhausted)
    }
}
