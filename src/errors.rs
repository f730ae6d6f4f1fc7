//! Typed error hierarchy for dual.
//!
//! Three top-level enums cover the three core subsystems:
//! - `ProjectError` — project-identity resolution failures
//! - `RegistryError` — registry locking, persistence and lookup failures
//! - `PortError` — port calculation and validation failures
//!
//! Lookup failures (`ProjectNotFound`, `ContextNotFound`, `ServiceNotFound`)
//! are expected conditions; command handlers match on them and print guidance
//! instead of a bare error chain.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from project-identity resolution.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("No git repository found at or above {start}")]
    NotAGitRepository { start: PathBuf },

    #[error("{path} is not a git worktree")]
    NotAWorktree { path: PathBuf },

    #[error("Parent repository {parent} for worktree {worktree} no longer exists")]
    ParentRepositoryNotFound { parent: PathBuf, worktree: PathBuf },

    #[error("Failed to read {path}: {source}")]
    GitFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the context registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Project {identity} not found in registry")]
    ProjectNotFound { identity: String },

    #[error("Context '{name}' not found for project {identity}")]
    ContextNotFound { identity: String, name: String },

    #[error("Context '{name}' already exists for project {identity}")]
    ContextExists { identity: String, name: String },

    #[error(
        "Timed out after {waited_ms}ms waiting for the registry lock at {path} \
         (another dual command may be running)"
    )]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Registry mutex poisoned")]
    MutexPoisoned,

    #[error("Registry was already closed")]
    Closed,

    #[error("No free base port below 65536; remove unused contexts")]
    PortSpaceExhausted,

    #[error("Failed to write registry at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the port allocation engine.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Service '{name}' is not configured for this project")]
    ServiceNotFound { name: String },

    #[error("Base port {port} is outside the allowed range 1024-65535")]
    InvalidBasePort { port: u32 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
