//! Daemon error kinds.
//!
//! Every startup failure is fatal to the run but never to the process:
//! the orchestrator logs it, tears down whatever was constructed, and
//! exits with [`DaemonError::exit_code`].

use std::path::PathBuf;

use thiserror::Error;

use crate::config::loader::ConfigError;

/// Errors that abort daemon startup.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The config file is missing or malformed.
    #[error("Failed to load config {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// No `[netdb] dir` entry was found in the config.
    #[error("No node database directory configured (missing [netdb] dir)")]
    NoNodeDbDir,

    /// The node database directory could not be created or validated.
    #[error("Failed to initialize node database at {path}: {source}")]
    NodeDbInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The router rejected its configuration.
    #[error("Router rejected configuration: {0}")]
    RouterConfig(String),

    /// A directory needed before startup could not be created.
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The event loop runtime could not be built.
    #[error("Failed to create event loop: {0}")]
    EventLoopInit(#[source] std::io::Error),

    /// The OS refused to spawn a pool thread.
    #[error("Failed to spawn thread for pool {pool}: {source}")]
    ThreadSpawn {
        pool: String,
        #[source]
        source: std::io::Error,
    },

    /// `run` was called on a context whose setup did not complete.
    #[error("Daemon is not set up")]
    NotReady,
}

impl DaemonError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Short stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DaemonError::ConfigLoad { .. } => "config_load",
            DaemonError::NoNodeDbDir => "no_nodedb_dir",
            DaemonError::NodeDbInit { .. } => "nodedb_init",
            DaemonError::RouterConfig(_) => "router_config",
            DaemonError::DirectoryCreate { .. } => "directory_create",
            DaemonError::EventLoopInit(_) => "event_loop_init",
            DaemonError::ThreadSpawn { .. } => "thread_spawn",
            DaemonError::NotReady => "not_ready",
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
