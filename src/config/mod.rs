//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & parse, default file generation)
//!     → store.rs (flatten into ordered (section, key, value) entries)
//!     → lifecycle::startup (pure mapping: pool size, netdb dir)
//!     → validation.rs (router settings, all errors collected)
//! ```
//!
//! # Design Decisions
//! - Enumeration order is file order (`toml` with `preserve_order`)
//! - Arrays expand into repeated keys, so duplicates are possible
//! - Effects are computed after enumeration, never during it

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;

pub use loader::{ensure_config, ConfigError};
pub use schema::{NodeDbDir, DEFAULT_WORKER_THREADS, NODEDB_DIR_MAX};
pub use store::{ConfigEntry, TomlConfigStore};
pub use validation::{validate_router, RouterSettings, ValidationError};
