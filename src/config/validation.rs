//! Router settings validation.
//!
//! # Responsibilities
//! - Turn `[router]`, `[bind]` and `[connect]` entries into typed settings
//! - Validate value ranges and address syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: entries → Result<RouterSettings, Vec<ValidationError>>
//! - Unknown keys are ignored so older configs keep loading

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

use crate::config::schema::{BIND_SECTION, CONNECT_SECTION, DEFAULT_NETID, ROUTER_SECTION};
use crate::config::store::ConfigEntry;

const NETID_MAX: usize = 8;
const NICKNAME_MAX: usize = 32;

/// A single semantic problem in the router config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("router.netid must be 1-8 ASCII bytes, got {0:?}")]
    InvalidNetId(String),

    #[error("router.nickname is longer than 32 bytes")]
    NicknameTooLong,

    #[error("router.{key} must be a non-negative integer, got {value:?}")]
    InvalidCount { key: &'static str, value: String },

    #[error("router.max-connections must be greater than zero")]
    NoConnectionsAllowed,

    #[error("router.min-connections ({min}) exceeds max-connections ({max})")]
    ConnectionBounds { min: usize, max: usize },

    #[error("[{section}] {name}: invalid address {value:?}")]
    InvalidAddress {
        section: &'static str,
        name: String,
        value: String,
    },
}

/// Validated router settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    pub netid: String,
    pub nickname: Option<String>,
    pub max_connections: usize,
    pub min_connections: usize,
    /// Listen addresses, keyed by their config name.
    pub binds: Vec<(String, SocketAddr)>,
    /// Peers to dial on start.
    pub connects: Vec<(String, SocketAddr)>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            netid: DEFAULT_NETID.to_string(),
            nickname: None,
            max_connections: 64,
            min_connections: 4,
            binds: Vec::new(),
            connects: Vec::new(),
        }
    }
}

/// Build router settings from config entries.
pub fn validate_router(entries: &[ConfigEntry]) -> Result<RouterSettings, Vec<ValidationError>> {
    let mut settings = RouterSettings::default();
    let mut errors = Vec::new();

    for entry in entries {
        match entry.section.as_str() {
            ROUTER_SECTION => apply_router_key(&mut settings, entry, &mut errors),
            BIND_SECTION => match parse_bind(&entry.value) {
                Some(addr) => settings.binds.push((entry.key.clone(), addr)),
                None => errors.push(invalid_address(BIND_SECTION, entry)),
            },
            CONNECT_SECTION => match entry.value.trim().parse::<SocketAddr>() {
                Ok(addr) => settings.connects.push((entry.key.clone(), addr)),
                Err(_) => errors.push(invalid_address(CONNECT_SECTION, entry)),
            },
            _ => {}
        }
    }

    if settings.max_connections == 0 {
        errors.push(ValidationError::NoConnectionsAllowed);
    } else if settings.min_connections > settings.max_connections {
        errors.push(ValidationError::ConnectionBounds {
            min: settings.min_connections,
            max: settings.max_connections,
        });
    }

    if errors.is_empty() {
        Ok(settings)
    } else {
        Err(errors)
    }
}

fn apply_router_key(
    settings: &mut RouterSettings,
    entry: &ConfigEntry,
    errors: &mut Vec<ValidationError>,
) {
    let value = entry.value.trim();
    match entry.key.as_str() {
        "netid" => {
            if value.is_empty() || value.len() > NETID_MAX || !value.is_ascii() {
                errors.push(ValidationError::InvalidNetId(value.to_string()));
            } else {
                settings.netid = value.to_string();
            }
        }
        "nickname" => {
            if value.len() > NICKNAME_MAX {
                errors.push(ValidationError::NicknameTooLong);
            } else if !value.is_empty() {
                settings.nickname = Some(value.to_string());
            }
        }
        "max-connections" => match value.parse() {
            Ok(n) => settings.max_connections = n,
            Err(_) => errors.push(ValidationError::InvalidCount {
                key: "max-connections",
                value: value.to_string(),
            }),
        },
        "min-connections" => match value.parse() {
            Ok(n) => settings.min_connections = n,
            Err(_) => errors.push(ValidationError::InvalidCount {
                key: "min-connections",
                value: value.to_string(),
            }),
        },
        // threads belongs to the orchestrator
        "threads" => {}
        other => tracing::debug!(key = other, "Ignoring unknown router key"),
    }
}

fn parse_bind(value: &str) -> Option<SocketAddr> {
    let value = value.trim();
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Some(addr);
    }
    value
        .parse::<u16>()
        .ok()
        .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
}

fn invalid_address(section: &'static str, entry: &ConfigEntry) -> ValidationError {
    ValidationError::InvalidAddress {
        section,
        name: entry.key.clone(),
        value: entry.value.clone(),
    }
}
