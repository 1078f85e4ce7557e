//! Configuration schema: well-known sections, keys, and bounds.
//!
//! The store itself is untyped; this module names the entries the daemon
//! understands and defines the default document written by
//! [`ensure_config`](crate::config::ensure_config).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const ROUTER_SECTION: &str = "router";
pub const NETDB_SECTION: &str = "netdb";
pub const BIND_SECTION: &str = "bind";
pub const CONNECT_SECTION: &str = "connect";

pub const THREADS_KEY: &str = "threads";
pub const DIR_KEY: &str = "dir";

/// Worker pool size used when the config does not set `router.threads`.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Capacity of the node database directory buffer, terminator included.
pub const NODEDB_DIR_MAX: usize = 256;

/// Network id written into generated configs.
pub const DEFAULT_NETID: &str = "overlay";

/// Port relays listen on in generated configs.
pub const DEFAULT_RELAY_PORT: u16 = 1090;

/// Node database directory held in a fixed, NUL-terminated buffer.
///
/// Longer inputs are cut to `NODEDB_DIR_MAX - 1` bytes on a character
/// boundary; an embedded NUL ends the path early.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeDbDir {
    buf: [u8; NODEDB_DIR_MAX],
    len: usize,
    truncated: bool,
}

impl NodeDbDir {
    pub fn new(raw: &str) -> Self {
        let mut truncated = false;

        let raw = match raw.find('\0') {
            Some(nul) => {
                truncated = true;
                &raw[..nul]
            }
            None => raw,
        };

        let mut end = raw.len().min(NODEDB_DIR_MAX - 1);
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        truncated |= end < raw.len();

        let mut buf = [0u8; NODEDB_DIR_MAX];
        buf[..end].copy_from_slice(&raw.as_bytes()[..end]);

        Self {
            buf,
            len: end,
            truncated,
        }
    }

    pub fn as_str(&self) -> &str {
        // Only whole characters are ever copied in.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    /// The path bytes followed by the terminating NUL.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if the configured value did not fit as-is.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.as_str())
    }
}

impl fmt::Debug for NodeDbDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeDbDir").field(&self.as_str()).finish()
    }
}

impl fmt::Display for NodeDbDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default config document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratedConfig {
    pub router: RouterSection,
    pub netdb: NetdbSection,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bind: BTreeMap<String, String>,
    #[serde(default)]
    pub connect: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterSection {
    pub threads: i64,
    pub netid: String,
    #[serde(rename = "max-connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetdbSection {
    pub dir: String,
}

impl GeneratedConfig {
    pub fn new(basedir: Option<&Path>, as_relay: bool) -> Self {
        let netdb_dir = match basedir {
            Some(base) => base.join("netdb"),
            None => PathBuf::from("netdb"),
        };

        let mut bind = BTreeMap::new();
        if as_relay {
            bind.insert("public".to_string(), format!("0.0.0.0:{}", DEFAULT_RELAY_PORT));
        }

        Self {
            router: RouterSection {
                threads: DEFAULT_WORKER_THREADS as i64,
                netid: DEFAULT_NETID.to_string(),
                max_connections: 64,
            },
            netdb: NetdbSection {
                dir: netdb_dir.display().to_string(),
            },
            bind,
            connect: BTreeMap::new(),
        }
    }
}
