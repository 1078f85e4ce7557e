//! Node database: on-disk store of peer records.
//!
//! # Responsibilities
//! - Create and validate the database directory
//! - Lay out hash-prefix subdirectories (`0`..`f`)
//! - Map peer keys to record paths and count stored records
//!
//! The record format itself is out of scope.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::schema::NodeDbDir;
use crate::subsystem::{Crypto, NodeDatabase};

/// File extension of stored peer records.
pub const RECORD_EXTENSION: &str = "signed";

const PREFIXES: &str = "0123456789abcdef";

/// Directory-backed node database.
pub struct NodeDb {
    crypto: Arc<dyn Crypto>,
    root: OnceLock<PathBuf>,
    records: AtomicUsize,
}

impl NodeDb {
    pub fn new(crypto: Arc<dyn Crypto>) -> Self {
        Self {
            crypto,
            root: OnceLock::new(),
            records: AtomicUsize::new(0),
        }
    }

    /// Root directory, once `ensure_dir` has succeeded.
    pub fn root(&self) -> Option<&Path> {
        self.root.get().map(PathBuf::as_path)
    }

    /// Where the record for `pubkey` lives.
    pub fn record_path(&self, pubkey: &[u8]) -> Option<PathBuf> {
        let root = self.root.get()?;
        let name = hex::encode(self.crypto.shorthash(pubkey));
        let prefix = &name[..1];
        Some(root.join(prefix).join(format!("{}.{}", name, RECORD_EXTENSION)))
    }
}

impl NodeDatabase for NodeDb {
    fn ensure_dir(&self, dir: &NodeDbDir) -> std::io::Result<()> {
        if dir.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty node database path",
            ));
        }

        let root = dir.to_path_buf();
        if root.exists() && !root.is_dir() {
            return Err(std::io::Error::other(format!(
                "{} exists and is not a directory",
                root.display()
            )));
        }

        fs::create_dir_all(&root)?;
        for prefix in PREFIXES.chars() {
            fs::create_dir_all(root.join(prefix.to_string()))?;
        }

        let count = count_records(&root)?;
        self.records.store(count, Ordering::SeqCst);

        tracing::info!(path = %root.display(), records = count, "Node database ready");
        let _ = self.root.set(root);
        Ok(())
    }

    fn record_count(&self) -> usize {
        self.records.load(Ordering::SeqCst)
    }
}

fn count_records(root: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for prefix in PREFIXES.chars() {
        for entry in fs::read_dir(root.join(prefix.to_string()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
                count += 1;
            }
        }
    }
    Ok(count)
}
