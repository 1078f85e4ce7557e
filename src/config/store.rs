//! Key/value config store backed by a TOML document.
//!
//! # Responsibilities
//! - Flatten the document into ordered `(section, key, value)` entries
//! - Preserve file order for enumeration
//! - Expand arrays into repeated keys

use std::fs;
use std::path::{Path, PathBuf};

use toml::{Table, Value};

use crate::config::loader::ConfigError;
use crate::subsystem::ConfigStore;

/// A single `(section, key, value)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl ConfigEntry {
    pub fn new(
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// True if this entry sits at `section.key`.
    pub fn is(&self, section: &str, key: &str) -> bool {
        self.section == section && self.key == key
    }
}

/// Config store loaded from a TOML file.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
    entries: Vec<ConfigEntry>,
}

impl TomlConfigStore {
    /// Load and flatten the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(path, &content)
    }

    /// Parse `content` as if it had been read from `path`.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let table: Table = content.parse().map_err(ConfigError::Parse)?;

        let mut entries = Vec::new();
        flatten("", &table, &mut entries);

        tracing::debug!(path = %path.display(), entries = entries.len(), "Config parsed");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Path the store was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }
}

impl ConfigStore for TomlConfigStore {
    fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }
}

fn flatten(section: &str, table: &Table, out: &mut Vec<ConfigEntry>) {
    for (key, value) in table {
        match value {
            Value::Table(inner) => flatten(&child_section(section, key), inner, out),
            Value::Array(items) => {
                for item in items {
                    push(section, key, item, out);
                }
            }
            scalar => push(section, key, scalar, out),
        }
    }
}

fn push(section: &str, key: &str, value: &Value, out: &mut Vec<ConfigEntry>) {
    let value = match value {
        Value::Table(inner) => {
            // array of tables
            flatten(&child_section(section, key), inner, out);
            return;
        }
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Datetime(d) => d.to_string(),
        Value::Array(_) => value.to_string(),
    };
    out.push(ConfigEntry::new(section, key, value));
}

fn child_section(section: &str, key: &str) -> String {
    if section.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", section, key)
    }
}
