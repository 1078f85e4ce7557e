//! Configuration loading from disk and default file generation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::GeneratedConfig;

/// Directory (under the user's home) holding the default config.
pub const CONFIG_DIR_NAME: &str = ".overlayd";

/// File name of the default config.
pub const CONFIG_FILE_NAME: &str = "overlayd.toml";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Serialize(e) => Some(e),
        }
    }
}

/// Resolve the default config path from the platform home directory.
///
/// `$HOME/.overlayd/overlayd.toml` on Unix, `%APPDATA%\.overlayd\overlayd.toml`
/// on Windows. Returns `None` when the variable is unset.
pub fn default_config_path() -> Option<PathBuf> {
    #[cfg(windows)]
    let home = std::env::var_os("APPDATA")?;
    #[cfg(not(windows))]
    let home = std::env::var_os("HOME")?;

    Some(PathBuf::from(home).join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Write a default config to `path` unless one already exists.
///
/// `basedir` anchors relative data paths (the node database lives in
/// `<basedir>/netdb`). Returns `true` when a file was written.
pub fn ensure_config(
    path: &Path,
    basedir: Option<&Path>,
    overwrite: bool,
    as_relay: bool,
) -> Result<bool, ConfigError> {
    if path.exists() && !overwrite {
        tracing::debug!(path = %path.display(), "Config exists, leaving it untouched");
        return Ok(false);
    }

    let generated = GeneratedConfig::new(basedir, as_relay);
    let content = toml::to_string(&generated).map_err(ConfigError::Serialize)?;
    fs::write(path, content).map_err(ConfigError::Io)?;

    tracing::info!(path = %path.display(), relay = as_relay, "Generated default config");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::TomlConfigStore;

    #[test]
    fn generated_config_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        assert!(ensure_config(&path, Some(dir.path()), false, true).unwrap());
        let store = TomlConfigStore::load(&path).unwrap();

        let netdb = store
            .entries()
            .iter()
            .find(|e| e.is("netdb", "dir"))
            .expect("netdb dir generated");
        assert_eq!(netdb.value, dir.path().join("netdb").display().to_string());
        assert!(store.entries().iter().any(|e| e.section == "bind"));
    }

    #[test]
    fn existing_config_is_kept_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[router]\nthreads = 7\n").unwrap();

        assert!(!ensure_config(&path, Some(dir.path()), false, false).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[router]\nthreads = 7\n");

        assert!(ensure_config(&path, Some(dir.path()), true, false).unwrap());
        assert!(fs::read_to_string(&path).unwrap().contains("[netdb]"));
    }
}
