//! TOML config file handling shared by the Uppe binaries.
//!
//! Each binary owns its `Config` struct; this crate finds, creates, reads and
//! writes the file, and formats the startup summary.

use std::{env, fmt, fs, path};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

/// Used to ensure we are actually reading a toml file
pub fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// `$XDG_CONFIG_HOME/uppe/{file_name}`, or `$HOME/.config/uppe/{file_name}`
pub fn default_config_path(file_name: &str) -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("uppe").join(file_name))
}

/// Read the config at `optional_path` (or the default location for
/// `file_name`). A missing file is created with `T::default()`.
pub fn load_or_create<T>(optional_path: Option<&path::Path>, file_name: &str) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let config_path = match optional_path {
        Some(path) => normalize_toml_path(path),
        None => default_config_path(file_name)?,
    };

    if config_path.exists() {
        let raw_string = fs::read_to_string(&config_path)
            .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
        Ok(toml::from_str(raw_string.as_str())?)
    } else {
        let config = T::default();
        write_config(&config, &config_path)?;
        Ok(config)
    }
}

/// Serialize and write a config to a file, creating parent directories
pub fn write_config<T: Serialize>(config: &T, path: &path::Path) -> Result<(), ConfigError> {
    let config_str: String = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
    }

    fs::write(path, config_str).map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
}

/// Section heading in a config summary
pub fn write_title(f: &mut fmt::Formatter<'_>, level: usize, label: &str) -> fmt::Result {
    writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
}

/// `label: value` line under a heading
pub fn write_field(f: &mut fmt::Formatter<'_>, level: usize, label: &str, value: &dyn fmt::Display) -> fmt::Result {
    writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
}
