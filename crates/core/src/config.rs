//! Keel configuration
//!
//! Resolves a named connection string from a JSON or YAML settings file into
//! a database location, plus connection options for the SQLite engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Database file name used when none is given
pub const DEFAULT_DB_NAME: &str = "data.db";

/// Configuration error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("No connection string named '{0}'")]
    MissingConnectionString(String),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
}

/// Directory plus file name of a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbLocation {
    pub directory: PathBuf,
    pub file_name: String,
}

impl DbLocation {
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_name: file_name.into(),
        }
    }

    /// Location inside the default directory, appending `.db` to bare names
    pub fn from_name(name: &str) -> Self {
        let file_name = if name.contains('.') {
            name.to_string()
        } else {
            format!("{}.db", name)
        };
        Self::new(default_directory(), file_name)
    }

    /// Parse `Data Source = <path>[; ...]`
    pub fn from_connection_string(conn: &str) -> Result<Self, ConfigError> {
        let source = conn
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| {
                let key = key.trim();
                key.eq_ignore_ascii_case("data source") || key.eq_ignore_ascii_case("filename")
            })
            .map(|(_, value)| value.trim())
            .ok_or_else(|| ConfigError::InvalidConnectionString(conn.to_string()))?;

        Self::from_path(Path::new(source))
            .ok_or_else(|| ConfigError::InvalidConnectionString(conn.to_string()))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => default_directory(),
        };
        Some(Self::new(directory, file_name))
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn connection_string(&self) -> String {
        format!("Data Source = {}", self.path().display())
    }
}

impl Default for DbLocation {
    fn default() -> Self {
        Self::new(default_directory(), DEFAULT_DB_NAME)
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

/// SQLite journal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    #[default]
    Wal,
    Memory,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Wal => "WAL",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Connection options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreOptions {
    /// How long a connection waits on a locked database (ms)
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default)]
    pub journal_mode: JournalMode,
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout(),
            journal_mode: JournalMode::default(),
        }
    }
}

/// Settings file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionSettings {
    #[serde(default)]
    pub connection_strings: HashMap<String, String>,

    #[serde(default)]
    pub store: StoreOptions,
}

impl ConnectionSettings {
    /// Load from a `.yaml`/`.yml` or JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn connection_string(&self, name: &str) -> Option<&str> {
        self.connection_strings.get(name).map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> Result<DbLocation, ConfigError> {
        let conn = self
            .connection_string(name)
            .ok_or_else(|| ConfigError::MissingConnectionString(name.to_string()))?;
        DbLocation::from_connection_string(conn)
    }
}

/// Resolve `name` through the settings file, falling back to a database
/// named after `name` in the default directory.
pub fn resolve_location(settings_path: &Path, name: &str) -> (DbLocation, StoreOptions) {
    let resolved = ConnectionSettings::load(settings_path)
        .and_then(|settings| settings.resolve(name).map(|loc| (loc, settings.store)));
    match resolved {
        Ok(found) => found,
        Err(e) => {
            warn!("Falling back to default location for '{}': {}", name, e);
            (DbLocation::from_name(name), StoreOptions::default())
        }
    }
}
