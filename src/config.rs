//! Settings from `config.toml`, environment variables, and command-line flags,
//! in increasing order of precedence.

use directories::ProjectDirs;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::models::Owner;

pub const DEFAULT_OWNER_ID: &str = "local";
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown backend '{0}', expected 'sqlite' or 'local'")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Local,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "db" => Ok(Backend::Sqlite),
            "local" | "json" => Ok(Backend::Local),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => f.write_str("sqlite"),
            Backend::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<Backend>,
    data_dir: Option<PathBuf>,
    log_level: Option<String>,
    user: UserSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserSection {
    id: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub owner: Owner,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "nextstep")
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(FileConfig::default())
    }
}

impl Config {
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn default_data_dir() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".nextstep"))
    }

    /// Load `path`, or the default config file when it exists, then apply
    /// `NEXTSTEP_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: FileConfig) -> Self {
        let owner = Owner::new(
            file.user.id.unwrap_or_else(|| DEFAULT_OWNER_ID.to_string()),
            file.user.name.unwrap_or_default(),
            file.user.email.unwrap_or_default(),
        );
        Self {
            backend: file.backend.unwrap_or_default(),
            data_dir: file.data_dir.unwrap_or_else(Self::default_data_dir),
            log_level: file
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            owner,
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(dir) = lookup("NEXTSTEP_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("NEXTSTEP_BACKEND").filter(|v| !v.is_empty()) {
            self.backend = backend.parse()?;
        }
        if let Some(user) = lookup("NEXTSTEP_USER").filter(|v| !v.is_empty()) {
            self.owner.id = user;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("nextstep.db")
    }

    pub fn local_dir(&self) -> PathBuf {
        self.data_dir.join("local")
    }
}
