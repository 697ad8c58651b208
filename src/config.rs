//! Settings for connecting to the target database and locating the version table.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::postgres_backend::{VersionTable, DEFAULT_LOCK_KEY};
use crate::Result;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "stepladder.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_url: Option<String>,
    pub version_table: String,
    pub version_schema: Option<String>,
    pub lock_key: i64,
}
impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            version_table: "schema_version".to_owned(),
            version_schema: None,
            lock_key: DEFAULT_LOCK_KEY,
        }
    }
}

/// Values given on the command line or through the environment. They win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub version_table: Option<String>,
    pub version_schema: Option<String>,
    pub lock_key: Option<i64>,
}

impl Config {
    /// Loads the configuration.
    ///
    /// Resolution order (highest priority first):
    /// 1. `overrides` (CLI flags and environment variables)
    /// 2. the file at `path`, or `stepladder.toml` in the working directory if it exists
    /// 3. compiled defaults
    ///
    /// An explicitly given `path` must exist.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Config::from_file(&default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Config::from_toml(&contents)
            .map_err(|error| Error::Config(format!("{}: {}", path.display(), error)))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|error| Error::Config(error.to_string()))
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(ref database_url) = overrides.database_url {
            self.database_url = Some(database_url.clone());
        }
        if let Some(ref version_table) = overrides.version_table {
            self.version_table = version_table.clone();
        }
        if let Some(ref version_schema) = overrides.version_schema {
            self.version_schema = Some(version_schema.clone());
        }
        if let Some(lock_key) = overrides.lock_key {
            self.lock_key = lock_key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version_table.trim().is_empty() {
            return Err(Error::Config("version_table must not be empty".to_owned()));
        }
        if let Some(ref schema) = self.version_schema {
            if schema.trim().is_empty() {
                return Err(Error::Config("version_schema must not be empty".to_owned()));
            }
        }
        Ok(())
    }

    /// The database URL, required by every command that talks to the database.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            Error::Config(
                "no database URL; set database_url in stepladder.toml, \
                 STEPLADDER_DATABASE_URL, or --database-url"
                    .to_owned(),
            )
        })
    }

    pub fn version_table(&self) -> VersionTable {
        VersionTable::new(self.version_table.clone(), self.version_schema.clone())
    }
}
