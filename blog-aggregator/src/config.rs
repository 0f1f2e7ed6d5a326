use crate::types::{AggregatorError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

/// User settings stored as JSON in the home directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AggregatorError::Config("could not locate home directory".to_string()))?;
        Ok(home.join(CONFIG_FILE_NAME))
    }

    pub fn read() -> Result<Self> {
        Self::read_from(Self::default_path()?)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            AggregatorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let mut config: Config = serde_json::from_str(&raw)?;
        config.path = path.to_path_buf();
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `DATABASE_URL` from the environment wins over the file.
    pub fn database_url(&self) -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| self.db_url.clone())
    }

    pub fn current_user(&self) -> Option<&str> {
        self.current_user_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn set_user(&mut self, name: &str) -> Result<()> {
        self.current_user_name = Some(name.to_string());
        self.write()
    }

    fn write(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
