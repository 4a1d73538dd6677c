use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::schema::ObjectDescriptor;

/// Engine settings, usually read from `lazydb.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the database file
    pub storage_location: PathBuf,
    /// Prepended to the database file name (e.g. `test_`)
    pub name_prefix: Option<String>,
    pub base_name: String,
    /// How long to wait on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Rows fetched per cursor page
    pub page_size: usize,
    /// SQLite journal mode; left at the SQLite default when unset
    pub journal_mode: Option<String>,
    /// Descriptors registered when the engine opens
    pub descriptors: Vec<ObjectDescriptor>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_location: PathBuf::from(".lazydb"),
            name_prefix: None,
            base_name: "lazy_database".to_string(),
            busy_timeout_ms: 5_000,
            page_size: 256,
            journal_mode: None,
            descriptors: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// `<storage_location>/<name_prefix><base_name>.db`
    pub fn database_path(&self) -> PathBuf {
        let prefix = self.name_prefix.as_deref().unwrap_or_default();
        self.storage_location
            .join(format!("{}{}.db", prefix, self.base_name))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("lazydb.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<EngineConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: EngineConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &EngineConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}
