//! Configuration storage operations

use crate::{models::Config, Result};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

pub struct ConfigStorage {
    config_dir: PathBuf,
}

impl ConfigStorage {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Load and validate the configuration, writing a default file if none exists.
    pub fn load(&self) -> Result<Config> {
        let config_path = self.path();

        if !config_path.exists() {
            return self.write_default();
        }

        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            return self.write_default();
        }

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from an explicit path without creating it.
    pub fn load_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.path(), content)?;

        Ok(())
    }

    fn write_default(&self) -> Result<Config> {
        let config = Config::default();
        self.save(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerConfig;
    use crate::Error;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_default() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().join("chainrpc"));

        let config = storage.load().unwrap();
        assert_eq!(config, Config::default());
        assert!(storage.path().exists());
    }

    #[test]
    fn test_empty_file_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().to_path_buf());
        std::fs::write(storage.path(), "  \n").unwrap();

        let config = storage.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().to_path_buf());

        let mut config = Config::default();
        config.servers.insert(
            "regtest".to_string(),
            ServerConfig::http("http://127.0.0.1:18443").with_credentials("rpc", "secret"),
        );
        config.default_server = Some("regtest".to_string());
        storage.save(&config).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.server(None).unwrap().url.as_deref(),
            Some("http://127.0.0.1:18443")
        );
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().to_path_buf());
        std::fs::write(
            storage.path(),
            r#"{"daemon":{"socket_path":"","log_level":"info"}}"#,
        )
        .unwrap();

        assert!(matches!(storage.load(), Err(Error::Validation(_))));
        assert!(ConfigStorage::load_file(&storage.path()).is_err());
    }
}
