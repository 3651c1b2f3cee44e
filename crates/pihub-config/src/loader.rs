//! Configuration loader with multi-source merging.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::HubConfig;

/// Name of the discovered project config file.
const CONFIG_FILE_NAME: &str = "pihub.toml";

/// Configuration loader with builder pattern.
///
/// Precedence, lowest to highest: built-in defaults, the TOML file,
/// `PIHUB_*` environment variables.
pub struct ConfigLoader {
    path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a loader that discovers `pihub.toml` in the working
    /// directory.
    pub fn new() -> Self {
        Self {
            path: None,
            env_prefix: "PIHUB".to_string(),
        }
    }

    /// Uses an explicit config file path; the file must exist.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Overrides the environment variable prefix (default: `PIHUB`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Loads, merges and validates the configuration.
    pub fn load(self) -> ConfigResult<HubConfig> {
        let mut config = match &self.path {
            Some(path) => Self::parse_file(path)?,
            None => {
                let discovered = PathBuf::from(CONFIG_FILE_NAME);
                if discovered.exists() {
                    Self::parse_file(&discovered)?
                } else {
                    debug!("no {CONFIG_FILE_NAME} found, using defaults");
                    HubConfig::default()
                }
            }
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> ConfigResult<HubConfig> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut HubConfig) -> ConfigResult<()> {
        if let Some(port) = self.env_value("PORT") {
            config.server.port = Self::parse_env(&self.env_name("PORT"), &port)?;
        }
        if let Some(max_clients) = self.env_value("MAX_CLIENTS") {
            config.server.max_clients =
                Self::parse_env(&self.env_name("MAX_CLIENTS"), &max_clients)?;
        }
        if let Some(interface) = self.env_value("NET_INTERFACE") {
            config.server.net_interface = interface;
        }
        Ok(())
    }

    fn env_name(&self, key: &str) -> String {
        format!("{}_{key}", self.env_prefix)
    }

    fn env_value(&self, key: &str) -> Option<String> {
        env::var(self.env_name(key)).ok()
    }

    fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T>
    where
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|e: T::Err| ConfigError::Env {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::tempdir;

    #[test]
    fn missing_discovered_file_yields_defaults() {
        let config = ConfigLoader::new()
            .with_env_prefix("PIHUB_TEST_NONE")
            .load()
            .unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn explicit_file_is_required() {
        let err = ConfigLoader::new()
            .with_path("/nonexistent/pihub.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pihub.toml");
        fs::write(
            &path,
            r#"
            [server]
            port = 7200
            max_clients = 3

            [dispatcher]
            delimiter = ","
            "#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_path(&path)
            .with_env_prefix("PIHUB_TEST_FILE")
            .load()
            .unwrap();

        assert_eq!(config.server.port, 7200);
        assert_eq!(config.server.max_clients, 3);
        assert_eq!(config.dispatcher.delimiter, ",");
        assert_eq!(config.server.max_pending, 10, "default preserved");
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pihub.toml");
        fs::write(&path, "server = 12").unwrap();

        let err = ConfigLoader::new().with_path(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pihub.toml");
        fs::write(&path, "[server]\nport = 7300\n").unwrap();

        // A test-unique prefix keeps this isolated from parallel tests.
        env::set_var("PIHUB_TEST_ENV_PORT", "7400");
        let config = ConfigLoader::new()
            .with_path(&path)
            .with_env_prefix("PIHUB_TEST_ENV")
            .load()
            .unwrap();
        env::remove_var("PIHUB_TEST_ENV_PORT");

        assert_eq!(config.server.port, 7400);
    }

    #[test]
    fn bad_env_value_reports_error() {
        env::set_var("PIHUB_TEST_BAD_PORT", "not-a-port");
        let err = ConfigLoader::new()
            .with_env_prefix("PIHUB_TEST_BAD")
            .load()
            .unwrap_err();
        env::remove_var("PIHUB_TEST_BAD_PORT");

        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn invalid_merged_config_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pihub.toml");
        fs::write(&path, "[server]\nmax_clients = 0\n").unwrap();

        let err = ConfigLoader::new().with_path(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
