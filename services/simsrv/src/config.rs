//! Service configuration
//!
//! Layered the usual way: built-in defaults, then an optional YAML file,
//! then `SIMSRV_`-prefixed environment variables (nested keys separated by
//! `__`, e.g. `SIMSRV_API__LISTEN`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimSrvError};

/// Admin API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address of the REST admin API
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8090".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default tracing directive, overridable with RUST_LOG
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    /// Root directory holding devices/ and templates/
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            data_dir: default_data_dir(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load the configuration, optionally from an explicit file path.
    ///
    /// An explicit path must exist; the implicit `simsrv.yaml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = match path {
            Some(p) => figment.merge(Yaml::file_exact(p)),
            None => figment.merge(Yaml::file("simsrv.yaml")),
        };
        let config: Config = figment.merge(Env::prefixed("SIMSRV_").split("__")).extract()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.api
            .listen
            .parse::<SocketAddr>()
            .map_err(|e| SimSrvError::config(format!("invalid api.listen '{}': {e}", self.api.listen)))?;
        if self.log.level.trim().is_empty() {
            return Err(SimSrvError::config("log.level must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.listen, "0.0.0.0:8090");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.log.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api:\n  listen: \"127.0.0.1:9999\"\ndata_dir: /tmp/simsrv").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.api.listen, "127.0.0.1:9999");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/simsrv"));
        // untouched keys keep their defaults
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some(Path::new("/nonexistent/simsrv.yaml"))).is_err());
    }

    #[test]
    fn test_invalid_listen_rejected() {
        let mut config = Config::default();
        config.api.listen = "not an address".to_string();
        assert!(config.validate().is_err());
    }
}
