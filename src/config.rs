//! Service configuration.
//!
//! The command line accepts only `-d`, so everything else is configured
//! through defaults, an optional TOML file named by `BACKLOGD_CONFIG`, and
//! individual `BACKLOGD_*` environment overrides (applied in that order,
//! later wins).

use std::{
    env, io,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "BACKLOGD_CONFIG";
/// Override for [`ServiceConfig::address`].
pub const ADDRESS_ENV: &str = "BACKLOGD_ADDRESS";
/// Override for [`ServiceConfig::data_path`].
pub const DATA_PATH_ENV: &str = "BACKLOGD_DATA_PATH";
/// Override for [`ServiceConfig::timestamp_interval_secs`].
pub const TIMESTAMP_INTERVAL_ENV: &str = "BACKLOGD_TIMESTAMP_INTERVAL_SECS";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("invalid listen address {value:?}: {source}"))]
    InvalidAddress {
        value: String,
        source: std::net::AddrParseError,
    },

    #[snafu(display("invalid timestamp interval {value:?}: {source}"))]
    InvalidInterval {
        value: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: io::Error },

    #[snafu(display("failed to parse config file {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Runtime configuration for the service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Address the supervisor listens on.
    pub address: SocketAddr,

    /// Path of the backing file (or device node, with the `char-device`
    /// backend).
    pub data_path: PathBuf,

    /// Period of the timestamp injector, in seconds.
    pub timestamp_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            data_path: default_data_path(),
            timestamp_interval_secs: 10,
        }
    }
}

impl ServiceConfig {
    /// Loads the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Ok(value) = env::var(ADDRESS_ENV) {
            config.address = value
                .parse()
                .with_context(|_| InvalidAddressSnafu { value })?;
        }
        if let Ok(value) = env::var(DATA_PATH_ENV) {
            config.data_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var(TIMESTAMP_INTERVAL_ENV) {
            config.timestamp_interval_secs = value
                .parse()
                .with_context(|_| InvalidIntervalSnafu { value })?;
        }

        Ok(config)
    }

    /// Parses a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).with_context(|_| ReadFileSnafu {
            path: path.to_path_buf(),
        })?;
        toml::from_str(&raw).with_context(|_| ParseFileSnafu {
            path: path.to_path_buf(),
        })
    }
}

fn default_address() -> SocketAddr {
    "0.0.0.0:9000".parse().expect("static address is valid")
}

#[cfg(not(feature = "char-device"))]
fn default_data_path() -> PathBuf {
    PathBuf::from("/var/tmp/backlogd.data")
}

#[cfg(feature = "char-device")]
fn default_data_path() -> PathBuf {
    PathBuf::from("/dev/backlog")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.address.port(), 9000);
        assert_eq!(config.timestamp_interval_secs, 10);
    }

    #[test]
    fn parses_toml_with_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "address = \"127.0.0.1:9999\"").unwrap();

        let config = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.address, "127.0.0.1:9999".parse().unwrap());
        // Unset keys keep their defaults.
        assert_eq!(config.data_path, ServiceConfig::default().data_path);
    }

    #[test]
    fn rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "no_such_key = 1").unwrap();

        assert!(ServiceConfig::from_file(file.path()).is_err());
    }
}
