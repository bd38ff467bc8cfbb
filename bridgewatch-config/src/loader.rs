//! Reading the configuration file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ConfigLoadError;
use crate::models::Config;
use crate::validation::{ConfigWarnings, validate};

/// Config file used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

const ENV_LISTEN_HOST: &str = "BRIDGEWATCH_LISTEN_HOST";
const ENV_LISTEN_PORT: &str = "BRIDGEWATCH_LISTEN_PORT";

/// A loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    /// Configuration with environment overrides applied.
    pub config: Config,
    /// File it was read from.
    pub path: PathBuf,
    /// Validation warnings, already logged.
    pub warnings: ConfigWarnings,
}

/// Reads the config file, applies environment overrides and validates.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    env_overrides: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

impl ConfigLoader {
    /// Load from `path`; the extension picks TOML or JSON.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_overrides: true,
        }
    }

    /// Ignore `BRIDGEWATCH_*` environment variables.
    pub fn without_env_overrides(mut self) -> Self {
        self.env_overrides = false;
        self
    }

    /// Read, override and validate.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let mut config = Self::read_file(&self.path)?;
        if self.env_overrides {
            apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        }

        let warnings = validate(&config)?;
        for warning in warnings.iter() {
            warn!("Config warning: {}", warning);
        }
        debug!(
            path = %self.path.display(),
            bridges = config.bridges.len(),
            bridge_accounts = config.bridge_account_count(),
            accounts = config.accounts.len(),
            "Loaded configuration"
        );

        Ok(ConfigLoad {
            config,
            path: self.path.clone(),
            warnings,
        })
    }

    fn read_file(path: &Path) -> Result<Config, ConfigLoadError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents).map_err(|source| ConfigLoadError::Json {
                path: path.to_path_buf(),
                source,
            }),
            _ => toml::from_str(&contents).map_err(|source| ConfigLoadError::Toml {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Apply the listen address overrides. `lookup` returns the value of an
/// environment variable; blank values are ignored.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigLoadError> {
    if let Some(host) = lookup(ENV_LISTEN_HOST)
        && !host.trim().is_empty()
    {
        config.listen.host = host.trim().to_owned();
    }

    if let Some(port) = lookup(ENV_LISTEN_PORT)
        && !port.trim().is_empty()
    {
        config.listen.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigLoadError::InvalidEnv {
                key: ENV_LISTEN_PORT,
                value: port.clone(),
            })?;
    }

    Ok(())
}
