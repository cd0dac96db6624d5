use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::error::RelayError;

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_UNIT_ID: u8 = 1;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(OutputFormat::Console),
            "json" => Ok(OutputFormat::Json),
            other => Err(RelayError::Config(format!("Unknown output format '{}'", other))),
        }
    }
}

/// Connection settings for one relay-bank controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub timeout_ms: u64,

    // Output settings
    pub output_format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            unit_id: DEFAULT_UNIT_ID,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            output_format: OutputFormat::Console,
        }
    }
}

impl Config {
    /// Builds the configuration: defaults, then `--config` file, then flags.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, RelayError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        // Override with command line arguments
        if let Some(host) = matches.get_one::<String>("host") {
            config.host = host.clone();
        }
        if let Some(port) = matches.get_one::<u16>("port") {
            config.port = *port;
        }
        if let Some(unit_id) = matches.get_one::<u8>("unit-id") {
            config.unit_id = *unit_id;
        }
        if let Some(timeout_ms) = matches.get_one::<u64>("timeout-ms") {
            config.timeout_ms = *timeout_ms;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            config.output_format = format.parse()?;
        }

        config.validate()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RelayError> {
        let path = path.as_ref();
        // Create directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RelayError::Config(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| RelayError::Config(format!("Cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.host.trim().is_empty() {
            return Err(RelayError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(RelayError::Config("port must not be 0".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(RelayError::Config("timeout_ms must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
