//! Application configuration
//!
//! Priority (highest to lowest):
//! 1. Command line flags (applied by the caller)
//! 2. Environment variables prefixed with `SUNS_`
//! 3. Config file (YAML, TOML or JSON by extension)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CommonError, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SUNS_";

/// Link to the device
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Modbus TCP
    #[default]
    Tcp,
    /// Modbus RTU over a serial line
    Rtu,
}

/// Rendering of decoded models
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Csv,
    Sql,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportKind,
    /// TCP host
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Serial device for RTU
    pub serial: String,
    pub baud: u32,
    /// Modbus unit / slave address
    pub slave: u8,
    /// Connect and read timeout in milliseconds
    pub timeout_ms: u64,
    /// Model definition files, loaded in order
    pub models: Vec<PathBuf>,
    pub output: OutputFormat,
    /// 1-based registers probed for the signature
    pub candidates: Vec<u16>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            host: "127.0.0.1".to_string(),
            port: 502,
            serial: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            slave: 1,
            timeout_ms: 4000,
            models: Vec::new(),
            output: OutputFormat::Text,
            candidates: vec![1, 40001, 50001],
            log_level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject settings no device session can use
    pub fn validate(&self) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(CommonError::Config(
                "At least one base register candidate is required".to_string(),
            ));
        }
        if self.candidates.contains(&0) {
            return Err(CommonError::Config(
                "Base register candidates are 1-based; 0 is not a register".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(CommonError::Config("Timeout must be positive".to_string()));
        }
        if self.transport == TransportKind::Tcp && self.host.is_empty() {
            return Err(CommonError::Config("TCP transport needs a host".to_string()));
        }
        Ok(())
    }
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CommonError::Config("Config file must have an extension".to_string()))?;

    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        _ => Err(CommonError::Config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}

/// Defaults, then `path` if given, then `SUNS_*` environment variables
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
    if let Some(path) = path {
        if !path.exists() {
            return Err(CommonError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        debug!("Loading configuration from {}", path.display());
        figment = file_provider(figment, path)?;
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .map_err(|e| CommonError::Config(format!("Failed to load configuration: {}", e)))
}

/// Load configuration from a specific file
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    Ok(file_provider(Figment::new(), path.as_ref())?.extract()?)
}
