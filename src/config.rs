use crate::assets::DEFAULT_PROBE_PATH;
use serde::Deserialize;
use std::{path::Path, time::Duration};

const DEFAULT_DETECTION_BASE_URL: &str = "http://localhost:8001";
const DEFAULT_ASSET_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_environment")]
    pub environment: Environment,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub server: ServerConfig,
    pub detection_service: DetectionServiceConfig,
    pub assets: AssetConfig,
    pub uploads: UploadConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

fn deserialize_environment<'de, D>(deserializer: D) -> Result<Environment, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Remote detection endpoint settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DetectionServiceConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl DetectionServiceConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where rendered assets are fetched from. This host is not necessarily the
/// detection host.
#[derive(Debug, Deserialize, Clone)]
pub struct AssetConfig {
    pub base_url: String,
    pub probe_path: String,
    pub timeout_ms: u64,
}

impl AssetConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// A new upload replaces the one in flight; the stale result is dropped.
    Supersede,
    /// A new upload is refused while another one is in flight.
    Reject,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub overlap: OverlapPolicy,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {e}"))
    })?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    build_configuration(&base_path.join("configuration"), environment)
}

/// Layers built-in defaults, the optional YAML files in
/// `configuration_directory` and `PLATE_*` environment variables.
pub fn build_configuration(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 3000_i64)?
        .set_default("detection_service.base_url", DEFAULT_DETECTION_BASE_URL)?
        .set_default("detection_service.timeout_ms", 30_000_i64)?
        .set_default("assets.base_url", DEFAULT_ASSET_BASE_URL)?
        .set_default("assets.probe_path", DEFAULT_PROBE_PATH)?
        .set_default("assets.timeout_ms", 10_000_i64)?
        .set_default("uploads.overlap", "supersede")?
        .add_source(
            config::File::from(configuration_directory.join("base.yaml")).required(false),
        )
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("PLATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override("environment", environment.as_str())?
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}
