use std::ops::Deref;
use std::time::Duration;

use derive_more::{Display, From, Into};
use serde::Deserialize;
use serde_valid::yaml::FromYamlStr;
use serde_valid::{UniqueItemsError, Validate, ValidateUniqueItems};

// Config Type
#[derive(Debug)]
pub struct Config {
    // GeckoTerminal API configuration
    pub geckoterminal: GeckoTerminalConfig,
    // Configuration for the pool scanner
    pub scanner: ScannerConfig,
    // Where aggregated tables are written
    pub output: OutputConfig,
}

impl Config {
    pub fn from_file(file_path: &str) -> Result<Self, ConfigError> {
        let config_file_content = std::fs::read_to_string(file_path)?;
        Self::from_yaml_str(&config_file_content)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let raw_config = RawConfig::from_yaml_str(s)?;

        let delimiter = raw_config.output.delimiter.clone();
        if delimiter.len() != 1 || !delimiter.is_ascii() {
            return Err(ConfigError::InvalidDelimiter(delimiter));
        }

        Ok(Config {
            geckoterminal: raw_config.geckoterminal,
            scanner: raw_config.scanner,
            output: OutputConfig {
                path: raw_config.output.path,
                delimiter: delimiter.as_bytes()[0],
                decimal_comma: raw_config.output.decimal_comma,
            },
        })
    }
}

#[derive(Debug, From, Display)]
pub enum ConfigError {
    #[display("Output delimiter must be a single ascii character, got: {:?}", _0)]
    #[from(ignore)]
    InvalidDelimiter(String),

    #[display("Serde Error: {}", _0)]
    SerdeError(serde_valid::Error<serde_yaml::Error>),

    #[display("Error Reading Config File: {}", _0)]
    IoError(std::io::Error),
}

// Intermediate Config Type as Deserialization Target
#[derive(Debug, Deserialize, Validate)]
pub struct RawConfig {
    #[validate]
    pub geckoterminal: GeckoTerminalConfig,
    #[validate]
    pub scanner: ScannerConfig,
    #[validate]
    pub output: RawOutputConfig,
}

#[derive(Debug, Deserialize, From, Into, Clone)]
pub struct Networks(Vec<String>);

impl ValidateUniqueItems for Networks {
    fn validate_unique_items(&self) -> Result<(), UniqueItemsError> {
        self.0.validate_unique_items()
    }
}

impl Deref for Networks {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct GeckoTerminalConfig {
    // The base URL of the GeckoTerminal API
    #[validate(
        pattern = r"https?:\/\/(www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_\+.~#?&//=]*)"
    )]
    pub base_url: String,

    // API version date sent in the Accept header
    #[validate(min_length = 1)]
    pub api_version: String,

    // Requests per minute the API allows without a key
    #[validate(minimum = 1)]
    pub rate_limit_per_minute: u32,

    // Per-request timeout
    #[validate(minimum = 1)]
    pub request_timeout_sec: u64,
}

impl GeckoTerminalConfig {
    // Fixed pause between paginated requests, derived from the rate limit
    pub fn page_delay(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.rate_limit_per_minute as f64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct ScannerConfig {
    // Network ids to scan; empty means discover via /networks
    #[validate(unique_items)]
    pub networks: Networks,

    // Related resources to embed in pool responses (e.g. base_token,dex)
    pub include: Option<String>,

    // Pools below this 24h volume are dropped from the aggregate
    #[validate(minimum = 0.0)]
    pub min_volume_usd_h24: f64,

    // Delay between sweeps in watch mode
    #[validate(minimum = 1)]
    pub poll_interval_sec: u64,
}

impl ScannerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RawOutputConfig {
    // File the aggregated table is written to
    #[validate(min_length = 1)]
    pub path: String,

    // CSV field delimiter, a single ascii character
    #[validate(min_length = 1)]
    pub delimiter: String,

    // Render floats with a comma decimal separator
    pub decimal_comma: bool,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub path: String,
    pub delimiter: u8,
    pub decimal_comma: bool,
}

pub fn get_sample_config() -> Config {
    Config::from_file("../../config.yaml.example").unwrap()
}
