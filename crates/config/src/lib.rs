pub mod config;

pub use config::{get_sample_config, Config, ConfigError};
