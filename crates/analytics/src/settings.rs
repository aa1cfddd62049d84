use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use validator::Validate;

/// Collector configuration supplied by the publisher at
/// analytics-enable time. Both fields are required: without them the
/// adapter stays inert.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Collector {
    #[validate(length(min = 1, message = "publisher_id must not be empty"))]
    pub publisher_id: String,
    /// Base URL; debug reports go to `{endpoint}/debug`.
    #[validate(url(message = "endpoint must be a valid base URL"))]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub collector: Collector,
}

impl Settings {
    /// Parse settings from a TOML string with environment overrides
    /// (`MOBKOI_ANALYTICS__COLLECTOR__ENDPOINT` and friends).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when required fields are missing or the
    /// TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let environment = Environment::default()
            .prefix("MOBKOI_ANALYTICS")
            .separator("__");

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()?;

        config.try_deserialize()
    }
}
