pub mod profiles;
pub mod types;

pub use profiles::{ConfigProfile, ProfileName};
pub use types::*;

use crate::core::ConfigError;
use std::path::Path;

impl PipelineConfig {
    /// Load configuration from a JSON file and validate it
    ///
    /// Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Parse configuration from a JSON string and validate it
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Start from a named profile
    pub fn from_profile(name: &str) -> Result<Self, ConfigError> {
        Ok(ConfigProfile::from_name(ProfileName::parse(name)?))
    }
}
