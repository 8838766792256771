//! `cfrwatch.toml` configuration.
//!
//! Every field is optional; missing values fall back to the govinfo.gov
//! publication URLs and the `avas` / `tbd` snapshot directories.
//!
//! ```toml
//! [source]
//! historical_url = "https://www.govinfo.gov/bulkdata/ECFR/title-27/ECFR-title27.xml"
//! annual_url_template = "https://www.govinfo.gov/content/pkg/CFR-{year}-title27-vol1/xml/CFR-{year}-title27-vol1-part9-subpartC.xml"
//! timeout_secs = 300
//!
//! [snapshots]
//! directories = ["avas", "tbd"]
//! extension = "geojson"
//! selection = "highest-secondary"
//! secondary_field = "ava_id"
//! validity_field = "valid_end"
//! ```

use crate::fetch::YEAR_PLACEHOLDER;
use crate::snapshot::{
    DEFAULT_EXTENSION, DEFAULT_SECONDARY_FIELD, DEFAULT_VALIDITY_FIELD, SelectionRule,
    SnapshotOptions,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "cfrwatch.toml";
pub const DEFAULT_HISTORICAL_URL: &str =
    "https://www.govinfo.gov/bulkdata/ECFR/title-27/ECFR-title27.xml";
pub const DEFAULT_ANNUAL_URL_TEMPLATE: &str = "https://www.govinfo.gov/content/pkg/CFR-{year}-title27-vol1/xml/CFR-{year}-title27-vol1-part9-subpartC.xml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DIRECTORIES: [&str; 2] = ["avas", "tbd"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckConfig {
    pub source: SourceConfig,
    pub snapshots: SnapshotConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub historical_url: String,
    pub annual_url_template: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            historical_url: DEFAULT_HISTORICAL_URL.to_string(),
            annual_url_template: DEFAULT_ANNUAL_URL_TEMPLATE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    pub directories: Vec<PathBuf>,
    pub extension: String,
    pub selection: SelectionRule,
    pub secondary_field: String,
    pub validity_field: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directories: DEFAULT_DIRECTORIES.iter().map(PathBuf::from).collect(),
            extension: DEFAULT_EXTENSION.to_string(),
            selection: SelectionRule::default(),
            secondary_field: DEFAULT_SECONDARY_FIELD.to_string(),
            validity_field: DEFAULT_VALIDITY_FIELD.to_string(),
        }
    }
}

impl SnapshotConfig {
    pub fn options(&self) -> SnapshotOptions {
        SnapshotOptions {
            extension: self.extension.trim_start_matches('.').to_string(),
            selection: self.selection,
            secondary_field: self.secondary_field.clone(),
            validity_field: self.validity_field.clone(),
        }
    }
}

impl CheckConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: CheckConfig = toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// An explicit path must exist; otherwise `cfrwatch.toml` is read when
    /// present and defaults apply when it is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.is_file() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.annual_url_template.contains(YEAR_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "source.annual_url_template must contain {YEAR_PLACEHOLDER}"
            )));
        }
        if self.source.historical_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "source.historical_url must not be empty".to_string(),
            ));
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "source.timeout_secs must be positive".to_string(),
            ));
        }
        if self.snapshots.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid(
                "snapshots.extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
