use crate::bugdb::BugDatabaseSettings;
use crate::error::Result;
use crate::measures::Metric;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings loaded from a TOML file; command-line flags take precedence.
///
/// ```toml
/// file_prefix = "//depot/project/"
///
/// [[metrics]]
/// key = "lines_changed"
/// type = "lines_changed"
///
/// [bug_database]
/// provider = "json-file"
/// args = ["exports/bugs.json"]
/// output_file = "cache/bugs/bugs.json"
/// output_type = "multiple_file"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChurnConfig {
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub bug_database: BugDatabaseSettings,
}

impl ChurnConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Missing path means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
