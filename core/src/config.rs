//! Renderer configuration.

use serde::{Deserialize, Serialize};

/// How sibling elements sharing a key are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeys {
    /// Reject the render of the affected subtree with
    /// [`RenderError::DuplicateKey`](crate::RenderError::DuplicateKey).
    #[default]
    Error,
    /// Log a warning and treat every repeat after the first as unkeyed.
    Warn,
}

/// Settings for a [`Renderer`](crate::Renderer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Policy for duplicate sibling keys.
    pub duplicate_keys: DuplicateKeys,
}

impl Config {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not a valid configuration document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
