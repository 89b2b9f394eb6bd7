//! Upgrade configuration.
//!
//! # Responsibility
//! - Carry the localized literals that old documents may contain where newer
//!   documents carry stable markers (`FieldRole`, `TitleKey`).
//! - Load and validate that configuration from JSON.
//!
//! # Invariants
//! - Canonical English literals always match, whatever is configured.
//! - Configured literals are non-empty after trimming.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Canonical display name of a reading activity's feedback field.
pub const CANONICAL_FEEDBACK_LABEL: &str = "Feedback";
/// Canonical versioned reading activity title written by early releases.
pub const CANONICAL_LEGACY_READING_TITLE: &str = "Reading Activity 0.11";

/// Literals the upgrade chain compares against on marker-less documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Translations of "Feedback" documents may have been authored with.
    pub feedback_labels: Vec<String>,
    /// Translations of "Reading Activity 0.11".
    pub legacy_reading_titles: Vec<String>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            feedback_labels: vec![CANONICAL_FEEDBACK_LABEL.to_string()],
            legacy_reading_titles: vec![CANONICAL_LEGACY_READING_TITLE.to_string()],
        }
    }
}

impl UpgradeConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_blank(&self.feedback_labels, "feedback_labels")?;
        require_non_blank(&self.legacy_reading_titles, "legacy_reading_titles")?;
        Ok(())
    }

    /// Whether `name` is the feedback label in any known language.
    pub fn is_feedback_label(&self, name: &str) -> bool {
        name == CANONICAL_FEEDBACK_LABEL || self.feedback_labels.iter().any(|label| label == name)
    }

    /// Whether `title` is the versioned reading title in any known language.
    pub fn is_legacy_reading_title(&self, title: &str) -> bool {
        title == CANONICAL_LEGACY_READING_TITLE
            || self
                .legacy_reading_titles
                .iter()
                .any(|candidate| candidate == title)
    }
}

fn require_non_blank(values: &[String], list: &'static str) -> Result<(), ConfigError> {
    if values.iter().any(|value| value.trim().is_empty()) {
        return Err(ConfigError::BlankLiteral(list));
    }
    Ok(())
}

/// Configuration load and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    BlankLiteral(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(message) => write!(f, "failed to read upgrade config: {message}"),
            Self::Parse(message) => write!(f, "invalid upgrade config: {message}"),
            Self::BlankLiteral(list) => write!(f, "`{list}` must not contain blank entries"),
        }
    }
}

impl Error for ConfigError {}
