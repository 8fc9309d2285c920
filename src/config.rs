//! Configuration management for the types installer LSP

use serde::Deserialize;

/// LSP configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Diagnostics configuration
    pub diagnostics: DiagnosticsConfig,
    /// Install quick fix configuration
    pub install: InstallConfig,
    /// Packages never flagged (patterns may contain `*`)
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Diagnostics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Enable diagnostics
    pub enabled: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Install quick fix configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Offer the install code action
    pub enabled: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Parse configuration from initialization options
    pub fn from_init_options(options: Option<serde_json::Value>) -> Self {
        match options {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Self::default(),
        }
    }
}
