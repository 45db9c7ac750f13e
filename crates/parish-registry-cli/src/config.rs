//! TOML configuration for the `parish` binary.
//!
//! ```toml
//! database = "./parish.sqlite3"
//! currency = "MZN"
//!
//! [credentials]
//! pastoral_care = "$argon2id$v=19$..."
//! finance = "$argon2id$v=19$..."
//! admin = "$argon2id$v=19$..."
//! ```
//!
//! Every key is optional. A missing file yields the defaults, which leave all
//! protected areas without a credential.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parish_registry_core::{Credentials, RegistryError};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "./parish.toml";

fn default_database() -> PathBuf {
    PathBuf::from("./parish.sqlite3")
}

fn default_currency() -> String {
    "MZN".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Label printed in front of amounts in text output.
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            currency: default_currency(),
            credentials: Credentials::default(),
        }
    }
}

impl AppConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "configuration file not found; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("invalid configuration file {}", path.display()))?;
        debug!(
            path = %path.display(),
            database = %config.database.display(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// # Errors
    /// Returns [`RegistryError::Configuration`] for malformed TOML or values of
    /// the wrong type.
    pub fn from_toml(raw: &str) -> Result<Self, RegistryError> {
        toml::from_str(raw).map_err(|err| RegistryError::Configuration(err.to_string()))
    }
}

#[derive(Serialize)]
struct CredentialSnippet<'a> {
    credentials: &'a Credentials,
}

/// Renders a `[credentials]` table ready to paste into the configuration file.
///
/// # Errors
/// Returns [`RegistryError::Configuration`] when serialization fails.
pub fn credentials_snippet(credentials: &Credentials) -> Result<String, RegistryError> {
    toml::to_string(&CredentialSnippet { credentials })
        .map_err(|err| RegistryError::Configuration(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = must(AppConfig::from_toml(""));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.currency, "MZN");
        assert_eq!(config.database, PathBuf::from("./parish.sqlite3"));
        assert!(config.credentials.finance.is_none());
    }

    #[test]
    fn partial_document_keeps_remaining_defaults() {
        let config = must(AppConfig::from_toml(
            "currency = \"EUR\"\n\n[credentials]\nfinance = \"$argon2id$stub\"\n",
        ));
        assert_eq!(config.currency, "EUR");
        assert_eq!(config.database, PathBuf::from("./parish.sqlite3"));
        assert_eq!(
            config.credentials.finance.as_deref(),
            Some("$argon2id$stub")
        );
        assert!(config.credentials.admin.is_none());
    }

    #[test]
    fn wrong_types_are_configuration_errors() {
        assert!(matches!(
            AppConfig::from_toml("currency = 12\n"),
            Err(RegistryError::Configuration(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("parish-registry-config-does-not-exist.toml");
        let config = must(AppConfig::load_or_default(&path));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn credential_snippet_parses_back_into_a_config() {
        let credentials = Credentials {
            pastoral_care: None,
            finance: Some("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string()),
            admin: None,
        };
        let snippet = must(credentials_snippet(&credentials));
        assert!(snippet.contains("[credentials]"));
        assert!(!snippet.contains("admin"));

        let config = must(AppConfig::from_toml(&snippet));
        assert_eq!(config.credentials, credentials);
    }
}
