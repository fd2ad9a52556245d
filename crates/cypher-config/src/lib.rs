//! # Cypher Compiler Configuration
//!
//! Type-safe configuration for the query compiler. Every field carries a
//! serde default, so a partial TOML file only needs the keys it changes.
//!
//! ## Quick Start
//!
//! ```rust
//! use cypher_config::CompilerConfig;
//!
//! let config = CompilerConfig::from_toml_str(
//!     r#"
//!     [generation]
//!     identifier_quote = "`"
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.generation.identifier_quote, '`');
//! assert_eq!(config.binding.default_alias_prefix, "s");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod components;

pub use components::*;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that was being read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for this schema.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the compiler cannot use.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Dotted field path
        field: String,
        /// What is wrong with it
        message: String,
    },
}

/// Top-level compiler configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Text generation settings
    pub generation: GenerationConfig,
    /// Expression binding settings
    pub binding: BindingConfig,
}

impl CompilerConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading compiler config");

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.binding.default_alias_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "binding.default_alias_prefix".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.generation.parameter_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "generation.parameter_prefix".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.generation.indent.chars().any(|c| !c.is_whitespace()) {
            return Err(ConfigError::InvalidValue {
                field: "generation.indent".to_string(),
                message: "must contain only whitespace".to_string(),
            });
        }

        Ok(())
    }
}
