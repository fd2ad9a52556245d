//! Generation component configuration
//!
//! Controls how a finished read is rendered to query text.

use serde::{Deserialize, Serialize};

/// Text generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Quote character used to delimit property and alias identifiers
    pub identifier_quote: char,
    /// Separator placed between an aliased expression and its alias
    pub alias_separator: String,
    /// One level of indentation inside `CASE` blocks
    pub indent: String,
    /// Token for a boolean `true` branch of a conditional
    pub true_literal: String,
    /// Token for a boolean `false` branch of a conditional
    pub false_literal: String,
    /// Emit non-null constants as `$pN` parameters instead of literals
    pub parameterize_literals: bool,
    /// Prefix for generated parameter names
    pub parameter_prefix: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            identifier_quote: '"',
            alias_separator: " AS ".to_string(),
            indent: "    ".to_string(),
            true_literal: "true".to_string(),
            false_literal: "false".to_string(),
            parameterize_literals: false,
            parameter_prefix: "p".to_string(),
        }
    }
}

impl GenerationConfig {
    /// Generation config that parameterizes every non-null literal
    pub fn parameterized() -> Self {
        Self {
            parameterize_literals: true,
            ..Self::default()
        }
    }
}
