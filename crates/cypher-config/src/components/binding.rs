//! Binding component configuration

use serde::{Deserialize, Serialize};

/// Settings consulted while expressions are bound to a read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Fallback return alias when neither a hint nor a storage name exists
    pub default_alias_prefix: String,
    /// Send constant members of object projections to the server
    pub project_constants: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            default_alias_prefix: "s".to_string(),
            project_constants: false,
        }
    }
}
