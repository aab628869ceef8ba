//! Error types for preprocessor-core

use thiserror::Error;

/// Result type alias for preprocessor-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in preprocessor-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse a JSON configuration document
    #[error("failed to parse configuration '{path}': {source}")]
    ConfigParse {
        /// Path (or URL) of the document
        path: String,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Malformed invocation tokens
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the offending token
        message: String,
    },

    /// Plugin name is not registered in the group
    #[error("plugin '{name}' not found in group '{group}'")]
    PluginNotFound {
        /// Plugin group that was searched
        group: String,
        /// Requested plugin name
        name: String,
    },

    /// Plugin is registered but could not be resolved
    #[error("failed to load plugin '{name}': {message}")]
    PluginLoad {
        /// Plugin name
        name: String,
        /// Description of the failure
        message: String,
    },

    /// A declared plugin parameter has the wrong shape
    #[error("invalid parameters for plugin '{plugin}': {message}")]
    InvalidParam {
        /// Plugin name
        plugin: String,
        /// Description of the error
        message: String,
    },

    /// The `method` parameter is not one the plugin knows
    #[error("plugin '{plugin}' has no method '{method}'")]
    UnknownMethod {
        /// Plugin name
        plugin: String,
        /// Requested method
        method: String,
    },

    /// A structurally required column is missing or unusable
    #[error("schema error in column '{column}': {message}")]
    Schema {
        /// Column name (or position)
        column: String,
        /// Description of the error
        message: String,
    },

    /// Remote endpoint failure
    #[error("remote request to '{url}' failed: {message}")]
    Remote {
        /// Endpoint URL
        url: String,
        /// Description of the failure
        message: String,
    },

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a schema error on a named column
    pub fn schema(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a parameter error on a plugin
    pub fn invalid_param(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}
