//! Configuration documents and the built-in default set
//!
//! Every configuration source (built-in defaults, plugin defaults, a
//! `--load_config` file, a remote endpoint) is a flat JSON object. Keys keep
//! their insertion order so saved documents read the same way they were
//! merged.
//!
//! # Example
//!
//! ```json
//! {
//!     "plugin": "normalizer",
//!     "method": "z-score",
//!     "window_size": 512
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// An ordered, flat key/value configuration document
pub type ConfigDocument = Map<String, Value>;

/// Immutable baseline for every recognized configuration key
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    values: ConfigDocument,
}

impl Defaults {
    /// The process-wide built-in defaults
    pub fn builtin() -> Self {
        let entries = [
            ("input_file", Value::Null),
            ("output_file", json!("./output.csv")),
            ("load_config", Value::Null),
            ("save_config", json!("./output_config.json")),
            ("remote_load_config", Value::Null),
            ("remote_save_config", Value::Null),
            ("remote_log", Value::Null),
            ("remote_username", Value::Null),
            ("remote_password", Value::Null),
            ("plugin", json!("default_plugin")),
            ("headers", json!(true)),
            ("force_date", json!(false)),
            ("debug_file", json!("./debug_out.json")),
            ("quiet_mode", json!(false)),
            ("only_low_CV", json!(false)),
        ];

        Self {
            values: entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }

    /// Build a default set from an arbitrary document
    pub fn from_document(values: ConfigDocument) -> Self {
        Self { values }
    }

    /// Borrow the underlying document
    pub fn as_document(&self) -> &ConfigDocument {
        &self.values
    }

    /// Look up the default for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Where a loaded document came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    /// File path or URL
    pub location: String,

    /// SHA-256 of the raw document bytes
    pub digest: String,
}

/// A document together with its provenance
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Parsed flat document
    pub document: ConfigDocument,

    /// Provenance of the document
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// Parse raw bytes fetched from `location`
    pub fn from_bytes(bytes: &[u8], location: &str) -> Result<Self> {
        let document = parse_document(bytes, location)?;
        Ok(Self {
            document,
            source: ConfigSource {
                location: location.to_string(),
                digest: digest(bytes),
            },
        })
    }
}

/// Load a flat JSON configuration document from disk
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LoadedConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::ConfigNotFound {
            path: path.display().to_string(),
        });
    }

    let bytes = std::fs::read(path)?;
    let loaded = LoadedConfig::from_bytes(&bytes, &path.display().to_string())?;

    tracing::debug!("Loaded {} keys from {}", loaded.document.len(), loaded.source.location);
    Ok(loaded)
}

/// Parse raw bytes into a flat document, rejecting nested objects
pub fn parse_document(bytes: &[u8], location: &str) -> Result<ConfigDocument> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| Error::ConfigParse {
        path: location.to_string(),
        source,
    })?;
    into_flat_document(value, location)
}

/// Check that a JSON value is an object with no nested objects
pub fn into_flat_document(value: Value, location: &str) -> Result<ConfigDocument> {
    let Value::Object(document) = value else {
        return Err(Error::ConfigInvalid {
            message: format!("'{}' must contain a JSON object", location),
        });
    };

    if let Some((key, _)) = document.iter().find(|(_, v)| v.is_object()) {
        return Err(Error::ConfigInvalid {
            message: format!(
                "key '{}' in '{}' holds a nested object; only flat documents are supported",
                key, location
            ),
        });
    }

    Ok(document)
}

/// Write a document as pretty JSON, replacing the destination atomically
pub fn write_document<P: AsRef<Path>>(path: P, document: &ConfigDocument) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, document)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::debug!("Wrote {} keys to {}", document.len(), path.display());
    Ok(())
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
