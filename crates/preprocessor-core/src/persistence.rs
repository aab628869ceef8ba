//! Saving the non-default part of an effective configuration
//!
//! A saved document holds only the keys whose values differ from both the
//! built-in defaults and the selected plugin's defaults. Reloading it as a
//! file config against the same defaults reproduces the run.

use serde_json::Value;
use std::path::PathBuf;

use crate::config::{ConfigDocument, Defaults, write_document};
use crate::error::Result;
use crate::merge::EffectiveConfig;
use crate::remote::{Credentials, RemoteClient};

/// Where a saved configuration goes
#[derive(Debug, Clone, PartialEq)]
pub enum SaveDestination {
    /// A file on local disk
    Local(PathBuf),
    /// A remote endpoint accepting a `json_config` form field
    Remote {
        /// Endpoint URL
        url: String,
        /// Optional basic-auth credentials
        credentials: Option<Credentials>,
    },
}

/// Keep only the entries that differ from every default source.
pub fn compose_savable(
    effective: &EffectiveConfig,
    defaults: &Defaults,
    plugin_defaults: &ConfigDocument,
) -> ConfigDocument {
    effective
        .values()
        .iter()
        .filter(|(key, value)| {
            let differs = |baseline: Option<&Value>| match baseline {
                Some(base) => !values_equal(value, base),
                None => true,
            };
            differs(defaults.get(key)) && differs(plugin_defaults.get(key.as_str()))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// JSON equality where numbers compare by value (`5 == 5.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

/// Write a document to its destination
pub fn save(document: &ConfigDocument, destination: &SaveDestination) -> Result<()> {
    match destination {
        SaveDestination::Local(path) => {
            write_document(path, document)?;
            tracing::info!("Configuration saved to {}", path.display());
        }
        SaveDestination::Remote { url, credentials } => {
            let client = RemoteClient::new(credentials.clone())?;
            client.save_config(url, document)?;
            tracing::info!("Configuration saved to {}", url);
        }
    }
    Ok(())
}
