//! Transformation strategies
//!
//! Each strategy declares its parameters as a typed struct whose `Default`
//! is the plugin's declared default set. `configure` overlays the merged
//! configuration onto those defaults, reading only declared keys, and
//! validates the result through serde.

mod cleaner;
mod default_plugin;
mod feature_selector;
mod normalizer;
pub mod registry;
mod signal_horizon;
mod trimmer;
mod unbiaser;

pub use cleaner::Cleaner;
pub use default_plugin::DefaultPlugin;
pub use feature_selector::FeatureSelector;
pub use normalizer::Normalizer;
pub use registry::{PLUGIN_GROUP, PluginDescriptor, ResolvedPlugin, available, resolve};
pub use signal_horizon::SignalHorizon;
pub use trimmer::Trimmer;
pub use unbiaser::Unbiaser;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::table::Table;

/// Per-run metrics and diagnostics, serialized to the debug file
pub type DebugRecord = ConfigDocument;

/// A pluggable table transformation
pub trait Plugin {
    /// Registered name
    fn name(&self) -> &'static str;

    /// Read declared parameters from the effective configuration
    fn configure(&mut self, config: &ConfigDocument) -> Result<()>;

    /// Transform a table into a new one
    fn process(&mut self, table: &Table) -> Result<Table>;

    /// Diagnostics gathered during the last `process`
    fn debug_info(&self) -> DebugRecord;
}

/// Declared default set of a parameter struct
pub fn declared_defaults<P: Serialize + Default>() -> Result<ConfigDocument> {
    match serde_json::to_value(P::default())? {
        Value::Object(document) => Ok(document),
        other => Err(Error::ConfigInvalid {
            message: format!("declared defaults must be an object, got {}", other),
        }),
    }
}

/// Overlay declared keys from `config` onto the declared defaults and decode
pub fn configure_params<P>(plugin: &str, config: &ConfigDocument) -> Result<P>
where
    P: Serialize + DeserializeOwned + Default,
{
    let mut document = declared_defaults::<P>()?;
    for (key, value) in document.iter_mut() {
        if let Some(supplied) = config.get(key) {
            *value = supplied.clone();
        }
    }
    serde_json::from_value(Value::Object(document))
        .map_err(|e| Error::invalid_param(plugin, e.to_string()))
}

/// Closed interval given as `[a, b]`, `"(a,b)"` or `"a,b"`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr")]
pub struct Range(pub f64, pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Pair(f64, f64),
    Text(String),
}

impl TryFrom<RangeRepr> for Range {
    type Error = String;

    fn try_from(repr: RangeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            RangeRepr::Pair(lo, hi) => Ok(Range(lo, hi)),
            RangeRepr::Text(text) => {
                let inner = text.trim().trim_start_matches(['(', '[']).trim_end_matches([')', ']']);
                let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
                match parts.as_slice() {
                    [lo, hi] => match (lo.parse(), hi.parse()) {
                        (Ok(lo), Ok(hi)) => Ok(Range(lo, hi)),
                        _ => Err(format!("range bounds must be numbers: '{}'", text)),
                    },
                    _ => Err(format!("range needs two bounds: '{}'", text)),
                }
            }
        }
    }
}

/// Ordered column or row positions given as a list, a number or `"1,2"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PositionsRepr")]
pub struct Positions(pub Vec<usize>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PositionsRepr {
    List(Vec<usize>),
    Single(usize),
    Text(String),
}

impl TryFrom<PositionsRepr> for Positions {
    type Error = String;

    fn try_from(repr: PositionsRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            PositionsRepr::List(list) => Ok(Positions(list)),
            PositionsRepr::Single(one) => Ok(Positions(vec![one])),
            PositionsRepr::Text(text) => text
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().map_err(|_| format!("invalid position '{}'", s)))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Positions),
        }
    }
}

/// Deserialize a boolean that may arrive as `"true"`/`"false"`
pub fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Bool(b) => Ok(b),
        Repr::Text(text) => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(de::Error::custom(format!("expected a boolean, got '{}'", text))),
        },
    }
}

/// Read a parameter snapshot when the path is set and the file exists
pub fn load_snapshot<T: DeserializeOwned>(path: Option<&str>) -> Result<Option<T>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !Path::new(path).exists() {
        tracing::warn!("Parameter snapshot {} not found, computing from data", path);
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let snapshot = serde_json::from_slice(&bytes).map_err(|source| Error::ConfigParse {
        path: path.to_string(),
        source,
    })?;
    tracing::info!("Loaded parameter snapshot from {}", path);
    Ok(Some(snapshot))
}

/// Write a parameter snapshot when the path is set
pub fn save_snapshot<T: Serialize>(path: Option<&str>, snapshot: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    match serde_json::to_value(snapshot)? {
        Value::Object(document) => crate::config::write_document(path, &document)?,
        _ => {
            return Err(Error::ConfigInvalid {
                message: format!("snapshot for '{}' is not an object", path),
            });
        }
    }
    tracing::info!("Saved parameter snapshot to {}", path);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        window_size: usize,
        range: Range,
        #[serde(deserialize_with = "flexible_bool")]
        enabled: bool,
        columns: Option<Positions>,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                window_size: 5,
                range: Range(-1.0, 1.0),
                enabled: false,
                columns: None,
            }
        }
    }

    fn doc(value: Value) -> ConfigDocument {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_declared_defaults_document() {
        let defaults = declared_defaults::<Sample>().unwrap();
        assert_eq!(defaults["window_size"], json!(5));
        assert_eq!(defaults["range"], json!([-1.0, 1.0]));
        assert_eq!(defaults["columns"], Value::Null);
    }

    #[test]
    fn test_configure_overlays_declared_keys_only() {
        let config = doc(json!({"window_size": 512, "plugin": "unbiaser", "enabled": "true"}));
        let params: Sample = configure_params("sample", &config).unwrap();
        assert_eq!(params.window_size, 512);
        assert!(params.enabled);
        assert_eq!(params.range, Range(-1.0, 1.0));
    }

    #[test]
    fn test_configure_rejects_wrong_type() {
        let config = doc(json!({"window_size": "big"}));
        let err = configure_params::<Sample>("sample", &config).unwrap_err();
        assert!(matches!(err, Error::InvalidParam { ref plugin, .. } if plugin == "sample"));
    }

    #[rstest]
    #[case(json!([0, 1]), Range(0.0, 1.0))]
    #[case(json!("(0,1)"), Range(0.0, 1.0))]
    #[case(json!("-1, 1"), Range(-1.0, 1.0))]
    fn test_range_forms(#[case] raw: Value, #[case] expected: Range) {
        let range: Range = serde_json::from_value(raw).unwrap();
        assert_eq!(range, expected);
    }

    #[test]
    fn test_range_rejects_garbage() {
        assert!(serde_json::from_value::<Range>(json!("(0;1)")).is_err());
    }

    #[rstest]
    #[case(json!([1, 2]), vec![1, 2])]
    #[case(json!(3), vec![3])]
    #[case(json!("1,4"), vec![1, 4])]
    #[case(json!("[2, 3]"), vec![2, 3])]
    fn test_positions_forms(#[case] raw: Value, #[case] expected: Vec<usize>) {
        let positions: Positions = serde_json::from_value(raw).unwrap();
        assert_eq!(positions.0, expected);
    }

    #[test]
    fn test_snapshot_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let path = path.to_str().unwrap();

        save_snapshot(Some(path), &Sample::default()).unwrap();
        let loaded: Option<Sample> = load_snapshot(Some(path)).unwrap();
        assert_eq!(loaded, Some(Sample::default()));

        let missing: Option<Sample> =
            load_snapshot(Some(dir.path().join("nope.json").to_str().unwrap())).unwrap();
        assert!(missing.is_none());
        assert!(load_snapshot::<Sample>(None).unwrap().is_none());
    }
}
