//! Configuration merge logic
//!
//! Builds the effective configuration of one run from four sources, applied
//! in order with last-writer-wins semantics per key (no deep merge):
//!
//! 1. Built-in defaults
//! 2. Plugin-declared defaults
//! 3. File (or remote) config document
//! 4. Flags actually present on the command line
//!
//! Recognized flags carry values already typed by the argument parser.
//! Any other `--name value` pair is an unknown argument whose value goes
//! through [`coerce_value`]. A bare leading positional argument overrides
//! `input_file` after all four passes.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

use crate::config::{ConfigDocument, Defaults};
use crate::error::{Error, Result};

/// Key bound by the positional argument
pub const INPUT_FILE_KEY: &str = "input_file";

/// Keys whose values are masked in logs
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "api_key", "credential"];

/// Which source supplied a key's effective value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigOrigin {
    /// Built-in default set
    Builtin,
    /// Defaults declared by the selected plugin
    Plugin,
    /// Loaded config document
    File,
    /// Unknown command-line flag, type-coerced
    CliUnknown,
    /// Recognized command-line flag
    Cli,
    /// Leading positional argument
    Positional,
}

/// A flag the argument parser recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSpec<'a> {
    /// Long name without the leading dashes
    pub name: &'a str,
    /// Whether the flag consumes a value
    pub takes_value: bool,
}

/// Raw command-line tokens partitioned for the merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenSplit {
    /// Tokens to hand to the argument parser
    pub recognized: Vec<String>,
    /// Unknown `--name value` pairs, values uncoerced
    pub unknown: BTreeMap<String, String>,
    /// Every `--name` seen, in order
    pub supplied: Vec<String>,
    /// Leading non-flag token
    pub positional: Option<String>,
}

impl TokenSplit {
    /// Partition raw tokens (without the program name).
    ///
    /// A recognized flag is never routed through the unknown path, even if
    /// it could also be read as a free-form pair.
    pub fn from_tokens<I, S>(tokens: I, recognized: &[FlagSpec<'_>]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut split = Self::default();
        let mut tokens = tokens.into_iter().map(Into::into).peekable();

        if let Some(first) = tokens.next_if(|t: &String| !t.starts_with('-')) {
            split.positional = Some(first);
        }

        while let Some(token) = tokens.next() {
            let Some(body) = token.strip_prefix("--") else {
                if token.starts_with('-') {
                    // short flags (-h, -V) belong to the parser
                    split.recognized.push(token);
                    continue;
                }
                return Err(Error::InvalidArgument {
                    message: format!("unexpected positional argument '{}'", token),
                });
            };

            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (body.to_string(), None),
            };
            if name.is_empty() {
                return Err(Error::InvalidArgument {
                    message: format!("malformed flag '{}'", token),
                });
            }
            split.supplied.push(name.clone());

            if let Some(spec) = recognized.iter().find(|f| f.name == name) {
                split.recognized.push(token);
                if spec.takes_value && inline.is_none() {
                    if let Some(value) = tokens.next_if(|t| !t.starts_with("--")) {
                        split.recognized.push(value);
                    }
                }
                continue;
            }

            let value = match inline {
                Some(value) => value,
                None => tokens
                    .next_if(|t| !t.starts_with("--"))
                    .unwrap_or_else(|| "true".to_string()),
            };
            split.unknown.insert(name, value);
        }

        Ok(split)
    }

    /// Attach the parser's typed values for recognized flags
    pub fn into_invocation(self, explicit: ConfigDocument) -> Invocation {
        Invocation {
            explicit,
            unknown: self.unknown,
            supplied: self.supplied,
            positional: self.positional,
        }
    }
}

/// Everything the command line contributes to the merge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    /// Typed values of all recognized fields, supplied or not
    pub explicit: ConfigDocument,
    /// Unknown flags with their raw values
    pub unknown: BTreeMap<String, String>,
    /// Flag names present in the raw tokens, in order
    pub supplied: Vec<String>,
    /// Positional input path override
    pub positional: Option<String>,
}

/// Coerce a free-form argument value: integer (i64, then u64), then float,
/// then string.
pub fn coerce_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(int) = raw.parse::<u64>() {
        return Value::from(int);
    }
    if let Some(float) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(float);
    }
    Value::String(raw.to_string())
}

/// The merged configuration of a single run, with per-key provenance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EffectiveConfig {
    values: ConfigDocument,
    origins: BTreeMap<String, ConfigOrigin>,
}

impl EffectiveConfig {
    fn set(&mut self, key: &str, value: Value, origin: ConfigOrigin) {
        self.values.insert(key.to_string(), value);
        self.origins.insert(key.to_string(), origin);
    }

    /// The merged key/value document
    pub fn values(&self) -> &ConfigDocument {
        &self.values
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a non-null string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Get a boolean value
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Source that supplied a key
    pub fn origin(&self, key: &str) -> Option<ConfigOrigin> {
        self.origins.get(key).copied()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no key is present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of the values with credential-like entries masked, for logging
    pub fn redacted(&self) -> ConfigDocument {
        self.values
            .iter()
            .map(|(key, value)| {
                let lower = key.to_lowercase();
                let secret = SECRET_KEYS.iter().any(|s| lower.contains(s));
                let shown = if secret && !value.is_null() {
                    Value::String("[REDACTED]".to_string())
                } else {
                    value.clone()
                };
                (key.clone(), shown)
            })
            .collect()
    }
}

/// Merge the four sources into an effective configuration.
pub fn merge(
    defaults: &Defaults,
    plugin_defaults: &ConfigDocument,
    file_config: &ConfigDocument,
    invocation: &Invocation,
) -> EffectiveConfig {
    let mut config = EffectiveConfig::default();

    for (key, value) in defaults.as_document() {
        config.set(key, value.clone(), ConfigOrigin::Builtin);
    }

    for (key, value) in plugin_defaults {
        tracing::debug!(key = %key, value = %value, "merge pass 2: plugin default");
        config.set(key, value.clone(), ConfigOrigin::Plugin);
    }

    for (key, value) in file_config {
        tracing::debug!(key = %key, "merge pass 3: file config");
        config.set(key, value.clone(), ConfigOrigin::File);
    }

    for name in &invocation.supplied {
        if let Some(value) = invocation.explicit.get(name) {
            config.set(name, value.clone(), ConfigOrigin::Cli);
        } else if let Some(raw) = invocation.unknown.get(name) {
            let value = coerce_value(raw);
            tracing::debug!(key = %name, value = %value, "merge pass 4: unknown argument");
            config.set(name, value, ConfigOrigin::CliUnknown);
        }
    }

    if let Some(path) = &invocation.positional {
        config.set(INPUT_FILE_KEY, Value::String(path.clone()), ConfigOrigin::Positional);
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    const FLAGS: &[FlagSpec<'static>] = &[
        FlagSpec { name: "plugin", takes_value: true },
        FlagSpec { name: "input_file", takes_value: true },
        FlagSpec { name: "headers", takes_value: false },
        FlagSpec { name: "help", takes_value: false },
    ];

    fn doc(value: Value) -> ConfigDocument {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[rstest]
    #[case("512", json!(512))]
    #[case("-3", json!(-3))]
    #[case("0.1", json!(0.1))]
    #[case("1e-4", json!(0.0001))]
    #[case("ema", json!("ema"))]
    #[case("(0,1)", json!("(0,1)"))]
    #[case("NaN", json!("NaN"))]
    #[case("", json!(""))]
    fn test_coerce_value(#[case] raw: &str, #[case] expected: Value) {
        assert_eq!(coerce_value(raw), expected);
    }

    #[test]
    fn test_coerce_integer_stays_integer() {
        assert!(coerce_value("512").is_i64());
        assert!(coerce_value("512.0").is_f64());
    }

    #[test]
    fn test_coerce_integer_beyond_i64_is_exact() {
        let value = coerce_value("18446744073709551615");
        assert_eq!(value.as_u64(), Some(u64::MAX));
        assert!(!value.is_f64());
    }

    #[test]
    fn test_split_recognized_and_unknown() {
        let split = TokenSplit::from_tokens(
            ["--plugin", "normalizer", "--window_size", "512", "--headers"],
            FLAGS,
        )
        .unwrap();

        assert_eq!(split.recognized, vec!["--plugin", "normalizer", "--headers"]);
        assert_eq!(split.unknown.get("window_size"), Some(&"512".to_string()));
        assert_eq!(split.supplied, vec!["plugin", "window_size", "headers"]);
        assert!(split.positional.is_none());
    }

    #[test]
    fn test_split_positional_first_only() {
        let split = TokenSplit::from_tokens(["data.csv", "--plugin", "cleaner"], FLAGS).unwrap();
        assert_eq!(split.positional.as_deref(), Some("data.csv"));

        let err = TokenSplit::from_tokens(["--headers", "data.csv"], FLAGS).unwrap_err();
        assert!(err.to_string().contains("data.csv"));
    }

    #[test]
    fn test_split_inline_values() {
        let split =
            TokenSplit::from_tokens(["--plugin=trimmer", "--method=z-score"], FLAGS).unwrap();
        assert_eq!(split.recognized, vec!["--plugin=trimmer"]);
        assert_eq!(split.unknown.get("method"), Some(&"z-score".to_string()));
    }

    #[test]
    fn test_split_unknown_without_value_is_true() {
        let split =
            TokenSplit::from_tokens(["--solve_missing", "--delete_nan"], FLAGS).unwrap();
        assert_eq!(split.unknown.get("solve_missing"), Some(&"true".to_string()));
        assert_eq!(split.unknown.get("delete_nan"), Some(&"true".to_string()));
    }

    #[test]
    fn test_split_negative_number_value() {
        let split = TokenSplit::from_tokens(["--offset", "-5"], FLAGS).unwrap();
        assert_eq!(split.unknown.get("offset"), Some(&"-5".to_string()));
    }

    #[test]
    fn test_split_recognized_never_unknown() {
        let split = TokenSplit::from_tokens(["--plugin", "unbiaser"], FLAGS).unwrap();
        assert!(split.unknown.is_empty());
    }

    #[test]
    fn test_merge_precedence_passes() {
        let defaults = Defaults::from_document(doc(json!({"a": 1, "b": 1, "c": 1, "d": 1, "e": 1})));
        let plugin = doc(json!({"b": 2, "c": 2, "d": 2, "e": 2}));
        let file = doc(json!({"c": 3, "d": 3, "e": 3}));
        let invocation = Invocation {
            explicit: doc(json!({"e": 5, "unused": true})),
            unknown: [("d".to_string(), "4".to_string())].into_iter().collect(),
            supplied: vec!["d".into(), "e".into()],
            positional: None,
        };

        let merged = merge(&defaults, &plugin, &file, &invocation);

        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(2)));
        assert_eq!(merged.get("c"), Some(&json!(3)));
        assert_eq!(merged.get("d"), Some(&json!(4)));
        assert_eq!(merged.get("e"), Some(&json!(5)));
        assert_eq!(merged.origin("a"), Some(ConfigOrigin::Builtin));
        assert_eq!(merged.origin("b"), Some(ConfigOrigin::Plugin));
        assert_eq!(merged.origin("c"), Some(ConfigOrigin::File));
        assert_eq!(merged.origin("d"), Some(ConfigOrigin::CliUnknown));
        assert_eq!(merged.origin("e"), Some(ConfigOrigin::Cli));
        assert!(merged.get("unused").is_none());
    }

    #[test]
    fn test_merge_explicit_beats_unknown_for_same_name() {
        let invocation = Invocation {
            explicit: doc(json!({"plugin": "normalizer"})),
            unknown: [("plugin".to_string(), "cleaner".to_string())].into_iter().collect(),
            supplied: vec!["plugin".into()],
            positional: None,
        };
        let merged = merge(&Defaults::builtin(), &ConfigDocument::new(), &ConfigDocument::new(), &invocation);
        assert_eq!(merged.get_str("plugin"), Some("normalizer"));
    }

    #[test]
    fn test_merge_positional_overrides_everything() {
        let invocation = Invocation {
            explicit: doc(json!({"input_file": "flag.csv"})),
            supplied: vec!["input_file".into()],
            positional: Some("positional.csv".into()),
            ..Default::default()
        };
        let file = doc(json!({"input_file": "file.csv"}));
        let merged = merge(&Defaults::builtin(), &ConfigDocument::new(), &file, &invocation);

        assert_eq!(merged.get_str("input_file"), Some("positional.csv"));
        assert_eq!(merged.origin("input_file"), Some(ConfigOrigin::Positional));
    }

    #[test]
    fn test_merge_invents_no_keys() {
        let defaults = Defaults::from_document(doc(json!({"a": 1})));
        let merged = merge(&defaults, &doc(json!({"b": 2})), &doc(json!({"c": 3})), &Invocation::default());
        let keys: Vec<_> = merged.values().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_redacted_masks_credentials() {
        let invocation = Invocation {
            explicit: doc(json!({"remote_password": "hunter2"})),
            supplied: vec!["remote_password".into()],
            ..Default::default()
        };
        let merged = merge(&Defaults::builtin(), &ConfigDocument::new(), &ConfigDocument::new(), &invocation);
        let shown = merged.redacted();

        assert_eq!(shown["remote_password"], "[REDACTED]");
        assert_eq!(shown["remote_username"], Value::Null);
        assert_eq!(merged.get_str("remote_password"), Some("hunter2"));
    }
}
