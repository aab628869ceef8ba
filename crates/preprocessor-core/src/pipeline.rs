//! Run orchestration
//!
//! A run is three steps over one [`Session`]:
//!
//! 1. [`prepare`]: resolve the plugin and build the effective configuration
//! 2. [`run`]: load the table, transform it, write the output and debug files
//! 3. [`persist`]: save the non-default configuration and post remote records

use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{ConfigDocument, ConfigSource, Defaults, load_config, write_document};
use crate::error::{Error, Result};
use crate::merge::{EffectiveConfig, Invocation, merge};
use crate::persistence::{SaveDestination, compose_savable, save};
use crate::plugins::{DebugRecord, PLUGIN_GROUP, ResolvedPlugin, resolve};
use crate::remote::{Credentials, RemoteClient};
use crate::table::{Table, load_table, write_table};

/// The file-config tier of the merge and where it came from
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Flat document, empty when nothing was loaded
    pub document: ConfigDocument,
    /// Provenance of the document
    pub source: Option<ConfigSource>,
}

/// Everything one run needs, owned by that run
#[derive(Debug)]
pub struct Session {
    /// Built-in default set
    pub defaults: Defaults,
    /// Selected strategy
    pub plugin: ResolvedPlugin,
    /// Merged configuration
    pub effective: EffectiveConfig,
    /// Provenance of the file-config tier
    pub config_source: Option<ConfigSource>,
}

impl Session {
    /// Basic-auth credentials from the effective configuration
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(
            self.effective.get_str("remote_username"),
            self.effective.get_str("remote_password"),
        )
    }
}

/// Outcome of [`run`]
#[derive(Debug)]
pub struct RunReport {
    /// Transformed table
    pub output: Table,
    /// Run metrics merged with the strategy's debug info
    pub debug: DebugRecord,
}

/// Outcome of [`persist`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistReport {
    /// Non-default configuration that was saved
    pub saved: ConfigDocument,
    /// Local file written, if any
    pub local_path: Option<PathBuf>,
    /// Whether the remote save succeeded, when one was requested
    pub remote_saved: Option<bool>,
    /// Whether the remote log succeeded, when one was requested
    pub remote_logged: Option<bool>,
}

fn supplied_str<'a>(invocation: &'a Invocation, key: &str) -> Option<&'a str> {
    if !invocation.supplied.iter().any(|k| k == key) {
        return None;
    }
    invocation.explicit.get(key).and_then(Value::as_str)
}

/// Fetch the file-config tier named on the command line.
///
/// The remote document is fetched first; a local `load_config` file replaces
/// it. A failed remote fetch is logged and treated as an empty document.
pub fn source_file_config(invocation: &Invocation) -> Result<FileConfig> {
    let mut file_config = FileConfig::default();

    if let Some(url) = supplied_str(invocation, "remote_load_config") {
        let credentials = Credentials::from_parts(
            supplied_str(invocation, "remote_username"),
            supplied_str(invocation, "remote_password"),
        );
        match RemoteClient::new(credentials).and_then(|client| client.load_config(url)) {
            Ok(loaded) => {
                tracing::info!("Loaded remote configuration from {}", url);
                file_config = FileConfig {
                    document: loaded.document,
                    source: Some(loaded.source),
                };
            }
            Err(e) => tracing::error!("Failed to load remote configuration: {}", e),
        }
    }

    if let Some(path) = supplied_str(invocation, "load_config") {
        let loaded = load_config(path)?;
        tracing::info!(
            "Loaded configuration from {} (sha256 {})",
            loaded.source.location,
            loaded.source.digest
        );
        file_config = FileConfig {
            document: loaded.document,
            source: Some(loaded.source),
        };
    }

    Ok(file_config)
}

/// Resolve the plugin and build the effective configuration.
///
/// The plugin name can come from any tier, so a first merge without plugin
/// defaults selects the plugin and a second merge includes its defaults.
pub fn prepare(defaults: Defaults, file_config: FileConfig, invocation: &Invocation) -> Result<Session> {
    let empty = ConfigDocument::new();
    let probe = merge(&defaults, &empty, &file_config.document, invocation);
    let name = probe.get_str("plugin").ok_or_else(|| Error::ConfigInvalid {
        message: "'plugin' must name a registered plugin".to_string(),
    })?;

    let plugin = resolve(PLUGIN_GROUP, name)?;
    let effective = merge(&defaults, plugin.defaults(), &file_config.document, invocation);

    let redacted = effective.redacted();
    for (key, value) in &redacted {
        tracing::debug!(
            key = %key,
            value = %value,
            origin = ?effective.origin(key),
            "effective configuration"
        );
    }
    tracing::info!("Using plugin '{}' ({})", plugin.name(), plugin.description());

    Ok(Session {
        defaults,
        plugin,
        effective,
        config_source: file_config.source,
    })
}

/// Load, transform and write the table
pub fn run(session: &Session) -> Result<RunReport> {
    let config = &session.effective;
    let input_file = config.get_str("input_file").ok_or_else(|| Error::ConfigInvalid {
        message: "no input file given (positional argument or --input_file)".to_string(),
    })?;

    let mut plugin = session.plugin.instantiate();
    plugin.configure(config.values())?;

    let input = load_table(input_file)?;
    let started = Instant::now();
    let output = plugin.process(&input)?;
    let elapsed = started.elapsed().as_secs_f64();

    if let Some(path) = config.get_str("output_file") {
        let include_date = config.get_bool("force_date").unwrap_or(false);
        let headers = config.get_bool("headers").unwrap_or(true);
        write_table(path, &output, include_date, headers)?;
        tracing::info!("Output written to {}", path);
    }

    let mut debug = DebugRecord::new();
    debug.insert("plugin".into(), json!(plugin.name()));
    debug.insert("execution_time".into(), json!(elapsed));
    debug.insert("input_rows".into(), json!(input.height()));
    debug.insert("output_rows".into(), json!(output.height()));
    debug.insert("input_columns".into(), json!(input.width()));
    debug.insert("output_columns".into(), json!(output.width()));
    if let Some(source) = &session.config_source {
        debug.insert("config_source".into(), json!(source));
    }
    debug.extend(plugin.debug_info());

    if let Some(path) = config.get_str("debug_file") {
        write_document(path, &debug)?;
        tracing::info!("Debug information written to {}", path);
    }

    Ok(RunReport { output, debug })
}

/// Save the non-default configuration and send remote records.
///
/// The local save is fatal on failure; remote failures are logged and
/// reported through the returned flags.
pub fn persist(session: &Session, report: &RunReport) -> Result<PersistReport> {
    let config = &session.effective;
    let saved = compose_savable(config, &session.defaults, session.plugin.defaults());
    let mut outcome = PersistReport {
        saved,
        ..Default::default()
    };

    if let Some(path) = config.get_str("save_config") {
        let path = PathBuf::from(path);
        save(&outcome.saved, &SaveDestination::Local(path.clone()))?;
        outcome.local_path = Some(path);
    }

    if let Some(url) = config.get_str("remote_save_config") {
        let destination = SaveDestination::Remote {
            url: url.to_string(),
            credentials: session.credentials(),
        };
        let ok = match save(&outcome.saved, &destination) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save configuration remotely: {}", e);
                false
            }
        };
        outcome.remote_saved = Some(ok);
    }

    if let Some(url) = config.get_str("remote_log") {
        let sent = RemoteClient::new(session.credentials())
            .and_then(|client| client.log(url, &outcome.saved, &report.debug));
        let ok = match sent {
            Ok(()) => {
                tracing::info!("Run logged to {}", url);
                true
            }
            Err(e) => {
                tracing::error!("Failed to log run remotely: {}", e);
                false
            }
        };
        outcome.remote_logged = Some(ok);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigOrigin;
    use std::fs;

    fn doc(value: Value) -> ConfigDocument {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn explicit(pairs: Value) -> Invocation {
        let explicit = doc(pairs);
        Invocation {
            supplied: explicit.keys().cloned().collect(),
            explicit,
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_resolves_plugin_from_file_config() {
        let file = FileConfig {
            document: doc(json!({"plugin": "unbiaser", "window_size": 9})),
            source: None,
        };
        let session = prepare(Defaults::builtin(), file, &Invocation::default()).unwrap();

        assert_eq!(session.plugin.name(), "unbiaser");
        assert_eq!(session.effective.get("window_size"), Some(&json!(9)));
        assert_eq!(session.effective.get("ema_alpha"), Some(&json!(0.1)));
        assert_eq!(session.effective.origin("ema_alpha"), Some(ConfigOrigin::Plugin));
    }

    #[test]
    fn test_prepare_unknown_plugin() {
        let err = prepare(
            Defaults::builtin(),
            FileConfig::default(),
            &explicit(json!({"plugin": "nope"})),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PluginNotFound { .. }));
    }

    #[test]
    fn test_run_requires_input_file() {
        let session = prepare(Defaults::builtin(), FileConfig::default(), &Invocation::default()).unwrap();
        assert!(matches!(run(&session), Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn test_source_file_config_local_replaces_unreachable_remote() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.json");
        fs::write(&path, r#"{"plugin": "trimmer"}"#).unwrap();

        let invocation = explicit(json!({
            "remote_load_config": "http://127.0.0.1:9/unreachable",
            "load_config": path.to_str().unwrap()
        }));
        let file = source_file_config(&invocation).unwrap();
        assert_eq!(file.document["plugin"], "trimmer");
        assert!(file.source.is_some());
    }

    #[test]
    fn test_source_file_config_failed_remote_is_empty() {
        let invocation = explicit(json!({"remote_load_config": "http://127.0.0.1:9/unreachable"}));
        let file = source_file_config(&invocation).unwrap();
        assert!(file.document.is_empty());
        assert!(file.source.is_none());
    }

    #[test]
    fn test_full_run_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        fs::write(
            &input,
            "DATE_TIME,OPEN,CLOSE\n2010-01-04 00:00:00,1,2\n2010-01-04 00:05:00,3,4\n2010-01-04 00:10:00,5,6\n",
        )
        .unwrap();
        let at = |name: &str| dir.path().join(name).to_str().unwrap().to_string();

        let invocation = explicit(json!({
            "input_file": at("in.csv"),
            "output_file": at("out.csv"),
            "save_config": at("saved.json"),
            "debug_file": at("debug.json"),
            "plugin": "normalizer",
            "force_date": true,
            "remote_save_config": "http://127.0.0.1:9/save"
        }));
        let session = prepare(Defaults::builtin(), FileConfig::default(), &invocation).unwrap();
        let report = run(&session).unwrap();
        let persisted = persist(&session, &report).unwrap();

        let out = fs::read_to_string(at("out.csv")).unwrap();
        assert!(out.starts_with("DATE_TIME,OPEN,CLOSE\n2010-01-04 00:00:00,-1,-1\n"));

        let debug: Value = serde_json::from_str(&fs::read_to_string(at("debug.json")).unwrap()).unwrap();
        assert_eq!(debug["input_rows"], 3);
        assert_eq!(debug["output_columns"], 2);
        assert_eq!(debug["method"], "min-max");
        assert!(debug["execution_time"].is_f64());

        let saved = load_config(at("saved.json")).unwrap().document;
        assert_eq!(saved["plugin"], "normalizer");
        assert_eq!(saved["force_date"], true);
        assert!(!saved.contains_key("method"));
        assert!(!saved.contains_key("headers"));

        assert_eq!(persisted.remote_saved, Some(false));
        assert_eq!(persisted.remote_logged, None);
    }

    #[test]
    fn test_failed_remote_log_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let saved = dir.path().join("saved.json");
        let invocation = explicit(json!({
            "plugin": "unbiaser",
            "save_config": saved.to_str().unwrap(),
            "remote_log": "http://127.0.0.1:9/log"
        }));
        let session = prepare(Defaults::builtin(), FileConfig::default(), &invocation).unwrap();
        let report = RunReport {
            output: Table::new(Vec::new(), Vec::new()).unwrap(),
            debug: DebugRecord::new(),
        };

        let persisted = persist(&session, &report).unwrap();
        assert_eq!(persisted.remote_logged, Some(false));
        assert_eq!(persisted.remote_saved, None);
        assert_eq!(persisted.local_path.as_deref(), Some(saved.as_path()));
        assert!(saved.exists());
    }
}
