//! Command-line surface
//!
//! Raw tokens are split before clap sees them: recognized flags go to the
//! derive parser, unknown `--name value` pairs and the leading positional
//! are kept aside for the merge.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use preprocessor_core::{ConfigDocument, FlagSpec, Invocation, TokenSplit};
use serde_json::Value;

/// Tick-data preprocessor
///
/// Any other `--name value` pair is passed to the selected plugin.
#[derive(Parser, Debug, Default)]
#[command(name = "preprocessor")]
#[command(author, version, about, long_about = None)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Input CSV (the leading positional argument overrides this)
    #[arg(long = "input_file")]
    pub input_file: Option<String>,

    /// Local config document to load
    #[arg(long = "load_config")]
    pub load_config: Option<String>,

    /// Where to save the non-default configuration
    #[arg(long = "save_config")]
    pub save_config: Option<String>,

    /// URL to fetch a config document from
    #[arg(long = "remote_load_config")]
    pub remote_load_config: Option<String>,

    /// URL to post the non-default configuration to
    #[arg(long = "remote_save_config")]
    pub remote_save_config: Option<String>,

    /// URL to post the run record to
    #[arg(long = "remote_log")]
    pub remote_log: Option<String>,

    /// Basic-auth user for the remote endpoint
    #[arg(long = "remote_username")]
    pub remote_username: Option<String>,

    /// Basic-auth password for the remote endpoint
    #[arg(long = "remote_password")]
    pub remote_password: Option<String>,

    /// Plugin to run
    #[arg(long = "plugin")]
    pub plugin: Option<String>,

    /// Output CSV
    #[arg(long = "output_file")]
    pub output_file: Option<String>,

    /// Write a header row
    #[arg(long = "headers")]
    pub headers: bool,

    /// Write the DATE_TIME column
    #[arg(long = "force_date")]
    pub force_date: bool,

    /// Where to write the debug record
    #[arg(long = "debug_file")]
    pub debug_file: Option<String>,

    /// Only log errors
    #[arg(long = "quiet_mode")]
    pub quiet_mode: bool,

    /// Passed through to plugins that filter by coefficient of variation
    #[arg(long = "only_low_CV")]
    pub only_low_cv: bool,
}

impl Cli {
    /// Typed values of every recognized field, keyed by flag name
    pub fn explicit(&self) -> ConfigDocument {
        let text = |v: &Option<String>| v.clone().map_or(Value::Null, Value::String);
        let mut doc = ConfigDocument::new();
        doc.insert("input_file".into(), text(&self.input_file));
        doc.insert("load_config".into(), text(&self.load_config));
        doc.insert("save_config".into(), text(&self.save_config));
        doc.insert("remote_load_config".into(), text(&self.remote_load_config));
        doc.insert("remote_save_config".into(), text(&self.remote_save_config));
        doc.insert("remote_log".into(), text(&self.remote_log));
        doc.insert("remote_username".into(), text(&self.remote_username));
        doc.insert("remote_password".into(), text(&self.remote_password));
        doc.insert("plugin".into(), text(&self.plugin));
        doc.insert("output_file".into(), text(&self.output_file));
        doc.insert("headers".into(), Value::Bool(self.headers));
        doc.insert("force_date".into(), Value::Bool(self.force_date));
        doc.insert("debug_file".into(), text(&self.debug_file));
        doc.insert("quiet_mode".into(), Value::Bool(self.quiet_mode));
        doc.insert("only_low_CV".into(), Value::Bool(self.only_low_cv));
        doc
    }
}

/// Split the raw tokens, let clap parse the recognized ones, and build the
/// command line's contribution to the merge.
///
/// `--help` and `--version` exit from inside clap.
pub fn parse_invocation<I, S>(tokens: I) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = Cli::command();
    command.build();
    let flags: Vec<FlagSpec<'_>> = command
        .get_arguments()
        .filter_map(|arg| {
            arg.get_long().map(|name| FlagSpec {
                name,
                takes_value: arg.get_action().takes_values(),
            })
        })
        .collect();

    let split = TokenSplit::from_tokens(tokens, &flags).context("Invalid command line")?;
    let cli = Cli::parse_from(std::iter::once("preprocessor".to_string()).chain(split.recognized.clone()));
    tracing::debug!(
        supplied = ?split.supplied,
        unknown = split.unknown.len(),
        "Parsed command line"
    );

    Ok(split.into_invocation(cli.explicit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_recognized_and_unknown_flags() {
        let invocation = parse_invocation([
            "ticks.csv",
            "--plugin",
            "unbiaser",
            "--window_size",
            "12",
            "--headers",
            "--only_low_CV",
        ])
        .unwrap();

        assert_eq!(invocation.positional.as_deref(), Some("ticks.csv"));
        assert_eq!(invocation.explicit["plugin"], json!("unbiaser"));
        assert_eq!(invocation.explicit["headers"], json!(true));
        assert_eq!(invocation.explicit["only_low_CV"], json!(true));
        assert_eq!(invocation.explicit["force_date"], json!(false));
        assert_eq!(invocation.unknown["window_size"], "12");
        assert_eq!(
            invocation.supplied,
            vec!["plugin", "window_size", "headers", "only_low_CV"]
        );
    }

    #[test]
    fn test_inline_values() {
        let invocation = parse_invocation(["--output_file=out.csv", "--method=ema"]).unwrap();
        assert_eq!(invocation.explicit["output_file"], json!("out.csv"));
        assert_eq!(invocation.unknown["method"], "ema");
    }

    #[test]
    fn test_repeated_flags_last_wins() {
        let invocation = parse_invocation([
            "--headers",
            "--headers",
            "--plugin",
            "normalizer",
            "--plugin",
            "cleaner",
        ])
        .unwrap();
        assert_eq!(invocation.explicit["headers"], json!(true));
        assert_eq!(invocation.explicit["plugin"], json!("cleaner"));
    }

    #[test]
    fn test_stray_positional_is_rejected() {
        let err = parse_invocation(["in.csv", "--plugin", "cleaner", "extra", "again"]).unwrap_err();
        assert!(format!("{:#}", err).contains("extra"));
    }

    #[test]
    fn test_explicit_covers_every_default_key() {
        let explicit = Cli::default().explicit();
        let defaults = preprocessor_core::Defaults::builtin();
        for key in explicit.keys() {
            assert!(defaults.get(key).is_some(), "{key}");
        }
        assert_eq!(explicit.len(), defaults.as_document().len());
    }
}
