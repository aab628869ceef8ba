//! Preprocessor CLI
//!
//! Merges the run configuration, applies one plugin to a tick-data CSV and
//! persists what differs from the defaults.

use anyhow::{Context, Result};
use preprocessor_core::plugins::registry;
use preprocessor_core::{Defaults, pipeline};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

mod args;

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, filter_handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let invocation = args::parse_invocation(std::env::args().skip(1))?;

    let file_config =
        pipeline::source_file_config(&invocation).context("Failed to load configuration")?;
    let session = pipeline::prepare(Defaults::builtin(), file_config, &invocation)
        .with_context(|| {
            format!(
                "Failed to prepare run (available plugins: {})",
                registry::available().join(", ")
            )
        })?;

    // quiet_mode is only known after the merge
    if session.effective.get_bool("quiet_mode").unwrap_or(false) {
        filter_handle
            .reload(EnvFilter::new("error"))
            .context("Failed to apply quiet mode")?;
    }

    let report = pipeline::run(&session).with_context(|| {
        format!(
            "Plugin '{}' failed on {}",
            session.plugin.name(),
            session.effective.get_str("input_file").unwrap_or("<no input>")
        )
    })?;
    tracing::info!(
        "Run finished: {} rows x {} columns",
        report.output.height(),
        report.output.width()
    );

    let persisted = pipeline::persist(&session, &report).context("Failed to save configuration")?;
    if let Some(path) = &persisted.local_path {
        tracing::info!("Configuration saved to {}", path.display());
    }

    Ok(())
}
