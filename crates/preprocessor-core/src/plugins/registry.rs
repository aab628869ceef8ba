//! Static plugin registry
//!
//! Strategies are registered at compile time under a single group. Resolving
//! a name yields a factory plus the plugin's declared default set.

use serde::Serialize;

use super::{
    Cleaner, DefaultPlugin, FeatureSelector, Normalizer, Plugin, SignalHorizon, Trimmer, Unbiaser,
    cleaner::CleanerParams, declared_defaults, default_plugin::DefaultPluginParams,
    feature_selector::FeatureSelectorParams, normalizer::NormalizerParams,
    signal_horizon::SignalHorizonParams, trimmer::TrimmerParams, unbiaser::UnbiaserParams,
};
use crate::config::{ConfigDocument, into_flat_document};
use crate::error::{Error, Result};

/// Group under which the built-in strategies are registered
pub const PLUGIN_GROUP: &str = "preprocessor.plugins";

/// A registered strategy
pub struct PluginDescriptor {
    /// Registered name
    pub name: &'static str,
    /// One-line summary
    pub description: &'static str,
    factory: fn() -> Box<dyn Plugin>,
    defaults: fn() -> Result<ConfigDocument>,
}

fn entry<P, D>(name: &'static str, description: &'static str) -> PluginDescriptor
where
    P: Plugin + Default + 'static,
    D: Serialize + Default,
{
    PluginDescriptor {
        name,
        description,
        factory: || Box::new(P::default()) as Box<dyn Plugin>,
        defaults: declared_defaults::<D>,
    }
}

fn plugins() -> [PluginDescriptor; 7] {
    [
        entry::<DefaultPlugin, DefaultPluginParams>(
            "default_plugin",
            "D1/D2/D3 split with min-max fitted on D1",
        ),
        entry::<Normalizer, NormalizerParams>("normalizer", "min-max or z-score normalization"),
        entry::<Unbiaser, UnbiaserParams>("unbiaser", "subtract a moving or exponential average"),
        entry::<Trimmer, TrimmerParams>("trimmer", "drop columns and rows by position"),
        entry::<FeatureSelector, FeatureSelectorParams>(
            "feature_selector",
            "keep columns by position or autocorrelation",
        ),
        entry::<Cleaner, CleanerParams>("cleaner", "fill time gaps and handle outliers"),
        entry::<SignalHorizon, SignalHorizonParams>(
            "signal_horizon",
            "forward targets, daily aggregates and rolling volatility",
        ),
    ]
}

/// Names of all registered strategies
pub fn available() -> Vec<&'static str> {
    plugins().iter().map(|p| p.name).collect()
}

/// A strategy resolved by name, with its validated defaults
pub struct ResolvedPlugin {
    descriptor: PluginDescriptor,
    defaults: ConfigDocument,
}

impl std::fmt::Debug for ResolvedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPlugin")
            .field("name", &self.descriptor.name)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl ResolvedPlugin {
    /// Registered name
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// One-line summary
    pub fn description(&self) -> &'static str {
        self.descriptor.description
    }

    /// Create a fresh, unconfigured instance
    pub fn instantiate(&self) -> Box<dyn Plugin> {
        (self.descriptor.factory)()
    }

    /// Declared default set
    pub fn defaults(&self) -> &ConfigDocument {
        &self.defaults
    }

    /// Declared parameter names, in declaration order
    pub fn param_names(&self) -> Vec<&str> {
        self.defaults.keys().map(String::as_str).collect()
    }
}

/// Resolve a plugin by group and name
pub fn resolve(group: &str, name: &str) -> Result<ResolvedPlugin> {
    if group != PLUGIN_GROUP {
        return Err(Error::PluginLoad {
            name: name.to_string(),
            message: format!("unknown plugin group '{}'", group),
        });
    }

    let descriptor = plugins()
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::PluginNotFound {
            group: group.to_string(),
            name: name.to_string(),
        })?;

    let load_error = |message: String| Error::PluginLoad {
        name: name.to_string(),
        message,
    };
    let declared = (descriptor.defaults)().map_err(|e| load_error(e.to_string()))?;
    let defaults = into_flat_document(serde_json::Value::Object(declared), name)
        .map_err(|e| load_error(e.to_string()))?;

    tracing::debug!(plugin = name, keys = defaults.len(), "Resolved plugin");
    Ok(ResolvedPlugin {
        descriptor,
        defaults,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("default_plugin")]
    #[case("normalizer")]
    #[case("unbiaser")]
    #[case("trimmer")]
    #[case("feature_selector")]
    #[case("cleaner")]
    #[case("signal_horizon")]
    fn test_every_registered_plugin_resolves(#[case] name: &str) {
        let resolved = resolve(PLUGIN_GROUP, name).unwrap();
        assert_eq!(resolved.name(), name);
        assert_eq!(resolved.instantiate().name(), name);
        assert!(!resolved.param_names().is_empty());
    }

    #[test]
    fn test_normalizer_defaults() {
        let resolved = resolve(PLUGIN_GROUP, "normalizer").unwrap();
        assert_eq!(resolved.defaults()["method"], json!("min-max"));
        assert_eq!(resolved.defaults()["range"], json!([-1.0, 1.0]));
        assert_eq!(
            resolved.param_names(),
            vec!["method", "range", "save_params", "load_params"]
        );
    }

    #[test]
    fn test_unknown_name() {
        let err = resolve(PLUGIN_GROUP, "missing").unwrap_err();
        assert!(matches!(err, Error::PluginNotFound { ref name, .. } if name == "missing"));
    }

    #[test]
    fn test_unknown_group() {
        let err = resolve("other.plugins", "normalizer").unwrap_err();
        assert!(matches!(err, Error::PluginLoad { .. }));
    }

    #[test]
    fn test_available_lists_all() {
        assert_eq!(available().len(), 7);
        assert!(available().contains(&"signal_horizon"));
    }
}
