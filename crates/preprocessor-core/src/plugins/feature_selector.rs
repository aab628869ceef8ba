//! Keeps a subset of columns, chosen by position or by autocorrelation

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{DebugRecord, Plugin, Positions, configure_params, load_snapshot, save_snapshot};
use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::stats;
use crate::table::{TEMPORAL_KEY, Table};

const NAME: &str = "feature_selector";

/// Declared parameters of the feature selector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelectorParams {
    pub method: String,
    pub single: usize,
    pub multi: Option<Positions>,
    pub max_lag: usize,
    pub significance_level: f64,
    pub save_params: Option<String>,
    pub load_params: Option<String>,
}

impl Default for FeatureSelectorParams {
    fn default() -> Self {
        Self {
            method: "select_single".to_string(),
            single: 4,
            multi: None,
            max_lag: 5,
            significance_level: 0.05,
            save_params: None,
            load_params: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Method {
    #[default]
    Single,
    Multi,
    Acf,
    Pacf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    method: String,
    selected_features: Vec<String>,
}

/// Feature selection strategy
#[derive(Debug, Default)]
pub struct FeatureSelector {
    params: FeatureSelectorParams,
    method: Method,
    selected: Vec<String>,
}

impl FeatureSelector {
    /// Column name at a file-layout position (0 is the temporal key)
    fn column_at<'a>(table: &'a Table, position: usize) -> Result<&'a str> {
        if position == 0 {
            return Err(Error::invalid_param(
                NAME,
                format!("position 0 is the temporal key {}", TEMPORAL_KEY),
            ));
        }
        table
            .column_names()
            .get(position - 1)
            .copied()
            .ok_or_else(|| {
                Error::schema(
                    position.to_string(),
                    format!("no column at position {} (table has {})", position, table.width() + 1),
                )
            })
    }

    fn select_by_correlation(&self, table: &Table) -> Vec<String> {
        let threshold = self.params.significance_level;
        table
            .columns()
            .iter()
            .filter(|column| {
                let coefficients = match self.method {
                    Method::Pacf => stats::partial_autocorrelation(&column.values, self.params.max_lag),
                    _ => stats::autocorrelation(&column.values, self.params.max_lag),
                };
                coefficients.iter().any(|c| c.abs() > threshold)
            })
            .map(|column| column.name.clone())
            .collect()
    }
}

impl Plugin for FeatureSelector {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configure(&mut self, config: &ConfigDocument) -> Result<()> {
        let params: FeatureSelectorParams = configure_params(NAME, config)?;
        self.method = match params.method.as_str() {
            "select_single" => Method::Single,
            "select_multi" => Method::Multi,
            "acf" => Method::Acf,
            "pacf" => Method::Pacf,
            other => {
                return Err(Error::UnknownMethod {
                    plugin: NAME.to_string(),
                    method: other.to_string(),
                });
            }
        };
        if self.method == Method::Multi && params.multi.is_none() {
            return Err(Error::invalid_param(NAME, "select_multi requires 'multi' positions"));
        }
        self.params = params;
        Ok(())
    }

    fn process(&mut self, table: &Table) -> Result<Table> {
        self.selected = match self.method {
            Method::Single => vec![Self::column_at(table, self.params.single)?.to_string()],
            Method::Multi => self
                .params
                .multi
                .iter()
                .flat_map(|p| p.0.iter())
                .map(|&position| Self::column_at(table, position).map(str::to_string))
                .collect::<Result<Vec<_>>>()?,
            Method::Acf | Method::Pacf => {
                match load_snapshot::<Snapshot>(self.params.load_params.as_deref())? {
                    Some(loaded) => loaded.selected_features,
                    None => {
                        let snapshot = Snapshot {
                            method: self.params.method.clone(),
                            selected_features: self.select_by_correlation(table),
                        };
                        save_snapshot(self.params.save_params.as_deref(), &snapshot)?;
                        snapshot.selected_features
                    }
                }
            }
        };

        tracing::info!("Selected features: {:?}", self.selected);
        table.select_columns(&self.selected)
    }

    fn debug_info(&self) -> DebugRecord {
        let mut record = DebugRecord::new();
        record.insert("method".into(), json!(self.params.method));
        record.insert("max_lag".into(), json!(self.params.max_lag));
        record.insert("significance_level".into(), json!(self.params.significance_level));
        record.insert("single".into(), json!(self.params.single));
        record.insert("multi".into(), json!(self.params.multi));
        record.insert("selected_features".into(), json!(self.selected));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testing::{config, table};

    fn ohlc() -> Table {
        let alternating: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let flat = vec![3.0; 40];
        let ramp: Vec<f64> = (0..40).map(f64::from).collect();
        table(&[
            ("OPEN", &alternating),
            ("HIGH", &flat),
            ("LOW", &ramp),
            ("CLOSE", &ramp),
        ])
    }

    #[test]
    fn test_select_single_default_is_close() {
        let mut plugin = FeatureSelector::default();
        plugin.configure(&config(json!({}))).unwrap();
        let output = plugin.process(&ohlc()).unwrap();
        assert_eq!(output.column_names(), vec!["CLOSE"]);
    }

    #[test]
    fn test_select_multi_keeps_given_order() {
        let mut plugin = FeatureSelector::default();
        plugin
            .configure(&config(json!({"method": "select_multi", "multi": "3,1"})))
            .unwrap();
        let output = plugin.process(&ohlc()).unwrap();
        assert_eq!(output.column_names(), vec!["LOW", "OPEN"]);
    }

    #[test]
    fn test_position_zero_is_rejected() {
        let mut plugin = FeatureSelector::default();
        plugin.configure(&config(json!({"single": 0}))).unwrap();
        assert!(matches!(plugin.process(&ohlc()), Err(Error::InvalidParam { .. })));
    }

    #[test]
    fn test_acf_drops_constant_column() {
        let mut plugin = FeatureSelector::default();
        plugin.configure(&config(json!({"method": "acf"}))).unwrap();
        let output = plugin.process(&ohlc()).unwrap();
        assert_eq!(output.column_names(), vec!["OPEN", "LOW", "CLOSE"]);
    }

    #[test]
    fn test_pacf_snapshot_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, r#"{"method": "pacf", "selected_features": ["HIGH"]}"#).unwrap();

        let mut plugin = FeatureSelector::default();
        plugin
            .configure(&config(json!({"method": "pacf", "load_params": path.to_str().unwrap()})))
            .unwrap();
        let output = plugin.process(&ohlc()).unwrap();
        assert_eq!(output.column_names(), vec!["HIGH"]);
    }

    #[test]
    fn test_granger_is_unknown() {
        let err = FeatureSelector::default()
            .configure(&config(json!({"method": "granger"})))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownMethod { .. }));
    }
}
