//! Chronological D1/D2/D3 split with min-max scaling fitted on D1
//!
//! The returned table is every input row scaled with D1's per-column
//! minimum and maximum. When prefixes are configured the raw OHLC splits and
//! the scaled splits are also written as `<prefix>d1.csv`, `d2`, `d3`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{DebugRecord, Plugin, configure_params};
use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::stats;
use crate::table::{Table, write_table};

const NAME: &str = "default_plugin";

const OHLC: [&str; 4] = ["OPEN", "LOW", "HIGH", "CLOSE"];

const EPSILON: f64 = 1e-8;

/// Declared parameters of the default strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultPluginParams {
    pub d1_proportion: f64,
    pub d2_proportion: f64,
    pub dataset_prefix: Option<String>,
    pub target_prefix: Option<String>,
}

impl Default for DefaultPluginParams {
    fn default() -> Self {
        Self {
            d1_proportion: 0.3,
            d2_proportion: 0.3,
            dataset_prefix: None,
            target_prefix: None,
        }
    }
}

/// Split-and-scale strategy used when no plugin is named
#[derive(Debug, Default)]
pub struct DefaultPlugin {
    params: DefaultPluginParams,
    column_metrics: Map<String, Value>,
    normalization_params: Map<String, Value>,
    split_rows: [usize; 3],
}

fn write_splits(prefix: &str, splits: &[Table; 3]) -> Result<()> {
    for (idx, split) in splits.iter().enumerate() {
        let path = format!("{}d{}.csv", prefix, idx + 1);
        write_table(&path, split, true, true)?;
        tracing::info!("Wrote {} rows to {}", split.height(), path);
    }
    Ok(())
}

impl Plugin for DefaultPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configure(&mut self, config: &ConfigDocument) -> Result<()> {
        let params: DefaultPluginParams = configure_params(NAME, config)?;
        let (d1, d2) = (params.d1_proportion, params.d2_proportion);
        if !(d1 > 0.0 && d2 >= 0.0 && d1 + d2 <= 1.0) {
            return Err(Error::invalid_param(
                NAME,
                format!("split proportions {} and {} must be positive and sum to at most 1", d1, d2),
            ));
        }
        self.params = params;
        Ok(())
    }

    fn process(&mut self, table: &Table) -> Result<Table> {
        for name in OHLC {
            table.require(name)?;
        }

        let total = table.height();
        let d1_rows = (total as f64 * self.params.d1_proportion) as usize;
        let d2_rows = (total as f64 * self.params.d2_proportion) as usize;
        if d1_rows == 0 {
            return Err(Error::invalid_param(
                NAME,
                format!("d1_proportion {} selects no rows of {}", self.params.d1_proportion, total),
            ));
        }
        self.split_rows = [d1_rows, d2_rows, total - d1_rows - d2_rows];
        tracing::info!(
            "Split {} rows into D1={}, D2={}, D3={}",
            total,
            d1_rows,
            d2_rows,
            self.split_rows[2]
        );

        self.column_metrics.clear();
        self.normalization_params.clear();
        for column in table.columns() {
            let values = &column.values;
            self.column_metrics.insert(
                column.name.clone(),
                json!({
                    "min": stats::min(values),
                    "max": stats::max(values),
                    "mean": stats::mean(values),
                    "std": stats::std_dev(values),
                    "cv": stats::coefficient_of_variation(values),
                }),
            );
        }

        let d1 = table.slice_rows(0, d1_rows);
        let scaled = table.map_columns(|column| {
            let fit = d1.column(&column.name).map_or(&[][..], |c| &c.values[..]);
            let (lo, hi) = (stats::min(fit), stats::max(fit));
            self.normalization_params
                .insert(column.name.clone(), json!({"min": lo, "max": hi}));
            column
                .values
                .iter()
                .map(|x| (x - lo) / (hi - lo + EPSILON))
                .collect()
        });

        let bounds = [(0, d1_rows), (d1_rows, d1_rows + d2_rows), (d1_rows + d2_rows, total)];
        if let Some(prefix) = &self.params.dataset_prefix {
            let raw = table.select_columns(&OHLC)?;
            write_splits(prefix, &bounds.map(|(s, e)| raw.slice_rows(s, e)))?;
        }
        if let Some(prefix) = &self.params.target_prefix {
            write_splits(prefix, &bounds.map(|(s, e)| scaled.slice_rows(s, e)))?;
        }

        Ok(scaled)
    }

    fn debug_info(&self) -> DebugRecord {
        let mut record = DebugRecord::new();
        record.insert("column_metrics".into(), Value::Object(self.column_metrics.clone()));
        record.insert(
            "normalization_params".into(),
            Value::Object(self.normalization_params.clone()),
        );
        record.insert("d1_rows".into(), json!(self.split_rows[0]));
        record.insert("d2_rows".into(), json!(self.split_rows[1]));
        record.insert("d3_rows".into(), json!(self.split_rows[2]));
        record
    }
}
