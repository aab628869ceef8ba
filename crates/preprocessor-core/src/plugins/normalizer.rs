//! Min-max or z-score normalization of every numeric column

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::{DebugRecord, Plugin, Range, configure_params, load_snapshot, save_snapshot};
use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::stats;
use crate::table::{Column, Table};

const NAME: &str = "normalizer";
const PIP: f64 = 0.0001;

/// Declared parameters of the normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerParams {
    pub method: String,
    pub range: Range,
    pub save_params: Option<String>,
    pub load_params: Option<String>,
}

impl Default for NormalizerParams {
    fn default() -> Self {
        Self {
            method: "min-max".to_string(),
            range: Range(-1.0, 1.0),
            save_params: None,
            load_params: None,
        }
    }
}

/// Fitted scaling, reusable through `save_params`/`load_params`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
enum Snapshot {
    #[serde(rename = "min-max")]
    MinMax {
        min: BTreeMap<String, f64>,
        max: BTreeMap<String, f64>,
        range: Range,
    },
    #[serde(rename = "z-score")]
    ZScore {
        mean: BTreeMap<String, f64>,
        std: BTreeMap<String, f64>,
    },
}

impl Snapshot {
    fn fit(method: &str, range: Range, table: &Table) -> Result<Self> {
        let per_column = |f: fn(&[f64]) -> f64| -> BTreeMap<String, f64> {
            table
                .columns()
                .iter()
                .map(|c| (c.name.clone(), finite_or_zero(f(&c.values))))
                .collect()
        };
        match method {
            "min-max" => Ok(Snapshot::MinMax {
                min: per_column(stats::min),
                max: per_column(stats::max),
                range,
            }),
            "z-score" => Ok(Snapshot::ZScore {
                mean: per_column(stats::mean),
                std: per_column(stats::std_dev),
            }),
            other => Err(Error::UnknownMethod {
                plugin: NAME.to_string(),
                method: other.to_string(),
            }),
        }
    }

    /// Offset, scale and shift for one column, if every needed entry is present
    fn coefficients(&self, name: &str) -> Option<(f64, f64, f64)> {
        match self {
            Snapshot::MinMax { min, max, range } => {
                let (lo, hi) = (*min.get(name)?, *max.get(name)?);
                let span = if hi - lo == 0.0 { 1.0 } else { hi - lo };
                Some((lo, span / (range.1 - range.0), range.0))
            }
            Snapshot::ZScore { mean, std } => {
                let (mu, sd) = (*mean.get(name)?, *std.get(name)?);
                Some((mu, if sd == 0.0 { 1.0 } else { sd }, 0.0))
            }
        }
    }

    fn apply(&self, table: &Table) -> Result<Table> {
        let columns = table
            .columns()
            .iter()
            .map(|column| {
                let (offset, scale, lo) = self.coefficients(&column.name).ok_or_else(|| {
                    Error::schema(&column.name, "not present in normalization parameters")
                })?;
                let values = column.values.iter().map(|x| (x - offset) / scale + lo).collect();
                Ok(Column::new(column.name.clone(), values))
            })
            .collect::<Result<Vec<_>>>()?;
        Table::new(table.timestamps().to_vec(), columns)
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

/// Normalization strategy
#[derive(Debug, Default)]
pub struct Normalizer {
    params: NormalizerParams,
    snapshot: Option<Snapshot>,
    first_column: Option<String>,
}

impl Plugin for Normalizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configure(&mut self, config: &ConfigDocument) -> Result<()> {
        let params: NormalizerParams = configure_params(NAME, config)?;
        if !matches!(params.method.as_str(), "min-max" | "z-score") {
            return Err(Error::UnknownMethod {
                plugin: NAME.to_string(),
                method: params.method,
            });
        }
        self.params = params;
        self.snapshot = None;
        Ok(())
    }

    fn process(&mut self, table: &Table) -> Result<Table> {
        let snapshot = match load_snapshot::<Snapshot>(self.params.load_params.as_deref())? {
            Some(loaded) => loaded,
            None => {
                let fitted = Snapshot::fit(&self.params.method, self.params.range, table)?;
                save_snapshot(self.params.save_params.as_deref(), &fitted)?;
                fitted
            }
        };

        let output = snapshot.apply(table)?;
        tracing::info!("Normalized {} columns with {}", table.width(), self.params.method);
        self.first_column = table.column_names().first().map(|s| s.to_string());
        self.snapshot = Some(snapshot);
        Ok(output)
    }

    fn debug_info(&self) -> DebugRecord {
        let mut record = DebugRecord::new();
        for key in ["min_val", "max_val", "mean", "std", "range", "method", "mae_per_pip"] {
            record.insert(key.to_string(), Value::Null);
        }
        let first = self.first_column.as_deref().unwrap_or_default();

        match &self.snapshot {
            Some(Snapshot::MinMax { min, max, range }) => {
                record.insert("min_val".into(), json!(min));
                record.insert("max_val".into(), json!(max));
                record.insert("range".into(), json!(range));
                record.insert("method".into(), json!("min-max"));
                if let (Some(lo), Some(hi)) = (min.get(first), max.get(first)) {
                    let mae = PIP * (range.1 - range.0) / (hi - lo);
                    record.insert("mae_per_pip".into(), json!(mae));
                }
            }
            Some(Snapshot::ZScore { mean, std }) => {
                record.insert("mean".into(), json!(mean));
                record.insert("std".into(), json!(std));
                record.insert("method".into(), json!("z-score"));
                if let Some(sd) = std.get(first) {
                    record.insert("mae_per_pip".into(), json!(PIP / sd));
                }
            }
            None => {}
        }
        record
    }
}
