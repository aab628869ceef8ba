//! Time-grid gap repair and outlier handling
//!
//! Data-quality findings are reported through the log and the debug record.
//! Nothing is changed unless a policy flag asks for it.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

use super::{DebugRecord, Plugin, configure_params, flexible_bool, load_snapshot, save_snapshot};
use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::stats;
use crate::table::{Column, Table};

const NAME: &str = "cleaner";

/// Declared parameters of the cleaner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanerParams {
    pub method: String,
    pub period: u32,
    pub outlier_threshold: Option<f64>,
    #[serde(deserialize_with = "flexible_bool")]
    pub solve_missing: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub delete_outliers: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub interpolate_outliers: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub delete_nan: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub interpolate_nan: bool,
    pub save_params: Option<String>,
    pub load_params: Option<String>,
}

impl Default for CleanerParams {
    fn default() -> Self {
        Self {
            method: "missing_values".to_string(),
            period: 5,
            outlier_threshold: None,
            solve_missing: false,
            delete_outliers: false,
            interpolate_outliers: false,
            delete_nan: false,
            interpolate_nan: false,
            save_params: None,
            load_params: None,
        }
    }
}

/// Cleaning policy as saved to and loaded from a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    method: String,
    period: u32,
    outlier_threshold: Option<f64>,
    solve_missing: bool,
    delete_outliers: bool,
    interpolate_outliers: bool,
    delete_nan: bool,
    interpolate_nan: bool,
}

impl From<&CleanerParams> for Snapshot {
    fn from(p: &CleanerParams) -> Self {
        Self {
            method: p.method.clone(),
            period: p.period,
            outlier_threshold: p.outlier_threshold,
            solve_missing: p.solve_missing,
            delete_outliers: p.delete_outliers,
            interpolate_outliers: p.interpolate_outliers,
            delete_nan: p.delete_nan,
            interpolate_nan: p.interpolate_nan,
        }
    }
}

/// Cleaning strategy
#[derive(Debug, Default)]
pub struct Cleaner {
    params: CleanerParams,
    missing_timestamps: usize,
    outliers: Map<String, Value>,
    rows_removed: usize,
}

impl Cleaner {
    fn check_method(method: &str) -> Result<()> {
        match method {
            "missing_values" | "outlier" => Ok(()),
            other => Err(Error::UnknownMethod {
                plugin: NAME.to_string(),
                method: other.to_string(),
            }),
        }
    }

    fn handle_missing(&mut self, policy: &Snapshot, table: &Table) -> Result<Table> {
        if policy.period == 0 {
            return Err(Error::invalid_param(NAME, "period must be at least 1 minute"));
        }
        let (Some(&first), Some(&last)) = (table.timestamps().iter().min(), table.timestamps().iter().max())
        else {
            return Ok(table.clone());
        };

        let present: BTreeSet<NaiveDateTime> = table.timestamps().iter().copied().collect();
        let step = Duration::minutes(i64::from(policy.period));
        let missing: Vec<NaiveDateTime> = std::iter::successors(Some(first), |t| Some(*t + step))
            .take_while(|t| *t <= last)
            .filter(|t| !present.contains(t))
            .collect();
        self.missing_timestamps = missing.len();

        if missing.is_empty() {
            return Ok(table.clone());
        }
        tracing::warn!(
            "{} timestamps missing from the {}-minute grid, first at {}",
            missing.len(),
            policy.period,
            missing[0]
        );
        if !policy.solve_missing {
            return Ok(table.clone());
        }

        // merge original rows and gap rows in time order
        let mut rows: Vec<(NaiveDateTime, Option<usize>)> = table
            .timestamps()
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, Some(i)))
            .chain(missing.into_iter().map(|t| (t, None)))
            .collect();
        rows.sort_by_key(|(t, _)| *t);

        let timestamps = rows.iter().map(|(t, _)| *t).collect();
        let columns = table
            .columns()
            .iter()
            .map(|c| {
                let mut values: Vec<f64> = rows
                    .iter()
                    .map(|(_, src)| src.map_or(f64::NAN, |i| c.values[i]))
                    .collect();
                stats::interpolate_linear(&mut values);
                Column::new(c.name.clone(), values)
            })
            .collect();
        Table::new(timestamps, columns)
    }

    fn handle_outliers(&mut self, policy: &Snapshot, table: &Table) -> Table {
        let mut data = table.clone();
        let names: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();

        for name in &names {
            if let Some(threshold) = policy.outlier_threshold {
                let Some(values) = data.column(name).map(|c| c.values.clone()) else {
                    continue;
                };
                let mean = stats::mean(&values);
                let sd = stats::std_dev(&values);
                let flagged: Vec<bool> = values
                    .iter()
                    .map(|x| (x - mean).abs() > threshold * sd)
                    .collect();
                let count = flagged.iter().filter(|f| **f).count();

                if count > 0 {
                    tracing::warn!("{} outliers detected in column {}", count, name);
                    self.outliers.insert(name.clone(), json!(count));
                    if policy.delete_outliers {
                        data = data.filter_rows(|row| !flagged[row]);
                    } else if policy.interpolate_outliers {
                        data = data.map_columns(|c| {
                            if &c.name == name {
                                c.values
                                    .iter()
                                    .zip(&flagged)
                                    .map(|(x, f)| if *f { f64::NAN } else { *x })
                                    .collect()
                            } else {
                                c.values.clone()
                            }
                        });
                    }
                }
            }

            if policy.delete_nan {
                data = data.filter_rows(|row| !data.row_has_nan(row));
            } else if policy.interpolate_nan {
                data = data.map_columns(|c| {
                    let mut values = c.values.clone();
                    stats::interpolate_linear(&mut values);
                    values
                });
            }
        }

        self.rows_removed = table.height() - data.height();
        data
    }
}

impl Plugin for Cleaner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configure(&mut self, config: &ConfigDocument) -> Result<()> {
        let params: CleanerParams = configure_params(NAME, config)?;
        Self::check_method(&params.method)?;
        self.params = params;
        Ok(())
    }

    fn process(&mut self, table: &Table) -> Result<Table> {
        let policy = match load_snapshot::<Snapshot>(self.params.load_params.as_deref())? {
            Some(loaded) => {
                Self::check_method(&loaded.method)?;
                loaded
            }
            None => {
                let policy = Snapshot::from(&self.params);
                save_snapshot(self.params.save_params.as_deref(), &policy)?;
                policy
            }
        };

        self.missing_timestamps = 0;
        self.outliers.clear();
        self.rows_removed = 0;

        let output = match policy.method.as_str() {
            "outlier" => self.handle_outliers(&policy, table),
            _ => self.handle_missing(&policy, table)?,
        };
        tracing::info!("Cleaning complete: {} rows in, {} rows out", table.height(), output.height());
        Ok(output)
    }

    fn debug_info(&self) -> DebugRecord {
        let mut record = DebugRecord::new();
        record.insert("method".into(), json!(self.params.method));
        record.insert("period".into(), json!(self.params.period));
        record.insert("outlier_threshold".into(), json!(self.params.outlier_threshold));
        record.insert("missing_timestamps".into(), json!(self.missing_timestamps));
        record.insert("outliers".into(), Value::Object(self.outliers.clone()));
        record.insert("rows_removed".into(), json!(self.rows_removed));
        record
    }
}
