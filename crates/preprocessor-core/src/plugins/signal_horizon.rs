//! Training-signal generation from a single target column
//!
//! Output columns, in order:
//! - `<target>_t+1 ..= <target>_t+time_horizon`: future values of the target
//! - `daily_{HIGH,LOW,CLOSE,OPEN}_D1 ..= _D<daily_horizon>`: per-calendar-day
//!   aggregates of the target, taken from the following days
//! - `std_dev_<std_dev_horizon>`, `std_dev_<long_std_dev_horizon>`: trailing
//!   sample standard deviation of the target
//!
//! Rows with any missing value are dropped.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use super::{DebugRecord, Plugin, configure_params};
use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::stats;
use crate::table::{Column, Table};

const NAME: &str = "signal_horizon";

const DAILY_AGGREGATES: [&str; 4] = ["HIGH", "LOW", "CLOSE", "OPEN"];

/// Declared parameters of the signal generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalHorizonParams {
    pub target_column: String,
    pub time_horizon: usize,
    pub daily_horizon: usize,
    pub std_dev_horizon: usize,
    pub long_std_dev_horizon: usize,
}

impl Default for SignalHorizonParams {
    fn default() -> Self {
        Self {
            target_column: "CLOSE".to_string(),
            time_horizon: 6,
            daily_horizon: 6,
            std_dev_horizon: 12,
            long_std_dev_horizon: 288,
        }
    }
}

/// HIGH, LOW, CLOSE, OPEN of one day
type DailyBar = [f64; 4];

fn daily_bars(table: &Table, target: &[f64]) -> BTreeMap<NaiveDate, DailyBar> {
    let mut bars: BTreeMap<NaiveDate, DailyBar> = BTreeMap::new();
    for (timestamp, &value) in table.timestamps().iter().zip(target) {
        if value.is_nan() {
            continue;
        }
        bars.entry(timestamp.date())
            .and_modify(|[high, low, close, _]| {
                *high = high.max(value);
                *low = low.min(value);
                *close = value;
            })
            .or_insert([value, value, value, value]);
    }
    bars
}

/// Signal-generation strategy
#[derive(Debug, Default)]
pub struct SignalHorizon {
    params: SignalHorizonParams,
    rows_before: usize,
    rows_after: usize,
}

impl Plugin for SignalHorizon {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configure(&mut self, config: &ConfigDocument) -> Result<()> {
        let params: SignalHorizonParams = configure_params(NAME, config)?;
        if params.std_dev_horizon == params.long_std_dev_horizon {
            return Err(Error::invalid_param(
                NAME,
                "std_dev_horizon and long_std_dev_horizon must differ",
            ));
        }
        if params.std_dev_horizon == 0 || params.long_std_dev_horizon == 0 {
            return Err(Error::invalid_param(NAME, "standard deviation windows must be positive"));
        }
        self.params = params;
        Ok(())
    }

    fn process(&mut self, table: &Table) -> Result<Table> {
        let p = &self.params;
        let target = &table.require(&p.target_column)?.values;
        let rows = table.height();
        let mut output = Table::new(table.timestamps().to_vec(), Vec::new())?;

        for i in 1..=p.time_horizon {
            let shifted = (0..rows)
                .map(|r| target.get(r + i).copied().unwrap_or(f64::NAN))
                .collect();
            output.push_column(Column::new(format!("{}_t+{}", p.target_column, i), shifted))?;
        }

        let bars = daily_bars(table, target);
        let days: Vec<NaiveDate> = bars.keys().copied().collect();
        let day_index: BTreeMap<NaiveDate, usize> =
            days.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        for (slot, aggregate) in DAILY_AGGREGATES.iter().enumerate() {
            for i in 1..=p.daily_horizon {
                let shifted = table
                    .timestamps()
                    .iter()
                    .map(|t| {
                        day_index
                            .get(&t.date())
                            .and_then(|&d| days.get(d + i))
                            .map_or(f64::NAN, |day| bars[day][slot])
                    })
                    .collect();
                output.push_column(Column::new(format!("daily_{}_D{}", aggregate, i), shifted))?;
            }
        }

        for window in [p.std_dev_horizon, p.long_std_dev_horizon] {
            output.push_column(Column::new(
                format!("std_dev_{}", window),
                stats::rolling_std(target, window),
            ))?;
        }

        let output = output.filter_rows(|row| !target[row].is_nan() && !output.row_has_nan(row));
        self.rows_before = rows;
        self.rows_after = output.height();
        tracing::info!(
            "Generated {} signal columns, kept {} of {} rows",
            output.width(),
            self.rows_after,
            self.rows_before
        );
        Ok(output)
    }

    fn debug_info(&self) -> DebugRecord {
        let mut record = DebugRecord::new();
        record.insert("target_column".into(), json!(self.params.target_column));
        record.insert("time_horizon".into(), json!(self.params.time_horizon));
        record.insert("daily_horizon".into(), json!(self.params.daily_horizon));
        record.insert("std_dev_horizon".into(), json!(self.params.std_dev_horizon));
        record.insert("long_std_dev_horizon".into(), json!(self.params.long_std_dev_horizon));
        record.insert("rows_before_dropna".into(), json!(self.rows_before));
        record.insert("rows_after_dropna".into(), json!(self.rows_after));
        record
    }
}
