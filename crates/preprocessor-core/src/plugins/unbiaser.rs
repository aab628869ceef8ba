//! Removes a moving-average bias from every numeric column

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{DebugRecord, Plugin, configure_params};
use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::stats;
use crate::table::Table;

const NAME: &str = "unbiaser";

/// Declared parameters of the unbiaser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbiaserParams {
    pub method: String,
    pub window_size: usize,
    pub ema_alpha: f64,
}

impl Default for UnbiaserParams {
    fn default() -> Self {
        Self {
            method: "ma".to_string(),
            window_size: 5,
            ema_alpha: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Method {
    #[default]
    MovingAverage,
    Exponential,
}

/// De-biasing strategy
#[derive(Debug, Default)]
pub struct Unbiaser {
    params: UnbiaserParams,
    method: Method,
}

impl Plugin for Unbiaser {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configure(&mut self, config: &ConfigDocument) -> Result<()> {
        let params: UnbiaserParams = configure_params(NAME, config)?;
        self.method = match params.method.as_str() {
            "ma" => Method::MovingAverage,
            "ema" => Method::Exponential,
            other => {
                return Err(Error::UnknownMethod {
                    plugin: NAME.to_string(),
                    method: other.to_string(),
                });
            }
        };
        if params.window_size == 0 {
            return Err(Error::invalid_param(NAME, "window_size must be at least 1"));
        }
        if !(params.ema_alpha > 0.0 && params.ema_alpha <= 1.0) {
            return Err(Error::invalid_param(NAME, "ema_alpha must be in (0, 1]"));
        }
        self.params = params;
        Ok(())
    }

    fn process(&mut self, table: &Table) -> Result<Table> {
        tracing::info!(
            "Unbiasing {} columns with {}",
            table.width(),
            self.params.method
        );
        Ok(table.map_columns(|column| {
            let baseline = match self.method {
                Method::MovingAverage => stats::rolling_mean(&column.values, self.params.window_size),
                Method::Exponential => stats::ewma(&column.values, self.params.ema_alpha),
            };
            column.values.iter().zip(baseline).map(|(x, b)| x - b).collect()
        }))
    }

    fn debug_info(&self) -> DebugRecord {
        let mut record = DebugRecord::new();
        record.insert("method".into(), json!(self.params.method));
        record.insert("window_size".into(), json!(self.params.window_size));
        record.insert("ema_alpha".into(), json!(self.params.ema_alpha));
        record
    }
}
