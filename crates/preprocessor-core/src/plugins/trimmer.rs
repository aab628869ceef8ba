//! Drops columns and rows by position
//!
//! Column positions follow the file layout, so position 0 is the temporal
//! key and cannot be removed. Row positions count data rows from 0.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

use super::{DebugRecord, Plugin, Positions, configure_params, load_snapshot, save_snapshot};
use crate::config::ConfigDocument;
use crate::error::{Error, Result};
use crate::table::{TEMPORAL_KEY, Table};

const NAME: &str = "trimmer";

/// Declared parameters of the trimmer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrimmerParams {
    pub columns: Option<Positions>,
    pub rows: Option<Positions>,
    pub save_params: Option<String>,
    pub load_params: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    columns: Option<Positions>,
    rows: Option<Positions>,
}

/// Column and row trimming strategy
#[derive(Debug, Default)]
pub struct Trimmer {
    params: TrimmerParams,
    applied: Snapshot,
    removed_columns: Vec<String>,
    removed_rows: usize,
}

impl Plugin for Trimmer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn configure(&mut self, config: &ConfigDocument) -> Result<()> {
        self.params = configure_params(NAME, config)?;
        Ok(())
    }

    fn process(&mut self, table: &Table) -> Result<Table> {
        let snapshot = match load_snapshot::<Snapshot>(self.params.load_params.as_deref())? {
            Some(loaded) => loaded,
            None => {
                let snapshot = Snapshot {
                    columns: self.params.columns.clone(),
                    rows: self.params.rows.clone(),
                };
                save_snapshot(self.params.save_params.as_deref(), &snapshot)?;
                snapshot
            }
        };

        let drop_columns: BTreeSet<usize> = snapshot
            .columns
            .iter()
            .flat_map(|p| p.0.iter().copied())
            .collect();
        if drop_columns.contains(&0) {
            return Err(Error::invalid_param(
                NAME,
                format!("column 0 is the temporal key {} and cannot be removed", TEMPORAL_KEY),
            ));
        }
        if let Some(&bad) = drop_columns.iter().find(|&&p| p > table.width()) {
            return Err(Error::invalid_param(
                NAME,
                format!("column position {} is out of range (table has {})", bad, table.width() + 1),
            ));
        }

        let drop_rows: BTreeSet<usize> = snapshot
            .rows
            .iter()
            .flat_map(|p| p.0.iter().copied())
            .collect();
        if let Some(&bad) = drop_rows.iter().find(|&&r| r >= table.height()) {
            return Err(Error::invalid_param(
                NAME,
                format!("row position {} is out of range (table has {})", bad, table.height()),
            ));
        }

        let names = table.column_names();
        let kept: Vec<&str> = names
            .iter()
            .enumerate()
            .filter(|(idx, _)| !drop_columns.contains(&(idx + 1)))
            .map(|(_, name)| *name)
            .collect();
        self.removed_columns = names
            .iter()
            .enumerate()
            .filter(|(idx, _)| drop_columns.contains(&(idx + 1)))
            .map(|(_, name)| name.to_string())
            .collect();
        self.removed_rows = drop_rows.len();

        let output = table
            .select_columns(&kept)?
            .filter_rows(|row| !drop_rows.contains(&row));
        tracing::info!(
            "Trimmed {} columns and {} rows",
            self.removed_columns.len(),
            self.removed_rows
        );
        self.applied = snapshot;
        Ok(output)
    }

    fn debug_info(&self) -> DebugRecord {
        let mut record = DebugRecord::new();
        record.insert("columns".into(), json!(self.applied.columns));
        record.insert("rows".into(), json!(self.applied.rows));
        record.insert("removed_columns".into(), json!(self.removed_columns));
        record.insert("removed_row_count".into(), json!(self.removed_rows));
        record
    }
}
