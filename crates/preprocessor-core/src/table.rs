//! In-memory time-indexed table and CSV I/O
//!
//! The first CSV column is always the temporal key, stored separately from
//! the numeric columns. Cells that do not parse as numbers become NaN.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::path::Path;

use crate::error::{Error, Result};

/// Name of the temporal key column
pub const TEMPORAL_KEY: &str = "DATE_TIME";

/// Column that must be present in every input table
pub const REQUIRED_COLUMN: &str = "CLOSE";

const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"];

/// A named numeric column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Header name
    pub name: String,
    /// One value per row, NaN for missing
    pub values: Vec<f64>,
}

impl Column {
    /// Create a column
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Rows indexed by timestamp, with numeric columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking that every column has one value per row
    pub fn new(timestamps: Vec<NaiveDateTime>, columns: Vec<Column>) -> Result<Self> {
        if let Some(bad) = columns.iter().find(|c| c.values.len() != timestamps.len()) {
            return Err(Error::schema(
                &bad.name,
                format!("has {} values for {} rows", bad.values.len(), timestamps.len()),
            ));
        }
        Ok(Self {
            timestamps,
            columns,
        })
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.timestamps.len()
    }

    /// Number of numeric columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Row timestamps
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Numeric columns in file order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in file order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column that must exist
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::schema(name, "required column is missing"))
    }

    /// Append a column
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if column.values.len() != self.height() {
            return Err(Error::schema(
                &column.name,
                format!("has {} values for {} rows", column.values.len(), self.height()),
            ));
        }
        self.columns.push(column);
        Ok(())
    }

    /// New table with every column transformed, timestamps unchanged
    pub fn map_columns<F>(&self, mut f: F) -> Table
    where
        F: FnMut(&Column) -> Vec<f64>,
    {
        Table {
            timestamps: self.timestamps.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), f(c)))
                .collect(),
        }
    }

    /// New table with the given columns, in the given order
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|name| self.require(name.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Table {
            timestamps: self.timestamps.clone(),
            columns,
        })
    }

    /// New table with the rows for which `keep(row)` is true
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.height()).filter(|&row| keep(row)).collect();
        self.take_rows(&rows)
    }

    /// New table made of the given row positions
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            timestamps: rows.iter().map(|&r| self.timestamps[r]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), rows.iter().map(|&r| c.values[r]).collect()))
                .collect(),
        }
    }

    /// Contiguous row range
    pub fn slice_rows(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.height());
        let start = start.min(end);
        let rows: Vec<usize> = (start..end).collect();
        self.take_rows(&rows)
    }

    /// Whether any column is NaN at `row`
    pub fn row_has_nan(&self, row: usize) -> bool {
        self.columns.iter().any(|c| c.values[row].is_nan())
    }
}

/// Parse a timestamp cell using ISO-like and day-first layouts
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_cell(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(f64::NAN)
}

/// Load a headered CSV whose first column is the temporal key
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(Error::schema(TEMPORAL_KEY, format!("'{}' has no header", path.display())));
    }

    let mut timestamps = Vec::new();
    let mut columns: Vec<Column> = headers
        .iter()
        .skip(1)
        .map(|name| Column::new(name.trim(), Vec::new()))
        .collect();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let raw = record.get(0).unwrap_or_default();
        let timestamp = parse_timestamp(raw).ok_or_else(|| {
            Error::schema(
                TEMPORAL_KEY,
                format!("row {}: cannot parse timestamp '{}'", row + 1, raw),
            )
        })?;
        timestamps.push(timestamp);
        for (idx, column) in columns.iter_mut().enumerate() {
            column.values.push(record.get(idx + 1).map_or(f64::NAN, parse_cell));
        }
    }

    let close = columns
        .iter_mut()
        .find(|c| c.name == REQUIRED_COLUMN)
        .ok_or_else(|| Error::schema(REQUIRED_COLUMN, "required column is missing"))?;
    if close.values.iter().any(|v| v.is_nan()) {
        tracing::warn!("{} contains missing values, filling forward then backward", REQUIRED_COLUMN);
        crate::stats::fill_forward_backward(&mut close.values);
    }

    tracing::info!(
        "Loaded {} rows x {} columns from {}",
        timestamps.len(),
        columns.len(),
        path.display()
    );
    Table::new(timestamps, columns)
}

/// Write a table as CSV; missing values are written as empty cells
pub fn write_table<P: AsRef<Path>>(
    path: P,
    table: &Table,
    include_temporal_key: bool,
    include_header: bool,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;

    if include_header {
        let mut header: Vec<&str> = Vec::with_capacity(table.width() + 1);
        if include_temporal_key {
            header.push(TEMPORAL_KEY);
        }
        header.extend(table.column_names());
        writer.write_record(&header)?;
    }

    for row in 0..table.height() {
        let mut record: Vec<String> = Vec::with_capacity(table.width() + 1);
        if include_temporal_key {
            record.push(table.timestamps[row].format(OUTPUT_DATE_FORMAT).to_string());
        }
        record.extend(table.columns.iter().map(|c| format_cell(c.values[row])));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    tracing::debug!("Wrote {} rows to {}", table.height(), path.display());
    Ok(())
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
