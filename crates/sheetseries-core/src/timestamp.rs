//! Derive a timestamp column from date/time columns.
//!
//! Two sources are supported:
//! - `Split`: a date column and a time column, joined with a single space
//!   before parsing (`"2024-01-01" + "09:00:00"` -> `"2024-01-01 09:00:00"`).
//! - `Combined`: one column that already holds both parts.
//!
//! Parsing uses the caller's chrono format when given. Otherwise the first
//! entry of [`INFERRED_FORMATS`] that parses row 0 is applied to every row,
//! so a column is never parsed with a mix of formats. Any row that fails is
//! reported with its index and text; rows are never dropped.

use std::sync::Arc;

use arrow::{
    array::{ArrayRef, TimestampMicrosecondArray},
    compute::cast,
};
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{ArrowSnafu, TableError, TableResult},
    table::{CellValue, TIMESTAMP_TYPE, Table},
};

/// Name of the derived column unless the caller picks another.
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "DateTime";

/// Candidate formats tried, in order, when no format is supplied.
pub const INFERRED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d",
    "%d/%m/%Y",
];

/// Where the timestamp text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimestampSource {
    /// Separate date and time columns.
    Split {
        /// Date column.
        date: String,
        /// Time-of-day column.
        time: String,
    },
    /// A single pre-combined column.
    Combined {
        /// Column holding date and time.
        column: String,
    },
}

impl TimestampSource {
    pub(crate) fn columns(&self) -> Vec<String> {
        match self {
            TimestampSource::Split { date, time } if date == time => vec![date.clone()],
            TimestampSource::Split { date, time } => vec![date.clone(), time.clone()],
            TimestampSource::Combined { column } => vec![column.clone()],
        }
    }

    fn label(&self) -> String {
        self.columns().join(" + ")
    }
}

fn default_output() -> String {
    DEFAULT_TIMESTAMP_COLUMN.to_string()
}

/// Request to append a derived timestamp column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeriveTimestamp {
    /// Source column(s).
    pub source: TimestampSource,
    /// Name of the appended column.
    #[serde(default = "default_output")]
    pub output: String,
    /// chrono format string; inferred when unset.
    #[serde(default)]
    pub format: Option<String>,
    /// Remove the source column(s) from the result.
    #[serde(default)]
    pub drop_sources: bool,
}

impl DeriveTimestamp {
    /// Combine a date column and a time column.
    pub fn split(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self::from_source(TimestampSource::Split {
            date: date.into(),
            time: time.into(),
        })
    }

    /// Parse a single pre-combined column.
    pub fn combined(column: impl Into<String>) -> Self {
        Self::from_source(TimestampSource::Combined {
            column: column.into(),
        })
    }

    fn from_source(source: TimestampSource) -> Self {
        Self {
            source,
            output: default_output(),
            format: None,
            drop_sources: false,
        }
    }

    /// Parse with an explicit chrono format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Name the derived column.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Remove the source columns from the result.
    pub fn dropping_sources(mut self) -> Self {
        self.drop_sources = true;
        self
    }
}

/// Append the derived timestamp column described by `spec`.
pub fn derive_timestamp(table: &Table, spec: &DeriveTimestamp) -> TableResult<Table> {
    let sources = spec.source.columns();
    table.require_columns(sources.as_slice())?;

    let derived: ArrayRef = match &spec.source {
        TimestampSource::Combined { column }
            if spec.format.is_none() && table.column_kind(column)?.is_temporal() =>
        {
            cast(table.column(column)?.as_ref(), &TIMESTAMP_TYPE).context(ArrowSnafu)?
        }
        source => Arc::new(parse_rows(table, source, spec.format.as_deref())?),
    };

    let base = if spec.drop_sources {
        table.drop_columns(sources.as_slice())?
    } else {
        table.clone()
    };

    debug!(
        "derived {} from {} over {} rows",
        spec.output,
        spec.source.label(),
        table.num_rows()
    );
    base.with_column(spec.output.clone(), derived)
}

/// Text of one row of the source, `None` when any part is null.
fn row_text(table: &Table, source: &TimestampSource, row: usize) -> TableResult<Option<String>> {
    let text = |name: &str| -> TableResult<Option<String>> {
        let value = table.value(name, row)?;
        Ok(match value {
            CellValue::Null => None,
            other => Some(other.to_string()),
        })
    };

    Ok(match source {
        TimestampSource::Split { date, time } if date != time => {
            match (text(date)?, text(time)?) {
                (Some(d), Some(t)) => Some(format!("{} {}", d.trim(), t.trim())),
                _ => None,
            }
        }
        TimestampSource::Split { date: column, .. } | TimestampSource::Combined { column } => {
            text(column)?
        }
    })
}

fn parse_rows(
    table: &Table,
    source: &TimestampSource,
    format: Option<&str>,
) -> TableResult<TimestampMicrosecondArray> {
    let parse_error = |row: usize, value: Option<String>, format: Option<&str>| {
        TableError::TimestampParse {
            column: source.label(),
            row,
            value: value.unwrap_or_default(),
            format: format.map(str::to_string),
        }
    };

    let texts = (0..table.num_rows())
        .map(|row| row_text(table, source, row))
        .collect::<TableResult<Vec<_>>>()?;

    let format = match format {
        Some(f) => f.to_string(),
        None => match texts.first() {
            None => return Ok(TimestampMicrosecondArray::from(Vec::<i64>::new())),
            Some(first) => first
                .as_deref()
                .and_then(infer_format)
                .ok_or_else(|| parse_error(0, first.clone(), None))?
                .to_string(),
        },
    };

    let mut micros = Vec::with_capacity(texts.len());
    for (row, text) in texts.into_iter().enumerate() {
        let parsed = text.as_deref().and_then(|t| parse_with_format(t, &format));
        match parsed {
            Some(ts) => micros.push(ts.and_utc().timestamp_micros()),
            None => return Err(parse_error(row, text, Some(format.as_str()))),
        }
    }

    Ok(TimestampMicrosecondArray::from(micros))
}

/// First candidate format that parses `text`.
pub fn infer_format(text: &str) -> Option<&'static str> {
    INFERRED_FORMATS
        .iter()
        .copied()
        .find(|f| parse_with_format(text, f).is_some())
}

/// Parse with `format`; date-only formats yield midnight.
pub fn parse_with_format(text: &str, format: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
