//! Inclusive time-range filtering.
//!
//! Rows are kept iff `start <= ts <= end`. The filter is vectorized: the
//! bounds are wrapped as one-element `Scalar` timestamp arrays, which Arrow's
//! comparison kernels broadcast across the column without allocating
//! full-length bound arrays. The resulting mask goes to
//! `filter_record_batch`, which treats null mask entries (null timestamps)
//! as "drop row".
//!
//! Date columns are widened to midnight timestamps before comparison.

use arrow::{
    array::{AsArray, Scalar, TimestampMicrosecondArray},
    compute::{
        cast, filter_record_batch,
        kernels::{aggregate, boolean as boolean_kernels, cmp as cmp_kernels},
    },
    datatypes::TimestampMicrosecondType,
};
use chrono::{DateTime, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{ArrowSnafu, InvalidRangeSnafu, NotTemporalSnafu, TableResult},
    table::{TIMESTAMP_TYPE, Table},
};

/// Inclusive `[start, end]` range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> TableResult<Self> {
        ensure!(start <= end, InvalidRangeSnafu { start, end });
        Ok(Self { start, end })
    }

    /// Min/max of the non-null values of a temporal column; `None` when
    /// the column has no non-null values.
    pub fn observed(table: &Table, column: &str) -> TableResult<Option<Self>> {
        let ts = timestamp_values(table, column)?;
        let ts = ts.as_primitive::<TimestampMicrosecondType>();

        let bounds = aggregate::min(ts)
            .zip(aggregate::max(ts))
            .and_then(|(min, max)| Some((from_micros(min)?, from_micros(max)?)));

        match bounds {
            Some((start, end)) => Ok(Some(Self::new(start, end)?)),
            None => Ok(None),
        }
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Inclusive upper bound.
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// True if `ts` lies within the range.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

impl<'de> Deserialize<'de> for TimeRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            start: NaiveDateTime,
            end: NaiveDateTime,
        }

        let raw = Raw::deserialize(deserializer)?;
        TimeRange::new(raw.start, raw.end).map_err(serde::de::Error::custom)
    }
}

fn from_micros(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

fn to_micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

/// Timestamp view of a temporal column.
fn timestamp_values(table: &Table, column: &str) -> TableResult<arrow::array::ArrayRef> {
    let array = table.column(column)?;
    ensure!(
        table.column_kind(column)?.is_temporal(),
        NotTemporalSnafu {
            column,
            datatype: array.data_type().clone(),
        }
    );
    cast(array.as_ref(), &TIMESTAMP_TYPE).context(ArrowSnafu)
}

/// Keep rows whose `column` value lies in `range` (both bounds inclusive).
pub fn filter_range(table: &Table, column: &str, range: &TimeRange) -> TableResult<Table> {
    let ts = timestamp_values(table, column)?;
    let ts = ts.as_primitive::<TimestampMicrosecondType>();

    let start = Scalar::new(TimestampMicrosecondArray::from(vec![to_micros(range.start)]));
    let end = Scalar::new(TimestampMicrosecondArray::from(vec![to_micros(range.end)]));

    let ge_mask = cmp_kernels::gt_eq(ts, &start).context(ArrowSnafu)?;
    let le_mask = cmp_kernels::lt_eq(ts, &end).context(ArrowSnafu)?;
    let mask = boolean_kernels::and(&ge_mask, &le_mask).context(ArrowSnafu)?;

    let filtered = filter_record_batch(table.batch(), &mask).context(ArrowSnafu)?;
    debug!(
        "filter {column} in [{}, {}]: {} -> {} rows",
        range.start,
        range.end,
        table.num_rows(),
        filtered.num_rows()
    );
    Table::from_batch(&filtered)
}
