use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray};
use chrono::{NaiveDate, NaiveDateTime};

use crate::{error::TableResult, table::Table};

pub(crate) type TestResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) fn naive(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, mi, s))
        .expect("valid test datetime")
}

pub(crate) fn text_column(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub(crate) fn number_column(values: &[f64]) -> ArrayRef {
    Arc::new(Float64Array::from(values.to_vec()))
}

pub(crate) fn timestamp_column(values: &[NaiveDateTime]) -> ArrayRef {
    let micros: Vec<i64> = values
        .iter()
        .map(|ts| ts.and_utc().timestamp_micros())
        .collect();
    Arc::new(TimestampMicrosecondArray::from(micros))
}

pub(crate) fn text_table(columns: &[(&str, &[&str])]) -> TableResult<Table> {
    let num_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
    Table::try_new(
        columns
            .iter()
            .map(|(name, values)| (name.to_string(), text_column(values)))
            .collect(),
        num_rows,
    )
}

/// `DateTime` (hourly from 2024-01-01 09:00), `items = "X"`, `M = 1..=n`.
pub(crate) fn hourly_table(n: usize) -> TableResult<Table> {
    let stamps: Vec<NaiveDateTime> = (0..n)
        .map(|i| naive(2024, 1, 1, 9 + i as u32, 0, 0))
        .collect();
    let items = vec!["X"; n];
    let metric: Vec<f64> = (1..=n).map(|v| v as f64).collect();

    Table::try_new(
        vec![
            ("DateTime".to_string(), timestamp_column(&stamps)),
            ("items".to_string(), text_column(&items)),
            ("M".to_string(), number_column(&metric)),
        ],
        n,
    )
}
