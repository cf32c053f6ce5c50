//! Core engine for turning uploaded spreadsheets into chart specifications.
//!
//! The pipeline is the same for every dashboard built on top of this crate:
//!
//! - Parse workbook or CSV bytes into an immutable Arrow-backed [`Table`]
//!   (`loader` module), optionally memoized by content hash
//!   ([`TableCache`]).
//! - Append a timestamp column built from a date and a time column, or from
//!   one pre-combined column (`timestamp` module).
//! - Reshape long/wide data with `pivot` and `melt` (`reshape` module).
//! - Keep rows inside an inclusive time range (`range` module).
//! - Resolve which metric columns to chart (`series` module).
//! - Describe charts as plain [`ChartSpec`] records for an external renderer
//!   (`chart` module).
//!
//! The `pipeline` module strings these together behind a serde-friendly
//! [`PipelineConfig`]. Every entry point is a pure function of its inputs;
//! only [`TableCache`] and [`Session`] hold state, through `&mut self`.
#![deny(missing_docs)]
pub mod chart;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod range;
pub mod reshape;
pub mod series;
pub mod table;
pub mod timestamp;

#[cfg(test)]
mod test_util;

pub use chart::{
    ChartBindings, ChartKind, ChartLayout, ChartSpec, Facet, LayoutOptions, MarkerPosition,
};
pub use error::{TableError, TableResult};
pub use loader::{LoadOptions, SourceFormat, TableCache};
pub use pipeline::{PipelineConfig, PipelineOutput, RangeBounds, Session};
pub use range::TimeRange;
pub use reshape::Reshape;
pub use series::{MetricColumns, SeriesRequest};
pub use table::{CellValue, ColumnKind, Table};
pub use timestamp::{DeriveTimestamp, TimestampSource};
