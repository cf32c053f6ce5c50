//! Wrapper prelude.
//!
//! The `sheetseries` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::steps;
pub use crate::{
    CellValue, ChartBindings, ChartKind, ChartLayout, ChartSpec, ColumnKind, DeriveTimestamp,
    Facet, LayoutOptions, LoadOptions, MarkerPosition, MetricColumns, PipelineConfig,
    PipelineOutput, RangeBounds, Reshape, SeriesRequest, Session, SourceFormat, Table, TableCache,
    TableError, TableResult, TimeRange, TimestampSource,
};
