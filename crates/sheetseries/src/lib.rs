//! # sheetseries
//!
//! Turn uploaded spreadsheets into chart-ready series and renderer-agnostic
//! chart specs.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sheetseries::prelude::*;
//!
//! let config: PipelineConfig = serde_json::from_str(r#"{
//!     "load": {"format": "csv"},
//!     "timestamp": {"source": {"kind": "split", "date": "DATE", "time": "TIME"}}
//! }"#)?;
//! let mut session = Session::new();
//! let output = session.run(&bytes, &config)?;
//! for spec in &output.charts {
//!     println!("{} -> {:?} (slot {})", spec.x, spec.y, spec.slot);
//! }
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Individual pipeline steps, for callers that drive them one by one.
pub mod steps {
    pub use sheetseries_core::chart::{build, chart_frame};
    pub use sheetseries_core::loader::load;
    pub use sheetseries_core::pipeline::run;
    pub use sheetseries_core::range::filter_range;
    pub use sheetseries_core::reshape::{melt, melt_columns, pivot};
    pub use sheetseries_core::series::{metric_columns, resolve};
    pub use sheetseries_core::timestamp::{derive_timestamp, infer_format};
}

pub use sheetseries_core::{
    CellValue, ChartBindings, ChartKind, ChartLayout, ChartSpec, ColumnKind, DeriveTimestamp,
    Facet, LayoutOptions, LoadOptions, MarkerPosition, MetricColumns, PipelineConfig,
    PipelineOutput, RangeBounds, Reshape, SeriesRequest, Session, SourceFormat, Table, TableCache,
    TableError, TableResult, TimeRange, TimestampSource,
};
