//! One-call pipeline: derive → reshape → filter → select → build.
//!
//! [`run`] is a pure function of a loaded table and a [`PipelineConfig`].
//! [`Session`] adds the memoized load in front of it, so re-running with the
//! same upload and new parameters skips parsing.

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    chart::{self, ChartBindings, ChartSpec, LayoutOptions},
    error::{NoXColumnSnafu, TableResult},
    loader::{LoadOptions, TableCache},
    range::{TimeRange, filter_range},
    reshape::Reshape,
    series::{self, MetricColumns, SeriesRequest},
    table::Table,
    timestamp::{DeriveTimestamp, derive_timestamp},
};

/// Range filter bounds. Missing bounds are taken from the data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeBounds {
    /// Temporal column to filter on; defaults to the derived timestamp
    /// column, then to the chart x column.
    pub column: Option<String>,
    /// Inclusive lower bound.
    pub start: Option<NaiveDateTime>,
    /// Inclusive upper bound.
    pub end: Option<NaiveDateTime>,
}

/// Every parameter of a pipeline run. All sections are optional in JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How to parse the uploaded bytes.
    pub load: LoadOptions,
    /// Timestamp column to derive.
    pub timestamp: Option<DeriveTimestamp>,
    /// Pivot or melt step.
    pub reshape: Option<Reshape>,
    /// Time range filter.
    pub range: Option<RangeBounds>,
    /// Which columns are metrics.
    pub metrics: MetricColumns,
    /// Which metrics to chart.
    pub series: SeriesRequest,
    /// Chart bindings; `x` defaults to the derived timestamp column.
    pub chart: ChartBindings,
    /// Layout options.
    pub layout: LayoutOptions,
}

impl PipelineConfig {
    /// Column the timestamp step appends, if any.
    pub fn derived_column(&self) -> Option<&str> {
        self.timestamp.as_ref().map(|ts| ts.output.as_str())
    }

    /// Effective x column.
    pub fn x_column(&self) -> Option<&str> {
        self.chart.x.as_deref().or_else(|| self.derived_column())
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Table after derive, reshape and filter.
    pub table: Table,
    /// Resolved series, in chart order.
    pub series: Vec<String>,
    /// Chart specs.
    pub charts: Vec<ChartSpec>,
}

impl PipelineOutput {
    /// Columns the charts read, in first-reference order.
    pub fn chart_frame(&self) -> TableResult<Table> {
        chart::chart_frame(&self.table, &self.charts)
    }
}

/// Run every configured step on `table`.
pub fn run(table: &Table, config: &PipelineConfig) -> TableResult<PipelineOutput> {
    let mut table = match &config.timestamp {
        Some(spec) => derive_timestamp(table, spec)?,
        None => table.clone(),
    };

    if let Some(step) = &config.reshape {
        table = step.apply(&table)?;
    }

    let x = config.x_column().map(str::to_string);

    if let Some(bounds) = &config.range {
        let column = bounds
            .column
            .as_deref()
            .or_else(|| config.derived_column())
            .or(x.as_deref())
            .context(NoXColumnSnafu)?;
        table = apply_bounds(&table, column, bounds)?;
    }

    // Timestamp sources and columns bound to chart roles are never metrics.
    let sources = config
        .timestamp
        .as_ref()
        .map(|ts| ts.source.columns())
        .unwrap_or_default();
    let bound: Vec<&str> = x
        .iter()
        .chain(sources.iter())
        .map(String::as_str)
        .chain(config.chart.color.as_deref())
        .chain(config.chart.facet.as_ref().map(|f| f.column.as_str()))
        .collect();
    let available: Vec<String> = series::metric_columns(&table, &config.metrics)?
        .into_iter()
        .filter(|name| !bound.contains(&name.as_str()))
        .collect();
    let series = series::resolve(available.as_slice(), &config.series)?;

    let bindings = ChartBindings {
        x,
        ..config.chart.clone()
    };
    let charts = chart::build(&table, series.as_slice(), &bindings, &config.layout)?;

    debug!(
        "pipeline produced {} chart(s) over {} rows x {} columns",
        charts.len(),
        table.num_rows(),
        table.num_columns()
    );
    Ok(PipelineOutput {
        table,
        series,
        charts,
    })
}

/// Fill missing bounds from the observed range and filter.
///
/// A missing bound never excludes data: an open end is widened to cover a
/// caller-supplied start beyond the observed maximum (and vice versa), which
/// yields an empty result rather than an inverted range. A column without
/// any timestamp values is left unfiltered unless both bounds are given.
fn apply_bounds(table: &Table, column: &str, bounds: &RangeBounds) -> TableResult<Table> {
    let observed = TimeRange::observed(table, column)?;

    let (start, end) = match (bounds.start, bounds.end, observed) {
        (Some(start), Some(end), _) => (start, end),
        (start, end, Some(observed)) => {
            let start = start.unwrap_or_else(|| observed.start().min(end.unwrap_or(observed.start())));
            let end = end.unwrap_or_else(|| observed.end().max(start));
            (start, end)
        }
        (_, _, None) => {
            debug!("range filter on {column} skipped: no timestamps observed");
            return Ok(table.clone());
        }
    };

    let range = TimeRange::new(start, end)?;
    filter_range(table, column, &range)
}

/// A single user's session: a load cache plus the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Session {
    cache: TableCache,
}

impl Session {
    /// Start a session with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `bytes` (memoized) and run the pipeline.
    pub fn run(&mut self, bytes: &[u8], config: &PipelineConfig) -> TableResult<PipelineOutput> {
        let table = self.cache.load(bytes, &config.load)?;
        info!(
            "running pipeline on {} rows x {} columns",
            table.num_rows(),
            table.num_columns()
        );
        run(&table, config)
    }

    /// The session's load cache.
    pub fn cache(&self) -> &TableCache {
        &self.cache
    }
}
