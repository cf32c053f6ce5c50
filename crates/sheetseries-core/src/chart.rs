//! Renderer-agnostic chart descriptions.
//!
//! [`build`] turns a table plus a resolved series selection into an ordered
//! list of [`ChartSpec`] records. Specs carry column names only; the data a
//! renderer needs is produced separately by [`chart_frame`].
//!
//! Layout follows a fixed pairing rule: the spec at position `i` goes into
//! slot `i % slots`, so with two slots consecutive charts alternate between a
//! left and a right column.

use std::collections::HashSet;

use arrow::{array::AsArray, compute::cast, datatypes::TimestampMicrosecondType};
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{
        ArrowSnafu, IndexOutOfRangeSnafu, NoSeriesSelectedSnafu, NoXColumnSnafu, NotTemporalSnafu,
        TableResult,
    },
    table::{CellValue, TIMESTAMP_TYPE, Table},
};

/// Default number of side-by-side layout slots.
pub const DEFAULT_SLOTS: usize = 2;
/// Default chart width in pixels.
pub const DEFAULT_WIDTH: u32 = 700;
/// Default chart height in pixels.
pub const DEFAULT_HEIGHT: u32 = 400;

/// Mark type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Connected line per series.
    #[default]
    Line,
    /// Unconnected points.
    Scatter,
}

/// Small-multiples split on a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    /// Column whose distinct values become panels.
    pub column: String,
    /// Panels per row.
    pub wrap: usize,
}

/// Column and label bindings shared by every spec of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartBindings {
    /// X column. Required by [`build`]; the pipeline fills it from the
    /// derived timestamp column when unset.
    pub x: Option<String>,
    /// Mark type.
    pub kind: ChartKind,
    /// Optional grouping column mapped to color.
    pub color: Option<String>,
    /// Optional facet split.
    pub facet: Option<Facet>,
    /// Chart title. Per-series charts fall back to the series name.
    pub title: Option<String>,
    /// X axis title; defaults to the x column name.
    pub x_title: Option<String>,
    /// Y axis title; see [`build`] for the defaults.
    pub y_title: Option<String>,
}

impl ChartBindings {
    /// Bindings with the given x column and defaults elsewhere.
    pub fn with_x(x: impl Into<String>) -> Self {
        Self {
            x: Some(x.into()),
            ..Self::default()
        }
    }
}

/// How series map to charts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartLayout {
    /// One chart per series.
    #[default]
    PerSeries,
    /// All series as lines of a single chart.
    Combined,
}

/// Where to draw the vertical marker line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPosition {
    /// X-value of this zero-based row.
    Row(usize),
    /// X-value of the row nearest to this timestamp.
    At(NaiveDateTime),
}

/// Placement, size and marker options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Per-series or combined charts.
    pub mode: ChartLayout,
    /// Number of display slots (values below 1 are treated as 1).
    pub slots: usize,
    /// Chart width in pixels.
    pub width: u32,
    /// Chart height in pixels.
    pub height: u32,
    /// Optional vertical marker.
    pub marker: Option<MarkerPosition>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            mode: ChartLayout::PerSeries,
            slots: DEFAULT_SLOTS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            marker: None,
        }
    }
}

/// One chart, ready to hand to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    /// Mark type.
    pub kind: ChartKind,
    /// Chart title.
    pub title: Option<String>,
    /// X column.
    pub x: String,
    /// Y column(s); more than one for combined charts.
    pub y: Vec<String>,
    /// Color grouping column.
    pub color: Option<String>,
    /// Facet split.
    pub facet: Option<Facet>,
    /// X axis title.
    pub x_title: String,
    /// Y axis title.
    pub y_title: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// X-value of the vertical marker line.
    pub marker: Option<CellValue>,
    /// Display slot index.
    pub slot: usize,
}

impl ChartSpec {
    /// Columns this spec reads, x first.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = vec![self.x.as_str()];
        out.extend(self.y.iter().map(String::as_str));
        out.extend(self.color.as_deref());
        out.extend(self.facet.as_ref().map(|f| f.column.as_str()));
        out
    }
}

/// Build chart specs for `series`.
///
/// Per-series layout yields one spec per series with the y title defaulting
/// to the series name. Combined layout yields one spec whose y title
/// defaults to `"value"`, or to the series name when only one is charted.
pub fn build<S: AsRef<str>>(
    table: &Table,
    series: &[S],
    bindings: &ChartBindings,
    layout: &LayoutOptions,
) -> TableResult<Vec<ChartSpec>> {
    ensure!(!series.is_empty(), NoSeriesSelectedSnafu);
    let x = bindings.x.clone().context(NoXColumnSnafu)?;
    let series: Vec<String> = series.iter().map(|s| s.as_ref().to_string()).collect();

    let mut referenced = vec![x.clone()];
    referenced.extend(series.iter().cloned());
    referenced.extend(bindings.color.iter().cloned());
    referenced.extend(bindings.facet.iter().map(|f| f.column.clone()));
    table.require_columns(referenced.as_slice())?;

    let marker = match layout.marker {
        Some(position) => Some(marker_value(table, &x, position)?),
        None => None,
    };
    let slots = layout.slots.max(1);

    let spec = |title: Option<String>, y: Vec<String>, y_title: String, position: usize| ChartSpec {
        kind: bindings.kind,
        title,
        x: x.clone(),
        y,
        color: bindings.color.clone(),
        facet: bindings.facet.clone(),
        x_title: bindings.x_title.clone().unwrap_or_else(|| x.clone()),
        y_title,
        width: layout.width,
        height: layout.height,
        marker: marker.clone(),
        slot: position % slots,
    };

    let specs = match layout.mode {
        ChartLayout::PerSeries => series
            .iter()
            .enumerate()
            .map(|(position, name)| {
                spec(
                    Some(bindings.title.clone().unwrap_or_else(|| name.clone())),
                    vec![name.clone()],
                    bindings.y_title.clone().unwrap_or_else(|| name.clone()),
                    position,
                )
            })
            .collect(),
        ChartLayout::Combined => {
            let y_title = bindings.y_title.clone().unwrap_or_else(|| match series.as_slice() {
                [only] => only.clone(),
                _ => "value".to_string(),
            });
            vec![spec(bindings.title.clone(), series.clone(), y_title, 0)]
        }
    };

    debug!(
        "built {} chart spec(s) for {} series over {} rows",
        specs.len(),
        series.len(),
        table.num_rows()
    );
    Ok(specs)
}

/// X-value for a marker position.
fn marker_value(table: &Table, x: &str, position: MarkerPosition) -> TableResult<CellValue> {
    match position {
        MarkerPosition::Row(index) => table.value(x, index),
        MarkerPosition::At(ts) => {
            let row = nearest_row(table, x, ts)?;
            table.value(x, row)
        }
    }
}

/// Row whose timestamp is closest to `target`; ties go to the earliest row.
fn nearest_row(table: &Table, column: &str, target: NaiveDateTime) -> TableResult<usize> {
    let array = table.column(column)?;
    ensure!(
        table.column_kind(column)?.is_temporal(),
        NotTemporalSnafu {
            column,
            datatype: array.data_type().clone(),
        }
    );
    let ts = cast(array.as_ref(), &TIMESTAMP_TYPE).context(ArrowSnafu)?;
    let ts = ts.as_primitive::<TimestampMicrosecondType>();
    let target = target.and_utc().timestamp_micros();

    let mut best: Option<(usize, u64)> = None;
    for (row, value) in ts.iter().enumerate() {
        let Some(value) = value else { continue };
        let distance = value.abs_diff(target);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((row, distance));
        }
    }

    best.map(|(row, _)| row).context(IndexOutOfRangeSnafu {
        index: 0usize,
        len: table.num_rows(),
    })
}

/// Project the columns referenced by `specs`, in first-reference order.
pub fn chart_frame(table: &Table, specs: &[ChartSpec]) -> TableResult<Table> {
    let mut seen = HashSet::new();
    let columns: Vec<&str> = specs
        .iter()
        .flat_map(ChartSpec::columns)
        .filter(|name| seen.insert(*name))
        .collect();
    table.project(columns.as_slice())
}
