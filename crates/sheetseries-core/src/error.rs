//! Error types and SNAFU context selectors for the pipeline.
//!
//! Every pipeline stage reports failures through [`TableError`]. Variants
//! carry the failing column, row or value so the surrounding application
//! can show an actionable message and let the user retry with corrected
//! input. Context selectors are `pub(crate)` so sibling modules can attach
//! context without re-exporting them at the crate root.

use arrow::{datatypes::DataType, error::ArrowError};
use chrono::NaiveDateTime;
use snafu::prelude::*;

/// Convenience alias used across the crate.
pub type TableResult<T> = Result<T, TableError>;

/// Errors from loading, transforming and charting a table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// The byte stream is not a well-formed spreadsheet or CSV file.
    #[snafu(display("Unreadable file: {reason}"))]
    UnreadableFile {
        /// Parser-provided reason.
        reason: String,
    },

    /// A sheet was requested by name but the workbook does not contain it.
    #[snafu(display("Sheet {sheet:?} not found (available: {})", available.join(", ")))]
    SheetNotFound {
        /// Requested sheet name.
        sheet: String,
        /// Sheets present in the workbook.
        available: Vec<String>,
    },

    /// One or more referenced columns are absent from the table.
    #[snafu(display("Missing column(s): {}", columns.join(", ")))]
    MissingColumn {
        /// Every missing name of the request, in request order.
        columns: Vec<String>,
    },

    /// A column name would appear twice in the resulting table.
    #[snafu(display("Column {column} already exists"))]
    DuplicateColumn {
        /// The duplicated name.
        column: String,
    },

    /// An Arrow column type that has no table column kind.
    #[snafu(display("Unsupported type for column {column}: {datatype}"))]
    UnsupportedColumnType {
        /// Name of the offending column.
        column: String,
        /// Arrow type encountered.
        datatype: DataType,
    },

    /// A date or timestamp column was required.
    #[snafu(display("Column {column} is {datatype}, expected a date or timestamp column"))]
    NotTemporal {
        /// Name of the offending column.
        column: String,
        /// Arrow type encountered.
        datatype: DataType,
    },

    /// A row could not be parsed into a timestamp.
    #[snafu(display(
        "Cannot parse timestamp in column {column} at row {row}: {value:?}{}",
        format.as_ref().map(|f| format!(" (format {f:?})")).unwrap_or_default()
    ))]
    TimestampParse {
        /// Source column(s) the value was built from.
        column: String,
        /// Zero-based row index.
        row: usize,
        /// The text that failed to parse (empty for null cells).
        value: String,
        /// Format in effect, if one was supplied or inferred.
        format: Option<String>,
    },

    /// More than one source row maps to the same pivot cell.
    #[snafu(display(
        "Ambiguous pivot: index {index:?} / {pivot:?} appears in rows {first_row} and {second_row}"
    ))]
    AmbiguousPivot {
        /// Display form of the index value.
        index: String,
        /// Display form of the pivot value.
        pivot: String,
        /// First source row that filled the cell.
        first_row: usize,
        /// Conflicting source row.
        second_row: usize,
    },

    /// A pivot index or pivot key cell is null.
    #[snafu(display("Null key in pivot column {column} at row {row}"))]
    NullPivotKey {
        /// Key column containing the null.
        column: String,
        /// Zero-based row index.
        row: usize,
    },

    /// Series resolution produced nothing to chart.
    #[snafu(display("No series selected; choose at least one metric column"))]
    NoSeriesSelected,

    /// Explicitly requested series are not metric columns of the table.
    #[snafu(display("Unknown series: {}", names.join(", ")))]
    UnknownSeries {
        /// Requested names that could not be resolved.
        names: Vec<String>,
    },

    /// A row index outside the table.
    #[snafu(display("Row index {index} out of range for table with {len} rows"))]
    IndexOutOfRange {
        /// Requested row index.
        index: usize,
        /// Number of rows available.
        len: usize,
    },

    /// Range bounds must satisfy start <= end.
    #[snafu(display("Invalid time range: start={start}, end={end} (expect start <= end)"))]
    InvalidRange {
        /// Inclusive lower bound supplied by the caller.
        start: NaiveDateTime,
        /// Inclusive upper bound supplied by the caller.
        end: NaiveDateTime,
    },

    /// No x column was bound and no timestamp column was derived.
    #[snafu(display("No x column: bind one explicitly or derive a timestamp column"))]
    NoXColumn,

    /// Arrow compute or conversion error.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}
