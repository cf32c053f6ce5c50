use arrow::error::ArrowError;
use sheetseries_core::TableError;

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Input file not found or not readable: {path}"))]
    ReadInput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Config file not found or not readable: {path}"))]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Invalid pipeline config {path}: {source}"))]
    ParseConfig {
        path: String,
        source: serde_json::Error,
    },

    #[snafu(display(
        "Invalid {flag} '{value}'. \
         Use a date/time such as 2024-01-01 09:00:00 or 2024-01-01."
    ))]
    InvalidTimestampArg { flag: String, value: String },

    #[snafu(display("Failed to load {path}: {source}"))]
    LoadTable {
        path: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Pipeline failed for {path}: {source}"))]
    RunPipeline {
        path: String,
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },

    #[snafu(display("Failed to serialize chart specs: {source}"))]
    SerializeSpecs { source: serde_json::Error },

    #[snafu(display("Failed to write {path}"))]
    WriteOutput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write chart data to {path}: {source}"))]
    WriteCsv { path: String, source: ArrowError },

    #[snafu(display("Failed to write to stdout"))]
    Stdout { source: std::io::Error },
}
