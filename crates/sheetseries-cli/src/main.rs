//! CLI tool for turning spreadsheets into chart specs.

mod error;
mod output;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use sheetseries_core::{
    ChartKind, ChartLayout, DeriveTimestamp, MarkerPosition, MetricColumns, PipelineConfig,
    RangeBounds, SeriesRequest, Session, SourceFormat, TimestampSource,
    loader::{LoadOptions, load},
    timestamp::{DEFAULT_TIMESTAMP_COLUMN, infer_format, parse_with_format},
};
use snafu::{OptionExt, ResultExt};

use crate::{
    error::{
        CliResult, InvalidTimestampArgSnafu, LoadTableSnafu, ParseConfigSnafu, ReadConfigSnafu,
        ReadInputSnafu, RunPipelineSnafu, StdoutSnafu,
    },
    output::{write_frame_csv, write_inspect, write_specs},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChartKindArg {
    Line,
    Scatter,
}

impl From<ChartKindArg> for ChartKind {
    fn from(v: ChartKindArg) -> Self {
        match v {
            ChartKindArg::Line => ChartKind::Line,
            ChartKindArg::Scatter => ChartKind::Scatter,
        }
    }
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Workbook (xlsx/xls/xlsb/ods) or CSV file
    #[arg(long)]
    file: PathBuf,

    /// Sheet name (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// Parse the file as CSV
    #[arg(long, default_value_t = false)]
    csv: bool,
}

#[derive(Debug, Args)]
struct ChartArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Pipeline config (JSON); flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long = "date-column", requires = "time_column", conflicts_with = "datetime_column")]
    date_column: Option<String>,

    #[arg(long = "time-column", requires = "date_column")]
    time_column: Option<String>,

    /// Pre-combined date-time column
    #[arg(long = "datetime-column")]
    datetime_column: Option<String>,

    /// chrono format, e.g. "%d/%m/%Y %H:%M" (inferred when omitted)
    #[arg(long = "timestamp-format")]
    timestamp_format: Option<String>,

    /// Remove the date/time source columns after deriving
    #[arg(long = "drop-sources", default_value_t = false)]
    drop_sources: bool,

    /// Inclusive range start
    #[arg(long)]
    start: Option<String>,

    /// Inclusive range end
    #[arg(long)]
    end: Option<String>,

    /// Column to range-filter on (default: derived timestamp or x)
    #[arg(long = "range-column")]
    range_column: Option<String>,

    /// Repeatable metric column names
    #[arg(long = "metric", conflicts_with = "filter")]
    metric: Vec<String>,

    /// Case-insensitive substring filter on metric names
    #[arg(long)]
    filter: Option<String>,

    /// Repeatable identifier (non-metric) column names
    #[arg(long = "id-column", conflicts_with = "metrics_from")]
    id_column: Vec<String>,

    /// Metrics are every column from this zero-based position on
    #[arg(long = "metrics-from")]
    metrics_from: Option<usize>,

    /// X column (default: derived timestamp column)
    #[arg(long)]
    x: Option<String>,

    #[arg(long)]
    color: Option<String>,

    #[arg(long, value_enum)]
    kind: Option<ChartKindArg>,

    /// One multi-line chart instead of one chart per metric
    #[arg(long, default_value_t = false)]
    combined: bool,

    #[arg(long)]
    slots: Option<usize>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    title: Option<String>,

    /// Vertical marker at this zero-based row
    #[arg(long = "marker-row", conflicts_with = "marker_at")]
    marker_row: Option<usize>,

    /// Vertical marker at the row nearest to this timestamp
    #[arg(long = "marker-at")]
    marker_at: Option<String>,

    /// Write chart specs here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the chart-ready rows as CSV
    #[arg(long = "data-out")]
    data_out: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print columns, kinds, row count and a preview
    Inspect {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Run the pipeline and emit chart specs as JSON
    Chart(ChartArgs),
}

#[derive(Debug, Parser)]
#[command(name = "sheetseries", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).context(ReadInputSnafu {
        path: path.display().to_string(),
    })
}

fn read_config(path: &Path) -> CliResult<PipelineConfig> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).context(ReadConfigSnafu {
        path: display.clone(),
    })?;
    serde_json::from_str(&text).context(ParseConfigSnafu { path: display })
}

fn parse_timestamp_arg(flag: &str, value: &str) -> CliResult<NaiveDateTime> {
    let value = value.trim();
    infer_format(value)
        .and_then(|format| parse_with_format(value, format))
        .context(InvalidTimestampArgSnafu {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}

fn apply_source(load: &mut LoadOptions, source: &SourceArgs) {
    if source.csv {
        load.format = SourceFormat::Csv;
    }
    if let Some(sheet) = &source.sheet {
        load.sheet = Some(sheet.clone());
    }
}

/// Layer explicit flags over the config file.
fn apply_overrides(config: &mut PipelineConfig, args: ChartArgs) -> CliResult<()> {
    apply_source(&mut config.load, &args.source);

    let source = match (args.date_column, args.time_column, args.datetime_column) {
        (Some(date), Some(time), _) => Some(TimestampSource::Split { date, time }),
        (_, _, Some(column)) => Some(TimestampSource::Combined { column }),
        _ => None,
    };
    if let Some(source) = source {
        config.timestamp = Some(match config.timestamp.take() {
            Some(existing) => DeriveTimestamp { source, ..existing },
            None => DeriveTimestamp {
                source,
                output: DEFAULT_TIMESTAMP_COLUMN.to_string(),
                format: None,
                drop_sources: false,
            },
        });
    }
    match &mut config.timestamp {
        Some(ts) => {
            if args.timestamp_format.is_some() {
                ts.format = args.timestamp_format;
            }
            ts.drop_sources |= args.drop_sources;
        }
        None if args.timestamp_format.is_some() || args.drop_sources => {
            warn!("--timestamp-format/--drop-sources ignored: no timestamp source given");
        }
        None => {}
    }

    let start = args
        .start
        .as_deref()
        .map(|v| parse_timestamp_arg("--start", v))
        .transpose()?;
    let end = args
        .end
        .as_deref()
        .map(|v| parse_timestamp_arg("--end", v))
        .transpose()?;
    if start.is_some() || end.is_some() || args.range_column.is_some() {
        let bounds = config.range.get_or_insert_with(RangeBounds::default);
        bounds.start = start.or(bounds.start);
        bounds.end = end.or(bounds.end);
        if args.range_column.is_some() {
            bounds.column = args.range_column;
        }
    }

    if !args.id_column.is_empty() {
        config.metrics = MetricColumns::Excluding {
            columns: args.id_column,
        };
    } else if let Some(index) = args.metrics_from {
        config.metrics = MetricColumns::FromPosition { index };
    }

    if !args.metric.is_empty() {
        config.series = SeriesRequest::Explicit(args.metric);
    } else if let Some(filter) = args.filter {
        config.series = SeriesRequest::TextFilter(filter);
    }

    let chart = &mut config.chart;
    chart.x = args.x.or(chart.x.take());
    chart.color = args.color.or(chart.color.take());
    chart.title = args.title.or(chart.title.take());
    if let Some(kind) = args.kind {
        chart.kind = kind.into();
    }

    let layout = &mut config.layout;
    if args.combined {
        layout.mode = ChartLayout::Combined;
    }
    layout.slots = args.slots.unwrap_or(layout.slots);
    layout.width = args.width.unwrap_or(layout.width);
    layout.height = args.height.unwrap_or(layout.height);
    if let Some(row) = args.marker_row {
        layout.marker = Some(MarkerPosition::Row(row));
    } else if let Some(at) = args.marker_at.as_deref() {
        layout.marker = Some(MarkerPosition::At(parse_timestamp_arg("--marker-at", at)?));
    }

    Ok(())
}

fn cmd_inspect(source: &SourceArgs, max_rows: usize) -> CliResult<()> {
    let bytes = read_input(&source.file)?;
    let mut options = LoadOptions::default();
    apply_source(&mut options, source);

    let table = load(&bytes, &options).context(LoadTableSnafu {
        path: source.file.display().to_string(),
    })?;

    let mut stdout = std::io::stdout();
    write_inspect(&table, max_rows, &mut stdout)
}

fn cmd_chart(args: ChartArgs) -> CliResult<()> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => PipelineConfig::default(),
    };
    let file = args.source.file.clone();
    let output = args.output.clone();
    let data_out = args.data_out.clone();
    apply_overrides(&mut config, args)?;

    let bytes = read_input(&file)?;
    let mut session = Session::new();
    let result = session.run(&bytes, &config).context(RunPipelineSnafu {
        path: file.display().to_string(),
    })?;
    info!(
        "{} chart(s) for series {:?}",
        result.charts.len(),
        result.series
    );

    write_specs(&result.charts, output.as_deref())?;

    if let Some(path) = data_out {
        let frame = result.chart_frame().context(RunPipelineSnafu {
            path: file.display().to_string(),
        })?;
        write_frame_csv(&frame, &path)?;
        if output.is_some() {
            writeln!(std::io::stdout(), "wrote: {}", path.display()).context(StdoutSnafu)?;
        }
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Inspect { source, max_rows } => cmd_inspect(&source, max_rows),
        Command::Chart(args) => cmd_chart(args),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
