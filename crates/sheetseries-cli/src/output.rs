use std::{fs::File, io::Write, path::Path};

use sheetseries_core::{ChartSpec, Table};
use snafu::ResultExt;
use tabled::{
    builder::Builder,
    settings::{Style, object::Rows, style::LineText, width::MinWidth},
};

use crate::error::{CliResult, SerializeSpecsSnafu, StdoutSnafu, WriteCsvSnafu, WriteOutputSnafu};

const PREVIEW_LABEL: &str = "Preview";
const PREVIEW_OFFSET: usize = 4;

/// Rounded grid of the header plus the first `max_rows` rows.
fn render_preview(table: &Table, max_rows: usize) -> Option<String> {
    let columns = table.column_names();
    if columns.is_empty() {
        return None;
    }

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in table.preview_rows(max_rows) {
        builder.push_record(row);
    }

    let min_width = PREVIEW_OFFSET + PREVIEW_LABEL.len() + 4;
    let mut grid = builder.build();
    grid.with(Style::rounded())
        .with(MinWidth::new(min_width))
        .with(LineText::new(PREVIEW_LABEL, Rows::first()).offset(PREVIEW_OFFSET))
        // the label line resets measured widths
        .with(MinWidth::new(min_width));
    Some(grid.to_string())
}

/// Schema, row count and a preview of the first `max_rows` rows.
pub fn write_inspect<W: Write>(table: &Table, max_rows: usize, out: &mut W) -> CliResult<()> {
    writeln!(out, "rows: {}", table.num_rows()).context(StdoutSnafu)?;
    writeln!(out, "columns: {}", table.num_columns()).context(StdoutSnafu)?;
    for (name, kind) in table.schema_summary() {
        writeln!(out, "  {name}: {kind}").context(StdoutSnafu)?;
    }

    if let Some(grid) = render_preview(table, max_rows) {
        writeln!(out, "{grid}").context(StdoutSnafu)?;
    }

    if table.num_rows() == 0 {
        writeln!(out, "(no rows)").context(StdoutSnafu)?;
    } else if max_rows == 0 {
        writeln!(out, "(preview suppressed; use --max-rows > 0)").context(StdoutSnafu)?;
    } else if table.num_rows() > max_rows {
        writeln!(out, "({} more rows)", table.num_rows() - max_rows).context(StdoutSnafu)?;
    }
    Ok(())
}

/// Pretty JSON to `path`, or to stdout when no path is given.
pub fn write_specs(specs: &[ChartSpec], path: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(specs).context(SerializeSpecsSnafu)?;
    match path {
        Some(path) => std::fs::write(path, format!("{json}\n")).context(WriteOutputSnafu {
            path: path.display().to_string(),
        }),
        None => {
            let mut stdout = std::io::stdout();
            writeln!(stdout, "{json}").context(StdoutSnafu)
        }
    }
}

/// Chart-ready rows as CSV with a header line.
pub fn write_frame_csv(frame: &Table, path: &Path) -> CliResult<()> {
    let display = path.display().to_string();
    let file = File::create(path).context(WriteOutputSnafu {
        path: display.clone(),
    })?;

    let mut writer = arrow_csv::WriterBuilder::new()
        .with_header(true)
        .build(file);
    writer
        .write(frame.batch())
        .context(WriteCsvSnafu { path: display })?;
    Ok(())
}
