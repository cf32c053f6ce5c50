//! Parse uploaded spreadsheet bytes into a [`Table`].
//!
//! Workbooks (xlsx, xlsm, xlsb, xls, ods) are read with `calamine`; CSV is
//! read with `arrow-csv` and only when explicitly requested, since almost
//! any byte stream is "valid" CSV. The first row of a sheet is the header.
//! Column kinds are inferred per column from the non-empty cells:
//!
//! - all numeric -> `Number`
//! - all dates at midnight -> `Date`
//! - all dates/datetimes -> `Timestamp`
//! - anything else -> `Text` (every cell stringified)
//!
//! [`TableCache`] memoizes the last parse keyed by a BLAKE3 hash of the
//! bytes and the load options.

use std::{
    collections::HashSet,
    io::Cursor,
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Date32Builder, Float64Builder, StringBuilder, TimestampMicrosecondBuilder},
    compute::concat_batches,
    datatypes::{Field, Schema},
};
use arrow_csv::{ReaderBuilder, reader::Format};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::{TableError, TableResult},
    table::{ColumnKind, Table, format_compact_float, format_timestamp},
};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Container format of the uploaded bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Detect a workbook from its file signature.
    #[default]
    Auto,
    /// Any workbook format `calamine` understands.
    Workbook,
    /// Comma-separated values with a header row.
    Csv,
}

/// How to turn bytes into a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Container format.
    pub format: SourceFormat,
    /// Worksheet to read; the first sheet when unset. Ignored for CSV.
    pub sheet: Option<String>,
}

/// Parse `bytes` into a table.
pub fn load(bytes: &[u8], options: &LoadOptions) -> TableResult<Table> {
    let table = match resolve_format(bytes, options.format)? {
        SourceFormat::Csv => load_csv(bytes)?,
        _ => load_workbook(bytes, options.sheet.as_deref())?,
    };

    info!(
        "loaded table: {} rows x {} columns",
        table.num_rows(),
        table.num_columns()
    );
    Ok(table)
}

fn resolve_format(bytes: &[u8], requested: SourceFormat) -> TableResult<SourceFormat> {
    match requested {
        SourceFormat::Auto if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => {
            Ok(SourceFormat::Workbook)
        }
        SourceFormat::Auto => Err(TableError::UnreadableFile {
            reason: "not a recognized workbook (request CSV explicitly for text files)"
                .to_string(),
        }),
        other => Ok(other),
    }
}

fn unreadable(err: impl std::fmt::Display) -> TableError {
    TableError::UnreadableFile {
        reason: err.to_string(),
    }
}

fn load_workbook(bytes: &[u8], sheet: Option<&str>) -> TableResult<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(unreadable)?;
    let available = workbook.sheet_names();

    let sheet = match sheet {
        Some(name) if available.iter().any(|s| s == name) => name.to_string(),
        Some(name) => {
            return Err(TableError::SheetNotFound {
                sheet: name.to_string(),
                available,
            });
        }
        None => available
            .first()
            .cloned()
            .ok_or_else(|| unreadable("workbook has no sheets"))?,
    };

    let range = workbook.worksheet_range(&sheet).map_err(unreadable)?;
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| unreadable(format!("sheet {sheet:?} is empty")))?;
    let body: Vec<&[Data]> = rows.collect();

    debug!("sheet {sheet:?}: {} header cells, {} rows", header.len(), body.len());
    table_from_cells(header, &body)
}

/// Build a table from a header row and body rows of workbook cells.
pub(crate) fn table_from_cells(header: &[Data], body: &[&[Data]]) -> TableResult<Table> {
    let names = header_names(header);
    let mut columns = Vec::with_capacity(names.len());

    for (idx, name) in names.into_iter().enumerate() {
        let cells: Vec<Option<&Data>> = body.iter().map(|row| row.get(idx)).collect();
        columns.push((name, build_column(&cells)));
    }

    Table::try_new(columns, body.len())
}

fn header_names(header: &[Data]) -> Vec<String> {
    unique_names(header.iter().map(cell_text))
}

/// Blank headers become `Unnamed: <idx>`; repeats get `.1`, `.2`, ...
fn unique_names<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let raw = raw.into_iter();
    let mut used = HashSet::with_capacity(raw.size_hint().0);
    let mut names = Vec::with_capacity(raw.size_hint().0);

    for (idx, base) in raw.enumerate() {
        let base = base.unwrap_or_default();
        let base = if base.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            base
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while !used.insert(name.clone()) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(name);
    }

    names
}

#[derive(Debug, Clone, Copy)]
enum CellClass {
    Empty,
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text,
}

fn classify(cell: Option<&Data>) -> CellClass {
    match cell {
        None | Some(Data::Empty) => CellClass::Empty,
        Some(Data::Int(v)) => CellClass::Number(*v as f64),
        Some(Data::Float(v)) => CellClass::Number(*v),
        Some(Data::DateTime(dt)) if dt.is_duration() || dt.as_f64() < 1.0 => CellClass::Text,
        Some(Data::DateTime(dt)) => match dt.as_datetime() {
            Some(ts) if is_midnight(ts) => CellClass::Date(ts.date()),
            Some(ts) => CellClass::DateTime(ts),
            None => CellClass::Text,
        },
        Some(Data::DateTimeIso(s)) => parse_iso(s),
        Some(_) => CellClass::Text,
    }
}

fn is_midnight(ts: NaiveDateTime) -> bool {
    ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0
}

fn parse_iso(s: &str) -> CellClass {
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return CellClass::DateTime(ts);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return CellClass::Date(date);
    }
    CellClass::Text
}

fn infer_kind(classes: &[CellClass]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for class in classes {
        let next = match class {
            CellClass::Empty => continue,
            CellClass::Number(_) => ColumnKind::Number,
            CellClass::Date(_) => ColumnKind::Date,
            CellClass::DateTime(_) => ColumnKind::Timestamp,
            CellClass::Text => return ColumnKind::Text,
        };
        kind = Some(match (kind, next) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(a), b) if a.is_temporal() && b.is_temporal() => ColumnKind::Timestamp,
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

fn build_column(cells: &[Option<&Data>]) -> ArrayRef {
    let classes: Vec<CellClass> = cells.iter().map(|c| classify(*c)).collect();

    match infer_kind(&classes) {
        ColumnKind::Number => {
            let mut builder = Float64Builder::with_capacity(cells.len());
            for class in &classes {
                match class {
                    CellClass::Number(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Date => {
            let mut builder = Date32Builder::with_capacity(cells.len());
            for class in &classes {
                match class {
                    CellClass::Date(d) => builder.append_value(days_since_epoch(*d)),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Timestamp => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(cells.len());
            for class in &classes {
                let ts = match class {
                    CellClass::DateTime(ts) => Some(*ts),
                    CellClass::Date(d) => d.and_hms_opt(0, 0, 0),
                    _ => None,
                };
                builder.append_option(ts.map(|ts| ts.and_utc().timestamp_micros()));
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Text => {
            let mut builder = StringBuilder::with_capacity(cells.len(), cells.len() * 8);
            for cell in cells {
                builder.append_option(cell.and_then(cell_text));
            }
            Arc::new(builder.finish())
        }
    }
}

/// Display form of a workbook cell; `None` for empty cells.
fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(v) => v.to_string(),
        Data::Float(v) => format_compact_float(*v, 15),
        Data::Bool(v) => v.to_string(),
        Data::Error(e) => e.to_string(),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if dt.is_duration() {
                format_compact_float(serial, 6)
            } else if serial < 1.0 {
                time_of_day(serial)
            } else {
                match dt.as_datetime() {
                    Some(ts) if is_midnight(ts) => ts.format("%Y-%m-%d").to_string(),
                    Some(ts) => format_timestamp(ts),
                    None => format_compact_float(serial, 6),
                }
            }
        }
    };
    Some(text)
}

fn time_of_day(fraction: f64) -> String {
    let secs = (fraction * SECONDS_PER_DAY).round() as u32 % 86_400;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

fn load_csv(bytes: &[u8]) -> TableResult<Table> {
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(Cursor::new(bytes), None)
        .map_err(unreadable)?;

    if schema.fields().is_empty() {
        return Err(unreadable("CSV input has no header row"));
    }

    let names = unique_names(schema.fields().iter().map(|f| Some(f.name().clone())));
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .zip(names)
        .map(|(field, name)| field.as_ref().clone().with_name(name))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(Format::default().with_header(true))
        .build(Cursor::new(bytes))
        .map_err(unreadable)?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(unreadable)?;
    let batch = concat_batches(&schema, &batches).map_err(unreadable)?;

    debug!("csv: {} batches, {} rows", batches.len(), batch.num_rows());
    Table::from_batch(&batch)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    key: blake3::Hash,
    table: Table,
}

/// Single-entry, content-keyed memo of the last parsed upload.
///
/// A new upload (different bytes or options) replaces the entry. A failed
/// parse leaves the previous entry in place.
#[derive(Debug, Clone, Default)]
pub struct TableCache {
    entry: Option<CacheEntry>,
}

impl TableCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached table for identical input, parsing otherwise.
    pub fn load(&mut self, bytes: &[u8], options: &LoadOptions) -> TableResult<Table> {
        let key = cache_key(bytes, options);

        if let Some(entry) = self.entry.as_ref().filter(|entry| entry.key == key) {
            info!("table cache hit ({})", key.to_hex());
            return Ok(entry.table.clone());
        }

        info!("table cache miss ({})", key.to_hex());
        let table = load(bytes, options)?;
        self.entry = Some(CacheEntry {
            key,
            table: table.clone(),
        });
        Ok(table)
    }

    /// True if `bytes` + `options` would be served from the cache.
    pub fn contains(&self, bytes: &[u8], options: &LoadOptions) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.key == cache_key(bytes, options))
    }

    /// Drop the cached table.
    pub fn clear(&mut self) {
        self.entry = None;
    }
}

fn cache_key(bytes: &[u8], options: &LoadOptions) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(bytes);
    hasher.update(&[0xFF]);
    let format_tag: u8 = match options.format {
        SourceFormat::Auto => 0,
        SourceFormat::Workbook => 1,
        SourceFormat::Csv => 2,
    };
    hasher.update(&[format_tag]);
    if let Some(sheet) = &options.sheet {
        hasher.update(sheet.as_bytes());
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;
    use crate::test_util::*;
    use crate::timestamp::{DeriveTimestamp, derive_timestamp};
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, XlsxError};

    /// Two sheets: `Readings` (date, time-of-day, text, number) then `Notes`.
    fn readings_workbook() -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let time_format = Format::new().set_num_format("hh:mm:ss");

        let readings = workbook.add_worksheet().set_name("Readings")?;
        for (col, name) in ["DATE", "TIME", "ITEM", "METRIC"].into_iter().enumerate() {
            readings.write_string(0, col as u16, name)?;
        }
        let rows = [((2024, 1, 1), (9, 30), "A", 5.0), ((2024, 1, 2), (10, 0), "B", 7.5)];
        for (idx, ((y, m, d), (h, mi), item, metric)) in rows.into_iter().enumerate() {
            let row = idx as u32 + 1;
            let date = ExcelDateTime::from_ymd(y, m, d)?;
            let time = ExcelDateTime::from_hms(h, mi, 0.0)?;
            readings.write_datetime_with_format(row, 0, &date, &date_format)?;
            readings.write_datetime_with_format(row, 1, &time, &time_format)?;
            readings.write_string(row, 2, item)?;
            readings.write_number(row, 3, metric)?;
        }

        let notes = workbook.add_worksheet().set_name("Notes")?;
        notes.write_string(0, 0, "NOTE")?;
        notes.write_string(1, 0, "sensor recalibrated")?;

        workbook.save_to_buffer()
    }

    fn sheet_options(sheet: &str) -> LoadOptions {
        LoadOptions {
            format: SourceFormat::Workbook,
            sheet: Some(sheet.to_string()),
        }
    }

    fn csv_options() -> LoadOptions {
        LoadOptions {
            format: SourceFormat::Csv,
            sheet: None,
        }
    }

    #[test]
    fn auto_rejects_bytes_without_workbook_signature() {
        let err = load(b"DATE,TIME\n2024-01-01,09:00:00\n", &LoadOptions::default())
            .expect_err("plain text is not a workbook");
        assert!(matches!(err, TableError::UnreadableFile { .. }));
    }

    #[test]
    fn workbook_first_sheet_loads_dates_and_time_text() -> TestResult {
        let bytes = readings_workbook()?;
        let table = load(&bytes, &LoadOptions::default())?;

        assert_eq!(
            table.schema_summary(),
            vec![
                ("DATE".to_string(), ColumnKind::Date),
                ("TIME".to_string(), ColumnKind::Text),
                ("ITEM".to_string(), ColumnKind::Text),
                ("METRIC".to_string(), ColumnKind::Number),
            ]
        );
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value("TIME", 0)?, CellValue::Text("09:30:00".to_string()));
        assert_eq!(table.value("METRIC", 1)?, CellValue::Number(7.5));

        let derived = derive_timestamp(&table, &DeriveTimestamp::split("DATE", "TIME"))?;
        assert_eq!(
            derived.value("DateTime", 0)?,
            CellValue::Timestamp(naive(2024, 1, 1, 9, 30, 0))
        );
        assert_eq!(
            derived.value("DateTime", 1)?,
            CellValue::Timestamp(naive(2024, 1, 2, 10, 0, 0))
        );
        Ok(())
    }

    #[test]
    fn named_sheet_is_selected() -> TestResult {
        let bytes = readings_workbook()?;
        let table = load(&bytes, &sheet_options("Notes"))?;

        assert_eq!(table.column_names(), vec!["NOTE"]);
        assert_eq!(
            table.value("NOTE", 0)?,
            CellValue::Text("sensor recalibrated".to_string())
        );
        Ok(())
    }

    #[test]
    fn unknown_sheet_lists_available_sheets() -> TestResult {
        let bytes = readings_workbook()?;
        let err = load(&bytes, &sheet_options("Summary")).expect_err("no such sheet");

        match &err {
            TableError::SheetNotFound { sheet, available } => {
                assert_eq!(sheet, "Summary");
                assert_eq!(available, &vec!["Readings".to_string(), "Notes".to_string()]);
            }
            other => panic!("expected SheetNotFound, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Sheet \"Summary\" not found (available: Readings, Notes)"
        );
        Ok(())
    }

    #[test]
    fn corrupt_workbook_is_unreadable() {
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"definitely not a zip archive");
        let err = load(&bytes, &LoadOptions::default()).expect_err("corrupt zip must fail");
        assert!(matches!(err, TableError::UnreadableFile { .. }));
    }

    #[test]
    fn csv_preserves_column_order_and_count() -> TestResult {
        let bytes = b"DATE,TIME,ITEM,METRIC\n2024-01-01,09:00:00,A,5\n2024-01-02,10:30:00,B,7.5\n";
        let table = load(bytes, &csv_options())?;

        assert_eq!(table.column_names(), vec!["DATE", "TIME", "ITEM", "METRIC"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_kind("METRIC")?, ColumnKind::Number);
        assert_eq!(table.value("METRIC", 1)?, CellValue::Number(7.5));
        Ok(())
    }

    #[test]
    fn csv_repeated_and_blank_headers_are_renamed() -> TestResult {
        let table = load(b"A,A,,A\n1,2,3,x\n", &csv_options())?;

        assert_eq!(table.column_names(), vec!["A", "A.1", "Unnamed: 2", "A.2"]);
        assert_eq!(table.value("A.1", 0)?, CellValue::Number(2.0));
        assert_eq!(table.value("A.2", 0)?, CellValue::Text("x".to_string()));
        Ok(())
    }

    #[test]
    fn empty_csv_is_unreadable() {
        let err = load(b"", &csv_options()).expect_err("empty input has no header");
        assert!(matches!(err, TableError::UnreadableFile { .. }));
    }

    #[test]
    fn header_names_fill_blanks_and_deduplicate() {
        let header = vec![
            Data::String("A".to_string()),
            Data::Empty,
            Data::String("A".to_string()),
            Data::String("A".to_string()),
        ];
        assert_eq!(header_names(&header), vec!["A", "Unnamed: 1", "A.1", "A.2"]);
    }

    #[test]
    fn cell_kinds_are_inferred_per_column() -> TestResult {
        let header = vec![
            Data::String("ITEM".to_string()),
            Data::String("METRIC".to_string()),
            Data::String("MIXED".to_string()),
        ];
        let row1 = vec![Data::String("A".to_string()), Data::Int(5), Data::Int(1)];
        let row2 = vec![Data::String("B".to_string()), Data::Empty, Data::String("x".to_string())];
        let table = table_from_cells(&header, &[row1.as_slice(), row2.as_slice()])?;

        assert_eq!(table.column_kind("ITEM")?, ColumnKind::Text);
        assert_eq!(table.column_kind("METRIC")?, ColumnKind::Number);
        assert_eq!(table.value("METRIC", 1)?, CellValue::Null);
        assert_eq!(table.column_kind("MIXED")?, ColumnKind::Text);
        assert_eq!(table.value("MIXED", 0)?, CellValue::Text("1".to_string()));
        Ok(())
    }

    #[test]
    fn iso_cells_become_dates_and_timestamps() -> TestResult {
        let header = vec![Data::String("DATE".to_string()), Data::String("AT".to_string())];
        let row1 = vec![
            Data::DateTimeIso("2024-01-01".to_string()),
            Data::DateTimeIso("2024-01-01T09:00:00".to_string()),
        ];
        let row2 = vec![
            Data::DateTimeIso("2024-01-02".to_string()),
            Data::DateTimeIso("2024-01-02".to_string()),
        ];
        let table = table_from_cells(&header, &[row1.as_slice(), row2.as_slice()])?;

        assert_eq!(table.column_kind("DATE")?, ColumnKind::Date);
        assert_eq!(table.column_kind("AT")?, ColumnKind::Timestamp);
        assert_eq!(
            table.value("AT", 1)?,
            CellValue::Timestamp(naive(2024, 1, 2, 0, 0, 0))
        );
        Ok(())
    }

    #[test]
    fn cache_serves_identical_bytes_and_replaces_on_new_upload() -> TestResult {
        let first = b"A,B\n1,2\n";
        let second = b"A,B\n3,4\n";
        let options = csv_options();
        let mut cache = TableCache::new();

        let t1 = cache.load(first, &options)?;
        assert!(cache.contains(first, &options));
        assert_eq!(cache.load(first, &options)?, t1);

        let t2 = cache.load(second, &options)?;
        assert_ne!(t1, t2);
        assert!(!cache.contains(first, &options));
        assert!(cache.contains(second, &options));
        Ok(())
    }

    #[test]
    fn failed_load_keeps_previous_entry() -> TestResult {
        let options = csv_options();
        let mut cache = TableCache::new();
        cache.load(b"A\n1\n", &options)?;

        assert!(cache.load(b"", &options).is_err());
        assert!(cache.contains(b"A\n1\n", &options));
        Ok(())
    }

    #[test]
    fn sheet_name_is_part_of_the_cache_key() {
        let bytes = b"A\n1\n";
        let a = LoadOptions {
            format: SourceFormat::Workbook,
            sheet: Some("one".to_string()),
        };
        let b = LoadOptions {
            sheet: Some("two".to_string()),
            ..a.clone()
        };
        assert_ne!(cache_key(bytes, &a), cache_key(bytes, &b));
    }
}
