//! Immutable, column-typed table backed by an Arrow `RecordBatch`.
//!
//! Every column of a [`Table`] has exactly one [`ColumnKind`]. Arrow inputs
//! are normalized on construction so downstream stages only ever see four
//! physical types:
//!
//! | kind        | Arrow type                         |
//! |-------------|------------------------------------|
//! | `Text`      | `Utf8`                             |
//! | `Number`    | `Float64`                          |
//! | `Date`      | `Date32`                           |
//! | `Timestamp` | `Timestamp(Microsecond, None)`     |
//!
//! Tables are never mutated; every transformation builds a new one. Cloning
//! is cheap because column buffers are shared.

use std::{collections::HashSet, fmt, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch, RecordBatchOptions},
    compute::cast,
    datatypes::{
        DataType, Date32Type, Field, Float64Type, Schema, TimeUnit, TimestampMicrosecondType,
    },
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use snafu::prelude::*;

use crate::error::{
    ArrowSnafu, DuplicateColumnSnafu, IndexOutOfRangeSnafu, TableError, TableResult,
    UnsupportedColumnTypeSnafu,
};

/// Maximum number of decimal places used when displaying numbers.
pub const DEFAULT_FLOAT_MAX_DECIMALS: usize = 6;

/// Arrow type used for every timestamp column.
pub const TIMESTAMP_TYPE: DataType = DataType::Timestamp(TimeUnit::Microsecond, None);

/// Semantic type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Free text.
    Text,
    /// 64-bit floating point number.
    Number,
    /// Calendar date without time of day.
    Date,
    /// Naive wall-clock timestamp with microsecond precision.
    Timestamp,
}

impl ColumnKind {
    /// Canonical Arrow type for this kind.
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Text => DataType::Utf8,
            ColumnKind::Number => DataType::Float64,
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Timestamp => TIMESTAMP_TYPE,
        }
    }

    /// Kind an Arrow type normalizes to, if any.
    pub fn from_data_type(datatype: &DataType) -> Option<Self> {
        match datatype {
            DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Utf8View
            | DataType::Boolean
            | DataType::Null
            | DataType::Time32(_)
            | DataType::Time64(_) => Some(ColumnKind::Text),
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64 => Some(ColumnKind::Number),
            DataType::Date32 | DataType::Date64 => Some(ColumnKind::Date),
            DataType::Timestamp(_, _) => Some(ColumnKind::Timestamp),
            _ => None,
        }
    }

    /// True for `Date` and `Timestamp`.
    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnKind::Date | ColumnKind::Timestamp)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Text => "text",
            ColumnKind::Number => "number",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// A single cell, detached from its column.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Missing value.
    Null,
    /// Text cell.
    Text(String),
    /// Numeric cell.
    Number(f64),
    /// Date cell.
    Date(NaiveDate),
    /// Timestamp cell.
    Timestamp(NaiveDateTime),
}

impl CellValue {
    /// Timestamp view of a temporal cell; dates widen to midnight.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Timestamp(ts) => Some(*ts),
            CellValue::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// True for [`CellValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(v) => {
                f.write_str(&format_compact_float(*v, DEFAULT_FLOAT_MAX_DECIMALS))
            }
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Timestamp(ts) => f.write_str(&format_timestamp(*ts)),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Number(v) => serializer.serialize_f64(*v),
            CellValue::Date(d) => d.serialize(serializer),
            CellValue::Timestamp(ts) => ts.serialize(serializer),
        }
    }
}

/// Format a timestamp as `%Y-%m-%d %H:%M:%S`, appending the fraction only
/// when it is non-zero.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    use chrono::Timelike;
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

/// Format a float with at most `max_decimals` places, trimming trailing zeros.
///
/// Avoids artifacts like `115.38499999999999` in previews and in the string
/// form of numeric cells.
pub fn format_compact_float(value: f64, max_decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let fixed = format!("{:.*}", max_decimals.min(15), value);
    let trimmed = if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.')
    } else {
        fixed.as_str()
    };
    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Ordered set of uniquely named, uniformly sized columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    /// Build a table from named columns, normalizing Arrow types.
    ///
    /// All columns must have the same length; `num_rows` is only consulted
    /// when `columns` is empty.
    pub fn try_new(columns: Vec<(String, ArrayRef)>, num_rows: usize) -> TableResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays = Vec::with_capacity(columns.len());

        for (name, array) in columns {
            ensure!(
                seen.insert(name.clone()),
                DuplicateColumnSnafu { column: name }
            );
            let array = normalize_array(&name, array)?;
            fields.push(Field::new(name, array.data_type().clone(), true));
            arrays.push(array);
        }

        let row_count = arrays.first().map(|a| a.len()).unwrap_or(num_rows);
        let options = RecordBatchOptions::new().with_row_count(Some(row_count));
        let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
            .context(ArrowSnafu)?;

        Ok(Self { batch })
    }

    /// Wrap an existing record batch, normalizing Arrow types.
    pub fn from_batch(batch: &RecordBatch) -> TableResult<Self> {
        let columns = batch
            .schema()
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| (field.name().clone(), Arc::clone(array)))
            .collect();
        Self::try_new(columns, batch.num_rows())
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            batch: RecordBatch::new_empty(Arc::new(Schema::empty())),
        }
    }

    /// Underlying record batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// True if the table has a column called `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    /// Fail with `MissingColumn` listing every name that is absent.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> TableResult<()> {
        let missing: Vec<String> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TableError::MissingColumn { columns: missing })
        }
    }

    /// Position of a column.
    pub fn index_of(&self, name: &str) -> TableResult<usize> {
        self.batch
            .schema()
            .index_of(name)
            .map_err(|_| TableError::MissingColumn {
                columns: vec![name.to_string()],
            })
    }

    /// Column array by name.
    pub fn column(&self, name: &str) -> TableResult<&ArrayRef> {
        let idx = self.index_of(name)?;
        Ok(self.batch.column(idx))
    }

    /// Kind of a column by name.
    pub fn column_kind(&self, name: &str) -> TableResult<ColumnKind> {
        let column = self.column(name)?;
        kind_of(name, column.data_type())
    }

    /// `(name, kind)` for every column, in table order.
    pub fn schema_summary(&self) -> Vec<(String, ColumnKind)> {
        self.batch
            .schema()
            .fields()
            .iter()
            .filter_map(|f| ColumnKind::from_data_type(f.data_type()).map(|k| (f.name().clone(), k)))
            .collect()
    }

    /// Named columns in table order, for building derived tables.
    pub fn columns(&self) -> Vec<(String, ArrayRef)> {
        self.batch
            .schema()
            .fields()
            .iter()
            .zip(self.batch.columns())
            .map(|(f, a)| (f.name().clone(), Arc::clone(a)))
            .collect()
    }

    /// Cell at `row` of column `name`.
    pub fn value(&self, name: &str, row: usize) -> TableResult<CellValue> {
        let column = self.column(name)?;
        ensure!(
            row < column.len(),
            IndexOutOfRangeSnafu {
                index: row,
                len: column.len(),
            }
        );
        Ok(cell_value(column.as_ref(), row))
    }

    /// Keep only the named columns, in the given order.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> TableResult<Self> {
        self.require_columns(names)?;
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            columns.push((name.to_string(), Arc::clone(self.column(name)?)));
        }
        Self::try_new(columns, self.num_rows())
    }

    /// Drop the named columns; absent names are ignored.
    pub fn drop_columns<S: AsRef<str>>(&self, names: &[S]) -> TableResult<Self> {
        let columns = self
            .columns()
            .into_iter()
            .filter(|(name, _)| !names.iter().any(|n| n.as_ref() == name.as_str()))
            .collect();
        Self::try_new(columns, self.num_rows())
    }

    /// Append a column at the end, rejecting duplicate names.
    pub fn with_column(&self, name: impl Into<String>, array: ArrayRef) -> TableResult<Self> {
        let mut columns = self.columns();
        columns.push((name.into(), array));
        Self::try_new(columns, self.num_rows())
    }

    /// Every row rendered with [`CellValue`]'s display form, up to `limit` rows.
    pub fn preview_rows(&self, limit: usize) -> Vec<Vec<String>> {
        (0..self.num_rows().min(limit))
            .map(|row| {
                self.batch
                    .columns()
                    .iter()
                    .map(|c| cell_value(c.as_ref(), row).to_string())
                    .collect()
            })
            .collect()
    }
}

fn kind_of(column: &str, datatype: &DataType) -> TableResult<ColumnKind> {
    ColumnKind::from_data_type(datatype).context(UnsupportedColumnTypeSnafu {
        column: column.to_string(),
        datatype: datatype.clone(),
    })
}

fn normalize_array(column: &str, array: ArrayRef) -> TableResult<ArrayRef> {
    let kind = kind_of(column, array.data_type())?;
    let target = kind.data_type();
    if array.data_type() == &target {
        return Ok(array);
    }
    cast(array.as_ref(), &target).context(ArrowSnafu)
}

/// Read one cell of a normalized column.
pub(crate) fn cell_value(array: &dyn Array, row: usize) -> CellValue {
    if array.is_null(row) {
        return CellValue::Null;
    }

    match array.data_type() {
        DataType::Utf8 => CellValue::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::Float64 => CellValue::Number(array.as_primitive::<Float64Type>().value(row)),
        DataType::Date32 => array
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
        DataType::Timestamp(TimeUnit::Microsecond, None) => array
            .as_primitive::<TimestampMicrosecondType>()
            .value_as_datetime(row)
            .map(CellValue::Timestamp)
            .unwrap_or(CellValue::Null),
        _ => CellValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use arrow::array::{BooleanArray, Int64Array, StringArray};

    #[test]
    fn compact_float_trims_trailing_zeros() {
        assert_eq!(format_compact_float(115.38499999999999, 6), "115.385");
        assert_eq!(format_compact_float(5.0, 6), "5");
        assert_eq!(format_compact_float(-0.0000001, 6), "0");
        assert_eq!(format_compact_float(f64::NAN, 6), "NaN");
    }

    #[test]
    fn integer_and_boolean_columns_are_normalized() -> TestResult {
        let table = Table::try_new(
            vec![
                ("n".to_string(), Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
                ("flag".to_string(), Arc::new(BooleanArray::from(vec![true, false]))),
            ],
            0,
        )?;

        assert_eq!(table.column_kind("n")?, ColumnKind::Number);
        assert_eq!(table.column_kind("flag")?, ColumnKind::Text);
        assert_eq!(table.value("n", 1)?, CellValue::Number(2.0));
        assert_eq!(table.value("flag", 0)?, CellValue::Text("true".to_string()));
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let col = Arc::new(StringArray::from(vec!["a"])) as ArrayRef;
        let err = Table::try_new(
            vec![("x".to_string(), col.clone()), ("x".to_string(), col)],
            0,
        )
        .expect_err("duplicate column must fail");
        assert!(matches!(err, TableError::DuplicateColumn { column } if column == "x"));
    }

    #[test]
    fn require_columns_lists_every_missing_name() -> TestResult {
        let table = text_table(&[("DATE", &["2024-01-01"])])?;
        let err = table
            .require_columns(&["DATE", "TIME", "ITEM"])
            .expect_err("missing columns must fail");
        match err {
            TableError::MissingColumn { columns } => assert_eq!(columns, vec!["TIME", "ITEM"]),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn value_out_of_range_is_an_error() -> TestResult {
        let table = text_table(&[("a", &["x", "y"])])?;
        let err = table.value("a", 2).expect_err("row 2 does not exist");
        assert!(matches!(err, TableError::IndexOutOfRange { index: 2, len: 2 }));
        Ok(())
    }

    #[test]
    fn zero_column_table_keeps_row_count() -> TestResult {
        let table = Table::try_new(Vec::new(), 3)?;
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 0);
        Ok(())
    }

    #[test]
    fn project_and_drop_preserve_order() -> TestResult {
        let table = text_table(&[("a", &["1"]), ("b", &["2"]), ("c", &["3"])])?;
        assert_eq!(table.project(&["c", "a"])?.column_names(), vec!["c", "a"]);
        assert_eq!(table.drop_columns(&["b"])?.column_names(), vec!["a", "c"]);
        Ok(())
    }
}
