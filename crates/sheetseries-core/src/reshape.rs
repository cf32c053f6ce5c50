//! Wide/long reshaping: `pivot` and its inverse `melt`.
//!
//! Both operations are built on Arrow's `take` kernel: the output columns
//! are gathered from the input by computed row indices, so cell values keep
//! their exact type and nulls fall out naturally for missing pivot cells.
//!
//! `pivot` never aggregates. Two source rows that land in the same
//! `(index, pivot)` cell are an error.

use std::{collections::HashMap, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, StringArray, UInt32Array, new_empty_array},
    compute::{cast, concat, sort_to_indices, take},
    datatypes::DataType,
};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{ArrowSnafu, TableError, TableResult},
    table::{Table, cell_value},
};

/// A reshape step, as it appears in a pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reshape {
    /// Long -> wide.
    Pivot {
        /// Column whose distinct values become rows.
        index: String,
        /// Column whose distinct values become columns.
        pivot: String,
        /// Column supplying the cell values.
        value: String,
    },
    /// Wide -> long.
    Melt {
        /// Identifier columns kept on every output row.
        id_columns: Vec<String>,
        /// Columns to melt; every non-id column when unset.
        #[serde(default)]
        value_columns: Option<Vec<String>>,
        /// Name of the column receiving the melted column names.
        #[serde(default = "default_var_name")]
        var_name: String,
        /// Name of the column receiving the melted values.
        #[serde(default = "default_value_name")]
        value_name: String,
    },
}

fn default_var_name() -> String {
    "variable".to_string()
}

fn default_value_name() -> String {
    "value".to_string()
}

impl Reshape {
    /// Apply this step to `table`.
    pub fn apply(&self, table: &Table) -> TableResult<Table> {
        match self {
            Reshape::Pivot {
                index,
                pivot: pivot_col,
                value,
            } => pivot(table, index, pivot_col, value),
            Reshape::Melt {
                id_columns,
                value_columns: Some(value_columns),
                var_name,
                value_name,
            } => melt_columns(
                table,
                id_columns.as_slice(),
                value_columns.as_slice(),
                var_name,
                value_name,
            ),
            Reshape::Melt {
                id_columns,
                value_columns: None,
                var_name,
                value_name,
            } => melt(table, id_columns.as_slice(), var_name, value_name),
        }
    }
}

/// Distinct keys of `array` in first-appearance order.
struct DistinctKeys {
    /// Source row of each distinct key's first appearance.
    first_rows: Vec<u32>,
    /// Distinct-key slot of every source row.
    slot_of_row: Vec<usize>,
}

fn distinct_keys(column: &str, array: &dyn Array) -> TableResult<DistinctKeys> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut first_rows = Vec::new();
    let mut slot_of_row = Vec::with_capacity(array.len());

    for row in 0..array.len() {
        let value = cell_value(array, row);
        if value.is_null() {
            return Err(TableError::NullPivotKey {
                column: column.to_string(),
                row,
            });
        }

        // Debug keeps full float precision, unlike the display form.
        let key = format!("{value:?}");
        let slot = *slots.entry(key).or_insert_with(|| {
            first_rows.push(row as u32);
            first_rows.len() - 1
        });
        slot_of_row.push(slot);
    }

    Ok(DistinctKeys {
        first_rows,
        slot_of_row,
    })
}

/// Output position of every distinct slot, ordered ascending by value.
fn sorted_ranks(array: &dyn Array, keys: &DistinctKeys) -> TableResult<(Vec<usize>, Vec<u32>)> {
    let firsts = UInt32Array::from(keys.first_rows.clone());
    let distinct = take(array, &firsts, None).context(ArrowSnafu)?;
    let order = sort_to_indices(distinct.as_ref(), None, None).context(ArrowSnafu)?;

    let mut rank = vec![0usize; keys.first_rows.len()];
    let mut ordered_rows = Vec::with_capacity(keys.first_rows.len());
    for (position, slot) in order.values().iter().enumerate() {
        let slot = *slot as usize;
        rank[slot] = position;
        ordered_rows.push(keys.first_rows[slot]);
    }

    Ok((rank, ordered_rows))
}

/// One row per distinct `index` value, one column per distinct `pivot`
/// value, cells taken from `value`.
pub fn pivot(table: &Table, index: &str, pivot: &str, value: &str) -> TableResult<Table> {
    table.require_columns(&[index, pivot, value])?;

    let index_col = table.column(index)?;
    let pivot_col = table.column(pivot)?;
    let value_col = table.column(value)?;

    let index_keys = distinct_keys(index, index_col.as_ref())?;
    let pivot_keys = distinct_keys(pivot, pivot_col.as_ref())?;
    let (index_rank, index_rows) = sorted_ranks(index_col.as_ref(), &index_keys)?;
    let (pivot_rank, pivot_rows) = sorted_ranks(pivot_col.as_ref(), &pivot_keys)?;

    let mut cells: Vec<Vec<Option<u32>>> = vec![vec![None; index_rows.len()]; pivot_rows.len()];
    for row in 0..table.num_rows() {
        let r = index_rank[index_keys.slot_of_row[row]];
        let c = pivot_rank[pivot_keys.slot_of_row[row]];

        if let Some(first_row) = cells[c][r] {
            return Err(TableError::AmbiguousPivot {
                index: cell_value(index_col.as_ref(), row).to_string(),
                pivot: cell_value(pivot_col.as_ref(), row).to_string(),
                first_row: first_row as usize,
                second_row: row,
            });
        }
        cells[c][r] = Some(row as u32);
    }

    let mut columns = Vec::with_capacity(pivot_rows.len() + 1);
    let index_take = UInt32Array::from(index_rows.clone());
    columns.push((
        index.to_string(),
        take(index_col.as_ref(), &index_take, None).context(ArrowSnafu)?,
    ));

    for (column_rows, key_row) in cells.into_iter().zip(&pivot_rows) {
        let name = cell_value(pivot_col.as_ref(), *key_row as usize).to_string();
        let indices = UInt32Array::from(column_rows);
        columns.push((
            name,
            take(value_col.as_ref(), &indices, None).context(ArrowSnafu)?,
        ));
    }

    debug!(
        "pivot {index}/{pivot}/{value}: {} rows -> {} rows x {} columns",
        table.num_rows(),
        index_rows.len(),
        columns.len()
    );
    Table::try_new(columns, index_rows.len())
}

/// Collapse every non-id column into `var_name`/`value_name` pairs.
pub fn melt<S: AsRef<str>>(
    table: &Table,
    id_columns: &[S],
    var_name: &str,
    value_name: &str,
) -> TableResult<Table> {
    table.require_columns(id_columns)?;
    let value_columns: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| !id_columns.iter().any(|id| id.as_ref() == name.as_str()))
        .collect();
    melt_columns(table, id_columns, value_columns.as_slice(), var_name, value_name)
}

/// Like [`melt`], with an explicit list of columns to collapse.
///
/// Output rows are grouped by melted column: every input row for the first
/// value column, then every input row for the second, and so on.
pub fn melt_columns<S: AsRef<str>, V: AsRef<str>>(
    table: &Table,
    id_columns: &[S],
    value_columns: &[V],
    var_name: &str,
    value_name: &str,
) -> TableResult<Table> {
    let mut required: Vec<&str> = id_columns.iter().map(AsRef::as_ref).collect();
    required.extend(value_columns.iter().map(AsRef::as_ref));
    table.require_columns(required.as_slice())?;

    let n = table.num_rows();
    let k = value_columns.len();
    let repeated = UInt32Array::from(
        (0..k)
            .flat_map(|_| 0..n as u32)
            .collect::<Vec<u32>>(),
    );

    let mut columns = Vec::with_capacity(id_columns.len() + 2);
    for id in id_columns {
        let id = id.as_ref();
        let array = take(table.column(id)?.as_ref(), &repeated, None).context(ArrowSnafu)?;
        columns.push((id.to_string(), array));
    }

    let names: Vec<&str> = value_columns
        .iter()
        .flat_map(|name| std::iter::repeat_n(name.as_ref(), n))
        .collect();
    columns.push((
        var_name.to_string(),
        Arc::new(StringArray::from(names)) as ArrayRef,
    ));
    columns.push((value_name.to_string(), melted_values(table, value_columns)?));

    debug!("melt {k} columns: {n} rows -> {} rows", n * k);
    Table::try_new(columns, n * k)
}

fn melted_values<V: AsRef<str>>(table: &Table, value_columns: &[V]) -> TableResult<ArrayRef> {
    let arrays = value_columns
        .iter()
        .map(|name| table.column(name.as_ref()).cloned())
        .collect::<TableResult<Vec<ArrayRef>>>()?;

    let Some(first) = arrays.first() else {
        return Ok(new_empty_array(&DataType::Utf8));
    };

    let shared = first.data_type().clone();
    let target = if arrays.iter().all(|a| a.data_type() == &shared) {
        shared
    } else {
        DataType::Utf8
    };

    let cast_arrays = arrays
        .iter()
        .map(|a| cast(a.as_ref(), &target))
        .collect::<Result<Vec<_>, _>>()
        .context(ArrowSnafu)?;
    let refs: Vec<&dyn Array> = cast_arrays.iter().map(|a| a.as_ref()).collect();
    concat(&refs).context(ArrowSnafu)
}
