//! Resolve which metric columns become chart series.
//!
//! Metric columns are declared explicitly through [`MetricColumns`] rather
//! than guessed from column position; the positional convention is still
//! available, but only when asked for by name.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{NoSeriesSelectedSnafu, TableResult, UnknownSeriesSnafu},
    table::{ColumnKind, Table},
};

/// Which columns of a table count as metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricColumns {
    /// Every column except the named identifier columns.
    Excluding {
        /// Identifier columns (date, time, item, ...).
        columns: Vec<String>,
    },
    /// Every column at or after a zero-based position.
    FromPosition {
        /// First metric column position.
        index: usize,
    },
    /// Every numeric column.
    Numeric,
}

impl Default for MetricColumns {
    fn default() -> Self {
        MetricColumns::Excluding {
            columns: Vec::new(),
        }
    }
}

/// How the user picked series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum SeriesRequest {
    /// Every available metric column.
    #[default]
    All,
    /// A caller-supplied list.
    Explicit(Vec<String>),
    /// Case-insensitive substring match on column names.
    TextFilter(String),
}

/// Metric columns of `table`, in table order.
pub fn metric_columns(table: &Table, metrics: &MetricColumns) -> TableResult<Vec<String>> {
    let names = table.column_names();
    let available = match metrics {
        MetricColumns::Excluding { columns } => {
            table.require_columns(columns.as_slice())?;
            names
                .into_iter()
                .filter(|name| !columns.contains(name))
                .collect()
        }
        MetricColumns::FromPosition { index } => names.into_iter().skip(*index).collect(),
        MetricColumns::Numeric => table
            .schema_summary()
            .into_iter()
            .filter(|(_, kind)| *kind == ColumnKind::Number)
            .map(|(name, _)| name)
            .collect(),
    };
    Ok(available)
}

/// Resolve `request` against `available`, preserving order and removing
/// duplicates. An empty result is an error.
pub fn resolve<S: AsRef<str>>(available: &[S], request: &SeriesRequest) -> TableResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut dedup = |names: Vec<String>| -> Vec<String> {
        names
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect()
    };

    let resolved = match request {
        SeriesRequest::All => dedup(available.iter().map(|s| s.as_ref().to_string()).collect()),
        SeriesRequest::Explicit(names) => {
            let unknown: Vec<String> = names
                .iter()
                .filter(|name| !available.iter().any(|a| a.as_ref() == name.as_str()))
                .cloned()
                .collect();
            ensure!(unknown.is_empty(), UnknownSeriesSnafu { names: unknown });
            dedup(names.clone())
        }
        SeriesRequest::TextFilter(text) => {
            let needle = text.to_lowercase();
            dedup(
                available
                    .iter()
                    .map(|name| name.as_ref())
                    .filter(|name| name.to_lowercase().contains(&needle))
                    .map(|name| name.to_string())
                    .collect(),
            )
        }
    };

    ensure!(!resolved.is_empty(), NoSeriesSelectedSnafu);

    debug!("resolved {} series from {} available", resolved.len(), available.len());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;
    use crate::test_util::*;

    const ABC: &[&str] = &["A", "B", "C"];

    #[test]
    fn all_returns_available_in_order() -> TestResult {
        assert_eq!(resolve(ABC, &SeriesRequest::All)?, vec!["A", "B", "C"]);
        assert_eq!(
            resolve(&["A", "B", "A"], &SeriesRequest::All)?,
            vec!["A", "B"]
        );
        Ok(())
    }

    #[test]
    fn text_filter_is_case_insensitive_substring() -> TestResult {
        assert_eq!(
            resolve(ABC, &SeriesRequest::TextFilter("b".to_string()))?,
            vec!["B"]
        );
        assert_eq!(
            resolve(ABC, &SeriesRequest::TextFilter(String::new()))?,
            vec!["A", "B", "C"]
        );
        Ok(())
    }

    #[test]
    fn text_filter_without_match_selects_nothing() {
        let err = resolve(ABC, &SeriesRequest::TextFilter("zzz".to_string()))
            .expect_err("nothing matches");
        assert!(matches!(err, TableError::NoSeriesSelected));
    }

    #[test]
    fn explicit_keeps_caller_order_and_drops_duplicates() -> TestResult {
        let request = SeriesRequest::Explicit(vec!["C".into(), "A".into(), "C".into()]);
        assert_eq!(resolve(ABC, &request)?, vec!["C", "A"]);
        Ok(())
    }

    #[test]
    fn explicit_rejects_unknown_names() {
        let request = SeriesRequest::Explicit(vec!["A".into(), "X".into(), "Y".into()]);
        let err = resolve(ABC, &request).expect_err("X and Y are unknown");
        match err {
            TableError::UnknownSeries { names } => assert_eq!(names, vec!["X", "Y"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_empty_list_selects_nothing() {
        let err = resolve(ABC, &SeriesRequest::Explicit(Vec::new())).expect_err("empty");
        assert!(matches!(err, TableError::NoSeriesSelected));
    }

    #[test]
    fn metric_columns_follow_declared_boundary() -> TestResult {
        let table = hourly_table(2)?;

        let excluding = MetricColumns::Excluding {
            columns: vec!["DateTime".into(), "items".into()],
        };
        assert_eq!(metric_columns(&table, &excluding)?, vec!["M"]);
        assert_eq!(
            metric_columns(&table, &MetricColumns::FromPosition { index: 1 })?,
            vec!["items", "M"]
        );
        assert!(metric_columns(&table, &MetricColumns::FromPosition { index: 9 })?.is_empty());
        assert_eq!(metric_columns(&table, &MetricColumns::Numeric)?, vec!["M"]);
        Ok(())
    }

    #[test]
    fn excluded_identifiers_must_exist() -> TestResult {
        let table = hourly_table(1)?;
        let metrics = MetricColumns::Excluding {
            columns: vec!["DATE".into()],
        };
        let err = metric_columns(&table, &metrics).expect_err("DATE is absent");
        assert!(matches!(err, TableError::MissingColumn { .. }));
        Ok(())
    }

    #[test]
    fn request_modes_deserialize() -> TestResult {
        let all: SeriesRequest = serde_json::from_str(r#"{"mode":"all"}"#)?;
        assert_eq!(all, SeriesRequest::All);
        let filter: SeriesRequest =
            serde_json::from_str(r#"{"mode":"text_filter","value":"temp"}"#)?;
        assert_eq!(filter, SeriesRequest::TextFilter("temp".to_string()));
        Ok(())
    }
}
