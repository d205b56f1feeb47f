//! Table-statistics effects: row/column counts and semi-structured column
//! profiling, computed locally over a fetched sample rather than pushed
//! down as a single aggregation query.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::connection::ConnectionProvider;
use crate::driver::QueryDriver;
use crate::error::ErrorInfo;
use crate::executor::BlockingExecutor;
use crate::record::CellValue;

use super::run_to_completion;

/// Per-column summary statistics over a sampled result set.
#[derive(Debug, Clone)]
pub struct ColumnStats {
    /// Column name.
    pub name: String,
    /// Number of `NULL` values observed.
    pub null_count: usize,
    /// Number of distinct non-null textual representations observed.
    pub distinct_count: usize,
}

/// Statistics for a table, computed over a bounded sample of its rows.
#[derive(Debug, Clone)]
pub struct TableStatistics {
    /// Number of rows the statistics were computed over.
    pub sampled_row_count: usize,
    /// Per-column statistics, in column order.
    pub columns: Vec<ColumnStats>,
}

/// Analyze `database.schema.table` by sampling up to `sample_size` rows and
/// computing per-column null/distinct counts.
///
/// The aggregation itself runs on the blocking thread pool via
/// [`BlockingExecutor`] — with a large sample this is real CPU work, and
/// keeping it off the async scheduler matches how the rest of this crate
/// isolates non-trivial synchronous work from `.await` points.
pub async fn analyze_table_statistics(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    executor: &BlockingExecutor,
    database: &str,
    schema: &str,
    table: &str,
    sample_size: usize,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<TableStatistics, ErrorInfo> {
    let sql = format!("SELECT * FROM {database}.{schema}.{table} LIMIT {sample_size}");
    let result = run_to_completion(connections, driver, &sql, None, None, poll_interval, timeout).await?;

    let rows = result.rows;
    let column_names: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();

    executor
        .run(move || Ok(compute_statistics(&column_names, &rows)))
        .await
}

fn compute_statistics(
    column_names: &[String],
    rows: &[crate::record::Row],
) -> TableStatistics {
    let columns = column_names
        .iter()
        .map(|name| {
            let mut null_count = 0usize;
            let mut seen = std::collections::HashSet::new();
            for row in rows {
                if let Some((_, value)) = row.0.iter().find(|(k, _)| k == name) {
                    match value {
                        CellValue::Null => null_count += 1,
                        other => {
                            seen.insert(cell_key(other));
                        }
                    }
                }
            }
            ColumnStats {
                name: name.clone(),
                null_count,
                distinct_count: seen.len(),
            }
        })
        .collect();

    TableStatistics {
        sampled_row_count: rows.len(),
        columns,
    }
}

fn cell_key(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::Text(s) => s.clone(),
    }
}

/// Profile of one semi-structured (`VARIANT`/`OBJECT`/`ARRAY`) column: the
/// distinct top-level JSON keys observed across the sample, with counts.
#[derive(Debug, Clone)]
pub struct SemiStructuredProfile {
    /// Column name.
    pub column: String,
    /// Top-level key to observation count, for object-shaped values.
    pub key_counts: BTreeMap<String, usize>,
}

/// Profile the top-level shape of a semi-structured column by sampling
/// `sample_size` rows and parsing each value's textual JSON form.
pub async fn profile_semi_structured_column(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    executor: &BlockingExecutor,
    database: &str,
    schema: &str,
    table: &str,
    column: &str,
    sample_size: usize,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<SemiStructuredProfile, ErrorInfo> {
    let sql = format!(
        "SELECT {column} FROM {database}.{schema}.{table} LIMIT {sample_size}"
    );
    let result = run_to_completion(connections, driver, &sql, None, None, poll_interval, timeout).await?;

    let rows = result.rows;
    let column_owned = column.to_string();

    executor
        .run(move || Ok(compute_profile(&column_owned, &rows)))
        .await
}

fn compute_profile(column: &str, rows: &[crate::record::Row]) -> SemiStructuredProfile {
    let mut key_counts = BTreeMap::new();
    for row in rows {
        let Some((_, CellValue::Text(text))) = row.0.iter().find(|(k, _)| k == column) else {
            continue;
        };
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text) {
            for key in map.keys() {
                *key_counts.entry(key.clone()).or_insert(0) += 1;
            }
        }
    }
    SemiStructuredProfile {
        column: column.to_string(),
        key_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Row;

    #[test]
    fn compute_statistics_counts_nulls_and_distinct_values() {
        let columns = vec!["a".to_string()];
        let rows = vec![
            Row(vec![("a".to_string(), CellValue::Int(1))]),
            Row(vec![("a".to_string(), CellValue::Int(1))]),
            Row(vec![("a".to_string(), CellValue::Null)]),
            Row(vec![("a".to_string(), CellValue::Int(2))]),
        ];

        let stats = compute_statistics(&columns, &rows);
        assert_eq!(stats.sampled_row_count, 4);
        assert_eq!(stats.columns.len(), 1);
        assert_eq!(stats.columns[0].null_count, 1);
        assert_eq!(stats.columns[0].distinct_count, 2);
    }

    #[test]
    fn compute_profile_counts_top_level_keys() {
        let rows = vec![
            Row(vec![(
                "v".to_string(),
                CellValue::Text(r#"{"a": 1, "b": 2}"#.to_string()),
            )]),
            Row(vec![("v".to_string(), CellValue::Text(r#"{"a": 3}"#.to_string()))]),
            Row(vec![("v".to_string(), CellValue::Null)]),
        ];

        let profile = compute_profile("v", &rows);
        assert_eq!(profile.key_counts.get("a"), Some(&2));
        assert_eq!(profile.key_counts.get("b"), Some(&1));
    }
}
