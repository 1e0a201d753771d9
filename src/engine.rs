//! The single code path every health check runs through: load the statement,
//! bind `[schema, extra...]`, stream the rows into typed records, and classify
//! the outcome.

use crate::executor::{CheckArg, RowCursor, StatementExecutor};
use crate::models::{CheckStatus, CheckSummary};
use crate::queries::{QuerySource, ResourceError};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};
use std::fmt::Debug;
use tracing::{debug, warn};

/// Suffix every check identifier carries; the label is what precedes it.
pub const QUERY_SUFFIX: &str = ".sql";

#[derive(Debug, Snafu)]
pub enum MapError {
    #[snafu(display("row #{}: {}", index, source))]
    Row {
        index: usize,
        source: serde_json::Error,
    },

    #[snafu(display("{}", source))]
    Cursor { source: sqlx::Error },
}

#[derive(Debug, Snafu)]
pub enum CheckError {
    #[snafu(display("ERROR AT {}: no open database connection", label))]
    NotConnected { label: String },

    #[snafu(display("ERROR AT {}: {}", label, source))]
    Resource {
        label: String,
        source: ResourceError,
    },

    #[snafu(display("ERROR AT {}: {}", label, source))]
    Query { label: String, source: sqlx::Error },

    #[snafu(display("ERROR AT {}: {}", label, source))]
    Decode { label: String, source: MapError },

    #[snafu(display("{}", message))]
    ViolationDetected { label: String, message: String },
}

impl CheckError {
    pub fn label(&self) -> &str {
        match self {
            CheckError::NotConnected { label }
            | CheckError::Resource { label, .. }
            | CheckError::Query { label, .. }
            | CheckError::Decode { label, .. }
            | CheckError::ViolationDetected { label, .. } => label,
        }
    }

    /// A violation is a successful check that found offending rows, not a fault.
    pub fn is_violation(&self) -> bool {
        matches!(self, CheckError::ViolationDetected { .. })
    }
}

/// Outcome of one check.
///
/// `error` is `None` exactly when the check passed. On a violation the decoded
/// records stay available next to the error; on an infrastructure failure
/// `records` is empty.
#[must_use]
#[derive(Debug)]
pub struct CheckReport<T> {
    pub label: String,
    pub records: Vec<T>,
    pub error: Option<CheckError>,
}

impl<T> CheckReport<T> {
    pub fn is_passed(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_parts(self) -> (Vec<T>, Option<CheckError>) {
        (self.records, self.error)
    }
}

impl<T: Serialize> CheckReport<T> {
    /// Erases the record type so reports of different checks can be collected.
    pub fn summarize(self) -> CheckSummary {
        let status = match &self.error {
            None => CheckStatus::Passed,
            Some(error) if error.is_violation() => CheckStatus::Violations,
            Some(_) => CheckStatus::Failed,
        };
        let records = self
            .records
            .iter()
            .map(|record| match serde_json::to_value(record) {
                Ok(value) => value,
                Err(err) => {
                    warn!("Failed to serialize record of check {}: {}", self.label, err);
                    Value::Null
                }
            })
            .collect();

        CheckSummary {
            label: self.label,
            status,
            message: self.error.map(|error| error.to_string()),
            records,
        }
    }
}

/// Derives the human-readable label from a check identifier.
pub fn check_label(id: &str) -> &str {
    id.split(QUERY_SUFFIX).next().unwrap_or(id)
}

/// The positional argument list: the schema alone, or the schema followed by
/// the check's extra thresholds in order.
pub fn build_args(schema: &str, extra: &[CheckArg]) -> Vec<CheckArg> {
    if extra.is_empty() {
        return vec![CheckArg::from(schema)];
    }
    let mut args = Vec::with_capacity(extra.len() + 1);
    args.push(CheckArg::from(schema));
    args.extend_from_slice(extra);
    args
}

/// Drains `cursor`, decoding each row into `T` by column name.
///
/// The cursor is consumed, so it is released on every return path.
pub async fn map_rows<T: DeserializeOwned>(mut cursor: RowCursor<'_>) -> Result<Vec<T>, MapError> {
    let mut records = Vec::new();
    while let Some(row) = cursor.next_row().await {
        let row = row.context(CursorSnafu)?;
        let record = serde_json::from_value(Value::Object(row)).context(RowSnafu {
            index: records.len(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Formats a violation: `prefix` followed by `#<idx>: <record>` per record.
pub fn violation_message<T: Debug>(prefix: &str, records: &[T]) -> String {
    let lines = records
        .iter()
        .enumerate()
        .map(|(idx, record)| format!("#{idx}: {record:?}\n"))
        .join("");
    format!("{prefix}{lines}")
}

/// Runs one check end to end.
///
/// `executor` is `None` for a session without a live connection, which fails
/// the check with [`CheckError::NotConnected`].
pub async fn run_check<T, E>(
    executor: Option<&E>,
    queries: &dyn QuerySource,
    schema: &str,
    id: &str,
    prefix: &str,
    extra: &[CheckArg],
) -> CheckReport<T>
where
    T: DeserializeOwned + Debug,
    E: StatementExecutor + ?Sized,
{
    let label = check_label(id).to_string();
    let args = build_args(schema, extra);
    debug!("Running check {} with {} argument(s)", label, args.len());

    let outcome: Result<Vec<T>, CheckError> = async {
        let executor = executor.context(NotConnectedSnafu { label: &label })?;
        let sql = queries.load(id).context(ResourceSnafu { label: &label })?;
        let cursor = executor
            .execute(&sql, &args)
            .await
            .context(QuerySnafu { label: &label })?;
        map_rows::<T>(cursor)
            .await
            .context(DecodeSnafu { label: &label })
    }
    .await;

    match outcome {
        Err(error) => {
            warn!("Check {} failed: {}", label, error);
            CheckReport {
                label,
                records: Vec::new(),
                error: Some(error),
            }
        }
        Ok(records) if records.is_empty() => {
            debug!("Check {} passed", label);
            CheckReport {
                label,
                records,
                error: None,
            }
        }
        Ok(records) => {
            warn!("Check {} found {} offending row(s)", label, records.len());
            let error = CheckError::ViolationDetected {
                label: label.clone(),
                message: violation_message(prefix, &records),
            };
            CheckReport {
                label,
                records,
                error: Some(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::mock::{MockExecutor, Script};
    use crate::executor::PgExecutor;
    use crate::queries::StaticQueries;
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    const SQL: &str = "SELECT table_name, table_size FROM t WHERE s = $1";

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct SizedTable {
        table_name: String,
        table_size: i64,
    }

    fn queries() -> StaticQueries {
        StaticQueries::new().with("sized_tables.sql", SQL)
    }

    async fn run(executor: &MockExecutor, extra: &[CheckArg]) -> CheckReport<SizedTable> {
        run_check(
            Some(executor),
            &queries(),
            "public",
            "sized_tables.sql",
            "SIZED: ",
            extra,
        )
        .await
    }

    #[rstest]
    #[case("bloated_tables.sql", "bloated_tables")]
    #[case("tables_without_primary_key.sql", "tables_without_primary_key")]
    #[case("no_suffix", "no_suffix")]
    #[case("a.sql.sql", "a")]
    fn label_strips_query_suffix(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(check_label(id), expected);
    }

    #[test]
    fn args_start_with_schema() {
        assert_eq!(build_args("app", &[]), vec![CheckArg::from("app")]);
        assert_eq!(
            build_args("app", &[CheckArg::from(20.0), CheckArg::from(5.0)]),
            vec![
                CheckArg::from("app"),
                CheckArg::from(20.0),
                CheckArg::from(5.0)
            ]
        );
    }

    #[tokio::test]
    async fn empty_result_passes() {
        let executor = MockExecutor::new();
        let report = run(&executor, &[]).await;

        assert!(report.is_passed());
        assert!(report.records.is_empty());
        assert_eq!(report.label, "sized_tables");
    }

    #[tokio::test]
    async fn rows_become_violation_with_indexed_lines() {
        let executor = MockExecutor::new().script(
            SQL,
            Script::Rows(vec![
                json!({"table_name": "a", "table_size": 10}),
                json!({"table_name": "b", "table_size": 20}),
                json!({"table_name": "c", "table_size": 30}),
            ]),
        );
        let report = run(&executor, &[]).await;

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[1].table_name, "b");
        let error = report.error.as_ref().unwrap();
        assert!(error.is_violation());
        assert_eq!(error.label(), "sized_tables");

        let message = error.to_string();
        assert!(message.starts_with("SIZED: #0: "));
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("#0: SizedTable { table_name: \"a\""));
        assert!(lines[1].starts_with("#1: "));
        assert!(lines[2].starts_with("#2: "));
        assert!(lines[2].contains("table_size: 30"));
    }

    #[tokio::test]
    async fn binds_schema_then_extra_arguments() {
        let executor = MockExecutor::new();
        let _ = run(&executor, &[CheckArg::from(42.5)]).await;
        let _ = run(&executor, &[]).await;

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, SQL);
        assert_eq!(
            calls[0].1,
            vec![CheckArg::from("public"), CheckArg::from(42.5)]
        );
        assert_eq!(calls[1].1, vec![CheckArg::from("public")]);
    }

    #[tokio::test]
    async fn decode_failure_discards_decoded_rows() {
        let executor = MockExecutor::new().script(
            SQL,
            Script::Rows(vec![
                json!({"table_name": "a", "table_size": 10}),
                json!({"table_name": "b", "table_size": 20}),
                json!({"table_name": "c", "table_size": "huge"}),
            ]),
        );
        let report = run(&executor, &[]).await;

        assert!(report.records.is_empty());
        let error = report.error.unwrap();
        assert!(matches!(
            error,
            CheckError::Decode {
                source: MapError::Row { index: 2, .. },
                ..
            }
        ));
        assert!(error.to_string().starts_with("ERROR AT sized_tables: row #2"));
    }

    #[tokio::test]
    async fn missing_column_is_a_decode_failure() {
        let executor = MockExecutor::new().script(
            SQL,
            Script::Rows(vec![json!({"table_name": "a"})]),
        );
        let report = run(&executor, &[]).await;

        assert!(report.records.is_empty());
        assert!(matches!(report.error, Some(CheckError::Decode { .. })));
    }

    #[tokio::test]
    async fn cursor_fault_after_clean_rows_is_a_decode_failure() {
        let executor = MockExecutor::new().script(
            SQL,
            Script::FaultAfter(
                vec![json!({"table_name": "a", "table_size": 10})],
                "connection reset".into(),
            ),
        );
        let report = run(&executor, &[]).await;

        assert!(report.records.is_empty());
        let error = report.error.unwrap();
        assert!(matches!(
            error,
            CheckError::Decode {
                source: MapError::Cursor { .. },
                ..
            }
        ));
        assert!(error.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn rejected_statement_is_a_query_failure() {
        let executor =
            MockExecutor::new().script(SQL, Script::Reject("syntax error at or near".into()));
        let report = run(&executor, &[]).await;

        assert!(report.records.is_empty());
        let error = report.error.unwrap();
        assert!(matches!(error, CheckError::Query { .. }));
        assert!(error.to_string().starts_with("ERROR AT sized_tables: "));
    }

    #[tokio::test]
    async fn missing_resource_fails_without_touching_the_database() {
        let executor = MockExecutor::new();
        let report: CheckReport<SizedTable> = run_check(
            Some(&executor),
            &queries(),
            "public",
            "absent.sql",
            "ABSENT: ",
            &[],
        )
        .await;

        let error = report.error.unwrap();
        assert!(matches!(error, CheckError::Resource { .. }));
        assert_eq!(
            error.to_string(),
            "ERROR AT absent: query resource not found: absent.sql"
        );
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn absent_executor_fails_cleanly() {
        let report: CheckReport<SizedTable> = run_check(
            None::<&PgExecutor>,
            &queries(),
            "public",
            "sized_tables.sql",
            "SIZED: ",
            &[],
        )
        .await;

        assert!(report.records.is_empty());
        assert_eq!(
            report.error.unwrap().to_string(),
            "ERROR AT sized_tables: no open database connection"
        );
    }

    #[tokio::test]
    async fn summary_keeps_records_and_status() {
        let executor = MockExecutor::new().script(
            SQL,
            Script::Rows(vec![json!({"table_name": "a", "table_size": 10})]),
        );
        let summary = run(&executor, &[]).await.summarize();

        assert_eq!(summary.status, CheckStatus::Violations);
        assert_eq!(summary.records, vec![json!({"table_name": "a", "table_size": 10})]);
        assert!(summary.message.unwrap().starts_with("SIZED: #0: "));
    }

    #[test]
    fn into_parts_keeps_records_next_to_violation() {
        let passed: CheckReport<SizedTable> = CheckReport {
            label: "x".into(),
            records: Vec::new(),
            error: None,
        };
        let (records, error) = passed.into_parts();
        assert!(records.is_empty());
        assert!(error.is_none());

        let violated = CheckReport {
            label: "x".into(),
            records: vec![SizedTable {
                table_name: "a".into(),
                table_size: 1,
            }],
            error: Some(CheckError::ViolationDetected {
                label: "x".into(),
                message: "X: #0: ...".into(),
            }),
        };
        let (records, error) = violated.into_parts();
        assert_eq!(records.len(), 1);
        assert!(error.unwrap().is_violation());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[test]
    fn summary_keeps_a_placeholder_for_unserializable_records() {
        let report = CheckReport {
            label: "opaque".into(),
            records: vec![Unserializable, Unserializable],
            error: Some(CheckError::ViolationDetected {
                label: "opaque".into(),
                message: "OPAQUE: #0: ...".into(),
            }),
        };
        let summary = report.summarize();

        assert_eq!(summary.status, CheckStatus::Violations);
        assert_eq!(summary.records, vec![Value::Null, Value::Null]);
        assert_eq!(summary.label, "opaque");
    }
}
