//! Positional statement execution and the row cursor handed to the mapper.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A value bound to one `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckArg {
    Text(String),
    Float(f64),
}

impl From<&str> for CheckArg {
    fn from(value: &str) -> Self {
        CheckArg::Text(value.to_string())
    }
}

impl From<String> for CheckArg {
    fn from(value: String) -> Self {
        CheckArg::Text(value)
    }
}

impl From<f64> for CheckArg {
    fn from(value: f64) -> Self {
        CheckArg::Float(value)
    }
}

/// One result row, keyed by column name.
pub type ResultRow = Map<String, Value>;

/// Forward-only, single-owner cursor over a statement's rows.
///
/// Dropping the cursor releases whatever the executor holds for it (for
/// Postgres, the pooled connection streaming the rows).
pub struct RowCursor<'a> {
    rows: BoxStream<'a, Result<ResultRow, sqlx::Error>>,
}

impl<'a> RowCursor<'a> {
    pub fn new(rows: BoxStream<'a, Result<ResultRow, sqlx::Error>>) -> Self {
        Self { rows }
    }

    /// Cursor over an already materialized set of rows. A trailing `Err`
    /// behaves like a fault reported by the connection mid-stream.
    pub fn from_rows(rows: Vec<Result<ResultRow, sqlx::Error>>) -> RowCursor<'static> {
        RowCursor {
            rows: stream::iter(rows).boxed(),
        }
    }

    pub async fn next_row(&mut self) -> Option<Result<ResultRow, sqlx::Error>> {
        self.rows.next().await
    }
}

impl fmt::Debug for RowCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Runs `sql` with `args` bound positionally. Errors returned here mean the
    /// database rejected or failed the statement; errors yielded later by the
    /// cursor are faults of the stream itself.
    async fn execute<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [CheckArg],
    ) -> Result<RowCursor<'a>, sqlx::Error>;

    /// Releases the underlying connection(s).
    async fn close(&self);
}

#[async_trait]
impl<T: StatementExecutor + ?Sized> StatementExecutor for Arc<T> {
    async fn execute<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [CheckArg],
    ) -> Result<RowCursor<'a>, sqlx::Error> {
        (**self).execute(sql, args).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StatementExecutor for PgExecutor {
    async fn execute<'a>(
        &'a self,
        sql: &'a str,
        args: &'a [CheckArg],
    ) -> Result<RowCursor<'a>, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                CheckArg::Text(value) => query.bind(value.as_str()),
                CheckArg::Float(value) => query.bind(*value),
            };
        }

        let mut rows = query.fetch(&self.pool);
        // Statement errors only surface once the stream is polled.
        let first = rows.try_next().await?;
        let rows = stream::iter(first.map(Ok::<_, sqlx::Error>))
            .chain(rows)
            .map(|row| row.and_then(|row| decode_row(&row)));

        Ok(RowCursor::new(rows.boxed()))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &PgRow) -> Result<ResultRow, sqlx::Error> {
    let mut values = Map::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        values.insert(column.name().to_string(), value);
    }
    Ok(values)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(Value::from),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)?
            .map(|decimal| {
                decimal
                    .to_f64()
                    .map(Value::from)
                    .ok_or_else(|| column_error(index, format!("numeric {decimal} out of range")))
            })
            .transpose()?,
        // Single-byte internal type, e.g. pg_class.relkind
        "\"CHAR\"" => row
            .try_get::<Option<i8>, _>(index)?
            .map(|code| Value::from(char::from(code as u8).to_string())),
        "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::from)
        }
        "TEXT[]" | "VARCHAR[]" | "NAME[]" | "BPCHAR[]" => {
            row.try_get::<Option<Vec<String>>, _>(index)?.map(Value::from)
        }
        other => return Err(column_error(index, format!("unsupported column type {other}"))),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn column_error(index: usize, reason: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: format!("{index:?}"),
        source: reason.into(),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What a scripted statement produces.
    #[derive(Debug, Clone)]
    pub(crate) enum Script {
        Rows(Vec<Value>),
        FaultAfter(Vec<Value>, String),
        Reject(String),
    }

    /// In-memory executor keyed by statement text. Unscripted statements
    /// produce no rows.
    #[derive(Debug, Default)]
    pub(crate) struct MockExecutor {
        scripts: HashMap<String, Script>,
        calls: Mutex<Vec<(String, Vec<CheckArg>)>>,
        closes: AtomicUsize,
    }

    impl MockExecutor {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn script(mut self, sql: &str, script: Script) -> Self {
            self.scripts.insert(sql.to_string(), script);
            self
        }

        pub(crate) fn calls(&self) -> Vec<(String, Vec<CheckArg>)> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    fn into_row(value: Value) -> ResultRow {
        match value {
            Value::Object(map) => map,
            other => panic!("scripted row must be an object, got {other}"),
        }
    }

    #[async_trait]
    impl StatementExecutor for MockExecutor {
        async fn execute<'a>(
            &'a self,
            sql: &'a str,
            args: &'a [CheckArg],
        ) -> Result<RowCursor<'a>, sqlx::Error> {
            self.calls
                .lock()
                .unwrap()
                .push((sql.to_string(), args.to_vec()));

            let rows: Vec<Result<ResultRow, sqlx::Error>> = match self.scripts.get(sql) {
                None => Vec::new(),
                Some(Script::Rows(rows)) => rows.iter().cloned().map(into_row).map(Ok).collect(),
                Some(Script::FaultAfter(rows, fault)) => rows
                    .iter()
                    .cloned()
                    .map(into_row)
                    .map(Ok)
                    .chain(std::iter::once(Err(sqlx::Error::Protocol(fault.clone()))))
                    .collect(),
                Some(Script::Reject(message)) => {
                    return Err(sqlx::Error::Protocol(message.clone()))
                }
            };
            Ok(RowCursor::from_rows(rows))
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
