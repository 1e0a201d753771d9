use crate::config::CheckerConfig;
use crate::engine::{run_check, CheckReport};
use crate::executor::{CheckArg, PgExecutor, StatementExecutor};
use crate::models::{
    BTreeIndexOnArrayColumn, BloatedIndex, BloatedTable, BoolColumnIndex, CheckSummary, Column,
    Constraint, DatabaseObject, DuplicatedForeignKey, DuplicatedIndex, FunctionWithoutDescription,
    HealthReport, Index, IndexWithNullValues, IndexWithUnnecessaryWhereClause, IntersectedForeignKey,
    IntersectedIndex, InvalidConstraint, PrimaryKeyWithSerialType, PrimaryKeyWithVarchar,
    SequenceOverflow, SerialColumn, Table, TableWithMissingIndexes, TableWithoutDescription,
    UnusedIndex,
};
use crate::queries::{EmbeddedQueries, QuerySource};
use serde::de::DeserializeOwned;
use snafu::{OptionExt, ResultExt, Snafu};
use std::fmt::{self, Debug};
use tracing::{debug, info};

#[derive(Debug, Snafu)]
pub enum SessionError {
    #[snafu(display("No open database connection to close"))]
    NothingToClose,
}

/// Connecting failed. The session is still handed back, disconnected, so the
/// caller can inspect it or report every check as failed.
#[derive(Debug, Snafu)]
#[snafu(display("Failed to connect to database {}: {}", database, source))]
pub struct ConnectError {
    database: String,
    source: sqlx::Error,
    session: Box<SqlChecker>,
}

impl ConnectError {
    pub fn sqlx_error(&self) -> &sqlx::Error {
        &self.source
    }

    pub fn session(&self) -> &SqlChecker {
        &self.session
    }

    pub fn into_session(self) -> SqlChecker {
        *self.session
    }
}

/// Every check label, in catalog order.
pub const CHECK_LABELS: &[&str] = &[
    "tables_without_description",
    "bloated_indexes",
    "bloated_tables",
    "btree_indexes_on_array_columns",
    "columns_not_following_naming_convention",
    "columns_with_fixed_length_varchar",
    "columns_with_json_type",
    "columns_without_description",
    "tables_not_linked_to_others",
    "tables_with_zero_or_one_column",
    "tables_without_primary_key",
    "tables_with_missing_indexes",
    "invalid_indexes",
    "unused_indexes",
    "columns_with_serial_types",
    "indexes_with_boolean",
    "intersected_indexes",
    "indexes_with_null_values",
    "indexes_with_unnecessary_where_clause",
    "duplicated_indexes",
    "functions_without_description",
    "duplicated_foreign_keys",
    "intersected_foreign_keys",
    "foreign_keys_without_index",
    "foreign_keys_with_unmatched_column_type",
    "not_valid_constraints",
    "possible_object_name_overflow",
    "objects_not_following_naming_convention",
    "sequence_overflow",
    "primary_keys_with_serial_types",
    "primary_keys_with_varchar",
];

/// A health-check session bound to one database schema.
///
/// Each `check_*` method runs one diagnostic statement against the configured
/// schema. A method never fails as a whole: the outcome, including any
/// connection or decoding problem, is carried by the returned [`CheckReport`].
pub struct SqlChecker<E = PgExecutor> {
    executor: Option<E>,
    queries: Box<dyn QuerySource>,
    database: String,
    schema_name: String,
    bloat_limit: f64,
    remaining_percentage_threshold: f64,
}

impl<E: Debug> Debug for SqlChecker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlChecker")
            .field("executor", &self.executor)
            .field("database", &self.database)
            .field("schema_name", &self.schema_name)
            .field("bloat_limit", &self.bloat_limit)
            .field(
                "remaining_percentage_threshold",
                &self.remaining_percentage_threshold,
            )
            .finish_non_exhaustive()
    }
}

impl SqlChecker<PgExecutor> {
    /// Opens a pool against `config` using the embedded query catalog.
    pub async fn connect(config: &CheckerConfig) -> Result<Self, ConnectError> {
        Self::connect_with(config, EmbeddedQueries).await
    }

    pub async fn connect_with(
        config: &CheckerConfig,
        queries: impl QuerySource + 'static,
    ) -> Result<Self, ConnectError> {
        info!(
            "Connecting to PostgreSQL at {}:{}",
            config.host, config.port
        );

        match PgExecutor::connect(
            &config.connection_string(),
            config.max_connections,
            config.acquire_timeout(),
        )
        .await
        {
            Ok(executor) => {
                info!("Successfully connected to database: {}", config.database);
                Ok(Self::with_executor(executor, queries, config))
            }
            Err(source) => Err(source).context(ConnectSnafu {
                database: &config.database,
                session: Box::new(Self::disconnected(config, queries)),
            }),
        }
    }
}

impl<E: StatementExecutor> SqlChecker<E> {
    pub fn with_executor(
        executor: E,
        queries: impl QuerySource + 'static,
        config: &CheckerConfig,
    ) -> Self {
        Self::assemble(Some(executor), Box::new(queries), config)
    }

    /// A session with no connection; every check fails with a
    /// not-connected error.
    pub fn disconnected(config: &CheckerConfig, queries: impl QuerySource + 'static) -> Self {
        Self::assemble(None, Box::new(queries), config)
    }

    fn assemble(
        executor: Option<E>,
        queries: Box<dyn QuerySource>,
        config: &CheckerConfig,
    ) -> Self {
        Self {
            executor,
            queries,
            database: config.database.clone(),
            schema_name: config.schema_name().to_string(),
            bloat_limit: config.bloat_limit,
            remaining_percentage_threshold: config.remaining_percentage_threshold,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn is_connected(&self) -> bool {
        self.executor.is_some()
    }

    /// Releases the connection pool. Closing a session that holds no
    /// connection, including one already closed, is an error.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        let executor = self.executor.take().context(NothingToCloseSnafu)?;
        executor.close().await;
        info!("Closed connection to database: {}", self.database);
        Ok(())
    }

    async fn check<T>(&self, id: &str, prefix: &str, extra: &[CheckArg]) -> CheckReport<T>
    where
        T: DeserializeOwned + Debug,
    {
        run_check(
            self.executor.as_ref(),
            self.queries.as_ref(),
            &self.schema_name,
            id,
            prefix,
            extra,
        )
        .await
    }

    pub async fn check_tables_without_description(&self) -> CheckReport<TableWithoutDescription> {
        self.check(
            "tables_without_description.sql",
            "TABLES WITHOUT DESCRIPTION: ",
            &[],
        )
        .await
    }

    /// Indexes whose estimated bloat exceeds the session's bloat limit.
    pub async fn check_bloated_indexes(&self) -> CheckReport<BloatedIndex> {
        self.check(
            "bloated_indexes.sql",
            "DETECTED BLOATED INDEXES: ",
            &[CheckArg::from(self.bloat_limit)],
        )
        .await
    }

    /// Tables whose estimated bloat exceeds the session's bloat limit.
    pub async fn check_bloated_tables(&self) -> CheckReport<BloatedTable> {
        self.check(
            "bloated_tables.sql",
            "DETECTED BLOATED TABLES: ",
            &[CheckArg::from(self.bloat_limit)],
        )
        .await
    }

    pub async fn check_btree_indexes_on_array_columns(
        &self,
    ) -> CheckReport<BTreeIndexOnArrayColumn> {
        self.check(
            "btree_indexes_on_array_columns.sql",
            "DETECTED B-Tree INDEXES ON ARRAY COLUMNS: ",
            &[],
        )
        .await
    }

    /// Columns whose names need quoting (upper case, spaces, reserved words).
    pub async fn check_columns_not_following_naming_convention(&self) -> CheckReport<Column> {
        self.check(
            "columns_not_following_naming_convention.sql",
            "DETECTED COLUMNS NOT FOLLOWING NAME CONVENTION: ",
            &[],
        )
        .await
    }

    pub async fn check_columns_with_fixed_length_varchar(&self) -> CheckReport<Column> {
        self.check(
            "columns_with_fixed_length_varchar.sql",
            "DETECTED COLUMNS WITH FIXED LENGTH VARCHAR: ",
            &[],
        )
        .await
    }

    pub async fn check_columns_with_json_type(&self) -> CheckReport<Column> {
        self.check(
            "columns_with_json_type.sql",
            "DETECTED COLUMNS WITH JSON TYPE: ",
            &[],
        )
        .await
    }

    pub async fn check_columns_without_description(&self) -> CheckReport<Column> {
        self.check(
            "columns_without_description.sql",
            "DETECTED COLUMNS WITHOUT DESCRIPTION: ",
            &[],
        )
        .await
    }

    pub async fn check_tables_not_linked_to_others(&self) -> CheckReport<Table> {
        self.check(
            "tables_not_linked_to_others.sql",
            "DETECTED TABLES NOT LINKED TO OTHERS: ",
            &[],
        )
        .await
    }

    pub async fn check_tables_with_zero_or_one_column(&self) -> CheckReport<Table> {
        self.check(
            "tables_with_zero_or_one_column.sql",
            "DETECTED TABLES WITH ZERO OR ONE COLUMN: ",
            &[],
        )
        .await
    }

    pub async fn check_tables_without_pk(&self) -> CheckReport<Table> {
        self.check(
            "tables_without_primary_key.sql",
            "DETECTED TABLES WITHOUT PRIMARY KEY: ",
            &[],
        )
        .await
    }

    /// Tables read mostly by sequential scans.
    pub async fn check_tables_with_missing_indexes(&self) -> CheckReport<TableWithMissingIndexes> {
        self.check(
            "tables_with_missing_indexes.sql",
            "DETECTED TABLES WITH MISSING INDEXES: ",
            &[],
        )
        .await
    }

    pub async fn check_invalid_indexes(&self) -> CheckReport<Index> {
        self.check("invalid_indexes.sql", "DETECTED INVALID INDEXES: ", &[])
            .await
    }

    pub async fn check_unused_indexes(&self) -> CheckReport<UnusedIndex> {
        self.check("unused_indexes.sql", "DETECTED UNUSED INDEXES: ", &[])
            .await
    }

    pub async fn check_serial_columns(&self) -> CheckReport<SerialColumn> {
        self.check(
            "columns_with_serial_types.sql",
            "DETECTED SERIAL COLUMNS: ",
            &[],
        )
        .await
    }

    pub async fn check_indexes_with_boolean(&self) -> CheckReport<BoolColumnIndex> {
        self.check(
            "indexes_with_boolean.sql",
            "DETECTED INDEXES WITH BOOLEAN: ",
            &[],
        )
        .await
    }

    pub async fn check_intersected_indexes(&self) -> CheckReport<IntersectedIndex> {
        self.check(
            "intersected_indexes.sql",
            "DETECTED INTERSECTED INDEXES: ",
            &[],
        )
        .await
    }

    pub async fn check_indexes_with_null_values(&self) -> CheckReport<IndexWithNullValues> {
        self.check(
            "indexes_with_null_values.sql",
            "DETECTED INDEXES WITH NULL VALUES: ",
            &[],
        )
        .await
    }

    pub async fn check_indexes_with_unnecessary_where_clause(
        &self,
    ) -> CheckReport<IndexWithUnnecessaryWhereClause> {
        self.check(
            "indexes_with_unnecessary_where_clause.sql",
            "DETECTED INDEXES WITH UNNECESSARY WHERE CLAUSE: ",
            &[],
        )
        .await
    }

    pub async fn check_duplicated_indexes(&self) -> CheckReport<DuplicatedIndex> {
        self.check(
            "duplicated_indexes.sql",
            "DETECTED DUPLICATED INDEXES: ",
            &[],
        )
        .await
    }

    pub async fn check_functions_without_description(
        &self,
    ) -> CheckReport<FunctionWithoutDescription> {
        self.check(
            "functions_without_description.sql",
            "DETECTED FUNCTIONS WITHOUT DESCRIPTION: ",
            &[],
        )
        .await
    }

    pub async fn check_duplicated_foreign_keys(&self) -> CheckReport<DuplicatedForeignKey> {
        self.check(
            "duplicated_foreign_keys.sql",
            "DETECTED DUPLICATED FOREIGN KEYS: ",
            &[],
        )
        .await
    }

    /// Foreign keys whose column sets overlap without being identical.
    pub async fn check_intersected_foreign_keys(&self) -> CheckReport<IntersectedForeignKey> {
        self.check(
            "intersected_foreign_keys.sql",
            "DETECTED INTERSECTED FOREIGN KEYS: ",
            &[],
        )
        .await
    }

    pub async fn check_fk_without_index(&self) -> CheckReport<Constraint> {
        self.check(
            "foreign_keys_without_index.sql",
            "DETECTED FOREIGN KEYS WITHOUT INDEXES: ",
            &[],
        )
        .await
    }

    pub async fn check_fk_with_unmatched_column_type(&self) -> CheckReport<Constraint> {
        self.check(
            "foreign_keys_with_unmatched_column_type.sql",
            "DETECTED FOREIGN KEYS WITH UNMATCHED COLUMN TYPE: ",
            &[],
        )
        .await
    }

    pub async fn check_not_valid_constraints(&self) -> CheckReport<InvalidConstraint> {
        self.check(
            "not_valid_constraints.sql",
            "DETECTED INVALID CONSTRAINTS: ",
            &[],
        )
        .await
    }

    /// Objects whose names reach the 63-byte identifier limit and were
    /// likely truncated.
    pub async fn check_possible_object_name_overflow(&self) -> CheckReport<DatabaseObject> {
        self.check(
            "possible_object_name_overflow.sql",
            "DETECTED POSSIBLE OBJECT NAME OVERFLOW: ",
            &[],
        )
        .await
    }

    pub async fn check_objects_not_following_naming_convention(
        &self,
    ) -> CheckReport<DatabaseObject> {
        self.check(
            "objects_not_following_naming_convention.sql",
            "DETECTED OBJECTS NOT FOLLOWING NAME CONVENTIONS: \n",
            &[],
        )
        .await
    }

    /// Sequences with less remaining capacity than the session's threshold.
    pub async fn check_sequence_overflow(&self) -> CheckReport<SequenceOverflow> {
        self.check(
            "sequence_overflow.sql",
            "DETECTED SEQUENCE OVERFLOW: ",
            &[CheckArg::from(self.remaining_percentage_threshold)],
        )
        .await
    }

    pub async fn check_primary_keys_with_serial_types(
        &self,
    ) -> CheckReport<PrimaryKeyWithSerialType> {
        self.check(
            "primary_keys_with_serial_types.sql",
            "DETECTED PRIMARY KEY WITH SERIAL TYPE: ",
            &[],
        )
        .await
    }

    pub async fn check_primary_keys_with_varchar(&self) -> CheckReport<PrimaryKeyWithVarchar> {
        self.check(
            "primary_keys_with_varchar.sql",
            "DETECTED PRIMARY KEY WITH UUID VARCHAR: ",
            &[],
        )
        .await
    }

    /// Runs the check registered under `label`. Unknown labels come back as
    /// a failed summary.
    pub async fn run_check_by_label(&self, label: &str) -> CheckSummary {
        match label {
            "tables_without_description" => {
                self.check_tables_without_description().await.summarize()
            }
            "bloated_indexes" => self.check_bloated_indexes().await.summarize(),
            "bloated_tables" => self.check_bloated_tables().await.summarize(),
            "btree_indexes_on_array_columns" => {
                self.check_btree_indexes_on_array_columns().await.summarize()
            }
            "columns_not_following_naming_convention" => self
                .check_columns_not_following_naming_convention()
                .await
                .summarize(),
            "columns_with_fixed_length_varchar" => {
                self.check_columns_with_fixed_length_varchar().await.summarize()
            }
            "columns_with_json_type" => self.check_columns_with_json_type().await.summarize(),
            "columns_without_description" => {
                self.check_columns_without_description().await.summarize()
            }
            "tables_not_linked_to_others" => {
                self.check_tables_not_linked_to_others().await.summarize()
            }
            "tables_with_zero_or_one_column" => {
                self.check_tables_with_zero_or_one_column().await.summarize()
            }
            "tables_without_primary_key" => self.check_tables_without_pk().await.summarize(),
            "tables_with_missing_indexes" => {
                self.check_tables_with_missing_indexes().await.summarize()
            }
            "invalid_indexes" => self.check_invalid_indexes().await.summarize(),
            "unused_indexes" => self.check_unused_indexes().await.summarize(),
            "columns_with_serial_types" => self.check_serial_columns().await.summarize(),
            "indexes_with_boolean" => self.check_indexes_with_boolean().await.summarize(),
            "intersected_indexes" => self.check_intersected_indexes().await.summarize(),
            "indexes_with_null_values" => self.check_indexes_with_null_values().await.summarize(),
            "indexes_with_unnecessary_where_clause" => self
                .check_indexes_with_unnecessary_where_clause()
                .await
                .summarize(),
            "duplicated_indexes" => self.check_duplicated_indexes().await.summarize(),
            "functions_without_description" => {
                self.check_functions_without_description().await.summarize()
            }
            "duplicated_foreign_keys" => self.check_duplicated_foreign_keys().await.summarize(),
            "intersected_foreign_keys" => self.check_intersected_foreign_keys().await.summarize(),
            "foreign_keys_without_index" => self.check_fk_without_index().await.summarize(),
            "foreign_keys_with_unmatched_column_type" => {
                self.check_fk_with_unmatched_column_type().await.summarize()
            }
            "not_valid_constraints" => self.check_not_valid_constraints().await.summarize(),
            "possible_object_name_overflow" => {
                self.check_possible_object_name_overflow().await.summarize()
            }
            "objects_not_following_naming_convention" => self
                .check_objects_not_following_naming_convention()
                .await
                .summarize(),
            "sequence_overflow" => self.check_sequence_overflow().await.summarize(),
            "primary_keys_with_serial_types" => {
                self.check_primary_keys_with_serial_types().await.summarize()
            }
            "primary_keys_with_varchar" => self.check_primary_keys_with_varchar().await.summarize(),
            unknown => CheckSummary::unknown(unknown),
        }
    }

    /// Runs every check in catalog order.
    pub async fn run_all(&self) -> HealthReport {
        self.run_selected(CHECK_LABELS).await
    }

    /// Runs the named checks one after another, in the order given.
    pub async fn run_selected<S: AsRef<str>>(&self, labels: &[S]) -> HealthReport {
        info!(
            "Running {} check(s) against {}.{}",
            labels.len(),
            self.database,
            self.schema_name
        );

        let mut checks = Vec::with_capacity(labels.len());
        for label in labels {
            let summary = self.run_check_by_label(label.as_ref()).await;
            debug!(
                "{}: {} ({} record(s))",
                summary.label,
                summary.status.as_str(),
                summary.records.len()
            );
            checks.push(summary);
        }

        let report = HealthReport {
            database: self.database.clone(),
            schema: self.schema_name.clone(),
            checks,
        };
        info!(
            "Finished {}.{}: {} violation(s), {} failure(s)",
            report.database,
            report.schema,
            report.violation_count(),
            report.failure_count()
        );
        report
    }
}
