use serde::{Deserialize, Serialize};

/// A table together with its on-disk size in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub table_name: String,
    pub table_size: i64,
}

/// An index together with its table and on-disk size in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub table_name: String,
    pub index_name: String,
    pub index_size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub table_name: String,
    pub column_name: String,
}

/// A constraint and the comma-separated list of columns it covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub table_name: String,
    pub constraint_name: String,
    pub columns: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableWithoutDescription {
    pub table_name: String,
}

/// Estimated bloat of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloatedTable {
    #[serde(flatten)]
    pub table: Table,
    pub bloat_size: i64,
    pub bloat_percentage: f64,
    /// Set when column statistics were missing and the estimate is unreliable
    pub stats_not_available: bool,
}

/// Estimated bloat of a B-tree index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloatedIndex {
    #[serde(flatten)]
    pub index: Index,
    pub bloat_size: i64,
    pub bloat_percentage: f64,
    pub stats_not_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BTreeIndexOnArrayColumn {
    pub table_name: String,
    pub index_name: String,
    pub column_not_null: bool,
    pub column_name: String,
    pub index_size: i64,
}

/// A table whose sequential scans dominate its index scans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableWithMissingIndexes {
    #[serde(flatten)]
    pub table: Table,
    pub seq_scan: i64,
    pub idx_scan: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnusedIndex {
    #[serde(flatten)]
    pub index: Index,
    pub index_scans: i64,
}

/// A column backed by an owned sequence (`smallserial`, `serial`, `bigserial`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialColumn {
    #[serde(flatten)]
    pub column: Column,
    pub column_type: String,
    pub sequence_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoolColumnIndex {
    #[serde(flatten)]
    pub index: Index,
    pub column_not_null: bool,
    pub column_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectedIndex {
    pub table_name: String,
    pub intersected_indexes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexWithNullValues {
    #[serde(flatten)]
    pub index: Index,
    pub nullable_fields: String,
}

/// A partial index whose `IS NOT NULL` predicate repeats a `NOT NULL` column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexWithUnnecessaryWhereClause {
    #[serde(flatten)]
    pub index: Index,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatedIndex {
    pub table_name: String,
    pub duplicated_indexes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionWithoutDescription {
    pub function_name: String,
    pub function_signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatedForeignKey {
    #[serde(flatten)]
    pub constraint: Constraint,
    pub duplicate_constraint_name: String,
    pub duplicate_constraint_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectedForeignKey {
    #[serde(flatten)]
    pub constraint: Constraint,
    pub intersected_constraint_name: String,
    pub intersected_constraint_columns: Vec<String>,
}

/// A constraint created `NOT VALID` and never validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidConstraint {
    pub table_name: String,
    pub constraint_type: String,
    pub constraint_name: String,
}

/// Any named schema object (table, index, constraint, function, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseObject {
    pub object_name: String,
    pub object_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceOverflow {
    pub sequence_name: String,
    pub data_type: String,
    pub remaining_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyWithSerialType {
    pub table_name: String,
    pub column_name: String,
    pub column_not_null: bool,
    pub column_type: String,
    pub sequence_name: String,
}

/// A primary key with at least one character-typed column, typically a UUID
/// stored as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyWithVarchar {
    pub table_name: String,
    pub columns: Vec<String>,
}

/// Outcome class of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// No offending rows
    Passed,
    /// The check ran and found offending rows
    Violations,
    /// The check could not run (missing query, database or decode error)
    Failed,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "PASSED",
            CheckStatus::Violations => "VIOLATIONS",
            CheckStatus::Failed => "FAILED",
        }
    }
}

/// Type-erased result of one check, ready for rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSummary {
    pub label: String,
    pub status: CheckStatus,
    /// Violation or failure message; absent when the check passed
    pub message: Option<String>,
    pub records: Vec<serde_json::Value>,
}

impl CheckSummary {
    pub fn unknown(label: &str) -> Self {
        Self {
            label: label.to_string(),
            status: CheckStatus::Failed,
            message: Some(format!("unknown check: {label}")),
            records: Vec::new(),
        }
    }
}

/// Results of a health-check run against one database schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub database: String,
    pub schema: String,
    pub checks: Vec<CheckSummary>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.checks
            .iter()
            .all(|check| check.status == CheckStatus::Passed)
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks
            .iter()
            .filter(|check| check.status == status)
            .count()
    }

    pub fn violation_count(&self) -> usize {
        self.count(CheckStatus::Violations)
    }

    pub fn failure_count(&self) -> usize {
        self.count(CheckStatus::Failed)
    }
}
