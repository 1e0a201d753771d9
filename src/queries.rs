//! Resolution of check identifiers to diagnostic statement text.

use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Snafu)]
pub enum ResourceError {
    #[snafu(display("query resource not found: {}", id))]
    NotFound { id: String },

    #[snafu(display("failed to read query resource {}: {}", path.display(), source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

type Result<T, E = ResourceError> = std::result::Result<T, E>;

/// A store of statement texts keyed by check identifier (`<name>.sql`).
///
/// Implementations must not touch the database. Callers may resolve the same
/// identifier any number of times; nothing is cached.
pub trait QuerySource: Send + Sync {
    fn load(&self, id: &str) -> Result<String>;
}

/// The diagnostic catalog shipped under `sql/`, compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedQueries;

const EMBEDDED: &[(&str, &str)] = &[
    ("bloated_indexes.sql", include_str!("../sql/bloated_indexes.sql")),
    ("bloated_tables.sql", include_str!("../sql/bloated_tables.sql")),
    (
        "btree_indexes_on_array_columns.sql",
        include_str!("../sql/btree_indexes_on_array_columns.sql"),
    ),
    (
        "columns_not_following_naming_convention.sql",
        include_str!("../sql/columns_not_following_naming_convention.sql"),
    ),
    (
        "columns_with_fixed_length_varchar.sql",
        include_str!("../sql/columns_with_fixed_length_varchar.sql"),
    ),
    (
        "columns_with_json_type.sql",
        include_str!("../sql/columns_with_json_type.sql"),
    ),
    (
        "columns_with_serial_types.sql",
        include_str!("../sql/columns_with_serial_types.sql"),
    ),
    (
        "columns_without_description.sql",
        include_str!("../sql/columns_without_description.sql"),
    ),
    (
        "duplicated_foreign_keys.sql",
        include_str!("../sql/duplicated_foreign_keys.sql"),
    ),
    (
        "duplicated_indexes.sql",
        include_str!("../sql/duplicated_indexes.sql"),
    ),
    (
        "foreign_keys_with_unmatched_column_type.sql",
        include_str!("../sql/foreign_keys_with_unmatched_column_type.sql"),
    ),
    (
        "foreign_keys_without_index.sql",
        include_str!("../sql/foreign_keys_without_index.sql"),
    ),
    (
        "functions_without_description.sql",
        include_str!("../sql/functions_without_description.sql"),
    ),
    (
        "indexes_with_boolean.sql",
        include_str!("../sql/indexes_with_boolean.sql"),
    ),
    (
        "indexes_with_null_values.sql",
        include_str!("../sql/indexes_with_null_values.sql"),
    ),
    (
        "indexes_with_unnecessary_where_clause.sql",
        include_str!("../sql/indexes_with_unnecessary_where_clause.sql"),
    ),
    (
        "intersected_foreign_keys.sql",
        include_str!("../sql/intersected_foreign_keys.sql"),
    ),
    (
        "intersected_indexes.sql",
        include_str!("../sql/intersected_indexes.sql"),
    ),
    ("invalid_indexes.sql", include_str!("../sql/invalid_indexes.sql")),
    (
        "not_valid_constraints.sql",
        include_str!("../sql/not_valid_constraints.sql"),
    ),
    (
        "objects_not_following_naming_convention.sql",
        include_str!("../sql/objects_not_following_naming_convention.sql"),
    ),
    (
        "possible_object_name_overflow.sql",
        include_str!("../sql/possible_object_name_overflow.sql"),
    ),
    (
        "primary_keys_with_serial_types.sql",
        include_str!("../sql/primary_keys_with_serial_types.sql"),
    ),
    (
        "primary_keys_with_varchar.sql",
        include_str!("../sql/primary_keys_with_varchar.sql"),
    ),
    (
        "sequence_overflow.sql",
        include_str!("../sql/sequence_overflow.sql"),
    ),
    (
        "tables_not_linked_to_others.sql",
        include_str!("../sql/tables_not_linked_to_others.sql"),
    ),
    (
        "tables_with_missing_indexes.sql",
        include_str!("../sql/tables_with_missing_indexes.sql"),
    ),
    (
        "tables_with_zero_or_one_column.sql",
        include_str!("../sql/tables_with_zero_or_one_column.sql"),
    ),
    (
        "tables_without_description.sql",
        include_str!("../sql/tables_without_description.sql"),
    ),
    (
        "tables_without_primary_key.sql",
        include_str!("../sql/tables_without_primary_key.sql"),
    ),
    ("unused_indexes.sql", include_str!("../sql/unused_indexes.sql")),
];

impl EmbeddedQueries {
    /// Identifiers of every statement in the embedded catalog.
    pub fn ids() -> impl Iterator<Item = &'static str> {
        EMBEDDED.iter().map(|(id, _)| *id)
    }
}

impl QuerySource for EmbeddedQueries {
    fn load(&self, id: &str) -> Result<String> {
        EMBEDDED
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, text)| (*text).to_string())
            .ok_or_else(|| ResourceError::NotFound { id: id.to_string() })
    }
}

/// Reads `<root>/<id>` from disk on every call.
#[derive(Debug, Clone)]
pub struct QueryDir {
    root: PathBuf,
}

impl QueryDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl QuerySource for QueryDir {
    fn load(&self, id: &str) -> Result<String> {
        let path = self.root.join(id);
        debug!("Reading query resource from {}", path.display());
        match std::fs::read_to_string(&path) {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ResourceError::NotFound { id: id.to_string() })
            }
            other => other.context(ReadSnafu { path }),
        }
    }
}

/// In-memory statement store.
#[derive(Debug, Clone, Default)]
pub struct StaticQueries {
    texts: HashMap<String, String>,
}

impl StaticQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(id.into(), text.into());
        self
    }
}

impl QuerySource for StaticQueries {
    fn load(&self, id: &str) -> Result<String> {
        self.texts
            .get(id)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound { id: id.to_string() })
    }
}
