//! Schema health checks for PostgreSQL: a catalog of diagnostic queries run
//! against one schema, each mapped into typed records and classified as
//! passed, violated or failed.

pub mod checker;
pub mod config;
pub mod engine;
pub mod executor;
pub mod models;
pub mod queries;
pub mod reporter;

pub use checker::{ConnectError, SessionError, SqlChecker, CHECK_LABELS};
pub use config::CheckerConfig;
pub use engine::{CheckError, CheckReport};
pub use models::{CheckStatus, CheckSummary, HealthReport};
