use clap::{Args, Parser, Subcommand};
use pgixhealth::checker::{ConnectError, SqlChecker, CHECK_LABELS};
use pgixhealth::config::CheckerConfig;
use pgixhealth::models::HealthReport;
use pgixhealth::queries::QueryDir;
use pgixhealth::reporter::{ReportFormat, Reporter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PostgreSQL Schema Health Checker - Finds structural problems in tables, indexes and constraints
#[derive(Parser, Debug)]
#[command(name = "pgixhealth")]
#[command(version = "0.1.0")]
#[command(about = "PostgreSQL schema health checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "text")]
    format: ReportFormat,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Database host
    #[arg(
        short = 'H',
        long = "host",
        env = "PG_HOST",
        default_value = "localhost"
    )]
    host: String,

    /// Database port
    #[arg(long = "port", env = "PG_PORT", default_value = "5432")]
    port: u16,

    /// Database name
    #[arg(short = 'd', long = "database", env = "PG_DBNAME")]
    database: String,

    /// Username
    #[arg(short = 'u', long = "username", env = "PG_UNAME")]
    username: String,

    /// Password
    #[arg(short = 'p', long = "password", env = "PG_PASSWORD")]
    password: String,

    /// Schema to inspect (defaults to public)
    #[arg(short = 's', long = "schema", env = "PG_SCHEMA")]
    schema: Option<String>,

    /// Minimum estimated bloat, in percent, reported for tables and indexes
    #[arg(long = "bloat-limit", env = "PG_BLOAT_LIMIT", default_value = "30.0")]
    bloat_limit: f64,

    /// Report sequences with less remaining capacity than this, in percent
    #[arg(
        long = "remaining-percentage",
        env = "PG_REMAINING_PERCENTAGE",
        default_value = "10.0"
    )]
    remaining_percentage: f64,

    /// Seconds to wait for a connection before giving up
    #[arg(long = "acquire-timeout", env = "PG_ACQUIRE_TIMEOUT", default_value = "30")]
    acquire_timeout: u64,
}

impl ConnectionArgs {
    fn into_config(self) -> CheckerConfig {
        let mut config = CheckerConfig::from_connection_params(
            self.host,
            self.port,
            self.database,
            self.username,
            self.password,
            self.schema,
            self.bloat_limit,
            self.remaining_percentage,
        );
        config.acquire_timeout_secs = self.acquire_timeout;
        config
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a single PostgreSQL database
    Run {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Read check queries from this directory instead of the built-in catalog
        #[arg(long = "sql-dir")]
        sql_dir: Option<PathBuf>,

        /// Run only this check (repeatable); see `list`
        #[arg(long = "check", value_name = "LABEL")]
        checks: Vec<String>,
    },
    /// Check multiple databases from a YAML config file
    Config {
        /// Path to YAML config file
        #[arg(short = 'c', long = "config")]
        config_path: String,

        /// Read check queries from this directory instead of the built-in catalog
        #[arg(long = "sql-dir")]
        sql_dir: Option<PathBuf>,
    },
    /// List the available checks
    List,
}

async fn connect(
    config: &CheckerConfig,
    sql_dir: Option<&PathBuf>,
) -> Result<SqlChecker, ConnectError> {
    match sql_dir {
        Some(dir) => SqlChecker::connect_with(config, QueryDir::new(dir.clone())).await,
        None => SqlChecker::connect(config).await,
    }
}

async fn check(checker: &mut SqlChecker, checks: &[String]) -> HealthReport {
    let report = if checks.is_empty() {
        checker.run_all().await
    } else {
        checker.run_selected(checks).await
    };

    if checker.is_connected() {
        if let Err(err) = checker.close().await {
            warn!("Failed to close connection: {err}");
        }
    }
    report
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let reports = match cli.command {
        Commands::Run {
            connection,
            sql_dir,
            checks,
        } => {
            let config = connection.into_config();
            info!("Checking database: {}", config.database);

            let mut checker = connect(&config, sql_dir.as_ref()).await?;
            vec![check(&mut checker, &checks).await]
        }
        Commands::Config {
            config_path,
            sql_dir,
        } => {
            info!("Loading config from: {}", config_path);
            let configs = CheckerConfig::from_config_file(&config_path)?;

            let mut reports = Vec::with_capacity(configs.len());
            for config in configs {
                info!("Checking database: {}", config.database);
                // One unreachable database must not hide the others
                let mut checker = match connect(&config, sql_dir.as_ref()).await {
                    Ok(checker) => checker,
                    Err(err) => {
                        warn!("{err}");
                        err.into_session()
                    }
                };
                reports.push(check(&mut checker, &[]).await);
            }
            reports
        }
        Commands::List => {
            for label in CHECK_LABELS {
                println!("{label}");
            }
            return Ok(ExitCode::SUCCESS);
        }
    };

    let reporter = Reporter::new(cli.format);
    reporter.report(&reports)?;

    if reports.iter().all(HealthReport::is_healthy) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
