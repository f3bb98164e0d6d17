use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{ConfigArgs, PipelineConfig};

mod database;
mod schema;
mod values;
pub use database::{Database, Row, DEFAULT_DATETIME_COLUMN};
pub use schema::{ColumnType, TableSchema};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("table `{0}` does not exist or was not declared")]
    UnknownTable(String),
    #[error("invalid schema for `{table}`: {reason}")]
    InvalidSchema { table: String, reason: String },
    #[error("source file {} not found", .0.display())]
    SourceNotFound(PathBuf),
    #[error("{}: expected a JSON object or a list of objects", .0.display())]
    UnsupportedShape(PathBuf),
    #[error("table `{0}` has no primary key to upsert on")]
    MissingPrimaryKey(String),
    #[error("row for `{table}` is missing primary key column `{column}`")]
    MissingKeyValue { table: String, column: String },
    #[error("table `{0}` has no full-text index")]
    NoFullTextIndex(String),
}

/// Works table: primary key `id`, full-text over `title`.
pub fn works_schema(config: &PipelineConfig) -> TableSchema {
    TableSchema::new(config.works_table(), &config.works_dir)
        .column("id", ColumnType::Text)
        .column("doi", ColumnType::Text)
        .column("title", ColumnType::Text)
        .column("source", ColumnType::Text)
        .column("is_oa", ColumnType::Integer)
        .primary_key(&["id"])
        .full_text(&["title"])
}

/// Authorships table: no primary key, full-text over `author`.
pub fn authorships_schema(config: &PipelineConfig) -> TableSchema {
    TableSchema::new(config.authorships_table(), &config.authorships_dir)
        .column("id", ColumnType::Text)
        .column("author", ColumnType::Text)
        .column("orcid", ColumnType::Text)
        .full_text(&["author"])
}

#[derive(Debug)]
pub struct TableLoad {
    pub table: String,
    pub result: Result<usize, StoreError>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub tables: Vec<TableLoad>,
}

impl LoadReport {
    pub fn rows_written(&self, table: &str) -> Option<usize> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .and_then(|t| t.result.as_ref().ok().copied())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableLoad> {
        self.tables.iter().filter(|t| t.result.is_err())
    }
}

/// Declare both tables and load their JSON files. A table that fails to load
/// is logged and recorded; the next one is still attempted.
pub fn load_tables(db: &mut Database, config: &PipelineConfig) -> Result<LoadReport, StoreError> {
    let mut report = LoadReport::default();

    for schema in [works_schema(config), authorships_schema(config)] {
        let table = schema.name.clone();
        db.create_table(schema)?;

        let has_pk = db.schema(&table).and_then(|s| s.primary_key.as_ref()).is_some();
        let result = if config.upsert && has_pk {
            db.upsert_data_into_table(&table)
        } else {
            db.insert_json_into_table(&table)
        };

        if let Err(e) = &result {
            error!("Failed to load {}: {}", table, e);
        }
        report.tables.push(TableLoad { table, result });
    }

    Ok(report)
}

#[derive(Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Upsert on the primary key instead of appending
    #[arg(short, long)]
    pub upsert: bool,

    /// Delete the database file before loading
    #[arg(short, long)]
    pub fresh: bool,
}

#[derive(Args)]
pub struct StampArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Table to stamp
    #[arg(long)]
    pub table: String,

    /// Primary key column(s) of the table
    #[arg(long, required = true, num_args = 1..)]
    pub primary_key: Vec<String>,

    /// Name of the datetime column
    #[arg(long, default_value = DEFAULT_DATETIME_COLUMN)]
    pub column: String,
}

#[derive(Args)]
pub struct DropArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Table to drop
    #[arg(long)]
    pub table: String,
}

pub fn open_database(config: &PipelineConfig) -> Result<Database> {
    Database::open(&config.db_dir, &config.db_name, config.fresh_db).with_context(|| {
        format!(
            "Failed to open {}",
            config.db_dir.join(&config.db_name).display()
        )
    })
}

pub fn run_load(args: LoadArgs) -> Result<()> {
    crate::init_tracing();

    let mut config = args.config.resolve()?;
    config.upsert |= args.upsert;
    config.fresh_db |= args.fresh;

    let mut db = open_database(&config)?;
    let report = load_tables(&mut db, &config).context("Failed to create tables")?;
    let db_path = db.path().map(|p| p.display().to_string()).unwrap_or_default();
    db.close().context("Failed to close database")?;

    let failed = report.failures().count();
    info!(
        "Loaded {} of {} tables into {}",
        report.tables.len() - failed,
        report.tables.len(),
        db_path
    );

    Ok(())
}

pub fn run_stamp(args: StampArgs) -> Result<()> {
    crate::init_tracing();

    let config = args.config.resolve()?;
    let db = open_database(&config)?;
    let pk: Vec<&str> = args.primary_key.iter().map(String::as_str).collect();

    db.add_datetime_column(&args.table, &pk, &args.column)
        .with_context(|| format!("Failed to stamp {}", args.table))?;
    db.close().context("Failed to close database")?;

    Ok(())
}

pub fn run_drop(args: DropArgs) -> Result<()> {
    crate::init_tracing();

    let config = args.config.resolve()?;
    let mut db = open_database(&config)?;

    db.drop_table(&args.table)
        .with_context(|| format!("Failed to drop {}", args.table))?;
    db.close().context("Failed to close database")?;

    Ok(())
}
