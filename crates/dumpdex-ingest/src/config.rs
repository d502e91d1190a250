//! Run configuration

use dumpdex_common::{DumpdexError, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::schema::Schema;

// ============================================================================
// Run Configuration Constants
// ============================================================================

/// Default dump file name.
pub const DEFAULT_INPUT: &str = "activityLog.sql";

/// Default source table whose inserts are loaded.
pub const DEFAULT_TABLE: &str = "ACTIVITYLOG";

/// Default target index.
pub const DEFAULT_INDEX: &str = "activitylog";

/// Default number of records per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default seconds between progress reports.
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 30;

/// Default number of per-record failure reasons logged per batch.
pub const DEFAULT_ERROR_SAMPLE_SIZE: usize = 2;

/// Default OpenSearch endpoint.
pub const DEFAULT_OPENSEARCH_URL: &str = "https://localhost:9200";

/// Default bulk request timeout in seconds.
pub const DEFAULT_OPENSEARCH_TIMEOUT_SECS: u64 = 60;

/// Where the field layout of the table comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaSource {
    /// Built-in activity log layout
    #[default]
    ActivityLog,
    /// Column names in order, rules inferred from names
    Columns(Vec<String>),
    /// TOML schema file
    File(PathBuf),
}

impl SchemaSource {
    pub fn resolve(&self) -> Result<Schema> {
        match self {
            SchemaSource::ActivityLog => Ok(Schema::activity_log()),
            SchemaSource::Columns(columns) => Schema::from_columns(columns)
                .map_err(|e| DumpdexError::schema(format!("invalid column list: {e}"))),
            SchemaSource::File(path) => Schema::load(path)
                .map_err(|e| DumpdexError::schema(format!("{}: {e}", path.display()))),
        }
    }
}

/// Settings shared by every ingest run, independent of the sink
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub input: PathBuf,
    pub table: String,
    pub schema: SchemaSource,
    pub batch_size: usize,
    pub report_interval: Duration,
    pub error_sample_size: usize,
    /// Reject tuples whose length differs from the schema
    pub strict_columns: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            table: DEFAULT_TABLE.to_string(),
            schema: SchemaSource::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            error_sample_size: DEFAULT_ERROR_SAMPLE_SIZE,
            strict_columns: false,
        }
    }
}

impl IngestConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DumpdexError::config("batch size must be greater than 0"));
        }

        if self.table.trim().is_empty() {
            return Err(DumpdexError::config("table name cannot be empty"));
        }

        if self.input.as_os_str().is_empty() {
            return Err(DumpdexError::config("input path cannot be empty"));
        }

        if let SchemaSource::Columns(columns) = &self.schema {
            if columns.iter().all(|c| c.trim().is_empty()) {
                return Err(DumpdexError::config("column list cannot be empty"));
            }
        }

        Ok(())
    }
}

/// Check a target index name before any request is sent
pub fn validate_index_name(index: &str) -> Result<()> {
    if index.trim().is_empty() {
        return Err(DumpdexError::config("index name cannot be empty"));
    }
    if index.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(DumpdexError::config(format!(
            "index name '{index}' must be lowercase"
        )));
    }
    Ok(())
}
