//! Dumpdex - SQL dump to search index loader

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dumpdex_common::logging::{init_logging, LogConfig, LogLevel};
use dumpdex_ingest::config::{
    validate_index_name, DEFAULT_BATCH_SIZE, DEFAULT_ERROR_SAMPLE_SIZE, DEFAULT_INDEX,
    DEFAULT_INPUT, DEFAULT_OPENSEARCH_TIMEOUT_SECS, DEFAULT_OPENSEARCH_URL,
    DEFAULT_REPORT_INTERVAL_SECS, DEFAULT_TABLE,
};
use dumpdex_ingest::sink::ndjson::default_output_path;
use dumpdex_ingest::source::byte_progress_bar;
use dumpdex_ingest::{
    IndexSink, IngestConfig, IngestPipeline, NdjsonSink, OpenSearchConfig, OpenSearchSink,
    RunSummary, SchemaSource,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dumpdex")]
#[command(author, version, about = "Load SQL dump inserts into a search index")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    run: RunArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show a progress bar over the input file
    #[arg(long, global = true)]
    progress: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Dump file (.sql or .sql.gz)
    #[arg(short, long, global = true, env = "DUMPDEX_INPUT", default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Source table whose inserts are loaded
    #[arg(short, long, global = true, env = "DUMPDEX_TABLE", default_value = DEFAULT_TABLE)]
    table: String,

    /// Records per bulk request
    #[arg(short, long, global = true, env = "DUMPDEX_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Seconds between progress reports
    #[arg(long, global = true, env = "DUMPDEX_REPORT_INTERVAL_SECS", default_value_t = DEFAULT_REPORT_INTERVAL_SECS)]
    report_interval_secs: u64,

    /// Rejected-record reasons logged per batch
    #[arg(long, global = true, env = "DUMPDEX_ERROR_SAMPLE_SIZE", default_value_t = DEFAULT_ERROR_SAMPLE_SIZE)]
    error_sample_size: usize,

    /// Drop rows whose value count differs from the schema
    #[arg(long, global = true, env = "DUMPDEX_STRICT_COLUMNS")]
    strict_columns: bool,

    /// TOML schema file
    #[arg(long, global = true, env = "DUMPDEX_SCHEMA", conflicts_with = "columns")]
    schema: Option<PathBuf>,

    /// Comma-separated column names, rules inferred from the names
    #[arg(long, global = true, env = "DUMPDEX_COLUMNS", value_delimiter = ',')]
    columns: Vec<String>,
}

impl RunArgs {
    fn to_config(&self) -> IngestConfig {
        let schema = match (&self.schema, self.columns.is_empty()) {
            (Some(path), _) => SchemaSource::File(path.clone()),
            (None, false) => SchemaSource::Columns(self.columns.clone()),
            (None, true) => SchemaSource::ActivityLog,
        };

        IngestConfig {
            input: self.input.clone(),
            table: self.table.clone(),
            schema,
            batch_size: self.batch_size,
            report_interval: Duration::from_secs(self.report_interval_secs),
            error_sample_size: self.error_sample_size,
            strict_columns: self.strict_columns,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the dump into OpenSearch
    Load {
        /// Cluster URL
        #[arg(long, env = "OPENSEARCH_URL", default_value = DEFAULT_OPENSEARCH_URL)]
        url: String,

        /// Target index
        #[arg(long, env = "DUMPDEX_INDEX", default_value = DEFAULT_INDEX)]
        index: String,

        #[arg(long, env = "OPENSEARCH_USERNAME")]
        username: Option<String>,

        #[arg(long, env = "OPENSEARCH_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Skip TLS certificate verification
        #[arg(long, env = "OPENSEARCH_ACCEPT_INVALID_CERTS")]
        accept_invalid_certs: bool,

        /// Bulk request timeout in seconds
        #[arg(long, env = "OPENSEARCH_TIMEOUT_SECS", default_value_t = DEFAULT_OPENSEARCH_TIMEOUT_SECS)]
        timeout_secs: u64,
    },

    /// Parse the dump and write records as NDJSON without indexing
    Parse {
        /// Output file (defaults to the input name with .ndjson)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

async fn execute<S: IndexSink>(config: &IngestConfig, sink: S, progress: bool) -> Result<RunSummary> {
    let mut pipeline = IngestPipeline::from_config(config, sink)?;

    let bar = if progress {
        let size = std::fs::metadata(&config.input)
            .with_context(|| format!("Failed to stat {}", config.input.display()))?
            .len();
        Some(byte_progress_bar(size, &format!("Loading {}", config.input.display())))
    } else {
        None
    };

    let summary = pipeline.run_path(&config.input, bar.clone()).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    Ok(summary?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("dumpdex")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let config = cli.run.to_config();

    let summary = match cli.command {
        Command::Load {
            url,
            index,
            username,
            password,
            accept_invalid_certs,
            timeout_secs,
        } => {
            validate_index_name(&index)?;
            if accept_invalid_certs {
                warn!("TLS certificate verification is disabled");
            }

            let sink = OpenSearchSink::new(OpenSearchConfig {
                url,
                index,
                username,
                password,
                accept_invalid_certs,
                timeout: Duration::from_secs(timeout_secs),
            })
            .context("Failed to build OpenSearch client")?;

            if let Err(e) = sink.healthcheck().await {
                warn!(error = %e, "OpenSearch health check failed, continuing");
            }

            execute(&config, sink, cli.progress).await?
        },
        Command::Parse { output } => {
            let output = output.unwrap_or_else(|| default_output_path(&config.input));
            info!(output = %output.display(), "Dry run, writing records to file");
            let sink = NdjsonSink::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;

            execute(&config, sink, cli.progress).await?
        },
    };

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        "Done"
    );
    Ok(())
}
