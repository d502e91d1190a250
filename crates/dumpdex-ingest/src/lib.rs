//! Dumpdex Ingest Library
//!
//! Loads the rows of a `mysqldump`-style SQL dump into a search index.
//!
//! # Pipeline
//!
//! - **tokenizer**: recovers row tuples from `INSERT INTO <table> VALUES (...),(...);` lines
//! - **normalize**: strips SQL quoting and escapes from one field
//! - **schema**: maps each tuple position to a typed JSON field
//! - **batch**: buffers records and writes them to the sink in bulk
//! - **pipeline**: drives a whole run, line by line
//!
//! # Example
//!
//! ```no_run
//! use dumpdex_ingest::{IngestConfig, IngestPipeline, NdjsonSink};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::default();
//!     let sink = NdjsonSink::create(Path::new("activityLog.ndjson"))?;
//!     let mut pipeline = IngestPipeline::from_config(&config, sink)?;
//!     let summary = pipeline.run_path(&config.input, None).await?;
//!     println!("{} records", summary.accepted);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod batch;
pub mod config;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod tokenizer;

pub use batch::{BatchDispatcher, BatchOptions, FlushOutcome, RunStats, RunSummary};
pub use config::{IngestConfig, SchemaSource};
pub use pipeline::{IngestPipeline, PipelineState};
pub use schema::{CoercionRule, FieldDescriptor, Record, Schema};
pub use sink::{BulkResult, IndexSink, NdjsonSink, OpenSearchConfig, OpenSearchSink, SinkError};
pub use tokenizer::StatementTokenizer;
