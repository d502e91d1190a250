//! Pipeline driver
//!
//! Reads a dump line by line, tokenizes insert statements for the configured
//! table, coerces every tuple through the schema and hands the records to the
//! [`BatchDispatcher`]. Lines are processed strictly in order; the next line
//! is not read until the previous one's records are buffered or flushed.
//!
//! ```text
//! Idle -> Running -> Draining -> Done
//!            \           \
//!             +-----------+--> Failed   (input read error)
//! ```

use dumpdex_common::{DumpdexError, Result};
use indicatif::ProgressBar;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchDispatcher, BatchOptions, RunStats, RunSummary};
use crate::config::IngestConfig;
use crate::schema::Schema;
use crate::sink::IndexSink;
use crate::source::{open_dump, LineSource};
use crate::tokenizer::StatementTokenizer;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Done,
    Failed,
}

/// One load of one dump into one sink
pub struct IngestPipeline<S> {
    tokenizer: StatementTokenizer,
    schema: Schema,
    strict_columns: bool,
    dispatcher: BatchDispatcher<S>,
    state: PipelineState,
}

impl<S: IndexSink> IngestPipeline<S> {
    pub fn new(config: &IngestConfig, schema: Schema, sink: S) -> Result<Self> {
        config.validate()?;

        let tokenizer = StatementTokenizer::new(&config.table)
            .map_err(|e| DumpdexError::config(format!("invalid table name '{}': {e}", config.table)))?;

        let dispatcher = BatchDispatcher::new(
            sink,
            BatchOptions {
                max_batch_size: config.batch_size,
                report_interval: config.report_interval,
                error_sample_size: config.error_sample_size,
            },
        );

        Ok(Self {
            tokenizer,
            schema,
            strict_columns: config.strict_columns,
            dispatcher,
            state: PipelineState::Idle,
        })
    }

    /// Build a pipeline, resolving the schema named in `config`
    pub fn from_config(config: &IngestConfig, sink: S) -> Result<Self> {
        let schema = config.schema.resolve()?;
        Self::new(config, schema, sink)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &RunStats {
        self.dispatcher.stats()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_sink(self) -> S {
        self.dispatcher.into_sink()
    }

    /// Open `path` and run over its lines
    pub async fn run_path(&mut self, path: &Path, progress: Option<ProgressBar>) -> Result<RunSummary> {
        let reader = match open_dump(path, progress) {
            Ok(reader) => reader,
            Err(source) => {
                self.state = PipelineState::Failed;
                error!(path = %path.display(), error = %source, "Cannot open dump");
                return Err(DumpdexError::InputSource { line: 0, source });
            },
        };

        info!(
            path = %path.display(),
            table = self.tokenizer.table(),
            fields = self.schema.len(),
            sink = %self.dispatcher.sink().describe(),
            "Starting load"
        );
        self.run(reader).await
    }

    /// Run over every line of `reader`, then drain the last batch
    pub async fn run<R: BufRead>(&mut self, reader: R) -> Result<RunSummary> {
        if self.state != PipelineState::Idle {
            return Err(DumpdexError::config(format!(
                "pipeline cannot start from state {:?}",
                self.state
            )));
        }
        self.state = PipelineState::Running;
        self.dispatcher.stats_mut().restart_clock();

        let mut lines = LineSource::new(reader);
        loop {
            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(source)) => {
                    self.state = PipelineState::Failed;
                    let line = lines.line_number() + 1;
                    error!(line, error = %source, "Input read failed, aborting load");
                    return Err(DumpdexError::InputSource { line, source });
                },
                None => break,
            };

            self.dispatcher.stats_mut().lines_read += 1;
            self.process_line(&line, lines.line_number()).await;
        }

        self.state = PipelineState::Draining;
        debug!(pending = self.dispatcher.pending(), "Input exhausted, draining");
        let summary = self.dispatcher.finish().await;
        self.state = PipelineState::Done;

        Ok(summary)
    }

    async fn process_line(&mut self, line: &str, line_number: u64) {
        let tuples = match self.tokenizer.tokenize(line) {
            Ok(Some(tuples)) => tuples,
            Ok(None) => return,
            Err(e) => {
                self.dispatcher.stats_mut().malformed_lines += 1;
                warn!(line = line_number, error = %e, "Skipping malformed statement");
                return;
            },
        };

        debug!(line = line_number, tuples = tuples.len(), "Statement tokenized");

        for raw in &tuples {
            match self.schema.coerce_tuple(raw, self.strict_columns) {
                Ok(record) => {
                    self.dispatcher.add(record).await;
                },
                Err(e) => {
                    self.dispatcher.stats_mut().malformed_rows += 1;
                    warn!(line = line_number, error = %e, "Skipping malformed row");
                },
            }
        }
    }
}
