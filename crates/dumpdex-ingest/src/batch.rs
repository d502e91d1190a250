//! Batch accumulator and dispatcher
//!
//! Records are buffered until the batch is full, then written to the sink in
//! one bulk call. The flush is awaited inside [`BatchDispatcher::add`], so
//! the caller cannot produce more records while a batch is in flight and the
//! buffer never grows past its maximum.
//!
//! Failures never stop the run: rejected records are counted and sampled in
//! the log, and a sink that fails outright costs only that batch.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_ERROR_SAMPLE_SIZE, DEFAULT_REPORT_INTERVAL_SECS};
use crate::schema::Record;
use crate::sink::IndexSink;

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_batch_size: usize,
    pub report_interval: Duration,
    /// Per-record failure reasons logged for each batch
    pub error_sample_size: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_BATCH_SIZE,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            error_sample_size: DEFAULT_ERROR_SAMPLE_SIZE,
        }
    }
}

/// Counters for one run; they only ever grow
#[derive(Debug, Clone)]
pub struct RunStats {
    pub lines_read: u64,
    /// Records the sink confirmed as stored
    pub accepted: u64,
    /// Records submitted but not stored, per-record or with their whole batch
    pub rejected: u64,
    pub batches: u64,
    pub failed_batches: u64,
    /// Lines dropped because their value groups could not be scanned
    pub malformed_lines: u64,
    /// Tuples dropped for a column count mismatch in strict mode
    pub malformed_rows: u64,
    started: Instant,
    last_report: Instant,
}

impl RunStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            lines_read: 0,
            accepted: 0,
            rejected: 0,
            batches: 0,
            failed_batches: 0,
            malformed_lines: 0,
            malformed_rows: 0,
            started: now,
            last_report: now,
        }
    }

    /// Start both clocks over at the moment the run begins
    pub(crate) fn restart_clock(&mut self) {
        let now = Instant::now();
        self.started = now;
        self.last_report = now;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Accepted records per second since the start, rounded
    pub fn rate(&self) -> u64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.accepted as f64 / secs).round() as u64
        } else {
            0
        }
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            lines_read: self.lines_read,
            accepted: self.accepted,
            rejected: self.rejected,
            batches: self.batches,
            failed_batches: self.failed_batches,
            malformed_lines: self.malformed_lines,
            malformed_rows: self.malformed_rows,
            elapsed_secs: self.elapsed().as_secs_f64(),
            rate: self.rate(),
        }
    }
}

/// Final figures of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub lines_read: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub malformed_lines: u64,
    pub malformed_rows: u64,
    pub elapsed_secs: f64,
    pub rate: u64,
}

/// What one flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,
    /// The sink answered; some records may still have been rejected
    Completed { accepted: usize, rejected: usize },
    /// The whole bulk call failed; every record in it was dropped
    Failed { dropped: usize },
}

/// Bounded record buffer in front of an [`IndexSink`]
pub struct BatchDispatcher<S> {
    sink: S,
    options: BatchOptions,
    buffer: Vec<Record>,
    stats: RunStats,
}

impl<S: IndexSink> BatchDispatcher<S> {
    pub fn new(sink: S, mut options: BatchOptions) -> Self {
        options.max_batch_size = options.max_batch_size.max(1);
        Self {
            buffer: Vec::with_capacity(options.max_batch_size),
            sink,
            options,
            stats: RunStats::new(),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    /// Records waiting for the next flush
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Buffer one record, flushing first if that fills the batch
    pub async fn add(&mut self, record: Record) -> Option<FlushOutcome> {
        self.buffer.push(record);
        if self.buffer.len() >= self.options.max_batch_size {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Write the buffered records in one bulk call
    ///
    /// The buffer is empty afterwards whatever the outcome.
    pub async fn flush(&mut self) -> FlushOutcome {
        if self.buffer.is_empty() {
            return FlushOutcome::Empty;
        }

        let submitted = self.buffer.len();
        let result = self.sink.bulk_write(&self.buffer).await;
        self.buffer.clear();
        self.stats.batches += 1;

        let outcome = match result {
            Ok(result) => {
                if result.items.len() != submitted {
                    warn!(
                        submitted,
                        reported = result.items.len(),
                        "Sink reported a different number of outcomes than records submitted"
                    );
                }

                let accepted = result.succeeded().min(submitted);
                let rejected = submitted - accepted;
                self.stats.accepted += accepted as u64;
                self.stats.rejected += rejected as u64;

                if rejected > 0 {
                    warn!(
                        batch = self.stats.batches,
                        rejected,
                        accepted,
                        "Some records in the batch were rejected"
                    );
                    for item in result.errors().take(self.options.error_sample_size) {
                        warn!(
                            reason = %item.reason,
                            doc_id = item.doc_id.as_deref().unwrap_or("-"),
                            "Rejected record"
                        );
                    }
                } else {
                    debug!(batch = self.stats.batches, accepted, "Batch indexed");
                }

                FlushOutcome::Completed { accepted, rejected }
            },
            Err(e) => {
                self.stats.failed_batches += 1;
                self.stats.rejected += submitted as u64;
                error!(
                    batch = self.stats.batches,
                    records = submitted,
                    sink = %self.sink.describe(),
                    error = %e,
                    "Bulk write failed, batch dropped"
                );
                FlushOutcome::Failed { dropped: submitted }
            },
        };

        self.maybe_report();
        outcome
    }

    fn maybe_report(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.stats.last_report) >= self.options.report_interval {
            self.stats.last_report = now;
            info!(
                lines = self.stats.lines_read,
                accepted = self.stats.accepted,
                elapsed_secs = self.stats.elapsed().as_secs(),
                rate = self.stats.rate(),
                "Progress"
            );
        }
    }

    /// Flush the remainder and return the run's figures
    pub async fn finish(&mut self) -> RunSummary {
        self.flush().await;

        let summary = self.stats.summary();
        info!(
            lines = summary.lines_read,
            accepted = summary.accepted,
            rejected = summary.rejected,
            batches = summary.batches,
            failed_batches = summary.failed_batches,
            malformed_lines = summary.malformed_lines,
            malformed_rows = summary.malformed_rows,
            elapsed_secs = format!("{:.1}", summary.elapsed_secs),
            rate = summary.rate,
            "Load finished"
        );
        summary
    }
}
