//! Newline-delimited JSON file sink for dry runs

use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{BulkResult, IndexSink, SinkError};
use crate::schema::Record;

/// Writes each record as one JSON line; every record is accepted
pub struct NdjsonSink<W: Write + Send> {
    writer: W,
    label: String,
    written: u64,
}

impl NdjsonSink<BufWriter<File>> {
    /// Create (or truncate) `path` and write records to it
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        let mut sink = Self::new(BufWriter::new(file));
        sink.label = format!("ndjson {}", path.display());
        Ok(sink)
    }
}

impl<W: Write + Send> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            label: "ndjson".to_string(),
            written: 0,
        }
    }

    /// Records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> IndexSink for NdjsonSink<W> {
    async fn bulk_write(&mut self, records: &[Record]) -> Result<BulkResult, SinkError> {
        for record in records {
            serde_json::to_writer(&mut self.writer, record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        self.written += records.len() as u64;

        Ok(BulkResult::all_indexed(records.len()))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Default dry-run output path next to the input file
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(".gz").trim_end_matches(".sql"))
        .filter(|n| !n.is_empty())
        .unwrap_or("dump");
    input.with_file_name(format!("{stem}.ndjson"))
}
