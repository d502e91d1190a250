//! Index sinks
//!
//! A sink takes one batch of records in a single bulk call and reports, per
//! record and in submission order, whether it was stored. A sink that fails
//! as a whole returns [`SinkError`]; the dispatcher treats that as zero
//! records stored.

pub mod ndjson;
pub mod opensearch;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::schema::Record;

pub use ndjson::NdjsonSink;
pub use opensearch::{OpenSearchConfig, OpenSearchSink};

/// Whole-call failures of a bulk write
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("bulk request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("index service returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to encode or decode bulk payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write records: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the sink refused one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub reason: String,
    pub doc_id: Option<String>,
}

/// Outcome for one submitted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Indexed,
    Rejected(ItemError),
}

/// Per-record outcomes of one bulk call, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResult {
    pub items: Vec<ItemOutcome>,
}

impl BulkResult {
    /// Result where each of `count` records was stored
    pub fn all_indexed(count: usize) -> Self {
        Self {
            items: vec![ItemOutcome::Indexed; count],
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, ItemOutcome::Indexed))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ItemError> {
        self.items.iter().filter_map(|item| match item {
            ItemOutcome::Rejected(err) => Some(err),
            ItemOutcome::Indexed => None,
        })
    }
}

/// Destination for batches of typed records
#[async_trait]
pub trait IndexSink: Send {
    /// Submit one batch in a single call
    async fn bulk_write(&mut self, records: &[Record]) -> Result<BulkResult, SinkError>;

    /// Short label used in logs
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(reason: &str) -> ItemOutcome {
        ItemOutcome::Rejected(ItemError {
            reason: reason.to_string(),
            doc_id: None,
        })
    }

    #[test]
    fn test_bulk_result_counts() {
        let result = BulkResult {
            items: vec![
                ItemOutcome::Indexed,
                rejected("mapper_parsing_exception"),
                ItemOutcome::Indexed,
                rejected("version_conflict"),
            ],
        };

        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 2);
        let reasons: Vec<&str> = result.errors().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["mapper_parsing_exception", "version_conflict"]);
    }

    #[test]
    fn test_all_indexed() {
        let result = BulkResult::all_indexed(3);
        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.failed(), 0);
        assert!(BulkResult::default().items.is_empty());
    }
}
