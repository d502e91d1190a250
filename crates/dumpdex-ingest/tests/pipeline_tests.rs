//! End-to-end pipeline tests over real dump files

use async_trait::async_trait;
use dumpdex_ingest::schema::INVALID_DATE;
use dumpdex_ingest::sink::{BulkResult, ItemError, ItemOutcome, SinkError};
use dumpdex_ingest::{
    IndexSink, IngestConfig, IngestPipeline, NdjsonSink, PipelineState, Record, Schema,
    SchemaSource,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::io::{Cursor, Write};
use tempfile::TempDir;

/// Keeps every batch it receives; rejects records whose `adminId` is negative
#[derive(Default)]
struct CollectingSink {
    batches: Vec<Vec<Record>>,
}

#[async_trait]
impl IndexSink for CollectingSink {
    async fn bulk_write(&mut self, records: &[Record]) -> Result<BulkResult, SinkError> {
        self.batches.push(records.to_vec());
        let items = records
            .iter()
            .map(|r| match r.get("adminId").and_then(Value::as_i64) {
                Some(id) if id < 0 => ItemOutcome::Rejected(ItemError {
                    reason: "negative admin".to_string(),
                    doc_id: None,
                }),
                _ => ItemOutcome::Indexed,
            })
            .collect();
        Ok(BulkResult { items })
    }

    fn describe(&self) -> String {
        "collecting".to_string()
    }
}

const DUMP: &str = "\
-- MySQL dump 10.13  Distrib 8.0.32
/*!40101 SET NAMES utf8mb4 */;
DROP TABLE IF EXISTS `ACTIVITYLOG`;
LOCK TABLES `ACTIVITYLOG` WRITE;
INSERT INTO `ACTIVITYLOG` VALUES (1,2,'{\\\"a\\\":1}','2021-01-01 00:00:00','2021-01-01 00:00:00','NULL'),(2,-1,NULL,'0000-00-00 00:00:00',NULL,'item-9');
INSERT INTO `USERS` VALUES (1,'someone');
INSERT INTO `ACTIVITYLOG` VALUES (3,4,'{\\\"note\\\":\\\"a, (b) and {c}\\\"}','2021-06-15 12:30:45.250','2021-06-15 12:30:45','it\\'s');
UNLOCK TABLES;
";

fn config(batch_size: usize) -> IngestConfig {
    IngestConfig {
        batch_size,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_activity_log_dump_end_to_end() {
    let mut pipeline =
        IngestPipeline::new(&config(1000), Schema::activity_log(), CollectingSink::default())
            .unwrap();

    let summary = pipeline.run(Cursor::new(DUMP)).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);

    assert_eq!(summary.lines_read, 8);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.batches, 1);

    let sink = pipeline.into_sink();
    let records: Vec<Value> = sink.batches[0]
        .iter()
        .cloned()
        .map(Value::Object)
        .collect();

    assert_eq!(
        records[0],
        json!({
            "logId": 1,
            "adminId": 2,
            "afterChange": {"a": 1},
            "createdAt": "2021-01-01T00:00:00.000Z",
            "updatedAt": "2021-01-01T00:00:00.000Z",
            "itemId": null
        })
    );
    assert_eq!(
        records[1],
        json!({
            "logId": 2,
            "adminId": -1,
            "afterChange": {},
            "createdAt": INVALID_DATE,
            "updatedAt": null,
            "itemId": "item-9"
        })
    );
    assert_eq!(records[2]["afterChange"], json!({"note": "a, (b) and {c}"}));
    assert_eq!(records[2]["createdAt"], json!("2021-06-15T12:30:45.250Z"));
    assert_eq!(records[2]["itemId"], json!("it's"));
}

#[tokio::test]
async fn test_records_keep_schema_key_set() {
    let mut pipeline =
        IngestPipeline::new(&config(10), Schema::activity_log(), CollectingSink::default())
            .unwrap();

    let dump = "INSERT INTO `ACTIVITYLOG` VALUES (1),(1,2,'{}','2021-01-01','2021-01-01','x','extra');\n";
    pipeline.run(Cursor::new(dump)).await.unwrap();

    let schema = Schema::activity_log();
    let expected: Vec<&str> = schema.field_names().collect();
    let sink = pipeline.into_sink();
    assert_eq!(sink.batches[0].len(), 2);
    for record in &sink.batches[0] {
        let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
        let mut want = expected.clone();
        keys.sort_unstable();
        want.sort_unstable();
        assert_eq!(keys, want);
    }
}

#[tokio::test]
async fn test_batches_never_exceed_maximum() {
    let row = "(1,2,'{}','2021-01-01 00:00:00','2021-01-01 00:00:00','NULL')";
    let line = format!(
        "INSERT INTO `ACTIVITYLOG` VALUES {};\n",
        vec![row; 7].join(",")
    );

    let mut pipeline =
        IngestPipeline::new(&config(3), Schema::activity_log(), CollectingSink::default())
            .unwrap();
    let summary = pipeline.run(Cursor::new(line)).await.unwrap();

    assert_eq!(summary.accepted, 7);
    let sizes: Vec<usize> = pipeline
        .into_sink()
        .batches
        .iter()
        .map(Vec::len)
        .collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[tokio::test]
async fn test_gzip_dump_to_ndjson_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("activityLog.sql.gz");
    let output = dir.path().join("activityLog.ndjson");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(DUMP.replace('\n', "\r\n").as_bytes()).unwrap();
    std::fs::write(&input, encoder.finish().unwrap()).unwrap();

    let config = IngestConfig {
        input: input.clone(),
        ..config(1)
    };
    let sink = NdjsonSink::create(&output).unwrap();
    let mut pipeline = IngestPipeline::from_config(&config, sink).unwrap();
    let summary = pipeline.run_path(&input, None).await.unwrap();

    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.batches, 3);

    let written = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["logId"], json!(1));
    assert_eq!(lines[2]["logId"], json!(3));
}

#[tokio::test]
async fn test_schema_file_and_custom_table() {
    let dir = TempDir::new().unwrap();
    let schema_path = dir.path().join("users.toml");
    std::fs::write(
        &schema_path,
        r#"
[[fields]]
name = "id"
rule = "integer"

[[fields]]
name = "profile"
rule = "json"

[[fields]]
name = "createdAt"
"#,
    )
    .unwrap();

    let config = IngestConfig {
        table: "users".to_string(),
        schema: SchemaSource::File(schema_path),
        ..config(10)
    };
    let mut pipeline = IngestPipeline::from_config(&config, CollectingSink::default()).unwrap();

    let dump = "INSERT INTO `users` VALUES (5,'{\\\"tier\\\":\\\"gold\\\"}','2022-02-02 02:02:02');\nINSERT INTO `ACTIVITYLOG` VALUES (1);\n";
    let summary = pipeline.run(Cursor::new(dump)).await.unwrap();

    assert_eq!(summary.accepted, 1);
    let sink = pipeline.into_sink();
    let record = &sink.batches[0][0];
    assert_eq!(record["id"], json!(5));
    assert_eq!(record["profile"], json!({"tier": "gold"}));
    assert_eq!(record["createdAt"], json!("2022-02-02T02:02:02.000Z"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_run() {
    let bad = IngestConfig {
        batch_size: 0,
        ..Default::default()
    };
    assert!(IngestPipeline::from_config(&bad, CollectingSink::default()).is_err());
}
