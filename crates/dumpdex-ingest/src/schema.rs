//! Schema coercion table
//!
//! A [`Schema`] is the ordered list of target fields for one table. Each
//! field carries a [`CoercionRule`] that turns the normalized text of its
//! column into a JSON value. Tuples are mapped by position: the i-th value
//! belongs to the i-th field.
//!
//! Coercion never fails. Bad JSON stays a string, bad timestamps become
//! [`INVALID_DATE`], bad integers become `null`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::normalize::normalize_value;

/// One typed document, keyed by field name
pub type Record = Map<String, Value>;

/// Marker emitted for timestamp columns that cannot be parsed
pub const INVALID_DATE: &str = "Invalid Date";

/// Zone-less layouts accepted for timestamp columns, read as UTC
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema has no fields")]
    Empty,

    #[error("field '{0}' appears more than once")]
    DuplicateField(String),

    #[error("unknown coercion rule '{0}' (expected integer, json, timestamp, nullable_sentinel or text)")]
    UnknownRule(String),

    #[error("row has {actual} values but the schema has {expected} fields")]
    ColumnMismatch { expected: usize, actual: usize },

    #[error("failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse schema file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How the text of one column becomes a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionRule {
    /// Base-10 integer; null, empty and non-numeric text become `null`
    Integer,
    /// Embedded JSON payload; absent becomes `{}`, unparseable stays a string
    Json,
    /// Datetime rendered as ISO-8601 UTC with milliseconds
    Timestamp,
    /// Text where the literal string `NULL` also means null
    NullableSentinel,
    /// Unchanged text or `null`
    Text,
}

impl CoercionRule {
    /// Rule for a well-known activity log column name, `Text` otherwise
    pub fn for_column(name: &str) -> Self {
        match name {
            "logId" | "adminId" => CoercionRule::Integer,
            "userAgent" | "afterChange" | "beforeChange" => CoercionRule::Json,
            "createdAt" | "updatedAt" => CoercionRule::Timestamp,
            "itemId" => CoercionRule::NullableSentinel,
            _ => CoercionRule::Text,
        }
    }

    /// Coerce one normalized value
    pub fn apply(self, value: Option<String>) -> Value {
        match self {
            CoercionRule::Integer => match value {
                Some(text) if !text.is_empty() => parse_integer(&text),
                _ => Value::Null,
            },
            CoercionRule::Json => match value {
                Some(text) if !text.is_empty() => match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(_) => Value::String(text),
                },
                _ => Value::Object(Map::new()),
            },
            CoercionRule::Timestamp => match value {
                Some(text) if !text.is_empty() => Value::String(
                    parse_timestamp(&text)
                        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
                        .unwrap_or_else(|| INVALID_DATE.to_string()),
                ),
                _ => Value::Null,
            },
            // The normalizer already maps an unquoted NULL to None; this
            // catches the quoted 'NULL' text as well.
            CoercionRule::NullableSentinel => match value {
                Some(text) if text != "NULL" => Value::String(text),
                _ => Value::Null,
            },
            CoercionRule::Text => value.map(Value::String).unwrap_or(Value::Null),
        }
    }
}

impl std::str::FromStr for CoercionRule {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" => Ok(CoercionRule::Integer),
            "json" => Ok(CoercionRule::Json),
            "timestamp" | "ts" => Ok(CoercionRule::Timestamp),
            "nullable_sentinel" | "nullable-sentinel" => Ok(CoercionRule::NullableSentinel),
            "text" | "string" => Ok(CoercionRule::Text),
            _ => Err(SchemaError::UnknownRule(s.to_string())),
        }
    }
}

impl std::fmt::Display for CoercionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoercionRule::Integer => write!(f, "integer"),
            CoercionRule::Json => write!(f, "json"),
            CoercionRule::Timestamp => write!(f, "timestamp"),
            CoercionRule::NullableSentinel => write!(f, "nullable_sentinel"),
            CoercionRule::Text => write!(f, "text"),
        }
    }
}

/// Leading signed digits, the way a lenient integer parser reads them
fn parse_integer(text: &str) -> Value {
    let text = text.trim_start();
    let sign_len = usize::from(text.starts_with(['+', '-']));
    let digits = text[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return Value::Null;
    }

    let number = &text[..sign_len + digits];
    if let Ok(n) = number.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = number.parse::<u64>() {
        return Value::from(n);
    }
    number
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// One named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub rule: CoercionRule,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, rule: CoercionRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }
}

/// Ordered field descriptors for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

/// On-disk layout of a schema file; a missing rule is inferred from the name
#[derive(Debug, Deserialize)]
struct SchemaFile {
    fields: Vec<SchemaFileField>,
}

#[derive(Debug, Deserialize)]
struct SchemaFileField {
    name: String,
    rule: Option<String>,
}

impl Schema {
    /// Build a schema, rejecting empty lists and duplicate names
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        Ok(Self { fields })
    }

    /// The `ACTIVITYLOG` table layout
    pub fn activity_log() -> Self {
        Self {
            fields: vec![
                FieldDescriptor::new("logId", CoercionRule::Integer),
                FieldDescriptor::new("adminId", CoercionRule::Integer),
                FieldDescriptor::new("afterChange", CoercionRule::Json),
                FieldDescriptor::new("createdAt", CoercionRule::Timestamp),
                FieldDescriptor::new("updatedAt", CoercionRule::Timestamp),
                FieldDescriptor::new("itemId", CoercionRule::NullableSentinel),
            ],
        }
    }

    /// Schema from bare column names, rules picked by [`CoercionRule::for_column`]
    pub fn from_columns<S: AsRef<str>>(columns: &[S]) -> Result<Self, SchemaError> {
        let fields = columns
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .map(|c| FieldDescriptor::new(c, CoercionRule::for_column(c)))
            .collect();
        Self::new(fields)
    }

    /// Parse a TOML schema
    ///
    /// ```toml
    /// [[fields]]
    /// name = "logId"
    /// rule = "integer"
    ///
    /// [[fields]]
    /// name = "createdAt"   # rule inferred: timestamp
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(text)?;
        let fields = file
            .fields
            .into_iter()
            .map(|f| {
                let rule = match f.rule {
                    Some(rule) => rule.parse()?,
                    None => CoercionRule::for_column(&f.name),
                };
                Ok(FieldDescriptor::new(f.name, rule))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        Self::new(fields)
    }

    /// Read a TOML schema file
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Normalize and coerce one raw tuple into a record
    ///
    /// With `strict` unset, surplus values are dropped and missing ones are
    /// coerced as absent, so the record always has exactly the schema's
    /// keys. With `strict` set, any length mismatch is an error.
    pub fn coerce_tuple(&self, raw: &[&str], strict: bool) -> Result<Record, SchemaError> {
        if raw.len() != self.fields.len() {
            if strict {
                return Err(SchemaError::ColumnMismatch {
                    expected: self.fields.len(),
                    actual: raw.len(),
                });
            }
            debug!(
                expected = self.fields.len(),
                actual = raw.len(),
                "Row length differs from schema, mapping by position"
            );
        }

        let mut record = Record::new();
        for (i, field) in self.fields.iter().enumerate() {
            let value = raw.get(i).and_then(|r| normalize_value(r));
            record.insert(field.name.clone(), field.rule.apply(value));
        }

        Ok(record)
    }
}
