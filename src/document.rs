use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::bigquery::client::QueryError;

/// Key under which the sync provenance is stored in the document.
pub const SYNC_KEY: &str = "bigquery_sync";

/// Label written into `bigquery_sync.source`.
pub const SYNC_SOURCE: &str = "BigQuery Rust Sync";

/// The JSON payload of the latest export.  Only `recordCount` and
/// `lastUpdated` are ever looked at, everything else is passed through
/// in its original key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub synced_at: String,
    pub source: String,
    pub bigquery_updated: Option<String>,
    pub export_timestamp: Option<String>,
}

impl Document {
    pub fn new(map: Map<String, Value>) -> Self {
        Document(map)
    }

    /// Parse the `json_data` column.  The payload has to be a JSON object.
    pub fn from_json_str(s: &str) -> Result<Document, QueryError> {
        match serde_json::from_str::<Value>(s).map_err(QueryError::Payload)? {
            Value::Object(map) => Ok(Document(map)),
            other => Err(QueryError::PayloadNotObject(json_kind(&other))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn record_count(&self) -> Option<&Value> {
        self.0.get("recordCount")
    }

    pub fn last_updated(&self) -> Option<&Value> {
        self.0.get("lastUpdated")
    }

    /// Attach the sync provenance, replacing any earlier one.
    pub fn stamp(&mut self, metadata: &SyncMetadata) {
        let value = json!({
            "synced_at": metadata.synced_at,
            "source": metadata.source,
            "bigquery_updated": metadata.bigquery_updated,
            "export_timestamp": metadata.export_timestamp,
        });
        self.0.insert(SYNC_KEY.to_string(), value);
    }

    pub fn sync_metadata(&self) -> Option<SyncMetadata> {
        self.0
            .get(SYNC_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Two space indent, non-ASCII characters are written as is.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Render a top level field for a log line, `default` if it is missing.
pub fn display_field(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
