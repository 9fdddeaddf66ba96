//! Payload shaping for REST -> MQTT republishing

use serde_json::{json, Map, Value};

pub const CONNECTOR_TYPE: &str = "akri-rest-connector";
/// エラートピックに載せるコネクタ名
pub const CONNECTOR_NAME: &str = "akri-rest-connector-test";

/// Bring the sensor endpoint's possible shapes into `{fields, count, source, original_payload}`
pub fn normalize_sensor_payload(payload: &Value) -> Option<Map<String, Value>> {
    let mut out = Map::new();
    match payload {
        Value::Array(items) => {
            out.insert("fields".into(), payload.clone());
            out.insert("count".into(), Value::from(items.len()));
            out.insert("source".into(), Value::from("list"));
        }
        Value::Object(obj) => {
            if let Some(fields) = obj.get("fields").and_then(Value::as_array) {
                let count = obj.get("count").cloned().unwrap_or_else(|| Value::from(fields.len()));
                let source = obj.get("source").cloned().unwrap_or_else(|| Value::from("fields-array"));
                out.insert("fields".into(), Value::Array(fields.clone()));
                out.insert("count".into(), count);
                out.insert("source".into(), source);
            } else if ["field_id", "value", "data_type"].iter().all(|k| obj.contains_key(*k)) {
                out.insert("fields".into(), Value::Array(vec![payload.clone()]));
                out.insert("count".into(), Value::from(1));
                out.insert("source".into(), Value::from("single-field"));
            } else {
                return None;
            }
        }
        _ => return None,
    }
    out.insert("original_payload".into(), payload.clone());
    Some(out)
}

/// Attach `connector_metadata`; merges into an existing block
pub fn attach_metadata(payload: &mut Map<String, Value>, metadata: Map<String, Value>) {
    let entry = payload
        .entry("connector_metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    match entry {
        Value::Object(existing) => existing.extend(metadata),
        other => *other = Value::Object(metadata),
    }
}

pub fn base_metadata(polling_interval_secs: u64, collection_time: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("connector_type".into(), Value::from(CONNECTOR_TYPE));
    meta.insert("polling_interval".into(), Value::from(polling_interval_secs));
    meta.insert("collection_time".into(), Value::from(collection_time));
    meta
}

pub fn error_payload(timestamp: &str, endpoint: &str, error: &str, retry_attempts: u32) -> Value {
    json!({
        "timestamp": timestamp,
        "connector": CONNECTOR_NAME,
        "endpoint": endpoint,
        "error": error,
        "retry_attempts": retry_attempts,
    })
}
