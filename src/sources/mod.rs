pub mod file;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::types::{NoticeProfile, OrganizationProfile};

/// Where notice and organization profiles come from. Fetching happens before
/// any scoring so the scoring loop never waits on I/O.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_notices(&self) -> EngineResult<Vec<NoticeProfile>>;
    async fn fetch_organizations(&self) -> EngineResult<Vec<OrganizationProfile>>;
}

const ENVELOPE_KEYS: [&str; 7] = [
    "data",
    "items",
    "results",
    "notices",
    "organizations",
    "editais",
    "tenants",
];

/// Decodes a list of records from either a bare JSON array or the array
/// found under one of the usual envelope keys (`data`, `items`, ...).
pub fn parse_records<T: DeserializeOwned>(payload: Value) -> EngineResult<Vec<T>> {
    let records = match payload {
        Value::Array(items) => items,
        Value::Object(object) => take_envelope_array(object)
            .ok_or_else(|| EngineError::invalid("payload holds no record array"))?,
        other => {
            return Err(EngineError::invalid(format!(
                "expected a record array, got {}",
                kind(&other)
            )))
        }
    };
    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            serde_json::from_value(record)
                .map_err(|e| EngineError::invalid(format!("record {idx}: {e}")))
        })
        .collect()
}

fn take_envelope_array(mut object: Map<String, Value>) -> Option<Vec<Value>> {
    for key in ENVELOPE_KEYS {
        let found = object
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned();
        if let Some(found) = found {
            match object.remove(&found) {
                Some(Value::Array(items)) => return Some(items),
                Some(Value::Object(nested)) => {
                    if let Some(items) = take_envelope_array(nested) {
                        return Some(items);
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
