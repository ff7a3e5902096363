//! Listing of auth entries from `/v0/management/auth-files`.
//!
//! The management API has changed field spellings over time, so every
//! logical field is probed through an ordered list of candidate keys.

use crate::error::{json_type_name, UsageError};
use crate::models::AuthEntry;
use crate::transport::Transport;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const AUTH_FILES_PATH: &str = "/v0/management/auth-files";

const LIST_KEYS: [&str; 5] = ["files", "data", "items", "auth_files", "authFiles"];
const PROVIDER_KEYS: [&str; 3] = ["provider", "auth_provider", "authProvider"];
const INDEX_KEYS: [&str; 3] = ["auth_index", "authIndex", "index"];
const DISPLAY_KEYS: [&str; 5] = ["account", "email", "name", "username", "id"];
const UNKNOWN_DISPLAY: &str = "unknown";

/// Fetch and normalize every auth entry known to the proxy.
pub async fn discover(
    transport: &dyn Transport,
    base_url: &str,
    headers: &HeaderMap,
) -> Result<Vec<AuthEntry>, UsageError> {
    let url = format!("{}{}", base_url, AUTH_FILES_PATH);
    let response = transport
        .request(Method::GET, &url, headers, None)
        .await?
        .unwrap_or(Value::Null);

    let entries = parse_entries(&response)?;
    debug!(count = entries.len(), "discovered auth entries");
    Ok(entries)
}

/// Unwrap the listing container and normalize each record. Records that are
/// not objects are skipped but still occupy a position.
pub fn parse_entries(response: &Value) -> Result<Vec<AuthEntry>, UsageError> {
    let list = unwrap_list(response).ok_or(UsageError::Shape {
        found: json_type_name(response),
    })?;

    let entries = list
        .iter()
        .enumerate()
        .filter_map(|(position, record)| match record.as_object() {
            Some(record) => Some(normalize_entry(record, position)),
            None => {
                warn!(position, "skipping non-object auth entry");
                None
            }
        })
        .collect();
    Ok(entries)
}

fn unwrap_list(response: &Value) -> Option<&Vec<Value>> {
    match response {
        Value::Array(list) => Some(list),
        Value::Object(map) => LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    }
}

fn normalize_entry(record: &Map<String, Value>, position: usize) -> AuthEntry {
    AuthEntry {
        index: pick_index(record).unwrap_or_else(|| position.to_string()),
        provider: pick_provider(record)
            .map(|p| p.trim().to_lowercase())
            .unwrap_or_default(),
        display_name: pick_display_name(record),
    }
}

fn pick_index(record: &Map<String, Value>) -> Option<String> {
    INDEX_KEYS.iter().find_map(|key| match record.get(*key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

fn pick_provider(record: &Map<String, Value>) -> Option<&str> {
    PROVIDER_KEYS
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
}

fn pick_display_name(record: &Map<String, Value>) -> String {
    DISPLAY_KEYS
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_DISPLAY)
        .to_string()
}
