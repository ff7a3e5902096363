use serde::Serialize;
use serde_json::{Map, Value};

/// One stored OAuth credential slot as reported by `/v0/management/auth-files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEntry {
    /// Resolved `auth_index`, or the entry's position in the listing
    pub index: String,
    /// Lowercased, trimmed provider name (empty when absent)
    pub provider: String,
    /// Best-effort human label (account, email, ...)
    pub display_name: String,
}

/// Usage fetched for one auth entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageResult {
    pub auth_index: String,
    pub display: String,
    /// Raw envelope returned by `/v0/management/api-call`
    pub wrapped: Value,
    /// Upstream usage payload unwrapped from the envelope
    pub body: Value,
}

/// A quota window inside a usage body, e.g. `five_hour`.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageWindow<'a> {
    pub name: &'a str,
    pub utilization: &'a Value,
    pub resets_at: Option<&'a Value>,
}

const PREFERRED_WINDOWS: [&str; 2] = ["five_hour", "seven_day"];

impl<'a> UsageWindow<'a> {
    fn from_entry(name: &'a str, value: &'a Value) -> Option<Self> {
        let window = value.as_object()?;
        let utilization = window.get("utilization")?;
        let resets_at = window.get("resets_at").or_else(|| window.get("resetsAt"));
        Some(Self {
            name,
            utilization,
            resets_at,
        })
    }

    /// Windows of a usage body in display order: `five_hour`, `seven_day`,
    /// then the remaining keys sorted. Keys without `utilization` are skipped.
    pub fn ordered(body: &'a Map<String, Value>) -> Vec<Self> {
        let mut rest: Vec<&str> = body
            .keys()
            .map(String::as_str)
            .filter(|k| !PREFERRED_WINDOWS.contains(k))
            .collect();
        rest.sort_unstable();

        let mut names: Vec<&'a str> = PREFERRED_WINDOWS.to_vec();
        names.extend(rest);

        names
            .into_iter()
            .filter_map(|name| {
                let (key, value) = body.get_key_value(name)?;
                Self::from_entry(key.as_str(), value)
            })
            .collect()
    }
}

/// Render a JSON value for plain-text output: strings without quotes,
/// everything else as compact JSON.
pub fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
