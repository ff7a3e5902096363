use crate::models::{plain_value, UsageResult, UsageWindow};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::io::{self, Write};

/// Write all results as one pretty-printed JSON array.
pub fn write_json<W: Write>(out: &mut W, results: &[UsageResult]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, results)?;
    writeln!(out)
}

/// Write a human-readable block per result.
pub fn write_summary<W: Write>(
    out: &mut W,
    provider: &str,
    results: &[UsageResult],
    pretty_body: bool,
    now: DateTime<Utc>,
) -> io::Result<()> {
    for result in results {
        writeln!(
            out,
            "[{}] auth_index={} display={}",
            provider, result.auth_index, result.display
        )?;

        let Some(body) = result.body.as_object() else {
            writeln!(out, "  body={}", plain_value(&result.body))?;
            continue;
        };

        for window in UsageWindow::ordered(body) {
            writeln!(out, "  {}", window_line(&window, now))?;
        }

        if pretty_body {
            serde_json::to_writer_pretty(&mut *out, &sorted_keys(&result.body))?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn window_line(window: &UsageWindow<'_>, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "{}: utilization={} resets_at={}",
        window.name,
        plain_value(window.utilization),
        window.resets_at.map_or_else(|| "null".to_string(), plain_value)
    );
    if let Some(reset) = window.resets_at.and_then(Value::as_str).and_then(parse_reset) {
        line.push_str(&format!(" ({})", format_reset_time(reset, now)));
    }
    line
}

/// Copy of `value` with every object's keys in lexical order.
fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), sorted_keys(&map[k])))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}

/// Reset timestamps are RFC 3339; anything else gets no hint.
fn parse_reset(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_reset_time(reset: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = reset.signed_duration_since(now);
    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours <= 0 && minutes <= 0 {
        "now".to_string()
    } else if hours < 1 {
        format!("in {} min", minutes.max(1))
    } else if hours < 24 {
        format!("in {}h", hours)
    } else {
        let days = hours / 24;
        if days == 1 {
            "in 1 day".to_string()
        } else {
            format!("in {} days", days)
        }
    }
}
