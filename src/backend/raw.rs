//! Loosely-typed backend payloads.
//!
//! [`RawRecord`] is the only type allowed to know how the backend spells its
//! fields. Every accessor is total: a missing key, a `null`, or a value of the
//! wrong JSON type all read as `None`, and the normalizer supplies defaults.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Epoch values above this are treated as milliseconds (year ~5138 in seconds).
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Value);

/// Projects share the record shape; the alias keeps signatures readable.
pub type RawProject = RawRecord;

impl RawRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// First of `keys` present with a non-null value.
    pub fn field(&self, keys: &[&str]) -> Option<&Value> {
        let obj = self.0.as_object()?;
        keys.iter()
            .filter_map(|k| obj.get(*k))
            .find(|v| !v.is_null())
    }

    /// Non-empty trimmed text. Numbers are accepted and stringified so numeric
    /// ids and string ids read the same way.
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| value_text(self.field(&[*k])?))
    }

    /// A person-ish field: either a plain string or an object carrying
    /// `name`, `login` or `username`.
    pub fn person(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.field(&[*k])? {
            obj @ Value::Object(_) => {
                RawRecord(obj.clone()).text(&["name", "login", "username", "email"])
            }
            other => value_text(other),
        })
    }

    pub fn timestamp(&self, keys: &[&str]) -> Option<DateTime<Utc>> {
        keys.iter().find_map(|k| value_timestamp(self.field(&[*k])?))
    }

    /// Nested records under the first key holding an array. `None` when no key
    /// holds an array at all, so callers can tell "absent" from "empty".
    pub fn children(&self, keys: &[&str]) -> Option<Vec<RawRecord>> {
        keys.iter().find_map(|k| match self.field(&[*k])? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter(|v| v.is_object())
                    .cloned()
                    .map(RawRecord)
                    .collect(),
            ),
            _ => None,
        })
    }

    /// Log text: a string, or an array of lines joined with newlines.
    pub fn log(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.field(&[*k])? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Array(lines) => {
                let joined = lines
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("\n");
                (!joined.trim().is_empty()).then_some(joined)
            }
            _ => None,
        })
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() || raw < 0.0 {
                return None;
            }
            if raw > EPOCH_MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(raw as i64)
            } else {
                DateTime::from_timestamp(raw as i64, 0)
            }
        }
        _ => None,
    }
}

/// RFC 3339 first, then the space-separated form some backends emit (read as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
