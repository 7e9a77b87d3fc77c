use crate::backend::raw::{RawProject, RawRecord};
use color_eyre::eyre::{eyre, Result};
use serde_json::Value;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10 MB

/// Keys a listing response may wrap its records under.
const LIST_WRAPPER_KEYS: &[&str] = &["pipelines", "runs", "data", "items"];

/// A backend payload split into its pipeline and project records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub pipelines: Vec<RawRecord>,
    pub projects: Vec<RawProject>,
}

fn check_response_size(json: &str) -> Result<()> {
    if json.len() > MAX_RESPONSE_SIZE {
        return Err(eyre!(
            "Response too large ({:.1} MB, max {} MB)",
            json.len() as f64 / (1024.0 * 1024.0),
            MAX_RESPONSE_SIZE / (1024 * 1024)
        ));
    }
    Ok(())
}

/// Parses a pipeline listing. Accepts a bare array or an object wrapping the
/// array under one of [`LIST_WRAPPER_KEYS`]. Malformed JSON is an error;
/// malformed individual records are not (the normalizer defaults them).
pub fn parse_records(json: &str) -> Result<Vec<RawRecord>> {
    Ok(parse_snapshot(json)?.pipelines)
}

pub fn parse_snapshot(json: &str) -> Result<Snapshot> {
    check_response_size(json)?;
    let value: Value = serde_json::from_str(json)?;
    match value {
        Value::Array(items) => Ok(Snapshot {
            pipelines: into_records(items),
            projects: Vec::new(),
        }),
        Value::Object(mut obj) => {
            let pipelines = LIST_WRAPPER_KEYS
                .iter()
                .find_map(|k| match obj.remove(*k) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| {
                    eyre!(
                        "Expected a pipeline array or an object with one of: {}",
                        LIST_WRAPPER_KEYS.join(", ")
                    )
                })?;
            let projects = match obj.remove("projects") {
                Some(Value::Array(items)) => into_records(items),
                _ => Vec::new(),
            };
            Ok(Snapshot {
                pipelines: into_records(pipelines),
                projects,
            })
        }
        _ => Err(eyre!("Expected a pipeline array or object, got a scalar")),
    }
}

/// Single pipeline detail: a bare object, or one wrapped under `pipeline`/`run`/`data`.
pub fn parse_detail(json: &str) -> Result<RawRecord> {
    check_response_size(json)?;
    let value: Value = serde_json::from_str(json)?;
    let Value::Object(mut obj) = value else {
        return Err(eyre!("Expected a pipeline object"));
    };
    for key in ["pipeline", "run", "data"] {
        if matches!(obj.get(key), Some(Value::Object(_))) {
            if let Some(inner) = obj.remove(key) {
                return Ok(RawRecord::new(inner));
            }
        }
    }
    Ok(RawRecord::new(Value::Object(obj)))
}

fn into_records(items: Vec<Value>) -> Vec<RawRecord> {
    items.into_iter().map(RawRecord::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::normalizer::normalize_all;
    use crate::status::Status;

    const LISTING_JSON: &str = r#"[
        {
            "id": 123,
            "name": "CI",
            "branch": "main",
            "commit_message": "Bump deps",
            "author": "ada",
            "status": "success",
            "duration": 300,
            "started_at": "2024-01-15T10:00:00Z"
        }
    ]"#;

    #[test]
    fn parse_bare_array() {
        let records = parse_records(LISTING_JSON).unwrap();
        assert_eq!(records.len(), 1);
        let runs = normalize_all(&records);
        assert_eq!(runs[0].id, "123");
        assert_eq!(runs[0].status, Status::Success);
        assert_eq!(runs[0].duration.to_string(), "5m 0s");
    }

    #[test]
    fn parse_wrapped_listing_with_projects() {
        let json = r#"{"pipelines": [{"id": 1}, {"id": 2}], "projects": [{"id": "p1", "name": "api"}]}"#;
        let snapshot = parse_snapshot(json).unwrap();
        assert_eq!(snapshot.pipelines.len(), 2);
        assert_eq!(snapshot.projects.len(), 1);
    }

    #[test]
    fn parse_alternate_wrapper_keys() {
        for key in LIST_WRAPPER_KEYS {
            let json = format!(r#"{{"{key}": [{{"id": 1}}]}}"#);
            let records = parse_records(&json).unwrap();
            assert_eq!(records.len(), 1, "wrapper key: {key}");
        }
    }

    #[test]
    fn parse_empty_array() {
        assert!(parse_records("[]").unwrap().is_empty());
    }

    #[test]
    fn parse_invalid_json_error() {
        assert!(parse_records("not json").is_err());
    }

    #[test]
    fn parse_unknown_wrapper_error() {
        assert!(parse_records(r#"{"not_pipelines": []}"#).is_err());
    }

    #[test]
    fn parse_scalar_error() {
        assert!(parse_records("42").is_err());
    }

    #[test]
    fn malformed_records_survive_parsing() {
        let records = parse_records(r#"[{"id": 1, "status": 5}, "garbage", null]"#).unwrap();
        assert_eq!(records.len(), 3);
        let runs = normalize_all(&records);
        assert_eq!(runs[1].id, "run-2");
        assert_eq!(runs[2].branch, "main");
    }

    #[test]
    fn parse_detail_unwraps() {
        let record = parse_detail(r#"{"pipeline": {"id": "abc"}}"#).unwrap();
        assert_eq!(record.text(&["id"]), Some("abc".to_string()));
        let bare = parse_detail(r#"{"id": "xyz"}"#).unwrap();
        assert_eq!(bare.text(&["id"]), Some("xyz".to_string()));
    }

    #[test]
    fn parse_detail_rejects_arrays() {
        assert!(parse_detail("[]").is_err());
    }

    #[test]
    fn oversized_response_rejected() {
        let huge = format!("[{}]", " ".repeat(MAX_RESPONSE_SIZE + 1));
        assert!(parse_records(&huge).is_err());
    }
}
