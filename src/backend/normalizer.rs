use crate::backend::raw::{RawProject, RawRecord};
use crate::model::{relative_time, Job, Project, Run, RunDuration, Step};
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMMIT_MESSAGE: &str = "No commit message";
pub const DEFAULT_AUTHOR: &str = "Unknown";
pub const DEFAULT_RUN_ID: &str = "unknown";

/// Keeps the tail (most relevant for diagnosis) of very long logs.
pub const LOG_MAX_LINES: usize = 500;

const ID_KEYS: &[&str] = &["id", "_id", "run_id", "runId", "pipeline_id", "pipelineId"];
const NAME_KEYS: &[&str] = &["name", "pipeline_name", "pipelineName", "workflow", "display_name", "displayName"];
const PROJECT_KEYS: &[&str] = &["project_id", "projectId", "project"];
const BRANCH_KEYS: &[&str] = &["branch", "ref", "head_branch", "headBranch"];
const MESSAGE_KEYS: &[&str] = &["commit_message", "commitMessage", "message", "title"];
const AUTHOR_KEYS: &[&str] = &["author", "triggered_by", "triggeredBy", "user", "actor"];
const STATUS_KEYS: &[&str] = &["status", "state"];
const CONCLUSION_KEYS: &[&str] = &["conclusion", "result"];
const JOB_ID_KEYS: &[&str] = &["id", "_id", "job_id", "jobId"];
const STARTED_KEYS: &[&str] = &["started_at", "startedAt", "created_at", "createdAt"];
const FINISHED_KEYS: &[&str] = &["finished_at", "finishedAt", "completed_at", "completedAt"];
const DURATION_KEYS: &[&str] = &["duration", "duration_seconds", "durationSeconds"];
const JOB_KEYS: &[&str] = &["jobs", "stages"];
const STEP_KEYS: &[&str] = &["steps"];
const LOG_KEYS: &[&str] = &["logs", "failure_log", "failureLog", "error_log", "log"];

pub fn normalize(raw: &RawRecord) -> Run {
    normalize_at(raw, Utc::now())
}

/// Same as [`normalize`] with an explicit clock, so relative labels are testable.
pub fn normalize_at(raw: &RawRecord, now: DateTime<Utc>) -> Run {
    let status = read_status(raw);
    let started_at = raw.timestamp(STARTED_KEYS);
    let finished_at = raw.timestamp(FINISHED_KEYS);

    let id = raw.text(ID_KEYS);
    Run {
        synthetic_id: id.is_none(),
        id: id.unwrap_or_else(|| DEFAULT_RUN_ID.to_string()),
        name: raw.text(NAME_KEYS),
        project_id: record_project_id(raw),
        branch: raw.text(BRANCH_KEYS).unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        commit_message: raw
            .text(MESSAGE_KEYS)
            .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
        author: raw.person(AUTHOR_KEYS).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
        status,
        duration: resolve_duration(raw, status, started_at, finished_at),
        started_at,
        finished_at,
        started_label: started_at.map_or_else(|| "-".to_string(), |t| relative_time(t, now)),
        jobs: raw.children(JOB_KEYS).map(|jobs| {
            jobs.iter()
                .enumerate()
                .map(|(idx, job)| normalize_job(job, idx))
                .collect()
        }),
        failure_log: raw.log(LOG_KEYS).map(|log| tail_lines(&log, LOG_MAX_LINES).0),
    }
}

/// Normalizes a listing, preserving order. Records with no id at all get a
/// positional id that does not clash with any real id in the same listing.
pub fn normalize_all(records: &[RawRecord]) -> Vec<Run> {
    let now = Utc::now();
    let mut taken: HashSet<String> = records.iter().filter_map(record_id).collect();
    records
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let mut run = normalize_at(raw, now);
            if run.synthetic_id {
                run.id = positional_id(idx + 1, &taken);
                taken.insert(run.id.clone());
            }
            run
        })
        .collect()
}

fn positional_id(position: usize, taken: &HashSet<String>) -> String {
    let base = format!("run-{position}");
    if !taken.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}.{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

/// Projects without an id cannot be used as a facet value and are dropped.
pub fn normalize_projects(records: &[RawProject]) -> Vec<Project> {
    records
        .iter()
        .filter_map(|raw| {
            let id = raw.text(&["id", "_id", "project_id", "projectId"])?;
            let name = raw
                .text(&["name", "display_name", "displayName", "path"])
                .unwrap_or_else(|| id.clone());
            Some(Project { id, name })
        })
        .collect()
}

/// Id of a raw pipeline record as the normalizer would read it, without the
/// positional fallback.
pub fn record_id(raw: &RawRecord) -> Option<String> {
    raw.text(ID_KEYS)
}

pub fn record_project_id(raw: &RawRecord) -> Option<String> {
    raw.text(PROJECT_KEYS).or_else(|| project_object_id(raw))
}

fn normalize_job(raw: &RawRecord, idx: usize) -> Job {
    let status = read_status(raw);
    let started_at = raw.timestamp(STARTED_KEYS);
    let finished_at = raw.timestamp(FINISHED_KEYS);
    Job {
        id: raw.text(JOB_ID_KEYS).unwrap_or_else(|| (idx + 1).to_string()),
        name: raw.text(&["name", "stage", "title"]).unwrap_or_else(|| "Unnamed job".to_string()),
        status,
        duration: resolve_duration(raw, status, started_at, finished_at),
        steps: raw
            .children(STEP_KEYS)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(idx, step)| normalize_step(step, idx))
            .collect(),
    }
}

fn normalize_step(raw: &RawRecord, idx: usize) -> Step {
    let status = read_status(raw);
    let started_at = raw.timestamp(STARTED_KEYS);
    let finished_at = raw.timestamp(FINISHED_KEYS);
    Step {
        id: raw
            .text(&["id", "_id", "number"])
            .unwrap_or_else(|| (idx + 1).to_string()),
        name: raw.text(&["name", "title", "command"]).unwrap_or_else(|| "Unnamed step".to_string()),
        status,
        duration: resolve_duration(raw, status, started_at, finished_at),
        log: raw.log(LOG_KEYS).map(|log| tail_lines(&log, LOG_MAX_LINES).0),
    }
}

/// A recognizable conclusion (GitHub-style `status: completed` +
/// `conclusion: failure`) wins over the coarse status.
fn read_status(raw: &RawRecord) -> Status {
    if let Some(outcome) = raw.text(CONCLUSION_KEYS).and_then(|c| c.parse().ok()) {
        return outcome;
    }
    raw.text(STATUS_KEYS)
        .map_or(Status::default(), |s| Status::from_raw(&s))
}

/// `project: {"id": ..}` is common enough to accept alongside flat ids.
fn project_object_id(raw: &RawRecord) -> Option<String> {
    match raw.field(&["project"])? {
        obj @ Value::Object(_) => RawRecord::new(obj.clone()).text(&["id", "_id"]),
        _ => None,
    }
}

/// Running work reports no duration; otherwise an explicit value wins over
/// timestamps, and timestamp differences never go negative.
fn resolve_duration(
    raw: &RawRecord,
    status: Status,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
) -> RunDuration {
    if status == Status::Running {
        return RunDuration::Running;
    }
    if let Some(value) = raw.field(DURATION_KEYS) {
        match value {
            Value::Number(n) => {
                if let Some(secs) = n.as_f64().filter(|s| s.is_finite()) {
                    return RunDuration::Seconds(secs.max(0.0).round() as u64);
                }
            }
            Value::String(s) => {
                let s = s.trim();
                if let Ok(secs) = s.parse::<f64>() {
                    if secs.is_finite() {
                        return RunDuration::Seconds(secs.max(0.0).round() as u64);
                    }
                }
                if !s.is_empty() {
                    return RunDuration::Text(s.to_string());
                }
            }
            _ => {}
        }
    }
    match (started_at, finished_at) {
        (Some(start), Some(end)) => {
            let secs = end.signed_duration_since(start).num_seconds().max(0);
            RunDuration::Seconds(secs as u64)
        }
        _ => RunDuration::Unknown,
    }
}

/// Takes the last `max_lines` lines from raw log output.
/// Returns `(text, was_truncated)`.
pub fn tail_lines(raw: &str, max_lines: usize) -> (String, bool) {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() > max_lines {
        (lines[lines.len() - max_lines..].join("\n"), true)
    } else {
        (raw.to_string(), false)
    }
}
