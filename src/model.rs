use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

// ── Shared formatting helpers ──

/// Format whole seconds as `"{minutes}m {seconds}s"` (e.g. `"2m 5s"`).
pub fn format_duration(secs: u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

/// Coarse "how long ago" label for a start timestamp. Future timestamps
/// (clock skew) read as "Just now".
pub fn relative_time(started_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = now.signed_duration_since(started_at).num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if minutes < 60 * 24 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / (60 * 24))
    }
}

/// Cuts `text` to at most `max_width` terminal columns, marking the cut with
/// an ellipsis.
pub fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let Some(budget) = max_width.checked_sub(1) else {
        return String::new();
    };
    let mut used = 0;
    let mut cut: String = text
        .chars()
        .take_while(|c| {
            used += c.width().unwrap_or(0);
            used <= budget
        })
        .collect();
    cut.push('\u{2026}');
    cut
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RunDuration {
    Seconds(u64),
    /// Backend already supplied a display string.
    Text(String),
    /// Still executing; elapsed time is not reported.
    Running,
    Unknown,
}

impl fmt::Display for RunDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunDuration::Seconds(secs) => f.write_str(&format_duration(*secs)),
            RunDuration::Text(text) => f.write_str(text),
            RunDuration::Running => f.write_str("Running..."),
            RunDuration::Unknown => f.write_str("-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    pub id: String,
    /// The backend record carried no id; `id` was assigned locally and cannot
    /// be used to address the record upstream.
    #[serde(skip)]
    pub synthetic_id: bool,
    /// Pipeline or workflow name, when the backend sends one.
    pub name: Option<String>,
    pub project_id: Option<String>,
    pub branch: String,
    pub commit_message: String,
    pub author: String,
    pub status: Status,
    pub duration: RunDuration,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Relative label computed at normalization time, e.g. `"5m ago"`.
    pub started_label: String,
    /// `None` = backend sent no job breakdown, `Some(vec)` = breakdown present (possibly empty).
    pub jobs: Option<Vec<Job>>,
    pub failure_log: Option<String>,
}

impl Run {
    pub fn is_failed(&self) -> bool {
        self.status == Status::Failure
    }

    /// Failure log if it carries any non-whitespace text.
    pub fn failure_log_text(&self) -> Option<&str> {
        self.failure_log
            .as_deref()
            .filter(|log| !log.trim().is_empty())
    }

    pub fn jobs(&self) -> &[Job] {
        self.jobs.as_deref().unwrap_or(&[])
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.commit_message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    /// As supplied by the backend; not derived from `steps`.
    pub status: Status,
    pub duration: RunDuration,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub duration: RunDuration,
    pub log: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}
