use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Also the landing spot for missing or unrecognized backend values.
    #[default]
    Queued,
    Running,
    Success,
    Failure,
    Canceled,
    Skipped,
}

pub const ALL_STATUSES: [Status; 6] = [
    Status::Queued,
    Status::Running,
    Status::Success,
    Status::Failure,
    Status::Canceled,
    Status::Skipped,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    Check,
    Cross,
    Spinner,
    Clock,
    Ban,
    Skip,
}

impl IconKind {
    pub fn glyph(self) -> &'static str {
        match self {
            IconKind::Check => "✓",
            IconKind::Cross => "✗",
            IconKind::Spinner => "⟳",
            IconKind::Clock => "·",
            IconKind::Ban => "⊘",
            IconKind::Skip => "↷",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorToken {
    Green,
    Red,
    Blue,
    Amber,
    Gray,
    Slate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDisplay {
    pub icon: IconKind,
    pub color: ColorToken,
    pub label: &'static str,
}

impl Status {
    /// Lenient parse used by the normalizer: anything unrecognized is pending.
    pub fn from_raw(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn display(self) -> StatusDisplay {
        let (icon, color, label) = match self {
            Status::Queued => (IconKind::Clock, ColorToken::Gray, "Queued"),
            Status::Running => (IconKind::Spinner, ColorToken::Blue, "Running"),
            Status::Success => (IconKind::Check, ColorToken::Green, "Success"),
            Status::Failure => (IconKind::Cross, ColorToken::Red, "Failed"),
            Status::Canceled => (IconKind::Ban, ColorToken::Amber, "Canceled"),
            Status::Skipped => (IconKind::Skip, ColorToken::Slate, "Skipped"),
        };
        StatusDisplay { icon, color, label }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Status::Queued | Status::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::Canceled => "CANCELED",
            Status::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse: rejects unknown values so CLI facets can report typos.
impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "passed" => Ok(Status::Success),
            "failed" | "failure" | "error" | "errored" => Ok(Status::Failure),
            "running" | "in_progress" | "started" => Ok(Status::Running),
            "pending" | "queued" | "created" | "waiting" => Ok(Status::Queued),
            "cancelled" | "canceled" => Ok(Status::Canceled),
            "skipped" => Ok(Status::Skipped),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}
