use crate::model::Run;
use crate::status::StatusDisplay;
use serde::Serialize;
use std::collections::HashSet;

pub const NO_JOBS_PLACEHOLDER: &str = "No jobs recorded";
pub const NO_STEPS_PLACEHOLDER: &str = "No steps recorded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailTab {
    Timeline,
    Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelState {
    #[default]
    Closed,
    OpenTimeline,
    OpenDiagnostics,
}

impl PanelState {
    pub fn active_tab(self) -> Option<DetailTab> {
        match self {
            PanelState::Closed => None,
            PanelState::OpenTimeline => Some(DetailTab::Timeline),
            PanelState::OpenDiagnostics => Some(DetailTab::Diagnostics),
        }
    }

    fn open_on(tab: DetailTab) -> Self {
        match tab {
            DetailTab::Timeline => PanelState::OpenTimeline,
            DetailTab::Diagnostics => PanelState::OpenDiagnostics,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineLevel {
    Job,
    Step,
    Placeholder,
}

/// One flattened line of the timeline view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineRow {
    pub level: TimelineLevel,
    pub job_id: Option<String>,
    pub step_id: Option<String>,
    pub label: String,
    pub status: Option<StatusDisplay>,
    pub duration: String,
    /// Job rows only.
    pub expanded: bool,
    /// Step rows only: the step carries its own log.
    pub has_log: bool,
}

impl TimelineRow {
    fn placeholder(label: &str, job_id: Option<&str>) -> Self {
        Self {
            level: TimelineLevel::Placeholder,
            job_id: job_id.map(str::to_string),
            step_id: None,
            label: label.to_string(),
            status: None,
            duration: String::new(),
            expanded: false,
            has_log: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunDetail {
    selected: Option<Run>,
    state: PanelState,
    // Jobs default to expanded, so only collapses are recorded.
    collapsed_jobs: HashSet<String>,
}

impl RunDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn active_tab(&self) -> Option<DetailTab> {
        self.state.active_tab()
    }

    pub fn selected(&self) -> Option<&Run> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|r| r.id.as_str())
    }

    pub fn is_open(&self) -> bool {
        self.state != PanelState::Closed
    }

    /// Opens the panel on `run`. Failures land on diagnostics, everything
    /// else on the timeline.
    pub fn select(&mut self, run: Run) -> PanelState {
        if self.selected_id() != Some(run.id.as_str()) {
            self.collapsed_jobs.clear();
        }
        self.state = if run.is_failed() {
            PanelState::OpenDiagnostics
        } else {
            PanelState::OpenTimeline
        };
        self.selected = Some(run);
        self.state
    }

    /// No-op while closed. Returns whether the tab changed.
    pub fn switch_tab(&mut self, tab: DetailTab) -> bool {
        if !self.is_open() || self.active_tab() == Some(tab) {
            return false;
        }
        self.state = PanelState::open_on(tab);
        true
    }

    /// Returns the run that was selected, if any.
    pub fn close(&mut self) -> Option<Run> {
        self.state = PanelState::Closed;
        self.collapsed_jobs.clear();
        self.selected.take()
    }

    pub fn toggle_job_expansion(&mut self, job_id: &str) {
        if !self.collapsed_jobs.remove(job_id) {
            self.collapsed_jobs.insert(job_id.to_string());
        }
    }

    pub fn is_job_expanded(&self, job_id: &str) -> bool {
        !self.collapsed_jobs.contains(job_id)
    }

    /// Expanded jobs of the selected run, in job order.
    pub fn expanded_job_ids(&self) -> Vec<String> {
        self.selected
            .iter()
            .flat_map(Run::jobs)
            .filter(|job| self.is_job_expanded(&job.id))
            .map(|job| job.id.clone())
            .collect()
    }

    /// Swaps in a fresh snapshot of the selected run. Returns true when the run
    /// has just turned into a failure and the panel moved to diagnostics.
    pub fn refresh_selected(&mut self, run: &Run) -> bool {
        let Some(current) = self.selected.as_mut() else {
            return false;
        };
        if current.id != run.id {
            return false;
        }
        let became_failed = !current.is_failed() && run.is_failed();
        *current = run.clone();
        if became_failed && self.is_open() {
            self.state = PanelState::OpenDiagnostics;
            return true;
        }
        false
    }

    pub fn timeline(&self) -> Vec<TimelineRow> {
        let Some(run) = &self.selected else {
            return Vec::new();
        };
        if run.jobs().is_empty() {
            return vec![TimelineRow::placeholder(NO_JOBS_PLACEHOLDER, None)];
        }
        let mut rows = Vec::new();
        for job in run.jobs() {
            let expanded = self.is_job_expanded(&job.id);
            rows.push(TimelineRow {
                level: TimelineLevel::Job,
                job_id: Some(job.id.clone()),
                step_id: None,
                label: job.name.clone(),
                status: Some(job.status.display()),
                duration: job.duration.to_string(),
                expanded,
                has_log: false,
            });
            if !expanded {
                continue;
            }
            if job.steps.is_empty() {
                rows.push(TimelineRow::placeholder(NO_STEPS_PLACEHOLDER, Some(&job.id)));
            }
            rows.extend(job.steps.iter().map(|step| TimelineRow {
                level: TimelineLevel::Step,
                job_id: Some(job.id.clone()),
                step_id: Some(step.id.clone()),
                label: step.name.clone(),
                status: Some(step.status.display()),
                duration: step.duration.to_string(),
                expanded: false,
                has_log: step.log.as_deref().is_some_and(|l| !l.trim().is_empty()),
            }));
        }
        rows
    }
}
