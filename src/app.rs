use crate::detail::{DetailTab, PanelState, RunDetail, TimelineRow};
use crate::diagnostics::{AnalysisOutcome, AnalysisRequest, Diagnostics};
use crate::filter::{self, FilterState, PageView};
use crate::model::{Project, Run};
use serde::Serialize;
use std::time::{Duration, Instant};

/// How long a collaborator error stays on screen in watch mode.
pub const ERROR_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsView {
    pub text: Option<String>,
    pub loading: bool,
}

/// Everything a detail panel renders, detached from the state borrow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailSnapshot {
    pub state: PanelState,
    pub selected_run: Option<Run>,
    pub active_tab: Option<DetailTab>,
    pub expanded_job_ids: Vec<String>,
    pub timeline: Vec<TimelineRow>,
    pub diagnostics: DiagnosticsView,
}

#[derive(Debug)]
pub struct AppState {
    pub runs: Vec<Run>,
    pub projects: Vec<Project>,
    pub filter: FilterState,
    pub detail: RunDetail,
    pub diagnostics: Diagnostics,
    pub loading_count: u16,
    pub error: Option<(String, Instant)>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(FilterState::default())
    }
}

impl AppState {
    pub fn new(filter: FilterState) -> Self {
        Self {
            runs: Vec::new(),
            projects: Vec::new(),
            filter,
            detail: RunDetail::new(),
            diagnostics: Diagnostics::new(),
            loading_count: 0,
            error: None,
        }
    }

    // --- Collection ---

    pub fn page(&self) -> PageView<'_> {
        filter::apply(&self.runs, &self.filter)
    }

    pub fn branch_options(&self) -> Vec<String> {
        filter::branch_options(&self.runs)
    }

    pub fn find_run(&self, run_id: &str) -> Option<&Run> {
        self.runs.iter().find(|r| r.id == run_id)
    }

    pub fn has_active_runs(&self) -> bool {
        self.runs.iter().any(|r| r.status.is_active())
    }

    /// Replaces the collection with a fresh listing and lets the open panel
    /// react. A selected run missing from the listing keeps its last snapshot.
    pub fn update_runs(&mut self, runs: Vec<Run>) -> Option<AnalysisRequest> {
        self.runs = runs;
        self.clear_error();
        let selected_id = self.detail.selected_id()?;
        let fresh = self.runs.iter().find(|r| r.id == selected_id)?.clone();
        self.refresh_selected(fresh)
    }

    /// Replaces a single run, typically from a detail fetch.
    pub fn upsert_run(&mut self, run: Run) -> Option<AnalysisRequest> {
        if let Some(slot) = self.runs.iter_mut().find(|r| r.id == run.id) {
            *slot = run.clone();
        }
        self.refresh_selected(run)
    }

    pub fn remove_run(&mut self, run_id: &str) {
        self.runs.retain(|r| r.id != run_id);
        if self.detail.selected_id() == Some(run_id) {
            self.close_detail();
        }
    }

    pub fn update_projects(&mut self, projects: Vec<Project>) {
        self.projects = projects;
    }

    // --- Detail panel ---

    /// Opens the detail panel on a run from the collection.
    pub fn select_run(&mut self, run_id: &str) -> Option<AnalysisRequest> {
        let Some(run) = self.find_run(run_id).cloned() else {
            tracing::warn!(run_id, "select_run: run not in collection");
            return None;
        };
        self.open_run(run)
    }

    pub fn open_run(&mut self, run: Run) -> Option<AnalysisRequest> {
        self.diagnostics.clear_except(&run.id);
        self.detail.select(run);
        self.begin_analysis()
    }

    /// Only entering diagnostics can start a request, and only when the run
    /// has no result yet.
    pub fn switch_tab(&mut self, tab: DetailTab) -> Option<AnalysisRequest> {
        if !self.detail.switch_tab(tab) || tab != DetailTab::Diagnostics {
            return None;
        }
        self.begin_analysis()
    }

    pub fn close_detail(&mut self) {
        if let Some(run) = self.detail.close() {
            tracing::debug!(run_id = %run.id, "detail closed");
        }
        self.diagnostics.clear();
    }

    pub fn toggle_job_expansion(&mut self, job_id: &str) {
        self.detail.toggle_job_expansion(job_id);
    }

    pub fn retry_analysis(&mut self) -> Option<AnalysisRequest> {
        let run = self.detail.selected()?;
        self.diagnostics.retry(run)
    }

    /// Stores a finished analysis if it still belongs to the open run.
    pub fn apply_analysis(&mut self, run_id: &str, outcome: AnalysisOutcome) -> bool {
        let current = self.detail.selected_id();
        self.diagnostics.complete(run_id, outcome, current)
    }

    pub fn detail_snapshot(&self) -> DetailSnapshot {
        let selected = self.detail.selected();
        let diagnostics = match selected {
            Some(run) => DiagnosticsView {
                text: self.diagnostics.text(&run.id).map(str::to_string),
                loading: self.diagnostics.is_loading(&run.id),
            },
            None => DiagnosticsView {
                text: None,
                loading: false,
            },
        };
        DetailSnapshot {
            state: self.detail.state(),
            selected_run: selected.cloned(),
            active_tab: self.detail.active_tab(),
            expanded_job_ids: self.detail.expanded_job_ids(),
            timeline: self.detail.timeline(),
            diagnostics,
        }
    }

    fn begin_analysis(&mut self) -> Option<AnalysisRequest> {
        let run = self.detail.selected()?;
        self.diagnostics.begin(run)
    }

    // A listing without a job breakdown or log does not wipe what a detail
    // fetch already supplied.
    fn refresh_selected(&mut self, mut fresh: Run) -> Option<AnalysisRequest> {
        let current = self.detail.selected()?;
        if current.id != fresh.id {
            return None;
        }
        if fresh.jobs.is_none() {
            fresh.jobs.clone_from(&current.jobs);
        }
        if fresh.failure_log.is_none() && fresh.status == current.status {
            fresh.failure_log.clone_from(&current.failure_log);
        }
        let became_failed = self.detail.refresh_selected(&fresh);
        if became_failed {
            tracing::info!(run_id = %fresh.id, "selected run failed, opening diagnostics");
        }
        if self.detail.active_tab() == Some(DetailTab::Diagnostics) {
            self.begin_analysis()
        } else {
            None
        }
    }

    // --- Loading & errors ---

    pub fn is_loading(&self) -> bool {
        self.loading_count > 0
    }

    pub fn begin_loading(&mut self) {
        self.loading_count = self.loading_count.saturating_add(1);
    }

    pub fn end_loading(&mut self) {
        self.loading_count = self.loading_count.saturating_sub(1);
    }

    pub fn set_error(&mut self, msg: String) {
        self.error = Some((msg, Instant::now()));
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Drops the error once it has been shown for [`ERROR_TTL`].
    pub fn prune_error(&mut self, now: Instant) {
        let expired = self
            .error
            .as_ref()
            .is_some_and(|(_, raised)| now.saturating_duration_since(*raised) >= ERROR_TTL);
        if expired {
            self.error = None;
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|(msg, _)| msg.as_str())
    }

    /// Message for an empty list view.
    pub fn empty_message(&self) -> &'static str {
        if self.runs.is_empty() {
            "No pipeline runs yet"
        } else if self.filter.is_filtered() {
            "No runs match the current filters"
        } else {
            "No runs on this page"
        }
    }
}
