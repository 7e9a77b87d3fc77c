use crate::diagnostics::AnalysisOutcome;
use crate::model::{Project, Run};

/// Results of spawned collaborator calls, delivered back to the controller.
#[derive(Debug)]
pub enum AppEvent {
    /// `manual` marks an explicit refresh rather than a live feed poll.
    RunsLoaded {
        runs: Vec<Run>,
        manual: bool,
    },
    LoadFailed {
        error: String,
        manual: bool,
    },
    ProjectsLoaded(Vec<Project>),
    DetailLoaded(Run),
    AnalysisResult {
        run_id: String,
        outcome: AnalysisOutcome,
    },
    DeleteSuccess(String),
    Error(String),
}
