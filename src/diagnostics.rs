//! Failure-triggered root-cause analysis sessions.
//!
//! Each run id owns at most one session, moving `Idle -> Loading ->
//! Resolved | Failed`. Sessions are pure bookkeeping: [`Diagnostics::begin`]
//! decides whether a request must be sent and hands back an
//! [`AnalysisRequest`]; the caller performs it with [`analyze`] and feeds the
//! outcome to [`Diagnostics::complete`].

use crate::model::Run;
use crate::traits::{AnalysisService, ServiceError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const NO_LOGS_MESSAGE: &str = "No logs available to analyze for this run.";
pub const NOTHING_TO_ANALYZE_MESSAGE: &str =
    "This run did not fail, so there is nothing to analyze.";
pub const MISSING_CREDENTIALS_MESSAGE: &str =
    "AI analysis is not configured. Set an analyzer command to enable root-cause analysis.";
pub const UNAVAILABLE_MESSAGE: &str =
    "AI analysis is temporarily unavailable. Review the failure log directly or retry later.";
pub const EMPTY_RESPONSE_MESSAGE: &str =
    "The AI service returned no analysis for this log. Review the failure log directly.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum AnalysisState {
    Idle,
    Loading,
    Resolved(String),
    /// Fallback text; counts as a result and is not retried automatically.
    Failed(String),
}

impl AnalysisState {
    pub fn text(&self) -> Option<&str> {
        match self {
            AnalysisState::Resolved(text) | AnalysisState::Failed(text) => Some(text),
            AnalysisState::Idle | AnalysisState::Loading => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AnalysisState::Loading)
    }
}

/// Result of one [`analyze`] call. Both arms carry displayable markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Resolved(String),
    Failed(String),
}

impl AnalysisOutcome {
    pub fn text(&self) -> &str {
        match self {
            AnalysisOutcome::Resolved(text) | AnalysisOutcome::Failed(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsSession {
    pub run_id: String,
    pub state: AnalysisState,
    /// Run was not a failure when last seen; analysis is short-circuited.
    pub successful: bool,
    /// Result produced locally (nothing to analyze / no logs) rather than by the
    /// service. Recomputed whenever the run is seen again.
    canned: bool,
}

/// A service call the caller must perform and report back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub run_id: String,
    pub log: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    sessions: HashMap<String, DiagnosticsSession>,
    in_flight: HashSet<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, run_id: &str) -> Option<&DiagnosticsSession> {
        self.sessions.get(run_id)
    }

    pub fn is_loading(&self, run_id: &str) -> bool {
        self.sessions
            .get(run_id)
            .is_some_and(|s| s.state.is_loading())
    }

    pub fn text(&self, run_id: &str) -> Option<&str> {
        self.sessions.get(run_id).and_then(|s| s.state.text())
    }

    pub fn is_in_flight(&self, run_id: &str) -> bool {
        self.in_flight.contains(run_id)
    }

    /// Opens or revisits the session for `run`.
    ///
    /// Returns a request only when the run failed, has a non-empty log, and no
    /// request is in flight or completed for its id.
    pub fn begin(&mut self, run: &Run) -> Option<AnalysisRequest> {
        let in_flight = self.in_flight.contains(&run.id);
        let session = self
            .sessions
            .entry(run.id.clone())
            .or_insert_with(|| DiagnosticsSession {
                run_id: run.id.clone(),
                state: AnalysisState::Idle,
                successful: !run.is_failed(),
                canned: false,
            });

        if session.canned || session.successful != !run.is_failed() {
            session.state = AnalysisState::Idle;
            session.canned = false;
        }
        session.successful = !run.is_failed();

        if session.successful {
            session.state = AnalysisState::Resolved(NOTHING_TO_ANALYZE_MESSAGE.to_string());
            session.canned = true;
            return None;
        }
        if session.state != AnalysisState::Idle {
            tracing::debug!(run_id = %run.id, "analysis already requested");
            return None;
        }
        let Some(log) = run.failure_log_text() else {
            session.state = AnalysisState::Resolved(NO_LOGS_MESSAGE.to_string());
            session.canned = true;
            return None;
        };

        session.state = AnalysisState::Loading;
        if in_flight {
            tracing::debug!(run_id = %run.id, "joining outstanding analysis");
            return None;
        }
        self.in_flight.insert(run.id.clone());
        tracing::info!(run_id = %run.id, "requesting failure analysis");
        Some(AnalysisRequest {
            run_id: run.id.clone(),
            log: log.to_string(),
        })
    }

    /// Applies a finished request. `current` is the id of the run now shown;
    /// results for any other run, or for a session that is no longer loading,
    /// are discarded. Returns whether the result was applied.
    pub fn complete(
        &mut self,
        run_id: &str,
        outcome: AnalysisOutcome,
        current: Option<&str>,
    ) -> bool {
        self.in_flight.remove(run_id);
        if current != Some(run_id) {
            tracing::debug!(run_id, "discarding stale analysis result");
            return false;
        }
        let Some(session) = self.sessions.get_mut(run_id) else {
            tracing::debug!(run_id, "discarding analysis result without a session");
            return false;
        };
        if !session.state.is_loading() {
            tracing::debug!(run_id, "discarding analysis result for settled session");
            return false;
        }
        session.state = match outcome {
            AnalysisOutcome::Resolved(text) => AnalysisState::Resolved(text),
            AnalysisOutcome::Failed(text) => AnalysisState::Failed(text),
        };
        true
    }

    /// Re-enters loading for a session whose last attempt failed.
    pub fn retry(&mut self, run: &Run) -> Option<AnalysisRequest> {
        match self.sessions.get_mut(&run.id) {
            Some(session) if matches!(session.state, AnalysisState::Failed(_)) => {
                session.state = AnalysisState::Idle;
            }
            _ => return None,
        }
        self.begin(run)
    }

    /// Drops every session except `run_id`'s. Outstanding requests stay tracked.
    pub fn clear_except(&mut self, run_id: &str) {
        self.sessions.retain(|id, _| id == run_id);
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

/// Runs one analysis against `service`. Total: every failure becomes a
/// human-readable fallback.
pub async fn analyze(service: &dyn AnalysisService, log: &str) -> AnalysisOutcome {
    if log.trim().is_empty() {
        return AnalysisOutcome::Resolved(NO_LOGS_MESSAGE.to_string());
    }
    match service.analyze_logs(log).await {
        Ok(text) if !text.trim().is_empty() => AnalysisOutcome::Resolved(text),
        Ok(_) => AnalysisOutcome::Failed(EMPTY_RESPONSE_MESSAGE.to_string()),
        Err(e) => {
            tracing::warn!("analysis failed: {e}");
            AnalysisOutcome::Failed(fallback_message(&e).to_string())
        }
    }
}

pub fn fallback_message(error: &ServiceError) -> &'static str {
    match error {
        ServiceError::MissingCredentials => MISSING_CREDENTIALS_MESSAGE,
        ServiceError::Unavailable(_) => UNAVAILABLE_MESSAGE,
        ServiceError::EmptyResponse => EMPTY_RESPONSE_MESSAGE,
    }
}
