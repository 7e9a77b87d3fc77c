
use fixtures::*;
use pretty_assertions::assert_eq;
use runlens::app::AppState;
use runlens::backend::file::JsonFileBackend;
use runlens::backend::normalizer::normalize_all;
use runlens::backend::parser;
use runlens::controller::Controller;
use runlens::detail::{DetailTab, PanelState, TimelineLevel, NO_STEPS_PLACEHOLDER};
use runlens::diagnostics::{
    self, AnalysisOutcome, NOTHING_TO_ANALYZE_MESSAGE, NO_LOGS_MESSAGE, UNAVAILABLE_MESSAGE,
};
use runlens::filter::{self, Facet, FilterState};
use runlens::model::{Run, RunDuration};
use runlens::status::Status;
use runlens::traits::{AnalysisService, PipelineBackend, ServiceError};
use serde_json::json;
use std::sync::Arc;

fn ids(runs: &[&Run]) -> Vec<String> {
    runs.iter().map(|r| r.id.clone()).collect()
}

fn controller_with(
    backend: Arc<FakeBackend>,
    analyzer: Arc<dyn AnalysisService>,
) -> Controller {
    Controller::new(
        AppState::default(),
        backend as Arc<dyn PipelineBackend>,
        analyzer,
    )
}

async fn loaded_controller(
    records: Vec<serde_json::Value>,
    analyzer: Arc<dyn AnalysisService>,
) -> Controller {
    let mut controller = controller_with(Arc::new(FakeBackend::new(records)), analyzer);
    controller.refresh();
    controller.settle().await;
    controller
}

// ========== Normalization → filtering data flow ==========

#[test]
fn full_flow_json_to_normalize_to_filter() {
    let json = r#"{
        "runs": [
            {
                "runId": 100,
                "pipelineName": "deploy",
                "ref": "release/1.2",
                "title": "Cut release",
                "triggeredBy": {"username": "ops-bot"},
                "state": "in_progress",
                "startedAt": "2024-06-01T10:00:00Z"
            },
            {
                "_id": "abc",
                "head_branch": "main",
                "message": "Bump deps",
                "actor": "ada",
                "status": "completed",
                "conclusion": "failure",
                "created_at": "2024-06-02T09:00:00Z",
                "completed_at": "2024-06-02T09:04:10Z",
                "failure_log": ["step 1 ok", "error: linker failed"]
            },
            {}
        ]
    }"#;

    let records = parser::parse_records(json).expect("parse should succeed");
    let runs = normalize_all(&records);
    assert_eq!(runs.len(), 3);

    assert_eq!(runs[0].id, "100");
    assert_eq!(runs[0].display_name(), "deploy");
    assert_eq!(runs[0].branch, "release/1.2");
    assert_eq!(runs[0].author, "ops-bot");
    assert_eq!(runs[0].status, Status::Running);
    assert_eq!(runs[0].duration.to_string(), "Running...");

    assert_eq!(runs[1].status, Status::Failure);
    assert_eq!(runs[1].duration, RunDuration::Seconds(250));
    assert_eq!(runs[1].duration.to_string(), "4m 10s");
    assert_eq!(
        runs[1].failure_log.as_deref(),
        Some("step 1 ok\nerror: linker failed")
    );

    assert_eq!(runs[2].id, "run-3");
    assert_eq!(runs[2].branch, "main");
    assert_eq!(runs[2].commit_message, "No commit message");
    assert_eq!(runs[2].author, "Unknown");
    assert_eq!(runs[2].status, Status::Queued);

    let mut state = AppState::default();
    state.update_runs(runs);
    state.filter.set_query("LINKER");
    assert_eq!(state.page().total_count, 0);
    state.filter.set_query("ops");
    assert_eq!(ids(&state.page().runs), vec!["100"]);
    assert_eq!(state.branch_options(), vec!["release/1.2", "main"]);
}

#[test]
fn normalize_survives_hostile_records() {
    let json = r#"[
        {"id": null, "status": 7, "duration": "soon", "jobs": "nope"},
        {"id": {"nested": true}, "started_at": "not a date", "duration": -5},
        {"jobs": [{"steps": [{}, {"logs": []}]}, 42]},
        [1, 2, 3],
        "string record",
        null
    ]"#;
    let runs = normalize_all(&parser::parse_records(json).unwrap());
    assert_eq!(runs.len(), 6);
    for run in &runs {
        assert_eq!(run.branch, "main");
        assert_eq!(run.author, "Unknown");
    }
    assert_eq!(runs[0].duration, RunDuration::Text("soon".to_string()));
    assert!(runs[0].jobs.is_none());
    assert_eq!(runs[1].duration, RunDuration::Seconds(0));
    assert_eq!(runs[1].started_at, None);
    let jobs = runs[2].jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "1");
    assert_eq!(jobs[0].name, "Unnamed job");
    assert_eq!(jobs[0].steps[1].id, "2");
    assert_eq!(jobs[0].steps[1].log, None);
}

// ========== Filter pipeline scenarios ==========

#[test]
fn failure_facet_selects_failed_run() {
    let mut failed = run_failed("a", "boom");
    failed.branch = "fix/x".to_string();
    let runs = vec![failed, run_on_branch("b", "main")];
    let mut state = FilterState::default();
    state.set_status_facet(Facet::Only(Status::Failure));
    let view = filter::apply(&runs, &state);
    assert_eq!(view.total_count, 1);
    assert_eq!(ids(&view.runs), vec!["a"]);
}

#[test]
fn third_page_of_twenty_five() {
    let runs = numbered_runs(25);
    let mut state = FilterState::new(10);
    state.set_page(3);
    let view = filter::apply(&runs, &state);
    assert_eq!(view.total_pages, 3);
    assert_eq!(ids(&view.runs), vec!["21", "22", "23", "24", "25"]);
}

#[test]
fn facet_changes_reset_page_from_any_page() {
    let runs = numbered_runs(40);
    for page in 2..=4 {
        let mut state = FilterState::new(10);
        state.set_page(page);
        assert_eq!(filter::apply(&runs, &state).page, page);
        state.set_branch_facet(Facet::Only("main".to_string()));
        assert_eq!(state.page(), 1);
        assert_eq!(filter::apply(&runs, &state).page, 1);
    }
}

#[test]
fn filtered_page_is_idempotent() {
    let mut runs = numbered_runs(30);
    for run in runs.iter_mut().step_by(3) {
        run.status = Status::Failure;
    }
    let mut state = FilterState::new(4);
    state.set_status_facet(Facet::Only(Status::Failure));
    state.set_page(2);
    let once: Vec<Run> = filter::apply(&runs, &state).runs.into_iter().cloned().collect();
    let twice: Vec<Run> = filter::apply(&once, &state).runs.into_iter().cloned().collect();
    assert_eq!(once, twice);
}

// ========== Diagnostics orchestration ==========

#[tokio::test]
async fn analyze_empty_log_makes_no_call() {
    let analyzer = CountingAnalyzer::ok("unused");
    let outcome = diagnostics::analyze(&analyzer, "").await;
    assert_eq!(outcome, AnalysisOutcome::Resolved(NO_LOGS_MESSAGE.to_string()));
    assert_eq!(analyzer.call_count(), 0);
}

#[tokio::test]
async fn service_errors_become_fallback_text() {
    let analyzer = Arc::new(CountingAnalyzer::failing(ServiceError::MissingCredentials));
    let mut controller =
        loaded_controller(vec![raw_failed("f1", "boom")], analyzer.clone()).await;
    controller.open_run("f1");
    controller.settle().await;
    let snap = controller.state().detail_snapshot();
    assert!(!snap.diagnostics.loading);
    assert!(snap.diagnostics.text.is_some_and(|t| t.contains("not configured")));
    assert!(controller.state().error_message().is_none());
}

#[tokio::test]
async fn selecting_failed_run_loads_then_resolves() {
    let analyzer = Arc::new(GatedAnalyzer::new());
    let mut controller =
        loaded_controller(vec![raw_failed("f1", "boom")], analyzer.clone()).await;

    controller.open_run("f1");
    let snap = controller.state().detail_snapshot();
    assert_eq!(snap.state, PanelState::OpenDiagnostics);
    assert_eq!(snap.active_tab, Some(DetailTab::Diagnostics));
    assert!(snap.diagnostics.loading);
    assert_eq!(snap.diagnostics.text, None);

    analyzer.release();
    controller.settle().await;
    let snap = controller.state().detail_snapshot();
    assert!(!snap.diagnostics.loading);
    assert_eq!(snap.diagnostics.text.as_deref(), Some("analysis of boom"));
    assert_eq!(analyzer.call_count(), 1);
}

#[tokio::test]
async fn reopening_failed_run_calls_service_once() {
    let analyzer = Arc::new(CountingAnalyzer::ok("## Root cause"));
    let mut controller =
        loaded_controller(vec![raw_failed("f1", "boom")], analyzer.clone()).await;

    controller.open_run("f1");
    controller.settle().await;
    controller.switch_tab(DetailTab::Timeline);
    controller.switch_tab(DetailTab::Diagnostics);
    controller.open_run("f1");
    controller.settle().await;

    assert_eq!(analyzer.call_count(), 1);
    assert_eq!(
        controller.state().detail_snapshot().diagnostics.text.as_deref(),
        Some("## Root cause")
    );
}

#[tokio::test]
async fn reopen_during_flight_does_not_duplicate() {
    let analyzer = Arc::new(GatedAnalyzer::new());
    let mut controller =
        loaded_controller(vec![raw_failed("f1", "boom")], analyzer.clone()).await;

    controller.open_run("f1");
    controller.close_detail();
    controller.open_run("f1");
    assert!(controller.state().detail_snapshot().diagnostics.loading);

    analyzer.release();
    controller.settle().await;
    assert_eq!(analyzer.call_count(), 1);
    assert_eq!(
        controller.state().detail_snapshot().diagnostics.text.as_deref(),
        Some("analysis of boom")
    );
}

#[tokio::test]
async fn successful_run_never_calls_service() {
    let analyzer = Arc::new(CountingAnalyzer::ok("unused"));
    let mut controller = loaded_controller(vec![raw_success("s1")], analyzer.clone()).await;

    controller.open_run("s1");
    assert_eq!(controller.state().detail.state(), PanelState::OpenTimeline);
    controller.switch_tab(DetailTab::Diagnostics);
    controller.settle().await;

    assert_eq!(analyzer.call_count(), 0);
    assert_eq!(
        controller.state().detail_snapshot().diagnostics.text.as_deref(),
        Some(NOTHING_TO_ANALYZE_MESSAGE)
    );
}

#[tokio::test]
async fn stale_result_is_discarded() {
    let analyzer = Arc::new(GatedAnalyzer::new());
    let mut controller = loaded_controller(
        vec![raw_failed("f1", "boom"), raw_success("s1")],
        analyzer.clone(),
    )
    .await;

    controller.open_run("f1");
    controller.open_run("s1");
    analyzer.release();
    controller.settle().await;

    let snap = controller.state().detail_snapshot();
    assert_eq!(snap.selected_run.map(|r| r.id), Some("s1".to_string()));
    assert_eq!(snap.diagnostics.text.as_deref(), Some(NOTHING_TO_ANALYZE_MESSAGE));
    assert!(controller.state().diagnostics.session("f1").is_none());
}

#[tokio::test]
async fn refresh_turning_run_failed_starts_analysis() {
    let backend = Arc::new(FakeBackend::new(vec![json!({
        "id": "r1", "status": "running", "jobs": []
    })]));
    let analyzer = Arc::new(CountingAnalyzer::ok("flaky network"));
    let mut controller = controller_with(backend.clone(), analyzer.clone());
    controller.refresh();
    controller.settle().await;
    controller.open_run("r1");
    assert_eq!(controller.state().detail.state(), PanelState::OpenTimeline);

    backend.replace(vec![raw_failed("r1", "connection reset")]);
    controller.refresh();
    controller.settle().await;

    let snap = controller.state().detail_snapshot();
    assert_eq!(snap.state, PanelState::OpenDiagnostics);
    assert_eq!(snap.diagnostics.text.as_deref(), Some("flaky network"));
    assert_eq!(analyzer.call_count(), 1);
}

#[tokio::test]
async fn crashing_analyzer_resolves_to_fallback() {
    let analyzer = Arc::new(PanickingAnalyzer::new());
    let mut controller = loaded_controller(vec![raw_failed("f1", "boom")], analyzer.clone()).await;

    controller.open_run("f1");
    controller.settle().await;
    let diag = controller.state().detail_snapshot().diagnostics;
    assert!(!diag.loading);
    assert_eq!(diag.text.as_deref(), Some(UNAVAILABLE_MESSAGE));
    assert_eq!(analyzer.call_count(), 1);

    // The failed attempt counts as a result; only an explicit retry calls again.
    controller.switch_tab(DetailTab::Timeline);
    controller.switch_tab(DetailTab::Diagnostics);
    controller.open_run("f1");
    controller.settle().await;
    assert_eq!(analyzer.call_count(), 1);

    controller.retry_analysis();
    assert!(controller.state().detail_snapshot().diagnostics.loading);
    controller.settle().await;
    let diag = controller.state().detail_snapshot().diagnostics;
    assert!(!diag.loading);
    assert_eq!(diag.text.as_deref(), Some(UNAVAILABLE_MESSAGE));
    assert_eq!(analyzer.call_count(), 2);

    // Closing drops the session and nothing is left in flight.
    controller.close_detail();
    controller.open_run("f1");
    controller.settle().await;
    assert!(!controller.state().detail_snapshot().diagnostics.loading);
    assert_eq!(analyzer.call_count(), 3);
    assert_eq!(controller.state().error_message(), None);
}

// ========== Detail panel ==========

#[tokio::test]
async fn timeline_and_expansion() {
    let analyzer = Arc::new(CountingAnalyzer::ok("x"));
    let mut controller =
        loaded_controller(vec![raw_failed("f1", "boom")], analyzer.clone()).await;
    controller.open_run("f1");
    controller.settle().await;

    let snap = controller.state().detail_snapshot();
    assert_eq!(snap.expanded_job_ids, vec!["1", "2"]);
    let levels: Vec<TimelineLevel> = snap.timeline.iter().map(|r| r.level).collect();
    assert_eq!(
        levels,
        vec![
            TimelineLevel::Job,
            TimelineLevel::Step,
            TimelineLevel::Job,
            TimelineLevel::Placeholder
        ]
    );
    assert_eq!(snap.timeline[3].label, NO_STEPS_PLACEHOLDER);

    controller.toggle_job_expansion("1");
    let snap = controller.state().detail_snapshot();
    assert_eq!(snap.expanded_job_ids, vec!["2"]);
    assert_eq!(snap.timeline.len(), 3);
}

#[tokio::test]
async fn delete_selected_run_closes_panel() {
    let analyzer = Arc::new(CountingAnalyzer::ok("x"));
    let mut controller =
        loaded_controller(vec![raw_success("s1"), raw_success("s2")], analyzer).await;
    controller.open_run("s1");
    controller.delete_run("s1");
    controller.settle().await;
    assert_eq!(controller.state().runs.len(), 1);
    assert_eq!(controller.state().detail.state(), PanelState::Closed);

    controller.delete_run("ghost");
    controller.settle().await;
    assert!(controller
        .state()
        .error_message()
        .is_some_and(|m| m.contains("not found")));
}

#[tokio::test]
async fn id_less_run_opens_without_backend_lookup() {
    let analyzer = Arc::new(CountingAnalyzer::ok("x"));
    let mut controller = loaded_controller(
        vec![raw_success("a"), json!({"status": "success", "branch": "dev"})],
        analyzer,
    )
    .await;
    let ids: Vec<&str> = controller.state().runs.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "run-2"]);

    controller.open_run("run-2");
    controller.settle().await;
    assert_eq!(controller.state().error_message(), None);
    assert_eq!(
        controller.state().detail_snapshot().selected_run.map(|r| r.id),
        Some("run-2".to_string())
    );
}

#[tokio::test]
async fn id_less_run_is_not_deleted_upstream() {
    let analyzer = Arc::new(CountingAnalyzer::ok("x"));
    let backend = Arc::new(FakeBackend::new(vec![
        raw_success("a"),
        json!({"status": "success", "branch": "dev"}),
    ]));
    let mut controller = controller_with(backend.clone(), analyzer);
    controller.refresh();
    controller.settle().await;

    controller.delete_run("run-2");
    assert!(!controller.state().is_loading());
    controller.settle().await;
    assert_eq!(controller.state().error_message(), None);
    assert!(controller.state().find_run("run-2").is_some());

    controller.refresh();
    controller.settle().await;
    assert_eq!(controller.state().runs.len(), 2);
    assert_eq!(backend.list_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

// ========== File backend end-to-end ==========

#[tokio::test]
async fn json_snapshot_end_to_end() {
    let path = std::env::temp_dir().join(format!("runlens-e2e-{}.json", std::process::id()));
    let snapshot = json!({
        "pipelines": [raw_failed("f1", "boom"), raw_success("s1")],
        "projects": [{"id": "p1", "name": "api"}]
    });
    std::fs::write(&path, snapshot.to_string()).unwrap();

    let analyzer = Arc::new(CountingAnalyzer::ok("## OOM"));
    let mut controller = Controller::new(
        AppState::default(),
        Arc::new(JsonFileBackend::new(&path)),
        analyzer.clone(),
    );
    controller.load_projects();
    controller.refresh();
    controller.settle().await;
    assert_eq!(controller.state().runs.len(), 2);
    assert_eq!(controller.state().projects.len(), 1);

    controller.update_filter(|f| f.set_status_facet(Facet::Only(Status::Failure)));
    let page: Vec<String> = controller.state().page().runs.iter().map(|r| r.id.clone()).collect();
    assert_eq!(page, vec!["f1"]);

    controller.open_run("f1");
    controller.settle().await;
    assert_eq!(
        controller.state().detail_snapshot().diagnostics.text.as_deref(),
        Some("## OOM")
    );
    let _ = std::fs::remove_file(&path);
}
