use crate::app::AppState;
use crate::backend::poller::{self, Poller};
use crate::detail::DetailTab;
use crate::diagnostics::{self, AnalysisOutcome, AnalysisRequest, UNAVAILABLE_MESSAGE};
use crate::events::AppEvent;
use crate::filter::FilterState;
use crate::traits::{AnalysisService, PipelineBackend, PipelineQuery};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

pub struct Controller {
    state: AppState,
    backend: Arc<dyn PipelineBackend>,
    analyzer: Arc<dyn AnalysisService>,
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    query_tx: watch::Sender<PipelineQuery>,
    live_feed: Option<LiveFeed>,
}

struct LiveFeed {
    interval_tx: watch::Sender<u64>,
    idle_interval: u64,
}

impl Controller {
    pub fn new(
        state: AppState,
        backend: Arc<dyn PipelineBackend>,
        analyzer: Arc<dyn AnalysisService>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (query_tx, _) = watch::channel(query_for(&state.filter));
        Self {
            state,
            backend,
            analyzer,
            tx,
            rx,
            query_tx,
            live_feed: None,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    // --- Collection ---

    pub fn refresh(&mut self) {
        self.state.begin_loading();
        let backend = Arc::clone(&self.backend);
        let query = self.query_tx.borrow().clone();
        let tx = self.tx.clone();
        spawn_monitored(self.tx.clone(), "refresh", async move {
            poller::fetch_runs(&*backend, &query, &tx, true).await;
        });
    }

    pub fn load_projects(&mut self) {
        self.state.begin_loading();
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        spawn_monitored(self.tx.clone(), "projects", async move {
            poller::fetch_projects(&*backend, &tx).await;
        });
    }

    /// Starts the background poller. Runs are re-listed every
    /// `idle_interval` seconds, faster while any run is still active.
    pub fn start_live_feed(&mut self, idle_interval: u64) -> JoinHandle<()> {
        let interval = poller::interval_for(self.state.has_active_runs(), idle_interval);
        let (interval_tx, interval_rx) = watch::channel(interval);
        self.live_feed = Some(LiveFeed {
            interval_tx,
            idle_interval,
        });
        let poller = Poller::new(
            Arc::clone(&self.backend),
            self.tx.clone(),
            interval_rx,
            self.query_tx.subscribe(),
        );
        tokio::spawn(poller.run())
    }

    pub fn delete_run(&mut self, run_id: &str) {
        if self.is_local_only(run_id) {
            tracing::warn!(%run_id, "run has no backend id, skipping delete");
            return;
        }
        self.state.begin_loading();
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let run_id = run_id.to_string();
        spawn_monitored(self.tx.clone(), "delete", async move {
            poller::delete_run(&*backend, &run_id, &tx).await;
        });
    }

    /// Applies a filter mutation. A changed project facet is forwarded to the
    /// backend listing.
    pub fn update_filter(&mut self, mutate: impl FnOnce(&mut FilterState)) {
        mutate(&mut self.state.filter);
        let query = query_for(&self.state.filter);
        if *self.query_tx.borrow() == query {
            return;
        }
        tracing::debug!(project = ?query.project_id, "upstream query changed");
        self.query_tx.send_replace(query);
        // A running live feed wakes on the query change by itself.
        if self.live_feed.is_none() {
            self.refresh();
        }
    }

    // --- Detail panel ---

    pub fn open_run(&mut self, run_id: &str) {
        let request = self.state.select_run(run_id);
        self.dispatch(request);
        let needs_detail = self
            .state
            .detail
            .selected()
            .is_some_and(|run| run.id == run_id && run.jobs.is_none() && !run.synthetic_id);
        if needs_detail {
            self.state.begin_loading();
            let backend = Arc::clone(&self.backend);
            let tx = self.tx.clone();
            let run_id = run_id.to_string();
            spawn_monitored(self.tx.clone(), "detail", async move {
                poller::fetch_detail(&*backend, &run_id, &tx).await;
            });
        }
    }

    pub fn switch_tab(&mut self, tab: DetailTab) {
        let request = self.state.switch_tab(tab);
        self.dispatch(request);
    }

    pub fn close_detail(&mut self) {
        self.state.close_detail();
    }

    pub fn toggle_job_expansion(&mut self, job_id: &str) {
        self.state.toggle_job_expansion(job_id);
    }

    pub fn retry_analysis(&mut self) {
        let request = self.state.retry_analysis();
        self.dispatch(request);
    }

    pub fn prune_error(&mut self) {
        self.state.prune_error(Instant::now());
    }

    // --- Event loop ---

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::RunsLoaded { runs, manual } => {
                if manual {
                    self.state.end_loading();
                }
                tracing::debug!(count = runs.len(), manual, "runs loaded");
                let request = self.state.update_runs(runs);
                self.dispatch(request);
                self.adapt_interval();
            }
            AppEvent::LoadFailed { error, manual } => {
                if manual {
                    self.state.end_loading();
                }
                tracing::warn!("{error}");
                self.state.set_error(error);
            }
            AppEvent::ProjectsLoaded(projects) => {
                self.state.end_loading();
                self.state.update_projects(projects);
            }
            AppEvent::DetailLoaded(run) => {
                self.state.end_loading();
                let request = self.state.upsert_run(run);
                self.dispatch(request);
            }
            AppEvent::AnalysisResult { run_id, outcome } => {
                self.state.end_loading();
                if self.state.apply_analysis(&run_id, outcome) {
                    tracing::info!(%run_id, "analysis ready");
                }
            }
            AppEvent::DeleteSuccess(run_id) => {
                self.state.end_loading();
                tracing::info!(%run_id, "run deleted");
                self.state.remove_run(&run_id);
            }
            AppEvent::Error(msg) => {
                self.state.end_loading();
                tracing::warn!("{msg}");
                self.state.set_error(msg);
            }
        }
    }

    /// Processes events until every outstanding call has reported back.
    pub async fn settle(&mut self) {
        while self.state.is_loading() {
            match self.rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    fn dispatch(&mut self, request: Option<AnalysisRequest>) {
        let Some(AnalysisRequest { run_id, log }) = request else {
            return;
        };
        self.state.begin_loading();
        let analyzer = Arc::clone(&self.analyzer);
        let tx = self.tx.clone();
        let crashed_id = run_id.clone();
        let task = async move {
            let outcome = diagnostics::analyze(&*analyzer, &log).await;
            if tx.send(AppEvent::AnalysisResult { run_id, outcome }).is_err() {
                tracing::warn!("analysis: channel closed");
            }
        };
        // A crashed analyzer still resolves the session, or it would stay loading.
        spawn_with_fallback(self.tx.clone(), "analysis", task, move |_| {
            AppEvent::AnalysisResult {
                run_id: crashed_id,
                outcome: AnalysisOutcome::Failed(UNAVAILABLE_MESSAGE.to_string()),
            }
        });
    }

    fn is_local_only(&self, run_id: &str) -> bool {
        self.state.find_run(run_id).is_some_and(|run| run.synthetic_id)
    }

    fn adapt_interval(&self) {
        let Some(feed) = &self.live_feed else {
            return;
        };
        let next = poller::interval_for(self.state.has_active_runs(), feed.idle_interval);
        feed.interval_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!(from = *current, to = next, "poll interval changed");
            *current = next;
            true
        });
    }
}

fn query_for(filter: &FilterState) -> PipelineQuery {
    PipelineQuery {
        project_id: match filter.project() {
            crate::filter::Facet::All => None,
            crate::filter::Facet::Only(id) => Some(id.clone()),
        },
    }
}

/// Spawns `fut` and reports a panic back as an [`AppEvent::Error`] so the
/// loading counter still settles.
fn spawn_monitored(
    tx: mpsc::UnboundedSender<AppEvent>,
    label: &'static str,
    fut: impl Future<Output = ()> + Send + 'static,
) {
    spawn_with_fallback(tx, label, fut, move |msg| {
        AppEvent::Error(format!("{label} crashed: {msg}"))
    });
}

/// Like [`spawn_monitored`], but a crashed task is reported through
/// `on_crash`, which builds the event the task itself would have sent.
fn spawn_with_fallback(
    tx: mpsc::UnboundedSender<AppEvent>,
    label: &'static str,
    fut: impl Future<Output = ()> + Send + 'static,
    on_crash: impl FnOnce(String) -> AppEvent + Send + 'static,
) {
    tokio::spawn(async move {
        let Err(join_err) = tokio::spawn(fut).await else {
            return;
        };
        let msg = crash_message(join_err);
        tracing::error!("{label} task failed: {msg}");
        if tx.send(on_crash(msg)).is_err() {
            tracing::warn!("{label}: channel closed while reporting crash");
        }
    });
}

fn crash_message(join_err: JoinError) -> String {
    if !join_err.is_panic() {
        return "task cancelled".to_string();
    }
    let payload = join_err.into_panic();
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "unknown panic".to_string())
}
