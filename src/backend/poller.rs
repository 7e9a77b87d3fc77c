//! Live feed: re-lists pipelines on an adaptive interval.
//!
//! The interval and the upstream query are both driven through `watch`
//! channels, so the controller can speed up polling while runs are active or
//! narrow the listing to a project without restarting the loop. Consecutive
//! failures stretch the delay exponentially up to [`MAX_BACKOFF_SECS`].

use crate::backend::normalizer::{self, normalize_all};
use crate::events::AppEvent;
use crate::traits::{PipelineBackend, PipelineQuery};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time;

/// Active runs change state within seconds.
pub const POLL_INTERVAL_ACTIVE: u64 = 3;
pub const POLL_INTERVAL_IDLE: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 300;

/// Delay before the next listing after `failures` consecutive errors: the
/// base interval doubled per failure, between one second and [`MAX_BACKOFF_SECS`].
pub fn backoff_delay(base_interval: u64, failures: u32) -> u64 {
    let stretched = 2u64
        .saturating_pow(failures)
        .saturating_mul(base_interval);
    stretched.clamp(1, MAX_BACKOFF_SECS)
}

/// Interval to use after a listing: fast while anything is still moving.
pub fn interval_for(has_active_runs: bool, idle_interval: u64) -> u64 {
    if has_active_runs {
        POLL_INTERVAL_ACTIVE.min(idle_interval)
    } else {
        idle_interval
    }
}

pub struct Poller {
    backend: Arc<dyn PipelineBackend>,
    tx: mpsc::UnboundedSender<AppEvent>,
    interval_rx: watch::Receiver<u64>,
    query_rx: watch::Receiver<PipelineQuery>,
}

impl Poller {
    pub fn new(
        backend: Arc<dyn PipelineBackend>,
        tx: mpsc::UnboundedSender<AppEvent>,
        interval_rx: watch::Receiver<u64>,
        query_rx: watch::Receiver<PipelineQuery>,
    ) -> Self {
        Self {
            backend,
            tx,
            interval_rx,
            query_rx,
        }
    }

    pub async fn run(mut self) {
        let mut failures: u32 = 0;
        loop {
            let query = self.query_rx.borrow().clone();
            match fetch_runs(&*self.backend, &query, &self.tx, false).await {
                FetchOutcome::Success => failures = 0,
                FetchOutcome::Failure => failures = failures.saturating_add(1),
                FetchOutcome::ChannelClosed => return,
            }

            let base_interval = *self.interval_rx.borrow();
            let delay = if failures > 0 {
                backoff_delay(base_interval, failures)
            } else {
                base_interval
            };
            // Wake early if the interval or the query changes; stop once the
            // controller has dropped its senders.
            tokio::select! {
                () = time::sleep(time::Duration::from_secs(delay)) => {},
                changed = self.interval_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                },
                changed = self.query_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                },
            }
        }
    }
}

pub enum FetchOutcome {
    Success,
    Failure,
    ChannelClosed,
}

/// One listing round-trip: backend call, normalization, event.
pub async fn fetch_runs(
    backend: &dyn PipelineBackend,
    query: &PipelineQuery,
    tx: &mpsc::UnboundedSender<AppEvent>,
    manual: bool,
) -> FetchOutcome {
    let (event, outcome) = match backend.list_pipelines(query).await {
        Ok(records) => (
            AppEvent::RunsLoaded {
                runs: normalize_all(&records),
                manual,
            },
            FetchOutcome::Success,
        ),
        Err(e) => (
            AppEvent::LoadFailed {
                error: format!("Failed to load runs: {e}"),
                manual,
            },
            FetchOutcome::Failure,
        ),
    };
    if tx.send(event).is_err() {
        tracing::warn!("fetch_runs: channel closed");
        return FetchOutcome::ChannelClosed;
    }
    outcome
}

pub async fn fetch_detail(
    backend: &dyn PipelineBackend,
    run_id: &str,
    tx: &mpsc::UnboundedSender<AppEvent>,
) {
    let event = match backend.get_pipeline_detail(run_id).await {
        Ok(raw) => {
            let mut run = normalizer::normalize(&raw);
            // The listing's id is authoritative for records without one.
            run.id = run_id.to_string();
            run.synthetic_id = false;
            AppEvent::DetailLoaded(run)
        }
        Err(e) => AppEvent::Error(format!("Failed to load run {run_id}: {e}")),
    };
    if tx.send(event).is_err() {
        tracing::warn!("fetch_detail: channel closed");
    }
}

pub async fn fetch_projects(backend: &dyn PipelineBackend, tx: &mpsc::UnboundedSender<AppEvent>) {
    let event = match backend.list_projects().await {
        Ok(records) => AppEvent::ProjectsLoaded(normalizer::normalize_projects(&records)),
        Err(e) => AppEvent::Error(format!("Failed to load projects: {e}")),
    };
    if tx.send(event).is_err() {
        tracing::warn!("fetch_projects: channel closed");
    }
}

pub async fn delete_run(
    backend: &dyn PipelineBackend,
    run_id: &str,
    tx: &mpsc::UnboundedSender<AppEvent>,
) {
    let event = match backend.delete_pipeline(run_id).await {
        Ok(()) => AppEvent::DeleteSuccess(run_id.to_string()),
        Err(e) => AppEvent::Error(format!("Failed to delete run {run_id}: {e}")),
    };
    if tx.send(event).is_err() {
        tracing::warn!("delete_run: channel closed");
    }
}
