use runlens::analyzer::CommandAnalyzer;
use runlens::app::{AppState, DetailSnapshot};
use runlens::backend::file::JsonFileBackend;
use runlens::cli::Cli;
use runlens::config::Config;
use runlens::controller::Controller;
use runlens::detail::TimelineLevel;
use runlens::events::AppEvent;
use runlens::model::{truncate, Run};
use runlens::traits::{AnalysisService, PipelineBackend};

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;

const MESSAGE_WIDTH: usize = 48;
const BRANCH_WIDTH: usize = 20;

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
    tracing::info!("runlens v{} starting", env!("CARGO_PKG_VERSION"));
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    setup_logging(args.verbose);
    let config = Config::from_cli(&args)?;

    let backend: Arc<dyn PipelineBackend> = Arc::new(JsonFileBackend::new(&config.runs_path));
    let analyzer: Arc<dyn AnalysisService> = Arc::new(CommandAnalyzer::new(
        config.analyzer_command.as_deref(),
        config.analyzer_timeout,
    ));
    let mut controller = Controller::new(AppState::new(config.filter.clone()), backend, analyzer);

    controller.load_projects();
    controller.refresh();
    controller.settle().await;
    if let Some(err) = controller.state().error_message() {
        return Err(eyre!("{err}"));
    }

    if let Some(run_id) = &config.show {
        controller.open_run(run_id);
        if !controller.state().detail.is_open() {
            return Err(eyre!("Run {run_id} not found"));
        }
        controller.settle().await;
    }
    print_report(controller.state(), config.json)?;

    if config.watch {
        let _feed = controller.start_live_feed(config.interval);
        while let Some(event) = controller.next_event().await {
            let reprint = matches!(
                event,
                AppEvent::RunsLoaded { .. }
                    | AppEvent::LoadFailed { .. }
                    | AppEvent::DetailLoaded(_)
                    | AppEvent::AnalysisResult { .. }
            );
            controller.handle_event(event);
            controller.prune_error();
            if reprint {
                print_report(controller.state(), config.json)?;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    page: usize,
    total_pages: usize,
    total_count: usize,
    runs: Vec<&'a Run>,
    detail: DetailSnapshot,
    error: Option<&'a str>,
}

fn print_report(state: &AppState, json: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    let view = state.page();
    if json {
        let report = JsonReport {
            page: view.page,
            total_pages: view.total_pages,
            total_count: view.total_count,
            runs: view.runs,
            detail: state.detail_snapshot(),
            error: state.error_message(),
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    if let Some(err) = state.error_message() {
        writeln!(out, "error: {err}")?;
    }
    match view.visible_range(state.filter.page_size()) {
        Some((first, last)) => writeln!(
            out,
            "Runs {first}-{last} of {} (page {}/{})",
            view.total_count, view.page, view.total_pages
        )?,
        None => writeln!(out, "{}", state.empty_message())?,
    }
    for run in &view.runs {
        let display = run.status.display();
        writeln!(
            out,
            "{} {:<8} {:<msg_w$} {:<br_w$} {:<12} {:>10} {:>9}  {}",
            display.icon.glyph(),
            display.label,
            truncate(&run.commit_message, MESSAGE_WIDTH),
            truncate(&run.branch, BRANCH_WIDTH),
            truncate(&run.author, 12),
            run.duration.to_string(),
            run.started_label,
            run.id,
            msg_w = MESSAGE_WIDTH,
            br_w = BRANCH_WIDTH,
        )?;
    }

    let snapshot = state.detail_snapshot();
    if let Some(run) = &snapshot.selected_run {
        print_detail(&mut out, run, &snapshot)?;
    }
    Ok(())
}

fn print_detail(out: &mut impl Write, run: &Run, snapshot: &DetailSnapshot) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "== {} ({}) ==", run.display_name(), run.id)?;
    writeln!(
        out,
        "{} on {} by {}, {}",
        run.status.display().label,
        run.branch,
        run.author,
        run.duration
    )?;
    writeln!(out, "-- Timeline --")?;
    for row in &snapshot.timeline {
        let glyph = row.status.map_or(" ", |s| s.icon.glyph());
        match row.level {
            TimelineLevel::Job => {
                let marker = if row.expanded { "v" } else { ">" };
                writeln!(out, "{marker} {glyph} {} [{}]", row.label, row.duration)?;
            }
            TimelineLevel::Step => {
                let log = if row.has_log { " (log)" } else { "" };
                writeln!(out, "    {glyph} {} [{}]{log}", row.label, row.duration)?;
            }
            TimelineLevel::Placeholder => writeln!(out, "    {}", row.label)?,
        }
    }
    writeln!(out, "-- Diagnostics --")?;
    if snapshot.diagnostics.loading {
        writeln!(out, "Analyzing failure...")?;
    } else if let Some(text) = &snapshot.diagnostics.text {
        writeln!(out, "{text}")?;
    } else {
        writeln!(out, "Open the diagnostics tab to analyze this run.")?;
    }
    Ok(())
}
