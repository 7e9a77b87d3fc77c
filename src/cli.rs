use crate::analyzer::DEFAULT_ANALYZER_TIMEOUT_SECS;
use crate::backend::poller::POLL_INTERVAL_IDLE;
use crate::filter::DEFAULT_PAGE_SIZE;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "runlens",
    version,
    about = "CI run aggregation, filtering and failure diagnostics"
)]
pub struct Cli {
    /// JSON snapshot of pipeline records (an array, or an object with `pipelines` and `projects`)
    #[arg(short, long, value_name = "FILE")]
    pub runs: PathBuf,

    /// Case-insensitive text search over commit message, branch, author and name
    #[arg(short, long)]
    pub query: Option<String>,

    /// Status facet: ALL, queued, running, success, failed, canceled or skipped
    #[arg(short, long, default_value = "ALL")]
    pub status: String,

    /// Exact branch name
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Project id; also narrows the backend listing
    #[arg(short, long)]
    pub project: Option<String>,

    /// Earliest start day, inclusive (UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub from: Option<String>,

    /// Latest start day, inclusive (UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub to: Option<String>,

    /// Page to print (clamped to the last page)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub page: u64,

    /// Runs per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE as u64, value_parser = clap::value_parser!(u64).range(1..))]
    pub page_size: u64,

    /// Open one run's detail panel and wait for its diagnostics
    #[arg(long, value_name = "RUN_ID")]
    pub show: Option<String>,

    /// Command that reads a failure log on stdin and prints a markdown analysis
    #[arg(long, env = "RUNLENS_ANALYZER", value_name = "CMD")]
    pub analyzer: Option<String>,

    /// Seconds before the analyzer command is abandoned
    #[arg(long, default_value_t = DEFAULT_ANALYZER_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub analyzer_timeout: u64,

    /// Keep polling the runs file and reprint the page on every change
    #[arg(short, long)]
    pub watch: bool,

    /// Poll interval in seconds while idle (active runs poll faster)
    #[arg(short, long, default_value_t = POLL_INTERVAL_IDLE, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Print the page and detail snapshot as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}
