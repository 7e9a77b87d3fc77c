use crate::cli::Cli;
use crate::filter::{Facet, FilterState};
use crate::status::Status;
use chrono::NaiveDate;
use color_eyre::eyre::{eyre, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub runs_path: PathBuf,
    pub filter: FilterState,
    pub show: Option<String>,
    pub analyzer_command: Option<String>,
    pub analyzer_timeout: Duration,
    pub watch: bool,
    pub interval: u64,
    pub json: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let status: Facet<Status> = cli
            .status
            .parse()
            .map_err(|e| eyre!("Invalid --status: {e}"))?;
        let from = cli.from.as_deref().map(parse_date).transpose()?;
        let to = cli.to.as_deref().map(parse_date).transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(eyre!("--from {from} is after --to {to}"));
            }
        }

        let mut filter = FilterState::new(cli.page_size as usize);
        if let Some(query) = &cli.query {
            filter.set_query(query.clone());
        }
        filter.set_status_facet(status);
        if let Some(branch) = &cli.branch {
            filter.set_branch_facet(Facet::Only(branch.clone()));
        }
        if let Some(project) = &cli.project {
            filter.set_project_facet(Facet::Only(project.clone()));
        }
        filter.set_date_range(from, to);
        // Facet setters reset the page, so the requested page goes last.
        filter.set_page(cli.page as usize);

        Ok(Self {
            runs_path: cli.runs.clone(),
            filter,
            show: cli.show.clone(),
            analyzer_command: cli.analyzer.clone().filter(|c| !c.trim().is_empty()),
            analyzer_timeout: Duration::from_secs(cli.analyzer_timeout),
            watch: cli.watch,
            interval: cli.interval,
            json: cli.json,
            verbose: cli.verbose,
        })
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| eyre!("Invalid date '{s}' (expected YYYY-MM-DD): {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn config(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["runlens", "--runs", "runs.json"];
        argv.extend_from_slice(args);
        Config::from_cli(&Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn defaults_are_unfiltered() {
        let cfg = config(&[]).unwrap();
        assert!(!cfg.filter.is_filtered());
        assert_eq!(cfg.filter.page(), 1);
        assert_eq!(cfg.filter.page_size(), 10);
        assert_eq!(cfg.analyzer_timeout, Duration::from_secs(60));
    }

    #[test]
    fn facets_are_applied_and_page_kept() {
        let cfg = config(&[
            "--status", "failed", "--branch", "main", "--project", "p1", "--from", "2024-01-01",
            "--page", "3",
        ])
        .unwrap();
        assert_eq!(cfg.filter.status(), &Facet::Only(Status::Failure));
        assert_eq!(cfg.filter.branch(), &Facet::Only("main".to_string()));
        assert_eq!(cfg.filter.project(), &Facet::Only("p1".to_string()));
        assert_eq!(
            cfg.filter.date_range(),
            (NaiveDate::from_ymd_opt(2024, 1, 1), None)
        );
        assert_eq!(cfg.filter.page(), 3);
    }

    #[test]
    fn bad_status_rejected() {
        assert!(config(&["--status", "exploded"]).is_err());
    }

    #[test]
    fn bad_date_rejected() {
        assert!(config(&["--from", "01/02/2024"]).is_err());
        assert!(config(&["--to", "2024-13-01"]).is_err());
    }

    #[test]
    fn inverted_range_rejected() {
        let err = config(&["--from", "2024-02-01", "--to", "2024-01-01"]).unwrap_err();
        assert!(err.to_string().contains("is after"));
    }

    #[test]
    fn blank_analyzer_is_unset() {
        let cfg = config(&["--analyzer", "  "]).unwrap();
        assert_eq!(cfg.analyzer_command, None);
    }
}
