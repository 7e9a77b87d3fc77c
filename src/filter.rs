use crate::model::Run;
use crate::status::Status;
use chrono::NaiveDate;
use serde::Serialize;
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One filter dimension: either unconstrained or pinned to a single value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum Facet<T> {
    #[default]
    All,
    Only(T),
}

impl<T: PartialEq> Facet<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Facet::All => true,
            Facet::Only(wanted) => wanted == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Facet::All)
    }
}

/// `"ALL"` (any case) is the unconstrained facet; anything else parses as a value.
impl<T: FromStr> FromStr for Facet<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(Facet::All)
        } else {
            s.trim().parse().map(Facet::Only)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterState {
    query: String,
    status: Facet<Status>,
    branch: Facet<String>,
    project: Facet<String>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    page: usize,
    page_size: usize,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl FilterState {
    pub fn new(page_size: usize) -> Self {
        Self {
            query: String::new(),
            status: Facet::All,
            branch: Facet::All,
            project: Facet::All,
            date_from: None,
            date_to: None,
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn status(&self) -> &Facet<Status> {
        &self.status
    }

    pub fn branch(&self) -> &Facet<String> {
        &self.branch
    }

    pub fn project(&self) -> &Facet<String> {
        &self.project
    }

    pub fn date_range(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        (self.date_from, self.date_to)
    }

    /// Requested page; [`apply`] clamps it into range.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// True when any facet or the query narrows the list.
    pub fn is_filtered(&self) -> bool {
        !self.query.trim().is_empty()
            || !self.status.is_all()
            || !self.branch.is_all()
            || !self.project.is_all()
            || self.date_from.is_some()
            || self.date_to.is_some()
    }

    // Every facet mutation lands back on page 1.

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.page = 1;
    }

    pub fn set_status_facet(&mut self, status: Facet<Status>) {
        self.status = status;
        self.page = 1;
    }

    pub fn set_branch_facet(&mut self, branch: Facet<String>) {
        self.branch = branch;
        self.page = 1;
    }

    pub fn set_project_facet(&mut self, project: Facet<String>) {
        self.project = project;
        self.page = 1;
    }

    pub fn set_date_range(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) {
        self.date_from = from;
        self.date_to = to;
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn clear_filters(&mut self) {
        *self = Self::new(self.page_size);
    }

    pub fn matches(&self, run: &Run) -> bool {
        self.matches_query(run)
            && self.status.matches(&run.status)
            && self.branch.matches(&run.branch)
            && self.matches_project(run)
            && self.matches_dates(run)
    }

    fn matches_query(&self, run: &Run) -> bool {
        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            Some(run.commit_message.as_str()),
            Some(run.branch.as_str()),
            Some(run.author.as_str()),
            run.name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }

    fn matches_project(&self, run: &Run) -> bool {
        match &self.project {
            Facet::All => true,
            Facet::Only(id) => run.project_id.as_ref() == Some(id),
        }
    }

    /// Day-granular and inclusive: `from` 00:00:00 through `to` 23:59:59 UTC.
    fn matches_dates(&self, run: &Run) -> bool {
        if self.date_from.is_none() && self.date_to.is_none() {
            return true;
        }
        let Some(started) = run.started_at else {
            return false;
        };
        let day = started.date_naive();
        self.date_from.is_none_or(|from| day >= from) && self.date_to.is_none_or(|to| day <= to)
    }
}

/// One page of the filtered list plus the metadata a list view needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView<'a> {
    pub runs: Vec<&'a Run>,
    pub total_count: usize,
    pub total_pages: usize,
    /// The requested page after clamping into `[1, total_pages]`.
    pub page: usize,
}

impl PageView<'_> {
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// 1-based index range of the visible slice within the filtered list,
    /// e.g. `(21, 25)`; `None` when nothing matched.
    pub fn visible_range(&self, page_size: usize) -> Option<(usize, usize)> {
        if self.runs.is_empty() {
            return None;
        }
        let start = (self.page - 1) * page_size + 1;
        Some((start, start + self.runs.len() - 1))
    }
}

pub fn total_pages(total_count: usize, page_size: usize) -> usize {
    total_count.div_ceil(page_size.max(1)).max(1)
}

pub fn apply<'a>(runs: &'a [Run], state: &FilterState) -> PageView<'a> {
    let matched: Vec<&Run> = runs.iter().filter(|r| state.matches(r)).collect();
    let total_count = matched.len();
    let total_pages = total_pages(total_count, state.page_size);
    let page = state.page.clamp(1, total_pages);
    let runs = matched
        .into_iter()
        .skip((page - 1) * state.page_size)
        .take(state.page_size)
        .collect();
    PageView {
        runs,
        total_count,
        total_pages,
        page,
    }
}

/// Distinct branch names in first-seen order, for populating the branch facet.
pub fn branch_options(runs: &[Run]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    runs.iter()
        .filter(|r| seen.insert(r.branch.as_str()))
        .map(|r| r.branch.clone())
        .collect()
}
