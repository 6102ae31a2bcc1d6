use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::fmt;

/// A GitHub account as returned by list and search endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

/// A user profile: login plus the optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Identity {
    pub fn new(login: &str, name: Option<&str>) -> Self {
        Self {
            login: login.to_string(),
            name: name.map(str::to_string),
        }
    }
}

/// One hit from the issue search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueItem {
    /// Canonical API locator, `{api}/repos/{owner}/{repo}/issues/{number}`
    pub url: String,
    pub number: u64,
    pub title: String,
    /// Null for deleted accounts
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
}

/// Envelope shared by every `/search/*` endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchResponse<T> {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<T>,
}

/// Owner and name of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Extract the repository from an issue locator by fixed position:
    /// the last four path segments are `{owner}/{repo}/{kind}/{number}`.
    ///
    /// Reading the locator avoids a repository request per search hit.
    pub fn from_issue_url(url: &str) -> Option<RepoRef> {
        let mut segments = url.trim_end_matches('/').rsplit('/');
        segments.next()?.parse::<u64>().ok()?;
        let kind = segments.next()?;
        if kind != "issues" && kind != "pulls" {
            return None;
        }
        let name = segments.next()?;
        let owner = segments.next()?;
        if name.is_empty() || owner.is_empty() {
            return None;
        }
        Some(RepoRef {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// A file found by code search that may hold code owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipHit {
    /// Repository name, without the owner
    pub repository: String,
    pub path: String,
    /// Contents API URL of the file
    pub url: String,
}

/// Pull request state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PrState {
    #[default]
    Open,
    Closed,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
        }
    }
}

/// Creation date interval. A missing bound is rendered as `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |date: Option<NaiveDate>| {
            date.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "*".to_string())
        };
        write!(f, "{}..{}", bound(self.after), bound(self.before))
    }
}

/// Issue search for pull requests in one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub org: String,
    pub state: PrState,
    pub created: DateRange,
    /// Restrict to these authors; empty means every author
    pub authors: Vec<String>,
    /// Authors to leave out when no explicit author list is given
    pub excluded: Vec<String>,
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "is:pr org:{} state:{} created:{}",
            self.org, self.state, self.created
        )?;
        if self.authors.is_empty() {
            for login in &self.excluded {
                write!(f, " -author:{}", login)?;
            }
        } else {
            for login in &self.authors {
                write!(f, " author:{}", login)?;
            }
        }
        Ok(())
    }
}
