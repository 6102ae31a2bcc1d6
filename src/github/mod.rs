pub mod client;
pub mod types;

pub use client::GitHubClient;
pub use types::{
    DateRange, Identity, IssueItem, OwnershipHit, PrState, RepoRef, SearchQuery, User,
};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// The GitHub operations the report pipeline depends on.
///
/// Every call is awaited in turn by the pipeline; implementations need not
/// handle concurrent use beyond being `Send + Sync`.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Members of the team whose numeric id or slug equals `team`.
    /// Returns `Ok(None)` when the organization has no such team.
    async fn team_members(
        &self,
        org: &str,
        team: &str,
    ) -> Result<Option<Vec<Identity>>, GitHubError>;

    /// Profiles of the requested logins that exist. Unknown logins are
    /// silently absent from the result.
    async fn search_users(&self, logins: &[String]) -> Result<Vec<Identity>, GitHubError>;

    /// Every pull request matching `query`, across all result pages.
    async fn search_pull_requests(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<IssueItem>, GitHubError>;

    /// Files named `file_name` in any of `repos`, in search order.
    async fn search_ownership_files(
        &self,
        repos: &[RepoRef],
        file_name: &str,
    ) -> Result<Vec<OwnershipHit>, GitHubError>;

    /// Raw text of a file found by [`GitHubApi::search_ownership_files`].
    async fn fetch_file(&self, hit: &OwnershipHit) -> Result<String, GitHubError>;
}
