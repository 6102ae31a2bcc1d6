pub mod owners;
pub mod types;

pub use owners::OwnershipMap;
pub use types::{PullRequestRecord, HEADER};

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::github::{GitHubApi, GitHubError, IssueItem, RepoRef};
use crate::resolve::IdentityMap;

/// Placeholder GitHub shows for deleted accounts.
const GHOST_LOGIN: &str = "ghost";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Api(#[from] GitHubError),
}

/// Turns search hits into sorted report rows.
pub struct ReportAssembler<'a> {
    identities: &'a IdentityMap,
    /// `Some(file name)` to fill in code owners
    ownership_file: Option<&'a str>,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(identities: &'a IdentityMap) -> Self {
        Self {
            identities,
            ownership_file: None,
        }
    }

    /// Fill `Code_Owners` from the named file in each repository.
    pub fn with_ownership(mut self, file_name: &'a str) -> Self {
        self.ownership_file = Some(file_name);
        self
    }

    /// Build the report rows.
    ///
    /// 1. Repository comes from each item's locator; items whose locator
    ///    can't be read are logged and skipped.
    /// 2. Author is the mapped display name, or the raw login.
    /// 3. With ownership enabled, one search covers every repository seen and
    ///    only the first file per repository is fetched; a file that fails to
    ///    fetch is logged and its repository keeps empty code owners.
    /// 4. Rows are stable-sorted by repository.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn assemble(
        &self,
        api: &dyn GitHubApi,
        items: Vec<IssueItem>,
    ) -> Result<Vec<PullRequestRecord>, ReportError> {
        let mut repos: Vec<RepoRef> = Vec::new();
        let mut records = Vec::with_capacity(items.len());

        for item in items {
            let Some(repo) = RepoRef::from_issue_url(&item.url) else {
                warn!(url = %item.url, "skipping item with unrecognized locator");
                continue;
            };
            let login = item
                .user
                .as_ref()
                .map(|u| u.login.as_str())
                .unwrap_or(GHOST_LOGIN);
            records.push(PullRequestRecord {
                repository: repo.name.clone(),
                author: self.identities.display_name(login).to_string(),
                date_created: item.created_at,
                title: item.title,
                code_owners: String::new(),
            });
            if !repos.contains(&repo) {
                repos.push(repo);
            }
        }

        if let Some(file_name) = self.ownership_file {
            let owners = load_ownership(api, &repos, file_name).await?;
            if owners.is_empty() {
                warn!(file_name, "no repository has a code owners file");
            } else if owners.len() < repos.len() {
                warn!(
                    missing = repos.len() - owners.len(),
                    file_name, "some repositories have no code owners file"
                );
            }
            for record in &mut records {
                if let Some(text) = owners.get(&record.repository) {
                    record.code_owners = text.to_string();
                }
            }
        }

        records.sort_by(|a, b| a.repository.cmp(&b.repository));
        debug!(records = records.len(), repositories = repos.len(), "assembled report");
        Ok(records)
    }
}

/// Search all repositories for the ownership file at once, then fetch the
/// first hit per repository. A failed fetch leaves that repository out.
async fn load_ownership(
    api: &dyn GitHubApi,
    repos: &[RepoRef],
    file_name: &str,
) -> Result<OwnershipMap, ReportError> {
    let mut owners = OwnershipMap::default();
    if repos.is_empty() {
        return Ok(owners);
    }
    let hits = api.search_ownership_files(repos, file_name).await?;
    let wanted: HashSet<&str> = repos.iter().map(|r| r.name.as_str()).collect();
    for hit in owners::first_per_repository(hits) {
        if !wanted.contains(hit.repository.as_str()) {
            continue;
        }
        let text = match api.fetch_file(&hit).await {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    repository = %hit.repository,
                    path = %hit.path,
                    %error,
                    "skipping unreadable code owners file"
                );
                continue;
            }
        };
        debug!(repository = %hit.repository, path = %hit.path, "loaded code owners");
        owners.insert(&hit.repository, &text);
    }
    Ok(owners)
}

/// Write the header and `records` as CSV with LF line endings.
pub fn write_records<W: Write>(records: &[PullRequestRecord], out: W) -> Result<(), ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the report to `path`, replacing any existing file.
#[instrument(skip(records), fields(path = %path.display(), records = records.len()))]
pub fn write_csv(records: &[PullRequestRecord], path: &Path) -> Result<(), ReportError> {
    let file = File::create(path)?;
    write_records(records, file)?;
    info!("wrote report");
    Ok(())
}
