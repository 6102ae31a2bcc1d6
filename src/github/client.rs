use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::types::{Identity, IssueItem, OwnershipHit, RepoRef, SearchQuery, SearchResponse, User};
use super::{GitHubApi, GitHubError};

const USER_AGENT: &str = "pr-report";
const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const PER_PAGE: &str = "100";

/// GitHub rejects search queries longer than this.
const MAX_QUERY_LEN: usize = 256;

#[derive(Debug, Deserialize)]
struct Team {
    id: u64,
    slug: String,
}

impl Team {
    fn matches(&self, ident: &str) -> bool {
        self.id.to_string() == ident || self.slug.eq_ignore_ascii_case(ident)
    }
}

#[derive(Debug, Deserialize)]
struct CodeSearchItem {
    path: String,
    url: String,
    repository: CodeSearchRepository,
}

#[derive(Debug, Deserialize)]
struct CodeSearchRepository {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// REST client for api.github.com or a GitHub Enterprise API root.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: String) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, url: &str, accept: &str) -> RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.request(url, JSON_MEDIA_TYPE)
    }

    /// Send a request, turning non-2xx responses into [`GitHubError::Api`]
    /// carrying the message GitHub put in the body.
    async fn send(&self, request: RequestBuilder) -> Result<Response, GitHubError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let fallback = status.canonical_reason().unwrap_or("unknown error").to_string();
        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or(fallback);
        Err(GitHubError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Collect every page of a list endpoint by following `rel="next"` links.
    async fn list_all<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, GitHubError> {
        let mut all = Vec::new();
        let mut request = self.get(url).query(&[("per_page", PER_PAGE)]);
        loop {
            let response = self.send(request).await?;
            let next = next_link(response.headers());
            let page: Vec<T> = response.json().await?;
            debug!(received = page.len(), "list page");
            all.extend(page);
            match next {
                Some(next_url) => request = self.get(&next_url),
                None => break,
            }
        }
        Ok(all)
    }

    /// Collect every page of a `/search/*` endpoint.
    async fn search_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        q: &str,
    ) -> Result<Vec<T>, GitHubError> {
        let url = format!("{}/search/{}", self.api_url, endpoint);
        let mut all = Vec::new();
        let mut total_count = 0;
        let mut request = self.get(&url).query(&[("q", q), ("per_page", PER_PAGE)]);
        loop {
            let response = self.send(request).await?;
            let next = next_link(response.headers());
            let page: SearchResponse<T> = response.json().await?;
            if page.incomplete_results {
                warn!(endpoint, q, "GitHub reported incomplete search results");
            }
            debug!(
                endpoint,
                total = page.total_count,
                received = page.items.len(),
                "search page"
            );
            total_count = page.total_count;
            all.extend(page.items);
            match next {
                Some(next_url) => request = self.get(&next_url),
                None => break,
            }
        }
        if is_truncated(total_count, all.len()) {
            warn!(
                endpoint,
                q,
                total = total_count,
                received = all.len(),
                "search results truncated by GitHub's result cap"
            );
        }
        Ok(all)
    }

    async fn user(&self, login: &str) -> Result<Identity, GitHubError> {
        let url = format!("{}/users/{}", self.api_url, login);
        Ok(self.send(self.get(&url)).await?.json().await?)
    }

    async fn profiles(&self, users: Vec<User>) -> Result<Vec<Identity>, GitHubError> {
        let mut identities = Vec::with_capacity(users.len());
        for user in users {
            identities.push(self.user(&user.login).await?);
        }
        Ok(identities)
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    #[instrument(skip(self))]
    async fn team_members(
        &self,
        org: &str,
        team: &str,
    ) -> Result<Option<Vec<Identity>>, GitHubError> {
        let teams: Vec<Team> = self
            .list_all(&format!("{}/orgs/{}/teams", self.api_url, org))
            .await?;
        let Some(found) = teams.into_iter().find(|t| t.matches(team)) else {
            return Ok(None);
        };
        debug!(slug = %found.slug, id = found.id, "found team");

        let members: Vec<User> = self
            .list_all(&format!(
                "{}/orgs/{}/teams/{}/members",
                self.api_url, org, found.slug
            ))
            .await?;
        Ok(Some(self.profiles(members).await?))
    }

    #[instrument(skip(self))]
    async fn search_users(&self, logins: &[String]) -> Result<Vec<Identity>, GitHubError> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }
        let q = logins
            .iter()
            .map(|login| format!("user:{}", login))
            .collect::<Vec<_>>()
            .join(" ");
        let hits: Vec<User> = self.search_all("users", &q).await?;
        self.profiles(hits).await
    }

    #[instrument(skip(self, query), fields(q = %query))]
    async fn search_pull_requests(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<IssueItem>, GitHubError> {
        self.search_all("issues", &query.to_string()).await
    }

    #[instrument(skip(self, repos), fields(repos = repos.len()))]
    async fn search_ownership_files(
        &self,
        repos: &[RepoRef],
        file_name: &str,
    ) -> Result<Vec<OwnershipHit>, GitHubError> {
        let mut hits = Vec::new();
        for q in batch_code_queries(file_name, repos) {
            let items: Vec<CodeSearchItem> = self.search_all("code", &q).await?;
            hits.extend(items.into_iter().map(|item| OwnershipHit {
                repository: item.repository.name,
                path: item.path,
                url: item.url,
            }));
        }
        Ok(hits)
    }

    #[instrument(skip(self, hit), fields(repository = %hit.repository, path = %hit.path))]
    async fn fetch_file(&self, hit: &OwnershipHit) -> Result<String, GitHubError> {
        let request = self.request(&hit.url, RAW_MEDIA_TYPE);
        Ok(self.send(request).await?.text().await?)
    }
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}

/// Whether a search returned fewer items than it matched.
fn is_truncated(total_count: u64, received: usize) -> bool {
    total_count > received as u64
}

/// Build code search queries for `file_name` across `repos`, packing as many
/// `repo:` qualifiers into each query as the length limit allows.
fn batch_code_queries(file_name: &str, repos: &[RepoRef]) -> Vec<String> {
    let prefix = format!("filename:{}", file_name);
    let mut queries = Vec::new();
    let mut current = prefix.clone();
    for repo in repos {
        let qualifier = format!(" repo:{}", repo.full_name());
        if current.len() > prefix.len() && current.len() + qualifier.len() > MAX_QUERY_LEN {
            queries.push(std::mem::replace(&mut current, prefix.clone()));
        }
        current.push_str(&qualifier);
    }
    if current.len() > prefix.len() {
        queries.push(current);
    }
    queries
}
