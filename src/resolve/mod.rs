pub mod identity;

pub use identity::IdentityMap;

use chrono::NaiveDate;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::parse_login_list;
use crate::github::{DateRange, GitHubApi, GitHubError, PrState, SearchQuery};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0}")]
    Configuration(String),

    #[error("{flag} must be a date in YYYY-MM-DD format, got {value:?}")]
    InvalidDate { flag: &'static str, value: String },

    #[error(transparent)]
    Api(#[from] GitHubError),
}

impl ResolveError {
    /// Errors caused by the command line rather than by GitHub.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ResolveError::Configuration(_) | ResolveError::InvalidDate { .. }
        )
    }
}

/// Raw report arguments as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ReportArgs {
    pub org: Option<String>,
    /// Comma separated logins
    pub user: Option<String>,
    /// Comma separated team ids or slugs
    pub team: Option<String>,
    pub state: PrState,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Who the report is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityFilter {
    Users(Vec<String>),
    Teams(Vec<String>),
    /// Every author in the organization
    Organization,
}

/// Arguments that passed validation; nothing here has touched the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFilter {
    pub org: String,
    pub state: PrState,
    pub created: DateRange,
    pub identities: IdentityFilter,
}

/// Everything one report run needs after identities are resolved.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub org: String,
    pub state: PrState,
    pub created: DateRange,
    pub identities: IdentityMap,
    pub excluded: BTreeSet<String>,
}

impl ReportRequest {
    /// The issue search for this run. Without resolved identities the whole
    /// organization is searched and exclusions become negated qualifiers.
    pub fn query(&self) -> SearchQuery {
        SearchQuery {
            org: self.org.clone(),
            state: self.state,
            created: self.created,
            authors: self.identities.logins().map(str::to_string).collect(),
            excluded: self.excluded.iter().cloned().collect(),
        }
    }
}

/// Check the arguments without making any request.
pub fn validate(args: &ReportArgs) -> Result<ReportFilter, ResolveError> {
    let org = args
        .org
        .as_deref()
        .map(str::trim)
        .filter(|org| !org.is_empty())
        .ok_or_else(|| ResolveError::Configuration("org is required".to_string()))?;

    let identities = match (args.user.as_deref(), args.team.as_deref()) {
        (Some(_), Some(_)) => {
            return Err(ResolveError::Configuration(
                "mutually exclusive values team and user specified".to_string(),
            ))
        }
        (Some(users), None) => IdentityFilter::Users(non_empty_list(users, "--user")?),
        (None, Some(teams)) => IdentityFilter::Teams(non_empty_list(teams, "--team")?),
        (None, None) => IdentityFilter::Organization,
    };

    let created = DateRange {
        after: parse_date("--after", args.after.as_deref())?,
        before: parse_date("--before", args.before.as_deref())?,
    };

    Ok(ReportFilter {
        org: org.to_string(),
        state: args.state,
        created,
        identities,
    })
}

fn non_empty_list(raw: &str, flag: &str) -> Result<Vec<String>, ResolveError> {
    let list = parse_login_list(raw);
    if list.is_empty() {
        return Err(ResolveError::Configuration(format!(
            "{} needs at least one value",
            flag
        )));
    }
    Ok(list)
}

fn parse_date(flag: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>, ResolveError> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                ResolveError::InvalidDate {
                    flag,
                    value: raw.to_string(),
                }
            })
        })
        .transpose()
}

/// Turn the identity filter into a login to display name mapping, then drop
/// excluded logins.
#[instrument(skip(filter, api, excluded), fields(org = %filter.org))]
pub async fn resolve_identities(
    filter: ReportFilter,
    api: &dyn GitHubApi,
    excluded: &BTreeSet<String>,
) -> Result<ReportRequest, ResolveError> {
    let mut identities = IdentityMap::default();

    match &filter.identities {
        IdentityFilter::Teams(teams) => {
            for team in teams {
                let members = api.team_members(&filter.org, team).await?.ok_or_else(|| {
                    ResolveError::Configuration(format!(
                        "could not find team {} in org {}",
                        team, filter.org
                    ))
                })?;
                debug!(team = %team, members = members.len(), "resolved team");
                identities.extend(members);
            }
        }
        IdentityFilter::Users(logins) => {
            identities.extend(api.search_users(logins).await?);
            if identities.is_empty() {
                return Err(ResolveError::Configuration(format!(
                    "none of the users {} exist",
                    logins.join(",")
                )));
            }
        }
        IdentityFilter::Organization => {}
    }

    let removed = identities.remove_all(excluded);
    if removed > 0 {
        info!(removed, "excluded authors");
    }
    if filter.identities != IdentityFilter::Organization && identities.is_empty() {
        return Err(ResolveError::Configuration(
            "every resolved author is excluded".to_string(),
        ));
    }

    Ok(ReportRequest {
        org: filter.org,
        state: filter.state,
        created: filter.created,
        identities,
        excluded: excluded.clone(),
    })
}

/// Validate, then resolve. Invalid arguments never reach `api`.
pub async fn resolve(
    args: &ReportArgs,
    api: &dyn GitHubApi,
    excluded: &BTreeSet<String>,
) -> Result<ReportRequest, ResolveError> {
    let filter = validate(args)?;
    resolve_identities(filter, api, excluded).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::fake::FakeGitHub;
    use crate::github::Identity;

    fn args(org: &str) -> ReportArgs {
        ReportArgs {
            org: Some(org.to_string()),
            ..ReportArgs::default()
        }
    }

    fn excluded(logins: &[&str]) -> BTreeSet<String> {
        logins.iter().map(|s| s.to_string()).collect()
    }

    fn fake_with_users() -> FakeGitHub {
        FakeGitHub {
            users: vec![
                Identity::new("alice", Some("Alice")),
                Identity::new("bob", Some("Bob")),
            ],
            ..FakeGitHub::default()
        }
    }

    #[tokio::test]
    async fn test_user_and_team_conflict_makes_no_calls() {
        let api = fake_with_users();
        let mut a = args("acme");
        a.user = Some("alice".to_string());
        a.team = Some("42".to_string());
        let err = resolve(&a, &api, &BTreeSet::new()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Configuration(_)));
        assert!(err.is_usage_error());
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn test_missing_org() {
        let err = validate(&ReportArgs::default()).unwrap_err();
        assert!(matches!(err, ResolveError::Configuration(_)));
        let err = validate(&args("  ")).unwrap_err();
        assert!(matches!(err, ResolveError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_malformed_before_makes_no_calls() {
        let api = fake_with_users();
        let mut a = args("acme");
        a.before = Some("2024-13-40".to_string());
        let err = resolve(&a, &api, &BTreeSet::new()).await.unwrap_err();
        match &err {
            ResolveError::InvalidDate { flag, value } => {
                assert_eq!(*flag, "--before");
                assert_eq!(value, "2024-13-40");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("--before"));
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn test_malformed_after_names_flag() {
        let mut a = args("acme");
        a.after = Some("01/15/2024".to_string());
        let err = validate(&a).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidDate { flag: "--after", .. }));
    }

    #[test]
    fn test_before_only_is_open_start() {
        let mut a = args("acme");
        a.before = Some("2024-01-15".to_string());
        let filter = validate(&a).unwrap();
        assert_eq!(filter.created.after, None);
        assert_eq!(filter.created.to_string(), "*..2024-01-15");
    }

    #[test]
    fn test_validate_splits_lists() {
        let mut a = args("acme");
        a.user = Some("alice, bob".to_string());
        let filter = validate(&a).unwrap();
        assert_eq!(
            filter.identities,
            IdentityFilter::Users(vec!["alice".to_string(), "bob".to_string()])
        );

        let mut a = args("acme");
        a.team = Some(",".to_string());
        assert!(validate(&a).is_err());
    }

    #[tokio::test]
    async fn test_org_wide_query() {
        let api = FakeGitHub::default();
        let request = resolve(&args("acme"), &api, &BTreeSet::new()).await.unwrap();
        assert!(request.identities.is_empty());
        assert_eq!(
            request.query().to_string(),
            "is:pr org:acme state:open created:*..*"
        );
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_exclusion_removes_resolved_author() {
        let api = fake_with_users();
        let mut a = args("acme");
        a.user = Some("alice,bob".to_string());
        let request = resolve(&a, &api, &excluded(&["bob"])).await.unwrap();
        let query = request.query();
        assert_eq!(query.authors, vec!["alice".to_string()]);
        assert!(!query.to_string().contains("bob"));
    }

    #[tokio::test]
    async fn test_exclusion_in_org_mode_negates_author() {
        let api = FakeGitHub::default();
        let request = resolve(&args("acme"), &api, &excluded(&["bob"]))
            .await
            .unwrap();
        assert!(request.query().to_string().ends_with(" -author:bob"));
    }

    #[tokio::test]
    async fn test_everyone_excluded_is_an_error() {
        let api = fake_with_users();
        let mut a = args("acme");
        a.user = Some("bob".to_string());
        let err = resolve(&a, &api, &excluded(&["bob"])).await.unwrap_err();
        assert!(matches!(err, ResolveError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_users_is_an_error() {
        let api = fake_with_users();
        let mut a = args("acme");
        a.user = Some("mallory".to_string());
        let err = resolve(&a, &api, &BTreeSet::new()).await.unwrap_err();
        assert!(err.to_string().contains("mallory"));
    }

    #[tokio::test]
    async fn test_team_mode_merges_members() {
        let mut api = FakeGitHub::default();
        api.teams.insert(
            "1".to_string(),
            vec![Identity::new("alice", Some("Alice")), Identity::new("bob", None)],
        );
        api.teams.insert(
            "platform".to_string(),
            vec![Identity::new("bob", Some("Robert")), Identity::new("carol", Some("Carol"))],
        );
        let mut a = args("acme");
        a.team = Some("1,platform".to_string());
        let request = resolve(&a, &api, &BTreeSet::new()).await.unwrap();
        assert_eq!(request.identities.len(), 3);
        assert_eq!(request.identities.display_name("alice"), "Alice");
        assert_eq!(request.identities.display_name("carol"), "Carol");
        assert_eq!(
            request.query().authors,
            vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_team_is_an_error() {
        let api = FakeGitHub::default();
        let mut a = args("acme");
        a.team = Some("99".to_string());
        let err = resolve(&a, &api, &BTreeSet::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "could not find team 99 in org acme");
    }
}
