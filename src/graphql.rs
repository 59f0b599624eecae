//! GraphQL query documents and response schemas.
//!
//! Commit histories of several repositories are fetched in one request by
//! giving each repository its own field alias (`r0`, `r1`, ...) and its own
//! set of variables, so one round trip advances every pending cursor.

use crate::models::{RepoId, TimeRange};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::Write;

pub const ORG_REPOSITORIES_QUERY: &str = r#"query OrgRepositories($org: String!, $first: Int!, $cursor: String) {
  organization(login: $org) {
    repositories(first: $first, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes {
        name
        nameWithOwner
        isPrivate
        isFork
        isEmpty
        isArchived
        forkCount
        stargazerCount
        createdAt
        updatedAt
        pushedAt
        licenseInfo { name }
        codeOfConduct { url }
        defaultBranchRef {
          name
          target {
            ... on Commit {
              history(first: 1) {
                nodes {
                  oid
                  committedDate
                  author { name email date user { login } }
                  committer { name email date user { login } }
                }
              }
            }
          }
        }
      }
    }
  }
}"#;

/// Envelope of every GraphQL response
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub path: Vec<Value>,
}

impl GraphQlError {
    /// First path segment, which is the alias or root field the error belongs to
    pub fn root_field(&self) -> Option<&str> {
        self.path.first().and_then(Value::as_str)
    }
}

impl<T> GraphQlResponse<T> {
    pub fn is_rate_limited(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
    }

    /// Errors attached to one alias or root field
    pub fn errors_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a GraphQlError> + 'a {
        self.errors
            .iter()
            .filter(move |e| e.root_field() == Some(field))
    }

    /// Errors not tied to any particular field
    pub fn unscoped_errors(&self) -> impl Iterator<Item = &GraphQlError> {
        self.errors.iter().filter(|e| e.path.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrgRepositoriesData {
    pub organization: Option<OrganizationNode>,
}

#[derive(Debug, Deserialize)]
pub struct OrganizationNode {
    pub repositories: Connection<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Connection<T> {
    pub page_info: PageInfo,
    #[serde(default)]
    pub nodes: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub name: String,
    pub name_with_owner: String,
    pub is_private: bool,
    pub is_fork: bool,
    pub is_empty: bool,
    pub is_archived: bool,
    pub fork_count: u64,
    pub stargazer_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub license_info: Option<NamedNode>,
    pub code_of_conduct: Option<UrlNode>,
    pub default_branch_ref: Option<BranchRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedNode {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UrlNode {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRef {
    pub name: Option<String>,
    pub target: Option<CommitTarget>,
}

/// `... on Commit` leaves this empty when the branch points at something else
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitTarget {
    #[serde(default)]
    pub history: Option<CommitHistory>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitHistory {
    #[serde(default)]
    pub page_info: Option<PageInfo>,
    #[serde(default)]
    pub nodes: Vec<CommitNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitNode {
    #[serde(default)]
    pub oid: String,
    pub committed_date: DateTime<Utc>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub author: Option<GitActorNode>,
    pub committer: Option<GitActorNode>,
    /// Every author GitHub credits, co-authors from commit trailers included
    pub authors: Option<ActorConnection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActorConnection {
    #[serde(default)]
    pub nodes: Vec<GitActorNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitActorNode {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub user: Option<UserNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserNode {
    pub login: String,
    pub company: Option<String>,
}

/// Per-alias payload of the batched history query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryHistoryNode {
    pub default_branch_ref: Option<BranchRef>,
}

pub type HistoryBatchData = HashMap<String, Option<RepositoryHistoryNode>>;

/// Position of one repository inside a history batch
#[derive(Debug, Clone)]
pub struct HistoryCursor<'a> {
    pub repo: &'a RepoId,
    pub after: Option<&'a str>,
}

pub fn alias(index: usize) -> String {
    format!("r{}", index)
}

pub fn org_repositories_variables(org: &str, first: u32, cursor: Option<&str>) -> Value {
    json!({
        "org": org,
        "first": first,
        "cursor": cursor,
    })
}

/// Builds one query document covering every cursor in `batch`.
///
/// Entry `i` is exposed under alias `r{i}` and binds `$owner{i}`,
/// `$name{i}` and `$cursor{i}`.
pub fn history_batch_query(
    batch: &[HistoryCursor<'_>],
    window: &TimeRange,
    first: u32,
) -> (String, Value) {
    let mut declarations = String::from("$since: GitTimestamp!, $until: GitTimestamp!, $first: Int!");
    let mut selections = String::new();
    let mut variables = Map::new();

    variables.insert("since".into(), json!(git_timestamp(window.since())));
    variables.insert("until".into(), json!(git_timestamp(window.until())));
    variables.insert("first".into(), json!(first));

    for (i, entry) in batch.iter().enumerate() {
        let _ = write!(
            declarations,
            ", $owner{i}: String!, $name{i}: String!, $cursor{i}: String"
        );
        let _ = write!(
            selections,
            r#"
  {alias}: repository(owner: $owner{i}, name: $name{i}) {{
    defaultBranchRef {{
      name
      target {{
        ... on Commit {{
          history(since: $since, until: $until, first: $first, after: $cursor{i}) {{
            pageInfo {{ hasNextPage endCursor }}
            nodes {{
              oid
              committedDate
              additions
              deletions
              author {{ name email date user {{ login company }} }}
              committer {{ name email date user {{ login company }} }}
              authors(first: 100) {{ nodes {{ name email date user {{ login company }} }} }}
            }}
          }}
        }}
      }}
    }}
  }}"#,
            alias = alias(i),
        );

        variables.insert(format!("owner{i}"), json!(entry.repo.owner));
        variables.insert(format!("name{i}"), json!(entry.repo.name));
        variables.insert(format!("cursor{i}"), json!(entry.after));
    }

    let query = format!("query CommitHistory({declarations}) {{{selections}\n}}");
    (query, Value::Object(variables))
}

fn git_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Pull requests of one repository, walked backwards from the newest
pub const PULL_REQUESTS_QUERY: &str = r#"query PullRequests($owner: String!, $name: String!, $last: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(last: $last, before: $cursor) {
      pageInfo { hasPreviousPage startCursor }
      nodes {
        number
        title
        state
        createdAt
        mergedAt
        additions
        deletions
        changedFiles
        comments { totalCount }
        author {
          login
          ... on User { name pullRequests { totalCount } }
        }
      }
    }
  }
}"#;

pub fn pull_request_variables(repo: &RepoId, last: u32, cursor: Option<&str>) -> Value {
    json!({
        "owner": repo.owner,
        "name": repo.name,
        "last": last,
        "cursor": cursor,
    })
}

#[derive(Debug, Deserialize)]
pub struct PullRequestsData {
    pub repository: Option<PullRequestRepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRepositoryNode {
    pub pull_requests: PullRequestConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestConnection {
    pub page_info: BackwardPageInfo,
    #[serde(default)]
    pub nodes: Vec<PullRequestNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackwardPageInfo {
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestNode {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changed_files: u64,
    pub comments: Option<TotalCount>,
    /// Null once the author's account is deleted
    pub author: Option<PullRequestAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestAuthor {
    pub login: String,
    pub name: Option<String>,
    pub pull_requests: Option<TotalCount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCount {
    pub total_count: u64,
}
