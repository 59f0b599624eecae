#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use gh_activity::config::{Attribution, ClientConfig, CollectorConfig, RateLimitPolicy, RetryPolicy};
use gh_activity::models::{OrgId, TimeRange, Transport};
use gh_activity::{Collector, GitHubClient};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Client configuration pointed at a mock server, with fast retries
pub fn client_config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::with_endpoints(
        "test_token",
        &server.uri(),
        &format!("{}/graphql", server.uri()),
    )
    .expect("mock server URI is valid");

    config.retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
    };
    config.rate_limit = RateLimitPolicy {
        threshold: 1,
        backoff_budget: Duration::from_secs(30),
    };
    config
}

pub fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new(client_config(server)).expect("Failed to create client")
}

pub fn collector(server: &MockServer, transport: Transport) -> Collector {
    Collector::new(
        client(server),
        CollectorConfig {
            transport,
            graphql_batch_size: 10,
            attribution: Attribution::Committer,
        },
    )
}

pub fn orgs(names: &[&str]) -> Vec<OrgId> {
    names.iter().map(|n| OrgId::new(*n).expect("valid org")).collect()
}

pub fn window() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
    )
    .expect("valid window")
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn rest_repo(owner: &str, name: &str) -> Value {
    json!({
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "private": false,
        "fork": false,
        "archived": false,
        "license": { "name": "MIT License" },
        "default_branch": "main",
        "forks_count": 3,
        "stargazers_count": 42,
        "created_at": "2020-01-01T00:00:00Z",
        "updated_at": "2024-03-01T00:00:00Z",
        "pushed_at": "2024-03-02T00:00:00Z"
    })
}

pub fn rest_commit(sha: &str, name: &str, email: &str, date: DateTime<Utc>) -> Value {
    let actor = json!({ "name": name, "email": email, "date": date.to_rfc3339() });
    json!({
        "sha": sha,
        "commit": { "author": actor, "committer": actor },
        "author": { "login": name.to_lowercase() },
        "committer": { "login": name.to_lowercase() }
    })
}

pub fn gql_commit(oid: &str, name: &str, email: &str, date: DateTime<Utc>) -> Value {
    let actor = json!({
        "name": name,
        "email": email,
        "date": date.to_rfc3339(),
        "user": { "login": name.to_lowercase() }
    });
    json!({
        "oid": oid,
        "committedDate": date.to_rfc3339(),
        "author": actor,
        "committer": actor
    })
}

pub fn gql_repo(owner: &str, name: &str) -> Value {
    json!({
        "name": name,
        "nameWithOwner": format!("{}/{}", owner, name),
        "isPrivate": false,
        "isFork": false,
        "isEmpty": false,
        "isArchived": false,
        "forkCount": 1,
        "stargazerCount": 7,
        "createdAt": "2020-01-01T00:00:00Z",
        "updatedAt": "2024-03-01T00:00:00Z",
        "pushedAt": "2024-03-02T00:00:00Z",
        "licenseInfo": { "name": "Apache License 2.0" },
        "defaultBranchRef": {
            "name": "main",
            "target": {
                "history": {
                    "nodes": [gql_commit("head", "Ada", "ada@example.com", at(2, 9))]
                }
            }
        }
    })
}

/// GraphQL history payload for one alias
pub fn gql_history(commits: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "defaultBranchRef": {
            "name": "main",
            "target": {
                "history": {
                    "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next },
                    "nodes": commits
                }
            }
        }
    })
}

/// Mounts a REST listing served as `pages`, linked through `?page=N`.
/// Each page expects exactly one fetch.
pub async fn mount_rest_pages(server: &MockServer, route: &str, pages: Vec<Vec<Value>>) {
    let total = pages.len();
    for (i, items) in pages.into_iter().enumerate() {
        let number = i + 1;
        let mut template = ResponseTemplate::new(200).set_body_json(Value::Array(items));
        if number < total {
            template = template.insert_header(
                "Link",
                format!(
                    "<{}{}?page={}>; rel=\"next\", <{}{}?page={}>; rel=\"last\"",
                    server.uri(),
                    route,
                    number + 1,
                    server.uri(),
                    route,
                    total
                )
                .as_str(),
            );
        }

        let mock = Mock::given(method("GET")).and(path(route));
        let mock = if number == 1 {
            mock.respond_with(template)
        } else {
            mock.and(query_param("page", number.to_string()))
                .respond_with(template)
                .with_priority(1)
        };
        mock.expect(1).mount(server).await;
    }
}

pub async fn mount_org_repos(server: &MockServer, org: &str, names: &[&str]) {
    let repos = names.iter().map(|n| rest_repo(org, n)).collect();
    mount_rest_pages(server, &format!("/orgs/{}/repos", org), vec![repos]).await;
}
