use chrono::{TimeZone, Utc};
use gh_activity::graphql::{
    self, GraphQlResponse, HistoryBatchData, HistoryCursor, OrgRepositoriesData,
};
use gh_activity::models::{RepoId, TimeRange};
use serde_json::json;

fn window() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
    )
    .unwrap()
}

#[test]
fn test_history_batch_query_aliases_every_repository() {
    let alpha: RepoId = "acme/alpha".parse().unwrap();
    let beta: RepoId = "acme/beta".parse().unwrap();
    let batch = [
        HistoryCursor { repo: &alpha, after: None },
        HistoryCursor { repo: &beta, after: Some("Y3Vyc29y") },
    ];

    let (query, variables) = graphql::history_batch_query(&batch, &window(), 100);

    assert!(query.starts_with("query CommitHistory("));
    assert!(query.contains("r0: repository(owner: $owner0, name: $name0)"));
    assert!(query.contains("r1: repository(owner: $owner1, name: $name1)"));
    assert!(query.contains("after: $cursor1"));
    assert!(!query.contains("r2:"));

    assert_eq!(variables["since"], "2024-01-01T00:00:00Z");
    assert_eq!(variables["until"], "2024-01-31T23:59:59Z");
    assert_eq!(variables["first"], 100);
    assert_eq!(variables["owner0"], "acme");
    assert_eq!(variables["name1"], "beta");
    assert!(variables["cursor0"].is_null());
    assert_eq!(variables["cursor1"], "Y3Vyc29y");

    // line counts and every credited author are requested
    assert!(query.contains("additions") && query.contains("deletions"));
    assert!(query.contains("authors(first: 100)"));
}

#[test]
fn test_org_repositories_variables() {
    let variables = graphql::org_repositories_variables("acme", 50, Some("abc"));
    assert_eq!(variables, json!({"org": "acme", "first": 50, "cursor": "abc"}));
    assert!(graphql::ORG_REPOSITORIES_QUERY.contains("query OrgRepositories("));
}

#[test]
fn test_pull_request_variables() {
    let repo: RepoId = "acme/widget".parse().unwrap();
    let variables = graphql::pull_request_variables(&repo, 25, None);
    assert_eq!(
        variables,
        json!({"owner": "acme", "name": "widget", "last": 25, "cursor": null})
    );
    assert!(graphql::PULL_REQUESTS_QUERY.contains("pullRequests(last: $last, before: $cursor)"));
}

#[test]
fn test_connection_without_nodes_is_empty() {
    let body = json!({"data": {"organization": {"repositories": {
        "pageInfo": {"hasNextPage": false, "endCursor": null}
    }}}});

    let response: GraphQlResponse<OrgRepositoriesData> = serde_json::from_value(body).unwrap();
    let organization = response.data.unwrap().organization.unwrap();
    assert!(organization.repositories.nodes.is_empty());
}

#[test]
fn test_errors_are_scoped_by_alias() {
    let body = json!({
        "data": {"r0": null, "r1": {"defaultBranchRef": null}},
        "errors": [
            {"type": "NOT_FOUND", "path": ["r0"], "message": "Could not resolve to a Repository"},
            {"message": "Something went wrong"}
        ]
    });

    let response: GraphQlResponse<HistoryBatchData> = serde_json::from_value(body).unwrap();
    assert!(!response.is_rate_limited());

    let r0: Vec<_> = response.errors_for("r0").collect();
    assert_eq!(r0.len(), 1);
    assert_eq!(r0[0].kind.as_deref(), Some("NOT_FOUND"));
    assert_eq!(response.errors_for("r1").count(), 0);
    assert_eq!(response.unscoped_errors().count(), 1);

    let data = response.data.unwrap();
    assert!(data["r0"].is_none());
    assert!(data["r1"].as_ref().unwrap().default_branch_ref.is_none());
}

#[test]
fn test_rate_limited_response() {
    let body = json!({
        "data": null,
        "errors": [{"type": "RATE_LIMITED", "message": "API rate limit exceeded"}]
    });

    let response: GraphQlResponse<OrgRepositoriesData> = serde_json::from_value(body).unwrap();
    assert!(response.is_rate_limited());
    assert!(response.data.is_none());
}
