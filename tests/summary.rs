use chrono::{TimeZone, Utc};
use gh_activity::models::{ActivityRecord, ResultSet};
use gh_activity::output::Tabular;
use gh_activity::summary::summarize;

fn push(set: &mut ResultSet, oid: &str, repo: &str, name: &str, email: &str, login: Option<&str>, day: u32) {
    set.push(
        oid,
        ActivityRecord {
            repository: repo.parse().unwrap(),
            committer_name: name.to_string(),
            committer_email: email.to_string(),
            committer_login: login.map(str::to_string),
            committer_company: None,
            committed_at: Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap(),
            commit_count: 1,
            additions: Some(3),
            deletions: Some(1),
        },
    );
}

#[test]
fn test_groups_by_login_and_links_orphan_emails() {
    let mut set = ResultSet::new();
    push(&mut set, "1", "acme/a", "Ada", "ada@work.example", Some("ada"), 1);
    push(&mut set, "2", "acme/b", "Ada", "ada@home.example", Some("Ada"), 3);
    // no login, but the email belongs to ada
    push(&mut set, "3", "acme/b", "Ada L.", "ADA@work.example", None, 5);
    push(&mut set, "4", "acme/a", "Grace", "grace@example.com", None, 2);

    let summaries = summarize(&set);
    assert_eq!(summaries.len(), 2);

    let ada = &summaries[0];
    assert_eq!(ada.identity, "ada");
    assert_eq!(ada.login.as_deref(), Some("ada"));
    assert_eq!(ada.commits, 3);
    assert_eq!(ada.emails, vec!["ada@work.example", "ada@home.example"]);
    assert_eq!(ada.repositories, vec!["acme/a", "acme/b"]);
    assert_eq!(ada.first_commit, Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap());
    assert_eq!(ada.last_commit, Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap());

    let grace = &summaries[1];
    assert_eq!(grace.identity, "grace@example.com");
    assert_eq!(grace.login, None);
    assert_eq!(grace.commits, 1);
}

#[test]
fn test_counts_folded_commits() {
    let mut set = ResultSet::new();
    push(&mut set, "1", "acme/a", "Bot", "bot@example.com", None, 1);
    // same instant, different commit: folded into one record with count 2
    push(&mut set, "2", "acme/a", "Bot", "bot@example.com", None, 1);

    let summaries = summarize(&set);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].commits, 2);
}

#[test]
fn test_ties_are_ordered_by_identity() {
    let mut set = ResultSet::new();
    push(&mut set, "1", "acme/a", "Zed", "zed@example.com", None, 1);
    push(&mut set, "2", "acme/a", "Amy", "amy@example.com", None, 2);

    let identities: Vec<_> = summarize(&set).into_iter().map(|s| s.identity).collect();
    assert_eq!(identities, vec!["amy@example.com", "zed@example.com"]);
}

#[test]
fn test_summary_row_layout() {
    let mut set = ResultSet::new();
    push(&mut set, "1", "acme/a", "Ada", "ada@example.com", Some("ada"), 1);
    push(&mut set, "2", "acme/b", "Ada", "ada@example.com", Some("ada"), 2);

    let summary = &summarize(&set)[0];
    let fields = summary.fields();
    assert_eq!(fields.len(), 12);
    assert_eq!(fields[3], "");
    assert_eq!(fields[5], "2");
    assert_eq!(fields[6], "6");
    assert_eq!(fields[7], "2");
    assert_eq!(fields[8], "2");
    assert_eq!(fields[9], "acme/a;acme/b");
    assert_eq!(fields[10], "2024-04-01T12:00:00Z");
}

#[test]
fn test_company_and_line_counts() {
    let mut set = ResultSet::new();
    push(&mut set, "1", "acme/a", "Ada", "ada@example.com", Some("ada"), 1);
    let mut with_company = ActivityRecord {
        repository: "acme/b".parse().unwrap(),
        committer_name: "Ada".to_string(),
        committer_email: "ada@example.com".to_string(),
        committer_login: Some("ada".to_string()),
        committer_company: Some("@acme".to_string()),
        committed_at: Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).unwrap(),
        commit_count: 1,
        additions: Some(40),
        deletions: Some(7),
    };
    set.push("2", with_company.clone());

    let ada = &summarize(&set)[0];
    assert_eq!(ada.company.as_deref(), Some("@acme"));
    assert_eq!(ada.additions, Some(43));
    assert_eq!(ada.deletions, Some(8));

    // a record without line counts makes the totals unknown
    with_company.additions = None;
    with_company.deletions = None;
    with_company.committed_at = Utc.with_ymd_and_hms(2024, 4, 3, 12, 0, 0).unwrap();
    set.push("3", with_company);

    let ada = &summarize(&set)[0];
    assert_eq!(ada.commits, 3);
    assert_eq!(ada.additions, None);
    assert_eq!(ada.deletions, None);
}

#[test]
fn test_empty_result_set() {
    assert!(summarize(&ResultSet::new()).is_empty());
}
