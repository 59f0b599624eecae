use chrono::{TimeZone, Utc};
use clap::Parser;
use gh_activity::cli::{Cli, Command};
use gh_activity::config::{self, Attribution, ClientConfig, RetryPolicy};
use gh_activity::error::CollectorError;
use gh_activity::models::Transport;
use std::fs;
use std::time::Duration;

#[test]
fn test_read_key_takes_first_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gh_key");
    fs::write(&path, "ghp_secret \nsecond line\n").unwrap();

    assert_eq!(config::read_key(&path).unwrap(), "ghp_secret");
}

#[test]
fn test_read_key_missing_or_empty() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(config::read_key(&missing), Err(CollectorError::ConfigError(_))));

    let empty = dir.path().join("gh_key");
    fs::write(&empty, "\n").unwrap();
    assert!(matches!(config::read_key(&empty), Err(CollectorError::ConfigError(_))));
}

#[test]
fn test_read_orgs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orgs.txt");
    fs::write(&path, "# tracked orgs\nacme,Acme Corp\n\n  globex  \nacme\ninitech\n").unwrap();

    let orgs = config::read_orgs(&path).unwrap();
    let names: Vec<_> = orgs.iter().map(|o| o.as_str()).collect();
    assert_eq!(names, vec!["acme", "globex", "initech"]);
}

#[test]
fn test_org_list_must_not_be_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orgs.txt");
    fs::write(&path, "# nothing yet\n").unwrap();

    assert!(matches!(config::read_orgs(&path), Err(CollectorError::ConfigError(_))));
    assert!(config::parse_orgs(Vec::<&str>::new()).is_err());
}

#[test]
fn test_client_config_defaults() {
    let client = ClientConfig::new("token").unwrap();
    assert_eq!(client.api_url.as_str(), "https://api.github.com/");
    assert_eq!(client.page_size, 100);
    assert_eq!(client.rate_limit.threshold, 10);
    assert_eq!(client.retry.max_retries, 3);

    assert!(matches!(ClientConfig::new("  "), Err(CollectorError::ConfigError(_))));
    assert!(ClientConfig::with_endpoints("token", "not a url", "https://x/graphql").is_err());
}

#[test]
fn test_retry_delay_doubles() {
    let policy = RetryPolicy {
        max_retries: 4,
        base_delay: Duration::from_millis(100),
    };
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.delay_for(4), Duration::from_millis(800));
}

#[test]
fn test_cli_commits_window() {
    let cli = Cli::try_parse_from([
        "gh-activity",
        "commits",
        "--org",
        "acme",
        "--since",
        "2024-01-01",
        "--until",
        "2024-01-31",
        "--transport",
        "rest",
    ])
    .unwrap();

    assert_eq!(cli.global.transport, Transport::Rest);
    assert_eq!(cli.global.orgs, vec!["acme"]);
    let orgs = cli.global.organizations().unwrap();
    assert_eq!(orgs[0].as_str(), "acme");

    let Command::Commits(window_args) = &cli.command else {
        panic!("expected the commits command");
    };
    assert_eq!(window_args.attribute_to, None);
    assert_eq!(window_args.attribution(Attribution::Committer), Attribution::Committer);

    let window = window_args.window(Utc::now()).unwrap();
    assert_eq!(window.since(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(window.until(), Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap());
}

#[test]
fn test_cli_default_window_is_thirty_days() {
    let cli = Cli::try_parse_from(["gh-activity", "people", "--attribute-to", "author"]).unwrap();
    let Command::People(window_args) = &cli.command else {
        panic!("expected the people command");
    };
    assert_eq!(window_args.attribute_to, Some(Attribution::Author));
    assert_eq!(window_args.attribution(Attribution::Committer), Attribution::Author);

    let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
    let window = window_args.window(now).unwrap();
    assert_eq!(window.until(), now);
    assert_eq!(window.since(), now - chrono::Duration::days(30));
}

#[test]
fn test_cli_rejects_inverted_window() {
    let cli = Cli::try_parse_from([
        "gh-activity",
        "commits",
        "--since",
        "2024-02-01",
        "--until",
        "2024-01-01",
    ])
    .unwrap();
    let Command::Commits(window_args) = &cli.command else {
        panic!("expected the commits command");
    };

    assert!(matches!(
        window_args.window(Utc::now()),
        Err(CollectorError::ConfigError(_))
    ));
}

#[test]
fn test_cli_client_config() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("gh_key");
    fs::write(&key, "ghp_from_file\n").unwrap();

    let cli = Cli::try_parse_from([
        "gh-activity",
        "repos",
        "--token-file",
        key.to_str().unwrap(),
        "--page-size",
        "50",
        "--max-retries",
        "5",
        "--backoff-budget",
        "60",
    ])
    .unwrap();

    let client = cli.global.client_config().unwrap();
    assert_eq!(client.token, "ghp_from_file");
    assert_eq!(client.page_size, 50);
    assert_eq!(client.retry.max_retries, 5);
    assert_eq!(client.rate_limit.backoff_budget, Duration::from_secs(60));

    let collector = cli.global.collector_config(Attribution::Author);
    assert_eq!(collector.graphql_batch_size, 10);
    assert_eq!(collector.attribution, Attribution::Author);
}

#[test]
fn test_cli_page_size_limit() {
    let cli = Cli::try_parse_from(["gh-activity", "repos", "--page-size", "500"]).unwrap();
    assert!(matches!(
        cli.global.client_config(),
        Err(CollectorError::ConfigError(_))
    ));
}

#[test]
fn test_cli_rejects_bad_dates() {
    assert!(Cli::try_parse_from(["gh-activity", "commits", "--since", "last week"]).is_err());
}

#[test]
fn test_cli_people_defaults_to_author() {
    let cli = Cli::try_parse_from(["gh-activity", "people"]).unwrap();
    let Command::People(window_args) = &cli.command else {
        panic!("expected the people command");
    };
    assert_eq!(window_args.attribution(Attribution::Author), Attribution::Author);
}

#[test]
fn test_cli_prs_arguments() {
    let cli = Cli::try_parse_from(["gh-activity", "prs", "--repo", "acme/widget", "--pages", "3"]).unwrap();
    let Command::Prs(args) = &cli.command else {
        panic!("expected the prs command");
    };
    assert_eq!(args.repo.to_string(), "acme/widget");
    assert_eq!(args.pages, 3);

    let cli = Cli::try_parse_from(["gh-activity", "prs", "--repo", "acme/widget"]).unwrap();
    let Command::Prs(args) = &cli.command else {
        panic!("expected the prs command");
    };
    assert_eq!(args.pages, 10);

    assert!(Cli::try_parse_from(["gh-activity", "prs", "--repo", "widget"]).is_err());
    assert!(Cli::try_parse_from(["gh-activity", "inclusivity"]).is_ok());
}
