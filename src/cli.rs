use crate::config::{
    self, Attribution, ClientConfig, CollectorConfig, RateLimitPolicy, RetryPolicy, MAX_PAGE_SIZE,
};
use crate::error::{CollectorError, Result};
use crate::models::{OrgId, RepoId, TimeRange, Transport};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gh-activity")]
#[command(about = "Collects GitHub organization, repository and commit activity into CSV files")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Commit activity per repository and committer inside a time window
    Commits(WindowArgs),

    /// Repository inventory with license, visibility and latest commit
    Repos,

    /// Commit activity aggregated per person inside a time window
    People(WindowArgs),

    /// Repositories on a `master` default branch or without a code of conduct
    Inclusivity,

    /// Recent pull requests of one repository with size and author details
    Prs(PrArgs),
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Organization to collect (repeatable); overrides the orgs file
    #[arg(long = "org", global = true)]
    pub orgs: Vec<String>,

    /// File with one organization per line
    #[arg(long, env = "GH_ORGS_FILE", default_value = "orgs.txt", global = true)]
    pub orgs_file: PathBuf,

    /// File whose first line is the GitHub API token
    #[arg(long, env = "GH_TOKEN_FILE", default_value = "gh_key", global = true)]
    pub token_file: PathBuf,

    /// API used to collect data
    #[arg(long, value_enum, env = "GH_TRANSPORT", default_value_t = Transport::GraphQl, global = true)]
    pub transport: Transport,

    /// Directory the CSV report is written to
    #[arg(long, env = "GH_OUTPUT_DIR", default_value = "output", global = true)]
    pub output_dir: PathBuf,

    /// GitHub REST API base URL
    #[arg(long, env = "GH_API_URL", default_value = config::DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// GitHub GraphQL endpoint
    #[arg(long, env = "GH_GRAPHQL_URL", default_value = config::DEFAULT_GRAPHQL_URL, global = true)]
    pub graphql_url: String,

    /// Results per page (at most 100)
    #[arg(long, default_value_t = MAX_PAGE_SIZE, global = true)]
    pub page_size: u32,

    /// Repositories whose histories share one GraphQL request
    #[arg(long, default_value_t = 10, global = true)]
    pub batch_size: usize,

    /// Wait for the quota reset once fewer requests than this remain
    #[arg(long, default_value_t = 10, global = true)]
    pub rate_limit_threshold: u32,

    /// Total seconds the run may spend waiting on rate limits
    #[arg(long, default_value_t = 3600, global = true)]
    pub backoff_budget: u64,

    /// Retries for connection failures and server errors
    #[arg(long, default_value_t = 3, global = true)]
    pub max_retries: u32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Write whatever was collected when the run is interrupted
    #[arg(long, global = true)]
    pub write_partial: bool,
}

#[derive(Args)]
pub struct WindowArgs {
    /// Collect commits from this date on (YYYY-MM-DD), default 30 days before --until
    #[arg(short, long)]
    pub since: Option<NaiveDate>,

    /// Collect commits up to the end of this date (YYYY-MM-DD), default now
    #[arg(short, long)]
    pub until: Option<NaiveDate>,

    /// Attribute each commit to its author or its committer
    /// [default: committer for commits, author for people]
    #[arg(long, value_enum)]
    pub attribute_to: Option<Attribution>,
}

#[derive(Args)]
pub struct PrArgs {
    /// Repository as owner/name
    #[arg(long)]
    pub repo: RepoId,

    /// Pages of pull requests to fetch, newest first
    #[arg(long, default_value_t = 10)]
    pub pages: u32,
}

impl GlobalArgs {
    /// Organizations from `--org`, or else the orgs file
    pub fn organizations(&self) -> Result<Vec<OrgId>> {
        if self.orgs.is_empty() {
            config::read_orgs(&self.orgs_file)
        } else {
            config::parse_orgs(self.orgs.iter().map(String::as_str))
        }
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(CollectorError::ConfigError(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let token = config::read_key(&self.token_file)?;
        let mut client = ClientConfig::with_endpoints(token, &self.api_url, &self.graphql_url)?;
        client.page_size = self.page_size;
        client.timeout = Duration::from_secs(self.timeout);
        client.rate_limit = RateLimitPolicy {
            threshold: self.rate_limit_threshold,
            backoff_budget: Duration::from_secs(self.backoff_budget),
        };
        client.retry = RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        };
        Ok(client)
    }

    pub fn collector_config(&self, attribution: Attribution) -> CollectorConfig {
        CollectorConfig {
            transport: self.transport,
            graphql_batch_size: self.batch_size.max(1),
            attribution,
        }
    }
}

impl WindowArgs {
    pub fn attribution(&self, default: Attribution) -> Attribution {
        self.attribute_to.unwrap_or(default)
    }

    pub fn window(&self, now: DateTime<Utc>) -> Result<TimeRange> {
        let until = match self.until {
            Some(date) => end_of_day(date)?,
            None => now,
        };
        match self.since {
            Some(date) => TimeRange::new(start_of_day(date)?, until),
            None => TimeRange::last_days(until, 30),
        }
    }
}

fn start_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .ok_or_else(|| CollectorError::ConfigError(format!("Invalid date {}", date)))
}

fn end_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(23, 59, 59)
        .map(|t| t.and_utc())
        .ok_or_else(|| CollectorError::ConfigError(format!("Invalid date {}", date)))
}
