use crate::error::{CollectorError, Result};
use crate::models::{OrgId, Transport};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";
pub const DEFAULT_USER_AGENT: &str = "gh-activity/0.1.0";
pub const MAX_PAGE_SIZE: u32 = 100;

/// When to suspend for the quota window and how long the run may spend waiting
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Suspend before the next request once remaining quota drops below this
    pub threshold: u32,
    /// Total time the run may spend waiting on rate limits
    pub backoff_budget: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            threshold: 10,
            backoff_budget: Duration::from_secs(3600), // one full quota window
        }
    }
}

/// Bounded exponential backoff for connection failures and 5xx responses
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub token: String,
    pub api_url: Url,
    pub graphql_url: Url,
    pub user_agent: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub rate_limit: RateLimitPolicy,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Configuration for github.com with default policies
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_endpoints(token, DEFAULT_API_URL, DEFAULT_GRAPHQL_URL)
    }

    /// Configuration against custom endpoints, e.g. GitHub Enterprise or a test server
    pub fn with_endpoints(
        token: impl Into<String>,
        api_url: &str,
        graphql_url: &str,
    ) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CollectorError::ConfigError("GitHub token is empty".to_string()));
        }

        Ok(Self {
            token,
            api_url: parse_url(api_url)?,
            graphql_url: parse_url(graphql_url)?,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            page_size: MAX_PAGE_SIZE,
            rate_limit: RateLimitPolicy::default(),
            retry: RetryPolicy::default(),
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| CollectorError::ConfigError(format!("Invalid URL {}: {}", raw, e)))
}

/// Which side of a commit an activity record is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Attribution {
    Author,
    #[default]
    Committer,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub transport: Transport,
    /// Repositories whose histories share one GraphQL request
    pub graphql_batch_size: usize,
    pub attribution: Attribution,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            transport: Transport::GraphQl,
            graphql_batch_size: 10,
            attribution: Attribution::Committer,
        }
    }
}

/// Reads the API token from the first line of `path`
pub fn read_key(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        CollectorError::ConfigError(format!(
            "Cannot read GitHub token from {}: {}",
            path.display(),
            e
        ))
    })?;

    let key = contents.lines().next().unwrap_or_default().trim_end().to_string();
    if key.is_empty() {
        return Err(CollectorError::ConfigError(format!(
            "GitHub token file {} is empty",
            path.display()
        )));
    }
    Ok(key)
}

/// Reads one org per line, taking the first comma-separated column.
/// Blank lines and `#` comments are skipped, repeats are dropped.
pub fn read_orgs(path: &Path) -> Result<Vec<OrgId>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        CollectorError::ConfigError(format!(
            "Cannot read organizations from {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_orgs(contents.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        line.split(',').next().map(str::trim)
    }))
}

/// Validates and deduplicates org names, keeping first-seen order
pub fn parse_orgs<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<OrgId>> {
    let mut seen = HashSet::new();
    let mut orgs = Vec::new();
    for name in names {
        let org = OrgId::new(name)?;
        if seen.insert(org.clone()) {
            orgs.push(org);
        }
    }

    if orgs.is_empty() {
        return Err(CollectorError::ConfigError(
            "No organizations configured".to_string(),
        ));
    }
    Ok(orgs)
}
