use crate::config::ClientConfig;
use crate::error::{CollectorError, Result};
use crate::graphql::GraphQlResponse;
use crate::models::{OrgId, RateLimitState, RepoId, TimeRange};
use crate::types::{RestCommit, RestErrorBody, RestRepository};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Extra time past the advertised reset before the next request
const RESET_SLACK: Duration = Duration::from_secs(1);
/// Assumed quota window when GitHub reports a limit without a reset time
const FALLBACK_RESET: Duration = Duration::from_secs(60);

/// One page of a paginated listing plus the cursor of the next page
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// Body and metadata of a response the client accepted
#[derive(Debug)]
struct ApiResponse {
    status: StatusCode,
    next: Option<String>,
    body: String,
}

pub struct GitHubClient {
    client: Client,
    config: ClientConfig,
    rate_limit: Option<RateLimitState>,
    backoff_spent: Duration,
    requests_sent: u64,
}

impl GitHubClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(GitHubClient {
            client,
            config,
            rate_limit: None,
            backoff_spent: Duration::ZERO,
            requests_sent: 0,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    /// Quota reported by the most recent response
    pub fn rate_limit_state(&self) -> Option<&RateLimitState> {
        self.rate_limit.as_ref()
    }

    /// Outbound requests issued so far, retries included
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Time spent suspended on rate limits so far
    pub fn backoff_spent(&self) -> Duration {
        self.backoff_spent
    }

    async fn execute<F>(&mut self, what: &str, build: F) -> Result<ApiResponse>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut retries = 0;

        loop {
            self.wait_for_quota().await?;

            self.requests_sent += 1;
            let sent = build(&self.client)
                .header("Accept", "application/vnd.github.v3+json")
                .header("Authorization", format!("token {}", self.config.token))
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) if is_transient(&e) => {
                    retries += 1;
                    self.backoff_or_fail(what, retries, e.to_string()).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            let headers = response.headers().clone();
            let rate_limit = rate_limit_from_headers(&headers);
            if let Some(state) = &rate_limit {
                self.rate_limit = Some(state.clone());
            }
            let next = headers
                .get("Link")
                .and_then(|h| h.to_str().ok())
                .and_then(next_link);

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    retries += 1;
                    self.backoff_or_fail(what, retries, e.to_string()).await?;
                    continue;
                }
            };

            match status {
                s if s.is_success() || s == StatusCode::CONFLICT => {
                    return Ok(ApiResponse { status, next, body });
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(CollectorError::AuthError(format!(
                        "{} rejected the token: {}",
                        what,
                        error_message(&body)
                    )));
                }
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
                    if is_rate_limited(status, &headers, rate_limit.as_ref(), &body) =>
                {
                    let reset = retry_after(&headers)
                        .map(from_now)
                        .or_else(|| rate_limit.as_ref().map(|state| state.reset_time))
                        .unwrap_or_else(|| from_now(FALLBACK_RESET));
                    self.suspend_until(what, reset).await?;
                    continue;
                }
                StatusCode::FORBIDDEN => {
                    return Err(CollectorError::ApiError(format!(
                        "Forbidden: {}: {}",
                        what,
                        error_message(&body)
                    )));
                }
                StatusCode::NOT_FOUND => {
                    return Err(CollectorError::NotFound(what.to_string()));
                }
                s if s.is_server_error() => {
                    retries += 1;
                    self.backoff_or_fail(what, retries, format!("server error {}", s)).await?;
                    continue;
                }
                s => {
                    return Err(CollectorError::ApiError(format!(
                        "{} failed with status {}: {}",
                        what,
                        s,
                        error_message(&body)
                    )));
                }
            }
        }
    }

    async fn backoff_or_fail(&mut self, what: &str, attempt: u32, cause: String) -> Result<()> {
        if attempt > self.config.retry.max_retries {
            return Err(CollectorError::TransientNetworkError(format!(
                "{} failed after {} attempts: {}",
                what, attempt, cause
            )));
        }

        let delay = self.config.retry.delay_for(attempt);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "⚠️ {} failed ({}). Retrying...",
            what,
            cause
        );
        sleep(delay).await;
        Ok(())
    }

    /// Suspends before a request while the last seen quota is under the threshold
    async fn wait_for_quota(&mut self) -> Result<()> {
        let Some(state) = &self.rate_limit else {
            return Ok(());
        };
        if state.remaining >= self.config.rate_limit.threshold || state.reset_time <= Utc::now() {
            return Ok(());
        }

        let reset = state.reset_time;
        self.suspend_until("next request", reset).await
    }

    async fn suspend_until(&mut self, what: &str, reset: DateTime<Utc>) -> Result<()> {
        let wait = wait_until(reset, Utc::now());
        let budget = self.config.rate_limit.backoff_budget;
        // slack is not charged, so a budget of one quota window covers a full wait
        let charged = wait.saturating_sub(RESET_SLACK);

        if self.backoff_spent + charged > budget {
            return Err(CollectorError::RateLimitExceeded(format!(
                "{} needs a {}s wait until {} but only {}s of backoff budget remain",
                what,
                charged.as_secs(),
                reset.to_rfc3339(),
                budget.saturating_sub(self.backoff_spent).as_secs()
            )));
        }

        warn!(
            wait_secs = wait.as_secs(),
            reset = %reset.to_rfc3339(),
            "⏱️ Rate limit reached. Waiting for quota reset..."
        );
        sleep(wait).await;
        self.backoff_spent += charged;

        // quota window has rolled over
        if let Some(state) = self.rate_limit.as_mut() {
            state.remaining = state.limit;
            state.is_limited = false;
        }
        Ok(())
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let raw = format!("{}/{}", self.config.api_url.as_str().trim_end_matches('/'), path);
        let mut url = Url::parse(&raw)
            .map_err(|e| CollectorError::ConfigError(format!("Invalid endpoint {}: {}", raw, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn cursor_url(cursor: &str) -> Result<Url> {
        Url::parse(cursor).map_err(|e| {
            CollectorError::MalformedResponseError(format!("Invalid next-page link {}: {}", cursor, e))
        })
    }

    /// Fetch a page of an org's repositories; `cursor` is the previous page's next link
    pub async fn list_org_repos_page(
        &mut self,
        org: &OrgId,
        cursor: Option<&str>,
    ) -> Result<Page<RestRepository>> {
        let url = match cursor {
            Some(cursor) => Self::cursor_url(cursor)?,
            None => self.endpoint(
                &format!("orgs/{}/repos", org),
                &[("type", "all".to_string()), ("per_page", self.page_size().to_string())],
            )?,
        };

        let what = format!("repositories of {}", org);
        let response = self.execute(&what, |c| c.get(url.clone())).await?;
        expect_ok(&response, &what)?;
        let items = decode(&response.body, &what)?;
        Ok(Page { items, next: response.next })
    }

    /// Fetch a page of default-branch commits inside `window`. Empty
    /// repositories come back as a final empty page.
    pub async fn list_commits_page(
        &mut self,
        repo: &RepoId,
        window: &TimeRange,
        cursor: Option<&str>,
    ) -> Result<Page<RestCommit>> {
        let url = match cursor {
            Some(cursor) => Self::cursor_url(cursor)?,
            None => self.endpoint(
                &format!("repos/{}/{}/commits", repo.owner, repo.name),
                &[
                    ("since", rest_timestamp(window.since())),
                    ("until", rest_timestamp(window.until())),
                    ("per_page", self.page_size().to_string()),
                ],
            )?,
        };

        let what = format!("commits of {}", repo);
        let response = self.execute(&what, |c| c.get(url.clone())).await?;
        if response.status == StatusCode::CONFLICT {
            debug!(repo = %repo, "Repository is empty");
            return Ok(Page { items: Vec::new(), next: None });
        }
        let items = decode(&response.body, &what)?;
        Ok(Page { items, next: response.next })
    }

    /// Most recent commit on the default branch, if any
    pub async fn latest_commit(&mut self, repo: &RepoId) -> Result<Option<RestCommit>> {
        let url = self.endpoint(
            &format!("repos/{}/{}/commits", repo.owner, repo.name),
            &[("per_page", "1".to_string())],
        )?;

        let what = format!("latest commit of {}", repo);
        let response = self.execute(&what, |c| c.get(url.clone())).await?;
        if response.status == StatusCode::CONFLICT {
            return Ok(None);
        }
        let commits: Vec<RestCommit> = decode(&response.body, &what)?;
        Ok(commits.into_iter().next())
    }

    /// Run a GraphQL query. Responses flagged `RATE_LIMITED` are retried
    /// after the quota resets.
    pub async fn graphql<T: DeserializeOwned>(
        &mut self,
        query: &str,
        variables: Value,
    ) -> Result<GraphQlResponse<T>> {
        let url = self.config.graphql_url.clone();
        let payload = json!({ "query": query, "variables": variables });

        loop {
            let response = self
                .execute("GraphQL query", |c| c.post(url.clone()).json(&payload))
                .await?;
            expect_ok(&response, "GraphQL query")?;

            let parsed: GraphQlResponse<T> = decode(&response.body, "GraphQL response")?;
            if parsed.is_rate_limited() {
                let reset = self
                    .rate_limit
                    .as_ref()
                    .map(|state| state.reset_time)
                    .filter(|reset| *reset > Utc::now())
                    .unwrap_or_else(|| from_now(FALLBACK_RESET));
                self.suspend_until("GraphQL query", reset).await?;
                continue;
            }
            return Ok(parsed);
        }
    }
}

/// Read the quota headers GitHub attaches to every API response
pub fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitState> {
    let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

    let remaining = header("X-RateLimit-Remaining")?.parse::<u32>().ok()?;

    let limit = header("X-RateLimit-Limit")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(5000);

    let reset_time = header("X-RateLimit-Reset")
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

    Some(RateLimitState {
        remaining,
        limit,
        reset_time,
        is_limited: remaining == 0,
    })
}

/// Extract the `rel="next"` target from a Link header
pub fn next_link(link_header: &str) -> Option<String> {
    link_header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// How long to sleep so the next request lands after `reset`
pub fn wait_until(reset: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (reset - now).to_std().unwrap_or(Duration::ZERO) + RESET_SLACK
}

fn from_now(wait: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("Retry-After")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn is_rate_limited(
    status: StatusCode,
    headers: &HeaderMap,
    rate_limit: Option<&RateLimitState>,
    body: &str,
) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || rate_limit.map(|state| state.remaining == 0).unwrap_or(false)
        || retry_after(headers).is_some()
        || error_message(body).to_lowercase().contains("rate limit")
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
}

fn expect_ok(response: &ApiResponse, what: &str) -> Result<()> {
    if response.status == StatusCode::CONFLICT {
        return Err(CollectorError::ApiError(format!(
            "{} failed with status {}: {}",
            what,
            response.status,
            error_message(&response.body)
        )));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| CollectorError::MalformedResponseError(format!("{}: {}", what, e)))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<RestErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

fn rest_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
