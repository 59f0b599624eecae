use crate::error::{CollectorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// GitHub organization login
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(String);

impl OrgId {
    pub fn new(login: impl Into<String>) -> Result<Self> {
        let login = login.into().trim().to_string();
        if login.is_empty() || login.contains('/') {
            return Err(CollectorError::ConfigError(format!(
                "Invalid organization name: {:?}",
                login
            )));
        }
        Ok(OrgId(login))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Repository identity, always owned by exactly one org
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn org(&self) -> &str {
        &self.owner
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = CollectorError;

    fn from_str(full_name: &str) -> Result<Self> {
        let parts: Vec<&str> = full_name.split('/').collect();
        match parts.as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => {
                Ok(RepoId::new(*owner, *name))
            }
            _ => Err(CollectorError::MalformedResponseError(format!(
                "Invalid repository name format: {}",
                full_name
            ))),
        }
    }
}

/// Inclusive query window over commit timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    since: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self> {
        if since > until {
            return Err(CollectorError::ConfigError(format!(
                "Time window starts after it ends: {} > {}",
                since.to_rfc3339(),
                until.to_rfc3339()
            )));
        }
        Ok(Self { since, until })
    }

    /// The `days` days leading up to `until`
    pub fn last_days(until: DateTime<Utc>, days: i64) -> Result<Self> {
        Self::new(until - chrono::Duration::days(days), until)
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since <= at && at <= self.until
    }
}

/// Contribution data for one committer at one instant in one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub repository: RepoId,
    pub committer_name: String,
    pub committer_email: String,
    pub committer_login: Option<String>,
    pub committer_company: Option<String>,
    pub committed_at: DateTime<Utc>,
    pub commit_count: u64,
    /// Lines added and removed; `None` when the transport does not report them
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
}

/// Key under which the result set refuses duplicates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub repository: RepoId,
    pub committer: String,
    pub committed_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            repository: self.repository.clone(),
            committer: self.committer_identity(),
            committed_at: self.committed_at,
        }
    }

    /// Email when present, otherwise the display name
    pub fn committer_identity(&self) -> String {
        if self.committer_email.trim().is_empty() {
            self.committer_name.trim().to_string()
        } else {
            self.committer_email.trim().to_lowercase()
        }
    }
}

/// Append-only, insertion-ordered collection of activity records for one run
#[derive(Debug, Default)]
pub struct ResultSet {
    records: Vec<ActivityRecord>,
    index: HashMap<RecordKey, usize>,
    // (repository, oid, committer identity)
    seen_commits: HashSet<(RepoId, String, String)>,
}

/// What happened to a record offered to the result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    Merged,
    Duplicate,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record produced by commit `oid`.
    ///
    /// A commit already seen for the repository and committer is dropped; a
    /// co-authored commit yields one record per author. A distinct commit
    /// whose key matches an existing record is folded into that record's
    /// counts, so keys stay unique.
    pub fn push(&mut self, oid: &str, record: ActivityRecord) -> PushOutcome {
        if !oid.is_empty()
            && !self.seen_commits.insert((
                record.repository.clone(),
                oid.to_string(),
                record.committer_identity(),
            ))
        {
            return PushOutcome::Duplicate;
        }

        let key = record.key();
        if let Some(&idx) = self.index.get(&key) {
            let existing = &mut self.records[idx];
            existing.commit_count += record.commit_count;
            existing.additions = sum_lines(existing.additions, record.additions);
            existing.deletions = sum_lines(existing.deletions, record.deletions);
            if existing.committer_company.is_none() {
                existing.committer_company = record.committer_company;
            }
            return PushOutcome::Merged;
        }

        self.index.insert(key, self.records.len());
        self.records.push(record);
        PushOutcome::Inserted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ActivityRecord> {
        self.records.iter()
    }

    /// Sum of `commit_count` over all records
    pub fn total_commits(&self) -> u64 {
        self.records.iter().map(|r| r.commit_count).sum()
    }

    pub fn into_records(self) -> Vec<ActivityRecord> {
        self.records
    }
}

/// Line totals stay known only while every contribution reports them
pub fn sum_lines(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    a.zip(b).map(|(a, b)| a + b)
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ActivityRecord;
    type IntoIter = std::slice::Iter<'a, ActivityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Repository inventory row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub org: String,
    pub name: String,
    pub name_with_owner: String,
    pub license: Option<String>,
    pub default_branch: Option<String>,
    pub is_private: bool,
    pub is_fork: bool,
    pub is_archived: bool,
    pub fork_count: u64,
    pub stargazer_count: u64,
    pub is_empty: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub last_commit_date: Option<DateTime<Utc>>,
    pub author_login: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub code_of_conduct: Option<String>,
}

/// Default branch and code of conduct of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusivityRow {
    pub name_with_owner: String,
    pub default_branch: Option<String>,
    pub code_of_conduct: Option<String>,
    pub is_private: bool,
    pub is_fork: bool,
    pub is_empty: bool,
    pub is_archived: bool,
}

impl InclusivityRow {
    /// A public, active repository still on `master` or without a code of conduct.
    /// Private, forked, empty and archived repositories are never flagged.
    pub fn needs_attention(&self) -> bool {
        if self.is_private || self.is_fork || self.is_empty || self.is_archived {
            return false;
        }
        self.default_branch.as_deref() == Some("master") || self.code_of_conduct.is_none()
    }
}

impl From<&RepositoryInfo> for InclusivityRow {
    fn from(repo: &RepositoryInfo) -> Self {
        Self {
            name_with_owner: repo.name_with_owner.clone(),
            default_branch: repo.default_branch.clone(),
            code_of_conduct: repo.code_of_conduct.clone(),
            is_private: repo.is_private,
            is_fork: repo.is_fork,
            is_empty: repo.is_empty,
            is_archived: repo.is_archived,
        }
    }
}

/// One pull request of the PR activity report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub repository: RepoId,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub comment_count: u64,
    pub author_login: Option<String>,
    pub author_name: Option<String>,
    /// Pull requests the author has opened across GitHub
    pub author_pr_count: Option<u64>,
}

/// Aggregated contribution of one person across a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitterSummary {
    pub identity: String,
    pub login: Option<String>,
    pub name: String,
    pub company: Option<String>,
    pub emails: Vec<String>,
    pub commits: u64,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub repositories: Vec<String>,
    pub first_commit: DateTime<Utc>,
    pub last_commit: DateTime<Utc>,
}

/// An org or repository the run could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTarget {
    pub target: String,
    pub reason: String,
}

/// Outcome of a collection run
#[derive(Debug, Default)]
pub struct Collection {
    pub records: ResultSet,
    pub skipped: Vec<SkippedTarget>,
    pub repositories_visited: usize,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(&mut self, target: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedTarget {
            target: target.into(),
            reason: reason.into(),
        });
    }
}

/// Rate limit state read from the last response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitState {
    pub remaining: u32,
    pub limit: u32,
    pub reset_time: DateTime<Utc>,
    pub is_limited: bool,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            remaining: 5000,
            limit: 5000,
            reset_time: Utc::now() + chrono::Duration::hours(1),
            is_limited: false,
        }
    }
}

/// Which GitHub API the collector talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Rest,
    #[default]
    #[value(name = "graphql")]
    #[serde(rename = "graphql")]
    GraphQl,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Rest => f.write_str("rest"),
            Transport::GraphQl => f.write_str("graphql"),
        }
    }
}
