use chrono::{DateTime, Utc};
use serde::Deserialize;

// GitHub REST API response structures

#[derive(Debug, Clone, Deserialize)]
pub struct RestRepository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    pub license: Option<RestLicense>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub stargazers_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestLicense {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestCommit {
    pub sha: String,
    pub commit: RestCommitDetail,
    /// Linked GitHub account of the author, absent for unknown emails
    pub author: Option<RestUser>,
    pub committer: Option<RestUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestCommitDetail {
    pub author: Option<RestGitActor>,
    pub committer: Option<RestGitActor>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestGitActor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestUser {
    pub login: String,
}

/// Error body GitHub returns alongside non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct RestErrorBody {
    pub message: String,
    pub documentation_url: Option<String>,
}
