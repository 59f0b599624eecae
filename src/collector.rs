use crate::config::{Attribution, CollectorConfig};
use crate::error::{CollectorError, Result};
use crate::github::GitHubClient;
use crate::graphql::{
    self, CommitNode, GitActorNode, GraphQlResponse, HistoryBatchData, HistoryCursor,
    OrgRepositoriesData, PullRequestNode, PullRequestsData, RepositoryNode,
};
use crate::models::{
    ActivityRecord, Collection, InclusivityRow, OrgId, PullRequestRecord, RepoId, RepositoryInfo,
    ResultSet, SkippedTarget, TimeRange, Transport,
};
use crate::types::{RestCommit, RestGitActor, RestRepository};
use tracing::{debug, info, warn};

/// A record and the commit it was built from
type Pending = (String, ActivityRecord);

/// Collects activity records for a set of organizations through one transport
pub struct Collector {
    client: GitHubClient,
    config: CollectorConfig,
}

/// Per-repository progress through a batched GraphQL history walk
#[derive(Debug)]
struct HistoryState {
    repo: RepoId,
    cursor: Option<String>,
    done: bool,
    failure: Option<String>,
    pending: Vec<Pending>,
}

impl HistoryState {
    fn new(repo: RepoId) -> Self {
        Self {
            repo,
            cursor: None,
            done: false,
            failure: None,
            pending: Vec::new(),
        }
    }

    fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.done = true;
    }
}

impl Collector {
    pub fn new(client: GitHubClient, config: CollectorConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Retrieve every activity record of `orgs` inside `window`
    pub async fn fetch_all(&mut self, orgs: &[OrgId], window: &TimeRange) -> Result<Collection> {
        let mut collection = Collection::new();
        self.collect_into(orgs, window, &mut collection).await?;
        Ok(collection)
    }

    /// Like [`Collector::fetch_all`], but appends into a caller-owned collection
    /// so whatever was gathered survives an interrupted or failed run.
    pub async fn collect_into(
        &mut self,
        orgs: &[OrgId],
        window: &TimeRange,
        collection: &mut Collection,
    ) -> Result<()> {
        require_orgs(orgs)?;

        for org in orgs {
            info!(org = %org, transport = %self.config.transport, "Processing organization");

            let repos = match self.list_repositories(org, self.config.transport).await {
                Ok(repos) => repos,
                Err(e) if !e.is_fatal() => {
                    warn!(org = %org, error = %e, "Cannot process organization, skipping");
                    collection.skip(org.to_string(), e.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut ids = Vec::with_capacity(repos.len());
            for repo in &repos {
                match repo.name_with_owner.parse::<RepoId>() {
                    Ok(id) if id.org().eq_ignore_ascii_case(org.as_str()) => ids.push((id, repo.is_empty)),
                    Ok(id) => {
                        collection.skip(id.to_string(), format!("repository is not owned by {}", org));
                    }
                    Err(e) => collection.skip(repo.name_with_owner.clone(), e.to_string()),
                }
            }

            let before = collection.records.len();
            match self.config.transport {
                Transport::Rest => self.collect_rest(&ids, window, collection).await?,
                Transport::GraphQl => self.collect_graphql(&ids, window, collection).await?,
            }

            info!(
                org = %org,
                repositories = ids.len(),
                records = collection.records.len() - before,
                "Finished organization"
            );
        }

        Ok(())
    }

    /// Inventory of every repository in `orgs`, with the latest default-branch commit.
    ///
    /// A repository whose latest commit cannot be read keeps its row and is
    /// also reported as skipped, so the gap shows up in the run summary.
    pub async fn fetch_repositories(
        &mut self,
        orgs: &[OrgId],
    ) -> Result<(Vec<RepositoryInfo>, Vec<SkippedTarget>)> {
        let (mut inventory, mut skipped) = self.list_orgs(orgs, self.config.transport).await?;

        // The GraphQL listing already carries the last commit
        if self.config.transport == Transport::Rest {
            for repo in inventory.iter_mut() {
                if let Err(e) = self.attach_latest_commit(repo).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(repo = %repo.name_with_owner, error = %e, "Cannot read latest commit");
                    skipped.push(SkippedTarget {
                        target: repo.name_with_owner.clone(),
                        reason: format!("latest commit not collected: {}", e),
                    });
                }
            }
        }

        Ok((inventory, skipped))
    }

    /// Default branch name and code of conduct of every repository in `orgs`.
    /// Always read over GraphQL; the REST listing carries no code of conduct.
    pub async fn fetch_inclusivity(
        &mut self,
        orgs: &[OrgId],
    ) -> Result<(Vec<InclusivityRow>, Vec<SkippedTarget>)> {
        let (inventory, skipped) = self.list_orgs(orgs, Transport::GraphQl).await?;
        Ok((inventory.iter().map(InclusivityRow::from).collect(), skipped))
    }

    /// Most recent pull requests of `repo`, newest first, reading at most
    /// `max_pages` pages of the client's page size.
    pub async fn fetch_pull_requests(
        &mut self,
        repo: &RepoId,
        max_pages: u32,
    ) -> Result<Vec<PullRequestRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let what = format!("pull requests of {}", repo);

        for page in 1..=max_pages.max(1) {
            let variables = graphql::pull_request_variables(repo, self.client.page_size(), cursor.as_deref());
            let response: GraphQlResponse<PullRequestsData> = self
                .client
                .graphql(graphql::PULL_REQUESTS_QUERY, variables)
                .await?;

            if !response.errors.is_empty() {
                return Err(graphql_error(&format!("repository {}", repo), &response));
            }
            let Some(repository) = response.data.as_ref().and_then(|d| d.repository.as_ref()) else {
                return Err(graphql_error(&format!("repository {}", repo), &response));
            };

            let connection = &repository.pull_requests;
            debug!(repo = %repo, page, pull_requests = connection.nodes.len(), "Fetched pull request page");
            // each page lists oldest first
            records.extend(connection.nodes.iter().rev().map(|node| pull_request_from_graphql(repo, node)));

            if !connection.page_info.has_previous_page {
                break;
            }
            cursor = advance(cursor, connection.page_info.start_cursor.clone(), &what)?;
            if cursor.is_none() {
                return Err(CollectorError::MalformedResponseError(format!(
                    "{}: hasPreviousPage without startCursor",
                    what
                )));
            }
        }

        Ok(records)
    }

    /// Lists the repositories of every org, skipping orgs that cannot be read
    async fn list_orgs(
        &mut self,
        orgs: &[OrgId],
        transport: Transport,
    ) -> Result<(Vec<RepositoryInfo>, Vec<SkippedTarget>)> {
        require_orgs(orgs)?;

        let mut inventory = Vec::new();
        let mut skipped = Vec::new();

        for org in orgs {
            info!(org = %org, transport = %transport, "Processing organization");

            match self.list_repositories(org, transport).await {
                Ok(repos) => inventory.extend(repos),
                Err(e) if !e.is_fatal() => {
                    warn!(org = %org, error = %e, "Cannot process organization, skipping");
                    skipped.push(SkippedTarget {
                        target: org.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok((inventory, skipped))
    }

    async fn attach_latest_commit(&mut self, repo: &mut RepositoryInfo) -> Result<()> {
        let id: RepoId = repo.name_with_owner.parse()?;

        // 409 from the commits endpoint is the only reliable emptiness signal over REST
        let Some(commit) = self.client.latest_commit(&id).await? else {
            repo.is_empty = true;
            return Ok(());
        };

        let actor = commit.commit.author.as_ref().or(commit.commit.committer.as_ref());
        repo.is_empty = false;
        repo.last_commit_date = commit
            .commit
            .committer
            .as_ref()
            .or(actor)
            .map(|a| a.date);
        repo.author_login = commit.author.as_ref().map(|u| u.login.clone());
        repo.author_name = actor.map(|a| a.name.clone());
        repo.author_email = actor.map(|a| a.email.clone());
        Ok(())
    }

    async fn list_repositories(&mut self, org: &OrgId, transport: Transport) -> Result<Vec<RepositoryInfo>> {
        match transport {
            Transport::Rest => self.list_repositories_rest(org).await,
            Transport::GraphQl => self.list_repositories_graphql(org).await,
        }
    }

    async fn list_repositories_rest(&mut self, org: &OrgId) -> Result<Vec<RepositoryInfo>> {
        let mut repos = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0;

        loop {
            page += 1;
            let listing = self.client.list_org_repos_page(org, cursor.as_deref()).await?;
            debug!(org = %org, page, repositories = listing.items.len(), "Fetched repository page");
            repos.extend(listing.items.iter().map(|r| repository_from_rest(org, r)));

            cursor = advance(cursor, listing.next, &format!("repositories of {}", org))?;
            if cursor.is_none() {
                break;
            }
        }

        Ok(repos)
    }

    async fn list_repositories_graphql(&mut self, org: &OrgId) -> Result<Vec<RepositoryInfo>> {
        let mut repos = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0;

        loop {
            page += 1;
            let variables =
                graphql::org_repositories_variables(org.as_str(), self.client.page_size(), cursor.as_deref());
            let response: GraphQlResponse<OrgRepositoriesData> = self
                .client
                .graphql(graphql::ORG_REPOSITORIES_QUERY, variables)
                .await?;

            let organization = match response.data.as_ref().and_then(|d| d.organization.as_ref()) {
                Some(organization) => organization,
                None => return Err(graphql_error(&format!("organization {}", org), &response)),
            };

            let connection = &organization.repositories;
            debug!(org = %org, page, repositories = connection.nodes.len(), "Fetched repository page");
            repos.extend(connection.nodes.iter().map(|node| repository_from_graphql(org, node)));

            if !connection.page_info.has_next_page {
                break;
            }
            cursor = advance(
                cursor,
                connection.page_info.end_cursor.clone(),
                &format!("repositories of {}", org),
            )?;
            if cursor.is_none() {
                return Err(CollectorError::MalformedResponseError(format!(
                    "repositories of {}: hasNextPage without endCursor",
                    org
                )));
            }
        }

        Ok(repos)
    }

    async fn collect_rest(
        &mut self,
        repos: &[(RepoId, bool)],
        window: &TimeRange,
        collection: &mut Collection,
    ) -> Result<()> {
        // emptiness is left to the 409 the commits endpoint answers with
        for (repo, _) in repos {
            collection.repositories_visited += 1;

            match self.rest_history(repo, window).await {
                Ok(pending) => append(&mut collection.records, pending),
                Err(e) if !e.is_fatal() => {
                    warn!(repo = %repo, error = %e, "Cannot process repository, skipping");
                    collection.skip(repo.to_string(), e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn rest_history(&mut self, repo: &RepoId, window: &TimeRange) -> Result<Vec<Pending>> {
        let mut pending = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0;

        loop {
            page += 1;
            let commits = self.client.list_commits_page(repo, window, cursor.as_deref()).await?;
            debug!(repo = %repo, page, commits = commits.items.len(), "Fetched commit page");

            for commit in &commits.items {
                pending.extend(records_from_rest(repo, commit, self.config.attribution)?);
            }

            cursor = advance(cursor, commits.next, &format!("commits of {}", repo))?;
            if cursor.is_none() {
                break;
            }
        }

        Ok(pending)
    }

    async fn collect_graphql(
        &mut self,
        repos: &[(RepoId, bool)],
        window: &TimeRange,
        collection: &mut Collection,
    ) -> Result<()> {
        collection.repositories_visited += repos.len();

        let active: Vec<RepoId> = repos
            .iter()
            .filter(|(_, is_empty)| !is_empty)
            .map(|(repo, _)| repo.clone())
            .collect();

        for chunk in active.chunks(self.config.graphql_batch_size.max(1)) {
            let mut states: Vec<HistoryState> = chunk.iter().cloned().map(HistoryState::new).collect();
            self.graphql_histories(&mut states, window).await?;

            for state in states {
                match state.failure {
                    Some(reason) => {
                        warn!(repo = %state.repo, reason = %reason, "Cannot process repository, skipping");
                        collection.skip(state.repo.to_string(), reason);
                    }
                    None => append(&mut collection.records, state.pending),
                }
            }
        }
        Ok(())
    }

    /// Walks the histories of `states` together, one request per round,
    /// until every repository is exhausted or has failed.
    async fn graphql_histories(&mut self, states: &mut [HistoryState], window: &TimeRange) -> Result<()> {
        let mut round = 0;

        loop {
            let active: Vec<usize> = (0..states.len()).filter(|&i| !states[i].done).collect();
            if active.is_empty() {
                return Ok(());
            }
            round += 1;

            let cursors: Vec<HistoryCursor<'_>> = active
                .iter()
                .map(|&i| HistoryCursor {
                    repo: &states[i].repo,
                    after: states[i].cursor.as_deref(),
                })
                .collect();
            let (query, variables) = graphql::history_batch_query(&cursors, window, self.client.page_size());

            let response: GraphQlResponse<HistoryBatchData> = match self.client.graphql(&query, variables).await {
                Ok(response) => response,
                Err(e) if !e.is_fatal() => {
                    for &i in &active {
                        states[i].fail(e.to_string());
                    }
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            debug!(round, repositories = active.len(), "Fetched commit history batch");

            if let Some(error) = response.unscoped_errors().next() {
                for &i in &active {
                    states[i].fail(format!("GraphQL error: {}", error.message));
                }
                return Ok(());
            }

            for (slot, &i) in active.iter().enumerate() {
                let alias = graphql::alias(slot);

                // Data next to a scoped error may be truncated anywhere below the alias
                if let Some(error) = response.errors_for(&alias).next() {
                    states[i].fail(format!("GraphQL error: {}", error.message));
                    continue;
                }

                let node = response
                    .data
                    .as_ref()
                    .and_then(|data| data.get(&alias))
                    .and_then(Option::as_ref);
                let Some(node) = node else {
                    states[i].fail("repository missing from response");
                    continue;
                };

                let history = node
                    .default_branch_ref
                    .as_ref()
                    .and_then(|branch| branch.target.as_ref())
                    .and_then(|target| target.history.as_ref());

                // No default branch, or it does not point at a commit
                let Some(history) = history else {
                    states[i].done = true;
                    continue;
                };

                let state = &mut states[i];
                for commit in &history.nodes {
                    match records_from_graphql(&state.repo, commit, self.config.attribution) {
                        Ok(pending) => state.pending.extend(pending),
                        Err(e) => {
                            state.fail(e.to_string());
                            break;
                        }
                    }
                }
                if state.failure.is_some() {
                    continue;
                }

                let Some(page_info) = history.page_info.as_ref() else {
                    state.fail("commit history without pageInfo");
                    continue;
                };
                if !page_info.has_next_page {
                    state.done = true;
                    continue;
                }
                match advance(state.cursor.take(), page_info.end_cursor.clone(), "commit history") {
                    Ok(Some(next)) => state.cursor = Some(next),
                    Ok(None) => state.fail("hasNextPage without endCursor"),
                    Err(e) => state.fail(e.to_string()),
                }
            }
        }
    }
}

fn require_orgs(orgs: &[OrgId]) -> Result<()> {
    if orgs.is_empty() {
        return Err(CollectorError::ConfigError(
            "At least one organization is required".to_string(),
        ));
    }
    Ok(())
}

fn append(records: &mut ResultSet, pending: Vec<Pending>) {
    for (oid, record) in pending {
        records.push(&oid, record);
    }
}

/// Moves to the next cursor, refusing a cursor that would fetch the same page again
fn advance(current: Option<String>, next: Option<String>, what: &str) -> Result<Option<String>> {
    match (current, next) {
        (Some(current), Some(next)) if current == next => Err(CollectorError::MalformedResponseError(
            format!("{}: pagination cursor did not advance", what),
        )),
        (_, next) => Ok(next),
    }
}

fn graphql_error<T>(target: &str, response: &GraphQlResponse<T>) -> CollectorError {
    match response.errors.first() {
        Some(e) if e.kind.as_deref() == Some("NOT_FOUND") => CollectorError::NotFound(target.to_string()),
        Some(e) => CollectorError::ApiError(format!("{}: {}", target, e.message)),
        None => CollectorError::MalformedResponseError(format!(
            "{}: response carries neither data nor errors",
            target
        )),
    }
}

fn repository_from_rest(org: &OrgId, repo: &RestRepository) -> RepositoryInfo {
    RepositoryInfo {
        org: org.to_string(),
        name: repo.name.clone(),
        name_with_owner: repo.full_name.clone(),
        license: repo.license.as_ref().map(|l| l.name.clone()),
        default_branch: repo.default_branch.clone(),
        is_private: repo.private,
        is_fork: repo.fork,
        is_archived: repo.archived,
        fork_count: repo.forks_count,
        stargazer_count: repo.stargazers_count,
        is_empty: false,
        created_at: repo.created_at,
        updated_at: repo.updated_at,
        pushed_at: repo.pushed_at,
        last_commit_date: None,
        author_login: None,
        author_name: None,
        author_email: None,
        code_of_conduct: None,
    }
}

fn repository_from_graphql(org: &OrgId, node: &RepositoryNode) -> RepositoryInfo {
    let last_commit = node
        .default_branch_ref
        .as_ref()
        .and_then(|branch| branch.target.as_ref())
        .and_then(|target| target.history.as_ref())
        .and_then(|history| history.nodes.first());
    let author = last_commit.and_then(|c| c.author.as_ref());

    RepositoryInfo {
        org: org.to_string(),
        name: node.name.clone(),
        name_with_owner: node.name_with_owner.clone(),
        license: node.license_info.as_ref().map(|l| l.name.clone()),
        default_branch: node.default_branch_ref.as_ref().and_then(|b| b.name.clone()),
        is_private: node.is_private,
        is_fork: node.is_fork,
        is_archived: node.is_archived,
        fork_count: node.fork_count,
        stargazer_count: node.stargazer_count,
        is_empty: node.is_empty,
        created_at: node.created_at,
        updated_at: node.updated_at,
        pushed_at: node.pushed_at,
        last_commit_date: last_commit.map(|c| c.committed_date),
        author_login: author.and_then(|a| a.user.as_ref()).map(|u| u.login.clone()),
        author_name: author.and_then(|a| a.name.clone()),
        author_email: author.and_then(|a| a.email.clone()),
        code_of_conduct: node.code_of_conduct.as_ref().map(|c| c.url.clone()),
    }
}

fn pull_request_from_graphql(repo: &RepoId, node: &PullRequestNode) -> PullRequestRecord {
    let author = node.author.as_ref();
    PullRequestRecord {
        repository: repo.clone(),
        number: node.number,
        title: node.title.clone(),
        state: node.state.clone(),
        created_at: node.created_at,
        merged_at: node.merged_at,
        additions: node.additions,
        deletions: node.deletions,
        changed_files: node.changed_files,
        comment_count: node.comments.as_ref().map_or(0, |c| c.total_count),
        author_login: author.map(|a| a.login.clone()),
        author_name: author.and_then(|a| a.name.clone()),
        author_pr_count: author.and_then(|a| a.pull_requests.as_ref()).map(|c| c.total_count),
    }
}

/// `Co-authored-by: Name <email>` trailers of a commit message
fn co_authors(message: &str) -> Vec<(String, String)> {
    message
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once(':')?;
            if !key.trim().eq_ignore_ascii_case("co-authored-by") {
                return None;
            }
            let (name, rest) = value.split_once('<')?;
            let email = rest.trim_end().strip_suffix('>')?;
            Some((name.trim().to_string(), email.trim().to_string()))
        })
        .collect()
}

/// Records for one REST commit: the attributed actor, plus co-authors from
/// the message trailers when attributing to authors. The commit listing
/// carries no line counts.
fn records_from_rest(repo: &RepoId, commit: &RestCommit, attribution: Attribution) -> Result<Vec<Pending>> {
    let (actor, user) = match attribution {
        Attribution::Author => (
            commit.commit.author.as_ref().or(commit.commit.committer.as_ref()),
            commit.author.as_ref(),
        ),
        Attribution::Committer => (
            commit.commit.committer.as_ref().or(commit.commit.author.as_ref()),
            commit.committer.as_ref(),
        ),
    };

    let RestGitActor { name, email, date } = actor.cloned().ok_or_else(|| {
        CollectorError::MalformedResponseError(format!(
            "commit {} in {} has neither author nor committer",
            commit.sha, repo
        ))
    })?;

    let record = |name: String, email: String, login: Option<String>| ActivityRecord {
        repository: repo.clone(),
        committer_name: name,
        committer_email: email,
        committer_login: login,
        committer_company: None,
        committed_at: date,
        commit_count: 1,
        additions: None,
        deletions: None,
    };

    let mut records = vec![(commit.sha.clone(), record(name, email, user.map(|u| u.login.clone())))];
    if attribution == Attribution::Author {
        records.extend(
            co_authors(&commit.commit.message)
                .into_iter()
                .map(|(name, email)| (commit.sha.clone(), record(name, email, None))),
        );
    }
    Ok(records)
}

/// Records for one GraphQL commit: one per credited author when attributing
/// to authors, otherwise one for the committer.
fn records_from_graphql(repo: &RepoId, commit: &CommitNode, attribution: Attribution) -> Result<Vec<Pending>> {
    let actors: Vec<&GitActorNode> = match attribution {
        Attribution::Author => {
            let credited: Vec<&GitActorNode> = commit
                .authors
                .as_ref()
                .map(|authors| authors.nodes.iter().collect())
                .unwrap_or_default();
            if credited.is_empty() {
                commit.author.as_ref().or(commit.committer.as_ref()).into_iter().collect()
            } else {
                credited
            }
        }
        Attribution::Committer => commit
            .committer
            .as_ref()
            .or(commit.author.as_ref())
            .into_iter()
            .collect(),
    };

    if actors.is_empty() {
        return Err(CollectorError::MalformedResponseError(format!(
            "commit {} in {} has neither author nor committer",
            commit.oid, repo
        )));
    }

    Ok(actors
        .into_iter()
        .map(|actor| {
            let user = actor.user.as_ref();
            (
                commit.oid.clone(),
                ActivityRecord {
                    repository: repo.clone(),
                    committer_name: actor.name.clone().unwrap_or_default(),
                    committer_email: actor.email.clone().unwrap_or_default(),
                    committer_login: user.map(|u| u.login.clone()),
                    committer_company: user.and_then(|u| u.company.clone()),
                    committed_at: actor.date.unwrap_or(commit.committed_date),
                    commit_count: 1,
                    additions: commit.additions,
                    deletions: commit.deletions,
                },
            )
        })
        .collect())
}

