use crate::models::{sum_lines, ActivityRecord, CommitterSummary, ResultSet};
use std::collections::HashMap;

/// Groups a result set by person.
///
/// Records carrying a GitHub login are grouped by login. The rest fall back
/// to their lowercased email, and join a login's group when that email was
/// seen on one of the login's records. Line counts are only summed when
/// every record of the person carries them. Summaries come back with the
/// most active person first.
pub fn summarize(records: &ResultSet) -> Vec<CommitterSummary> {
    // email -> login, from records where GitHub linked the two
    let known_emails: HashMap<String, String> = records
        .iter()
        .filter_map(|r| {
            let login = r.committer_login.as_ref()?;
            let email = r.committer_email.trim().to_lowercase();
            (!email.is_empty()).then(|| (email, login.to_lowercase()))
        })
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut people: HashMap<String, CommitterSummary> = HashMap::new();

    for record in records {
        let identity = identity_of(record, &known_emails);

        let summary = people.entry(identity.clone()).or_insert_with(|| {
            order.push(identity.clone());
            CommitterSummary {
                identity: identity.clone(),
                login: None,
                name: record.committer_name.clone(),
                company: None,
                emails: Vec::new(),
                commits: 0,
                additions: Some(0),
                deletions: Some(0),
                repositories: Vec::new(),
                first_commit: record.committed_at,
                last_commit: record.committed_at,
            }
        });

        if summary.login.is_none() {
            summary.login = record.committer_login.clone();
        }
        if summary.name.is_empty() {
            summary.name = record.committer_name.clone();
        }
        if summary.company.is_none() {
            summary.company = record.committer_company.clone();
        }

        let email = record.committer_email.trim().to_lowercase();
        if !email.is_empty() && !summary.emails.contains(&email) {
            summary.emails.push(email);
        }

        let repository = record.repository.to_string();
        if !summary.repositories.contains(&repository) {
            summary.repositories.push(repository);
        }

        summary.commits += record.commit_count;
        summary.additions = sum_lines(summary.additions, record.additions);
        summary.deletions = sum_lines(summary.deletions, record.deletions);
        summary.first_commit = summary.first_commit.min(record.committed_at);
        summary.last_commit = summary.last_commit.max(record.committed_at);
    }

    let mut summaries: Vec<CommitterSummary> = order
        .into_iter()
        .filter_map(|identity| people.remove(&identity))
        .collect();
    summaries.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.identity.cmp(&b.identity)));
    summaries
}

fn identity_of(record: &ActivityRecord, known_emails: &HashMap<String, String>) -> String {
    if let Some(login) = &record.committer_login {
        return login.to_lowercase();
    }
    let email = record.committer_email.trim().to_lowercase();
    known_emails
        .get(&email)
        .cloned()
        .unwrap_or_else(|| record.committer_identity())
}
