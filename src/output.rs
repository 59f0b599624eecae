//! CSV report writing.
//!
//! Reports are flat: every row type lists its columns once in
//! [`Tabular::HEADER`] and yields its values in that order from
//! [`Tabular::fields`]. [`RowWriter`] turns rows into delimited lines and
//! [`read_rows`] parses them back.

use crate::error::{CollectorError, Result};
use crate::models::{
    ActivityRecord, CommitterSummary, InclusivityRow, PullRequestRecord, RepoId, RepositoryInfo,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A row type with a stable column layout
pub trait Tabular {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

/// Writes header and rows as comma-separated lines
pub struct RowWriter<W: Write> {
    out: W,
    columns: Option<usize>,
    rows: usize,
}

impl<W: Write> RowWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            columns: None,
            rows: 0,
        }
    }

    pub fn write_header(&mut self, header: &[&str]) -> Result<()> {
        self.columns = Some(header.len());
        self.write_line(header.iter().copied())
    }

    pub fn write_row<S: AsRef<str>>(&mut self, row: &[S]) -> Result<()> {
        if let Some(columns) = self.columns {
            if row.len() != columns {
                return Err(CollectorError::CsvError {
                    line: self.rows + 2,
                    message: format!("row has {} fields, header has {}", row.len(), columns),
                });
            }
        }
        self.write_line(row.iter().map(AsRef::as_ref))?;
        self.rows += 1;
        Ok(())
    }

    /// Header followed by one line per record
    pub fn write_all<T: Tabular>(&mut self, records: &[T]) -> Result<()> {
        self.write_header(T::HEADER)?;
        for record in records {
            self.write_row(&record.fields())?;
        }
        Ok(())
    }

    /// Data rows written so far, header excluded
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_line<'a>(&mut self, fields: impl Iterator<Item = &'a str>) -> Result<()> {
        let line = fields.map(escape).collect::<Vec<_>>().join(",");
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

/// Quotes a field when it holds a delimiter, quote or line break
pub fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parses CSV text into rows of fields, header included
pub fn read_rows(input: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            '"' => {
                return Err(CollectorError::CsvError {
                    line,
                    message: "unexpected quote inside unquoted field".to_string(),
                });
            }
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CollectorError::CsvError {
            line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

/// `dir/<prefix>_<date>.csv`
pub fn output_path(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}_{}.csv", prefix, date.format("%Y-%m-%d")))
}

/// Writes `records` to today's report file under `dir`, creating `dir` if needed
pub fn write_report<T: Tabular>(dir: &Path, prefix: &str, records: &[T]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = output_path(dir, prefix, Utc::now().date_naive());

    let mut writer = RowWriter::new(BufWriter::new(File::create(&path)?));
    writer.write_all(records)?;
    writer.finish()?;
    Ok(path)
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn optional_timestamp(at: &Option<DateTime<Utc>>) -> String {
    at.as_ref().map(timestamp).unwrap_or_default()
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn optional_count(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_optional_count(raw: &str) -> std::result::Result<Option<u64>, std::num::ParseIntError> {
    if raw.is_empty() {
        Ok(None)
    } else {
        raw.parse().map(Some)
    }
}

impl Tabular for ActivityRecord {
    const HEADER: &'static [&'static str] = &[
        "org",
        "repository",
        "committer_name",
        "committer_email",
        "committer_login",
        "committer_company",
        "committed_at",
        "commit_count",
        "additions",
        "deletions",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.repository.org().to_string(),
            self.repository.to_string(),
            self.committer_name.clone(),
            self.committer_email.clone(),
            optional(&self.committer_login),
            optional(&self.committer_company),
            timestamp(&self.committed_at),
            self.commit_count.to_string(),
            optional_count(self.additions),
            optional_count(self.deletions),
        ]
    }
}

impl ActivityRecord {
    /// Rebuilds a record from a row in [`Tabular::HEADER`] order
    pub fn from_row(row: &[String]) -> Result<Self> {
        let invalid = |message: String| CollectorError::CsvError { line: 0, message };

        let [_org, repository, name, email, login, company, committed_at, count, additions, deletions] = row
        else {
            return Err(invalid(format!(
                "expected {} fields, found {}",
                Self::HEADER.len(),
                row.len()
            )));
        };

        Ok(ActivityRecord {
            repository: repository
                .parse::<RepoId>()
                .map_err(|e| invalid(e.to_string()))?,
            committer_name: name.clone(),
            committer_email: email.clone(),
            committer_login: (!login.is_empty()).then(|| login.clone()),
            committer_company: (!company.is_empty()).then(|| company.clone()),
            committed_at: DateTime::parse_from_rfc3339(committed_at)
                .map_err(|e| invalid(format!("bad timestamp {:?}: {}", committed_at, e)))?
                .with_timezone(&Utc),
            commit_count: count
                .parse()
                .map_err(|e| invalid(format!("bad commit count {:?}: {}", count, e)))?,
            additions: parse_optional_count(additions)
                .map_err(|e| invalid(format!("bad additions {:?}: {}", additions, e)))?,
            deletions: parse_optional_count(deletions)
                .map_err(|e| invalid(format!("bad deletions {:?}: {}", deletions, e)))?,
        })
    }
}

impl Tabular for RepositoryInfo {
    const HEADER: &'static [&'static str] = &[
        "org",
        "name",
        "nameWithOwner",
        "license",
        "defaultBranch",
        "isPrivate",
        "isFork",
        "isArchived",
        "forkCount",
        "stargazerCount",
        "isEmpty",
        "createdAt",
        "updatedAt",
        "pushedAt",
        "last_commit_date",
        "author_login",
        "author_name",
        "author_email",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.org.clone(),
            self.name.clone(),
            self.name_with_owner.clone(),
            optional(&self.license),
            optional(&self.default_branch),
            self.is_private.to_string(),
            self.is_fork.to_string(),
            self.is_archived.to_string(),
            self.fork_count.to_string(),
            self.stargazer_count.to_string(),
            self.is_empty.to_string(),
            optional_timestamp(&self.created_at),
            optional_timestamp(&self.updated_at),
            optional_timestamp(&self.pushed_at),
            optional_timestamp(&self.last_commit_date),
            optional(&self.author_login),
            optional(&self.author_name),
            optional(&self.author_email),
        ]
    }
}

impl Tabular for CommitterSummary {
    const HEADER: &'static [&'static str] = &[
        "identity",
        "login",
        "name",
        "company",
        "emails",
        "commits",
        "additions",
        "deletions",
        "repository_count",
        "repositories",
        "first_commit",
        "last_commit",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.identity.clone(),
            optional(&self.login),
            self.name.clone(),
            optional(&self.company),
            self.emails.join(";"),
            self.commits.to_string(),
            optional_count(self.additions),
            optional_count(self.deletions),
            self.repositories.len().to_string(),
            self.repositories.join(";"),
            timestamp(&self.first_commit),
            timestamp(&self.last_commit),
        ]
    }
}

impl Tabular for InclusivityRow {
    const HEADER: &'static [&'static str] = &[
        "nameWithOwner",
        "isPrivate",
        "isFork",
        "isEmpty",
        "isArchived",
        "defaultBranch",
        "codeOfConduct_url",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.name_with_owner.clone(),
            self.is_private.to_string(),
            self.is_fork.to_string(),
            self.is_empty.to_string(),
            self.is_archived.to_string(),
            optional(&self.default_branch),
            self.code_of_conduct
                .clone()
                .unwrap_or_else(|| "Not Found".to_string()),
        ]
    }
}

impl Tabular for PullRequestRecord {
    const HEADER: &'static [&'static str] = &[
        "repository",
        "number",
        "title",
        "state",
        "createdAt",
        "mergedAt",
        "additions",
        "deletions",
        "changedFiles",
        "comment_ct",
        "author_login",
        "author_name",
        "author_pr_count",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.repository.to_string(),
            self.number.to_string(),
            self.title.clone(),
            self.state.clone(),
            timestamp(&self.created_at),
            optional_timestamp(&self.merged_at),
            self.additions.to_string(),
            self.deletions.to_string(),
            self.changed_files.to_string(),
            self.comment_count.to_string(),
            optional(&self.author_login),
            optional(&self.author_name),
            optional_count(self.author_pr_count),
        ]
    }
}
