//! GitHub API helpers: list the files changed by a pull request and post
//! the patch-coverage comment.

use anyhow::{bail, Context as _, Result};
use serde::Deserialize;

use crate::diff::{ChangedFile, PullRequestChangeSource};
use crate::report::ReportSink;

const COMMENT_MARKER: &str = "<!-- prcov-comment -->";
const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// Resolved GitHub Actions context, read from environment variables.
#[derive(Debug, Clone)]
pub struct Context {
    token: String,
    api_url: String,
    pub repo: String,
    pub pr_number: u64,
    pub sha: Option<String>,
}

impl Context {
    /// Build a context from standard GitHub Actions environment variables
    /// (`GITHUB_TOKEN`, `GITHUB_REPOSITORY`, `GITHUB_REF`, `GITHUB_SHA`,
    /// `GITHUB_API_URL`).
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .context("GITHUB_TOKEN environment variable is required")?;
        let repo = std::env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is required")?;
        let github_ref = std::env::var("GITHUB_REF").unwrap_or_default();
        let pr_number = pr_number_from_ref(&github_ref)
            .context("could not determine PR number from GITHUB_REF")?;
        let sha = std::env::var("GITHUB_SHA").ok();
        let api_url =
            std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Ok(Self {
            token,
            api_url,
            repo,
            pr_number,
            sha,
        })
    }

    fn get(&self, path: &str) -> ureq::Request {
        self.request("GET", path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}/{}", self.api_url.trim_end_matches('/'), path);
        ureq::request(method, &url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", "prcov")
            .set("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Fetch every file changed by the pull request, following pagination.
    pub fn fetch_files(&self) -> Result<Vec<ChangedFile>> {
        tracing::info!(repo = %self.repo, pr = self.pr_number, "fetching pull request files");
        let mut files = Vec::new();
        let mut page = 1u32;
        loop {
            let path = format!(
                "repos/{}/pulls/{}/files?per_page={PER_PAGE}&page={page}",
                self.repo, self.pr_number
            );
            let batch: Vec<ChangedFile> = self
                .get(&path)
                .call()
                .map_err(api_error)
                .context("Failed to list pull request files")?
                .into_json()
                .context("Failed to parse pull request files JSON")?;
            let done = batch.len() < PER_PAGE;
            files.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        tracing::debug!(files = files.len(), "fetched pull request files");
        Ok(files)
    }

    /// Create or update the prcov comment on the pull request.
    pub fn post_comment(&self, body: &str) -> Result<()> {
        let body_with_marker = format!("{COMMENT_MARKER}\n{body}");
        let payload = serde_json::json!({ "body": body_with_marker });

        match self.find_existing_comment()? {
            Some(comment_id) => {
                let path = format!("repos/{}/issues/comments/{comment_id}", self.repo);
                self.request("PATCH", &path)
                    .send_json(payload)
                    .map_err(api_error)
                    .context("Failed to update comment")?;
            }
            None => {
                let path = format!("repos/{}/issues/{}/comments", self.repo, self.pr_number);
                self.request("POST", &path)
                    .send_json(payload)
                    .map_err(api_error)
                    .context("Failed to create comment")?;
            }
        }

        tracing::info!(repo = %self.repo, pr = self.pr_number, "comment posted");
        Ok(())
    }

    /// Find an existing prcov comment on the PR (by our hidden marker).
    fn find_existing_comment(&self) -> Result<Option<u64>> {
        let mut page = 1u32;
        loop {
            let path = format!(
                "repos/{}/issues/{}/comments?per_page={PER_PAGE}&page={page}",
                self.repo, self.pr_number
            );
            let comments: Vec<Comment> = self
                .get(&path)
                .call()
                .map_err(api_error)
                .context("Failed to list PR comments")?
                .into_json()
                .context("Failed to parse comments JSON")?;
            if comments.is_empty() {
                return Ok(None);
            }
            if let Some(c) = comments
                .iter()
                .find(|c| c.body.as_deref().is_some_and(|b| b.contains(COMMENT_MARKER)))
            {
                return Ok(Some(c.id));
            }
            page += 1;
        }
    }
}

#[derive(Deserialize)]
struct Comment {
    id: u64,
    body: Option<String>,
}

/// Keep the response body of HTTP errors; GitHub puts the reason there.
fn api_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            anyhow::anyhow!("GitHub API error (HTTP {code}): {body}")
        }
        other => anyhow::Error::new(other),
    }
}

/// Extract PR number from GITHUB_REF (e.g. "refs/pull/42/merge" → 42).
fn pr_number_from_ref(github_ref: &str) -> Option<u64> {
    let parts: Vec<&str> = github_ref.split('/').collect();
    if parts.len() >= 3 && parts[0] == "refs" && parts[1] == "pull" {
        parts[2].parse().ok()
    } else {
        None
    }
}

/// Changed files of the current pull request, from the GitHub API.
pub struct PullRequestFiles {
    pub context: Context,
}

impl PullRequestFiles {
    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let context = Context::from_env()?;
        Ok(Self { context })
    }
}

impl PullRequestChangeSource for PullRequestFiles {
    fn changed_files(&self) -> Result<Vec<ChangedFile>> {
        self.context.fetch_files()
    }

    fn sha(&self) -> Option<&str> {
        self.context.sha.as_deref()
    }
}

/// Publishes the report as a pull request comment.
pub struct PullRequestComment {
    pub context: Context,
}

impl ReportSink for PullRequestComment {
    fn publish(&self, body: &str) -> Result<()> {
        if body.trim().is_empty() {
            bail!("refusing to post an empty comment");
        }
        self.context.post_comment(body)
    }
}
