//! GitHub commit source with paginated retrieval
//!
//! Wraps the GitHub REST API behind the [`CommitSource`] trait: listing the
//! organization's source repositories and listing a repository's commits
//! created after a watermark. Both listings walk `Link: rel="next"` pages
//! at 100 entries per page until the upstream stops advertising a next
//! page, and both treat an HTTP 409 (empty or unqueryable repository) as
//! "no results" rather than an error.

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Upstream page size for both repository and commit listings
pub const PER_PAGE: u32 = 100;

/// A commit as returned by the upstream API.
///
/// This is the record appended to the per-repository log, one JSON object
/// per line, exactly as fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// The SHA of the commit
    pub sha: String,

    /// The commit details
    pub commit: CommitDetails,

    /// Web URL of the commit, when the upstream provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,

    /// Parent commits
    #[serde(default)]
    pub parents: Vec<CommitParent>,
}

/// The author and message for a commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetails {
    /// The author of the commit
    pub author: CommitAuthor,
    /// The commit message
    pub message: String,
}

/// The author and date for a commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitAuthor {
    /// Author name
    pub name: String,
    /// Author email
    pub email: String,
    /// The date of the commit
    pub date: DateTime<Utc>,
}

/// Reference to a parent commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitParent {
    /// The SHA of the parent
    pub sha: String,
}

/// Repository entry in the organization listing; only the name is consumed
#[derive(Debug, Deserialize)]
struct RepoEntry {
    name: String,
}

/// Trait for the upstream repository/commit source
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Names of all source repositories in the organization
    async fn list_repositories(&self) -> Result<Vec<String>, FetchError>;

    /// All commits for `repo` created strictly after `since`, oldest page
    /// first, fully materialized. `None` fetches the whole history.
    async fn commits_since(
        &self,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>, FetchError>;
}

/// GitHub REST API client
pub struct GithubClient {
    http: Client,
    base_url: String,
    organization: String,
    token: Option<String>,
}

impl GithubClient {
    /// Create a client against the public GitHub API
    pub fn new(organization: &str, token: Option<String>) -> Result<Self, FetchError> {
        Self::with_base_url("https://api.github.com", organization, token)
    }

    /// Create a client against a custom API base URL (GitHub Enterprise,
    /// or a stub server in tests)
    pub fn with_base_url(
        base_url: &str,
        organization: &str,
        token: Option<String>,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(concat!("githarvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            organization: organization.to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn repos_url(&self) -> String {
        format!(
            "{}/orgs/{}/repos?type=sources&per_page={}",
            self.base_url, self.organization, PER_PAGE
        )
    }

    fn commits_url(&self, repo: &str, since: Option<DateTime<Utc>>) -> String {
        let mut url = format!(
            "{}/repos/{}/{}/commits?per_page={}",
            self.base_url, self.organization, repo, PER_PAGE
        );
        if let Some(t) = since {
            url.push_str("&since=");
            url.push_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        url
    }

    /// Fetch one page of a listing.
    ///
    /// A 409 means the repository is empty or in a state that rejects the
    /// query; it yields an empty terminal page so the caller's cycle can
    /// still complete.
    async fn get_page<T: DeserializeOwned>(&self, url: String) -> Result<Page<T>, FetchError> {
        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!("Upstream returned 409 for {}, treating as empty", url);
            return Ok(Page {
                items: Vec::new(),
                next: None,
            });
        }

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let next = next_page_url(response.headers());
        let items = response
            .json::<Vec<T>>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(Page { items, next })
    }
}

#[async_trait]
impl CommitSource for GithubClient {
    async fn list_repositories(&self) -> Result<Vec<String>, FetchError> {
        let entries: Vec<RepoEntry> =
            drain_pages(self.repos_url(), |url| self.get_page::<RepoEntry>(url)).await?;
        Ok(entries.into_iter().map(|r| r.name).collect())
    }

    async fn commits_since(
        &self,
        repo: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Commit>, FetchError> {
        drain_pages(self.commits_url(repo, since), |url| {
            self.get_page::<Commit>(url)
        })
        .await
    }
}

/// One page of a paginated listing
struct Page<T> {
    items: Vec<T>,
    /// Target of the `rel="next"` link, absent on the last page
    next: Option<String>,
}

/// Walk a paginated listing until the upstream stops advertising a next
/// page, concatenating items in page order.
///
/// Issues exactly one request per upstream page; any page-level error
/// aborts the walk with no partial result surfaced to the caller.
async fn drain_pages<T, F, Fut>(first_url: String, mut fetch: F) -> Result<Vec<T>, FetchError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    let mut items = Vec::new();
    let mut url = Some(first_url);

    while let Some(current) = url {
        let page = fetch(current).await?;
        items.extend(page.items);
        url = page.next;
    }

    Ok(items)
}

/// Extract the `rel="next"` target from an RFC 5988 `Link` header
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;

    link.split(',').find_map(|part| {
        let (target, params) = part.trim().split_once(';')?;
        if !params.split(';').any(|p| p.trim() == "rel=\"next\"") {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')?
            .strip_suffix('>')
            .map(str::to_string)
    })
}
