//! GitHub REST implementation of [`RepositorySource`].

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{ContentKind, FileContent, FileEntry, RepoRef, Repository, RepositorySource, SourceError};

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct GithubSource {
    client: reqwest::Client,
    token: String,
    /// Base URL of the REST API. Configurable for GitHub Enterprise and tests.
    base_url: String,
    max_response_bytes: usize,
}

impl fmt::Debug for GithubSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSource")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(rename = "type", default)]
    kind: ContentKind,
    #[serde(default)]
    size: u64,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Deserialize)]
struct RepoResponse {
    name: String,
    full_name: String,
    owner: RepoOwner,
    default_branch: String,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    topics: Vec<String>,
    clone_url: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<RepoResponse> for Repository {
    fn from(r: RepoResponse) -> Self {
        Self {
            owner: r.owner.login,
            name: r.name,
            full_name: r.full_name,
            default_branch: r.default_branch,
            description: r.description,
            language: r.language,
            size: r.size,
            stars: r.stargazers_count,
            forks: r.forks_count,
            topics: r.topics,
            clone_url: r.clone_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl GithubSource {
    /// # Errors
    ///
    /// Returns [`SourceError::MissingCredential`] if `token` is empty.
    pub fn new(token: impl Into<String>) -> Result<Self, SourceError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SourceError::MissingCredential("GitHub token"));
        }
        Ok(Self {
            client: repoqa_llm::http::default_client(),
            token,
            base_url: GITHUB_API_URL.to_owned(),
            max_response_bytes: MAX_RESPONSE_BYTES,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| SourceError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')));
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, resource: &str) -> Result<T, SourceError> {
        tracing::debug!(%url, "GitHub request");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| SourceError::Transient(format!("{resource}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, resp.headers(), resource));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SourceError::Transient(format!("{resource}: {e}")))?;
        if bytes.len() > self.max_response_bytes {
            return Err(SourceError::TooLarge(bytes.len()));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| SourceError::Malformed(format!("{resource}: {e}")))
    }
}

fn classify_status(status: StatusCode, headers: &HeaderMap, resource: &str) -> SourceError {
    let rate_limited = status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");

    if status == StatusCode::NOT_FOUND {
        SourceError::NotFound(resource.to_owned())
    } else if status == StatusCode::TOO_MANY_REQUESTS || rate_limited {
        SourceError::Transient(format!("{resource}: rate limited (HTTP {status})"))
    } else if status.is_server_error() {
        SourceError::Transient(format!("{resource}: HTTP {status}"))
    } else {
        SourceError::Status {
            status: status.as_u16(),
            resource: resource.to_owned(),
        }
    }
}

fn decode_content(path: &str, resp: ContentResponse) -> Result<FileContent, SourceError> {
    let decode_err = |reason: String| SourceError::Decode {
        path: path.to_owned(),
        reason,
    };

    let (Some(content), Some("base64")) = (resp.content, resp.encoding.as_deref()) else {
        return Err(decode_err("no inline base64 content".into()));
    };
    let compact: String = content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| decode_err(e.to_string()))?;
    let size = if resp.size > 0 {
        resp.size
    } else {
        bytes.len() as u64
    };
    let content = String::from_utf8(bytes).map_err(|e| decode_err(e.to_string()))?;

    Ok(FileContent {
        path: path.to_owned(),
        content,
        size,
        kind: resp.kind,
    })
}

impl RepositorySource for GithubSource {
    async fn list_blobs(&self, repo: &RepoRef) -> Result<Vec<FileEntry>, SourceError> {
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.name, "git", "trees", &repo.branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let resource = format!("tree {repo}");
        let tree: TreeResponse = self.get_json(url, &resource).await?;
        if tree.truncated {
            tracing::warn!(%repo, "tree listing truncated by GitHub, some files will be missing");
        }

        let blobs: Vec<FileEntry> = tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| FileEntry::new(item.path, item.size.unwrap_or(0)))
            .collect();
        tracing::debug!(%repo, blobs = blobs.len(), "listed tree");
        Ok(blobs)
    }

    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<FileContent, SourceError> {
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.name, "contents", path])?;
        url.query_pairs_mut().append_pair("ref", &repo.branch);

        let resource = format!("{path} in {repo}");
        let value: serde_json::Value = self.get_json(url, &resource).await?;
        if value.is_array() {
            return Err(SourceError::IsDirectory(path.to_owned()));
        }
        let resp: ContentResponse = serde_json::from_value(value)
            .map_err(|e| SourceError::Malformed(format!("{resource}: {e}")))?;
        decode_content(path, resp)
    }

    async fn repository_info(&self, owner: &str, name: &str) -> Result<Repository, SourceError> {
        let url = self.endpoint(&["repos", owner, name])?;
        let resource = format!("repository {owner}/{name}");
        let resp: RepoResponse = self.get_json(url, &resource).await?;
        Ok(resp.into())
    }
}
