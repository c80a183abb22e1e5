//! Read-only access to a hosted source repository.

pub mod error;
pub mod github;

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use error::SourceError;
pub use github::GithubSource;

/// Identity of one branch of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl RepoRef {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
    }
}

/// Descriptive repository metadata as reported by the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
    pub description: Option<String>,
    pub language: Option<String>,
    /// Repository size in kilobytes.
    pub size: u64,
    pub stars: u64,
    pub forks: u64,
    pub topics: Vec<String>,
    pub clone_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// Reference to `branch`, or to the default branch when `None`.
    #[must_use]
    pub fn repo_ref(&self, branch: Option<&str>) -> RepoRef {
        RepoRef::new(
            &self.owner,
            &self.name,
            branch.unwrap_or(&self.default_branch),
        )
    }
}

/// A blob entry of a tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

impl FileEntry {
    #[must_use]
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    File,
    Symlink,
    Submodule,
    #[serde(other)]
    Other,
}

/// Decoded text of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    /// Size in bytes.
    pub size: u64,
    pub kind: ContentKind,
}

/// Read API of a source-hosting platform.
///
/// Implementations must be side-effect free: every call only reads.
pub trait RepositorySource: Send + Sync {
    /// All blob entries of the tree at `repo.branch`, in listing order.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] when the repository or branch does not exist,
    /// [`SourceError::Transient`] for network, server and rate-limit failures.
    fn list_blobs(
        &self,
        repo: &RepoRef,
    ) -> impl Future<Output = Result<Vec<FileEntry>, SourceError>> + Send;

    /// Fetch and decode one file at `repo.branch`.
    ///
    /// # Errors
    ///
    /// [`SourceError::IsDirectory`] when `path` names a directory,
    /// [`SourceError::Decode`] when the content is not UTF-8 text,
    /// [`SourceError::Transient`] for network, server and rate-limit failures.
    fn fetch_file(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> impl Future<Output = Result<FileContent, SourceError>> + Send;

    /// Descriptive metadata of a repository.
    ///
    /// # Errors
    ///
    /// Same as [`RepositorySource::list_blobs`].
    fn repository_info(
        &self,
        owner: &str,
        name: &str,
    ) -> impl Future<Output = Result<Repository, SourceError>> + Send;
}
