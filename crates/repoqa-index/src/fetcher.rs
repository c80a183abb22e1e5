//! Rate-limited, failure-tolerant bulk file fetching.

use std::time::Duration;

use futures::future::join_all;

use crate::source::{FileContent, FileEntry, RepoRef, RepositorySource, SourceError};

/// Exponential backoff for transient per-file failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts per file, including the first one.
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based): `min_delay * 2^(retry-1)`, clamped.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.min_delay
            .saturating_mul(factor)
            .clamp(self.min_delay, self.max_delay.max(self.min_delay))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_pause: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause: Duration::from_secs(1),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// A file that could not be fetched.
#[derive(Debug)]
pub struct FetchFailure {
    pub path: String,
    pub error: SourceError,
    pub attempts: u32,
}

#[derive(Debug, Default)]
pub struct FetchReport {
    /// Successfully fetched files, in request order.
    pub files: Vec<FileContent>,
    pub failures: Vec<FetchFailure>,
}

/// Fetches files in fixed-size concurrent batches.
///
/// All fetches of a batch run concurrently and the batch settles completely before
/// the next one starts. One file failing never fails its batch: transient errors
/// are retried with backoff, and whatever still fails is recorded in
/// [`FetchReport::failures`] and left out of [`FetchReport::files`].
pub struct BatchFetcher<'a, S> {
    source: &'a S,
    config: FetchConfig,
}

impl<'a, S: RepositorySource> BatchFetcher<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, config: FetchConfig) -> Self {
        Self { source, config }
    }

    pub async fn fetch_all(&self, repo: &RepoRef, entries: &[FileEntry]) -> FetchReport {
        let mut report = FetchReport::default();
        let batch_size = self.config.batch_size.max(1);
        let batches = entries.len().div_ceil(batch_size);

        for (i, batch) in entries.chunks(batch_size).enumerate() {
            if i > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            let results = join_all(batch.iter().map(|e| self.fetch_one(repo, &e.path))).await;

            for (entry, result) in batch.iter().zip(results) {
                match result {
                    Ok(file) => report.files.push(file),
                    Err((error, attempts)) => {
                        tracing::warn!(
                            %repo,
                            path = %entry.path,
                            attempts,
                            "skipping file: {error}"
                        );
                        report.failures.push(FetchFailure {
                            path: entry.path.clone(),
                            error,
                            attempts,
                        });
                    }
                }
            }

            tracing::info!(
                %repo,
                batch = i + 1,
                batches,
                fetched = report.files.len(),
                failed = report.failures.len(),
                "fetch batch settled"
            );
        }

        report
    }

    async fn fetch_one(&self, repo: &RepoRef, path: &str) -> Result<FileContent, (SourceError, u32)> {
        let policy = self.config.backoff;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.source.fetch_file(repo, path).await {
                Ok(file) => return Ok(file),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = policy.delay(attempt);
                    tracing::debug!(
                        path,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient fetch failure, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}
