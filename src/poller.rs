//! Per-repository poll cycle and task scheduling
//!
//! One task per repository runs exactly one cycle:
//! read watermark → fetch commits since watermark → serialize → append →
//! commit the cycle-start time as the new watermark. Steps run strictly in
//! that order; any failure ends the cycle with the watermark untouched, so
//! the next run re-fetches the same window. Repositories are fully
//! independent; tasks share only the remote backends.

use crate::error::{FetchError, HarvestError};
use crate::github::{Commit, CommitSource};
use crate::storage::LogStore;
use crate::watermark::WatermarkStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delay before a repository's poll cycle fires
pub const POLL_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on one cycle's upstream fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Shared clients handed to every repository task.
///
/// Explicit dependencies rather than process-wide singletons; the trait
/// objects are the seams the tests swap out.
#[derive(Clone)]
pub struct HarvesterDeps {
    pub source: Arc<dyn CommitSource>,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub logs: Arc<dyn LogStore>,
}

/// Storage path of a repository's commit log
pub fn log_path(repo: &str) -> String {
    format!("/commits/{}.log", repo)
}

/// Encode a batch as newline-delimited JSON, one record per line, in
/// fetch order. Any record failing to encode aborts the whole batch
/// before a single byte reaches storage.
pub fn encode_records(commits: &[Commit]) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();

    for commit in commits {
        serde_json::to_writer(&mut buf, commit)?;
        buf.push(b'\n');
    }

    Ok(buf)
}

/// Run one fetch-and-append cycle for `repo`, returning the number of
/// commits appended.
///
/// The watermark committed on success is the time captured at cycle
/// start, not the newest commit's timestamp: commits created while the
/// fetch was in flight get re-fetched by a later cycle instead of being
/// silently skipped. The cost is an occasional duplicate at the window
/// boundary, which the log's at-least-once contract allows.
pub async fn run_cycle(deps: &HarvesterDeps, repo: &str) -> Result<usize, HarvestError> {
    let cycle_start = Utc::now();

    let since = deps.watermarks.get(repo).await?;
    tracing::debug!(
        "Fetching commits for '{}' since {:?}",
        repo,
        since.map(|t| t.to_rfc3339())
    );

    let commits = tokio::time::timeout(FETCH_TIMEOUT, deps.source.commits_since(repo, since))
        .await
        .map_err(|_| FetchError::Timeout(FETCH_TIMEOUT.as_secs()))??;

    let batch = encode_records(&commits)?;

    deps.logs.append(&log_path(repo), &batch).await?;

    deps.watermarks.set(repo, cycle_start).await?;

    Ok(commits.len())
}

/// Schedule one poll cycle for `repo` after the standard delay.
///
/// Cancellation observed while waiting abandons the cycle with no side
/// effects. A cycle already in flight runs to completion; the watermark
/// is only ever written after a fully successful append, so cancellation
/// cannot leave the log and watermark inconsistent. Cycle failures are
/// logged with repository context and never propagate out of the task.
pub fn spawn_repo_task(
    deps: HarvesterDeps,
    repo: String,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Poll task for '{}' cancelled before start", repo);
                return;
            }
            _ = tokio::time::sleep(POLL_DELAY) => {}
        }

        match run_cycle(&deps, &repo).await {
            Ok(count) => tracing::info!("Repo {} has {} commits", repo, count),
            Err(err) => tracing::error!("Poll cycle for '{}' failed: {}", repo, err),
        }
    })
}
