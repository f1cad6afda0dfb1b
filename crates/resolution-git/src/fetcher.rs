//! Clone-and-read transport.

use std::path::Path;

use async_trait::async_trait;
use git2::build::RepoBuilder;
use git2::{FetchOptions, ObjectType, RemoteCallbacks};
use tokio_util::sync::CancellationToken;

use crate::error::{GitError, Result};
use crate::params::GitParams;

/// A file read from a repository at a specific commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Full hash of the commit the file was read at.
    pub commit: String,
    /// File contents.
    pub content: Vec<u8>,
}

/// Reads one file out of a remote repository.
#[async_trait]
pub trait GitFetcher: Send + Sync {
    async fn fetch(&self, params: &GitParams) -> Result<FetchedFile>;
}

/// [`GitFetcher`] that clones with libgit2 into a scratch directory.
///
/// The clone runs on the blocking pool. The file is read from the commit's
/// tree, so no working copy is checked out. Dropping the fetch future, as a
/// resolve deadline does, aborts the clone at its next progress callback
/// and frees the blocking thread.
#[derive(Debug, Clone, Default)]
pub struct Git2Fetcher;

#[async_trait]
impl GitFetcher for Git2Fetcher {
    async fn fetch(&self, params: &GitParams) -> Result<FetchedFile> {
        let params = params.clone();
        let cancel = CancellationToken::new();
        let _abort_on_drop = cancel.clone().drop_guard();
        tokio::task::spawn_blocking(move || fetch_blocking(&params, &cancel))
            .await
            .map_err(|e| GitError::Task(e.to_string()))?
    }
}

fn fetch_blocking(params: &GitParams, cancel: &CancellationToken) -> Result<FetchedFile> {
    if cancel.is_cancelled() {
        return Err(GitError::Cancelled);
    }
    let scratch = tempfile::tempdir()?;

    let mut callbacks = RemoteCallbacks::new();
    let transfer = cancel.clone();
    callbacks.transfer_progress(move |_| !transfer.is_cancelled());
    let sideband = cancel.clone();
    callbacks.sideband_progress(move |_| !sideband.is_cancelled());
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);

    let mut builder = RepoBuilder::new();
    builder.bare(true).fetch_options(fetch);
    if let Some(branch) = &params.branch {
        builder.branch(branch);
    }
    tracing::debug!(url = %params.url, branch = ?params.branch, "cloning");
    let repo = builder
        .clone(&params.url, scratch.path())
        .map_err(|e| {
            if cancel.is_cancelled() {
                tracing::debug!(url = %params.url, "clone aborted");
                GitError::Cancelled
            } else {
                GitError::Clone(e)
            }
        })?;

    let commit = match &params.commit {
        Some(rev) => repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|source| GitError::Revision {
                rev: rev.clone(),
                source,
            })?,
        None => repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(GitError::Head)?,
    };

    let tree = commit.tree().map_err(GitError::Head)?;
    let entry = tree
        .get_path(Path::new(&params.path))
        .map_err(|source| GitError::FileNotFound {
            path: params.path.clone(),
            source,
        })?;
    if entry.kind() != Some(ObjectType::Blob) {
        return Err(GitError::NotAFile(params.path.clone()));
    }
    let blob = repo
        .find_blob(entry.id())
        .map_err(|source| GitError::FileNotFound {
            path: params.path.clone(),
            source,
        })?;

    Ok(FetchedFile {
        commit: commit.id().to_string(),
        content: blob.content().to_vec(),
    })
}
