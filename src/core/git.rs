//! Revision resolution and commit diffing against the local git checkout.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::{Error, Result};
use crate::utils::command;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionPair {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Modified or added: the file exists in the end-revision working copy.
    Present,
    /// Deleted between the two revisions.
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    pub presence: Presence,
}

/// Resolve a revision identifier to a commit hash.
pub fn resolve_revision(repo: &Path, revision: &str) -> Result<String> {
    if revision.trim().is_empty() {
        return Err(Error::commit_unresolvable(revision));
    }

    command::run_in(
        repo,
        "git",
        &["rev-parse", "--verify", "--quiet", &format!("{}^{{commit}}", revision)],
        "git rev-parse",
    )
    .map_err(|_| Error::commit_unresolvable(revision))
}

/// Validate that both ends of the pair resolve, returning the commit hashes.
pub fn validate_pair(repo: &Path, pair: &RevisionPair) -> Result<(String, String)> {
    let start = resolve_revision(repo, &pair.start)?;
    let end = resolve_revision(repo, &pair.end)?;
    Ok((start, end))
}

/// List files that differ between the two revisions, restricted to the
/// managed source root, classified as present or deleted by checking the
/// end-revision working copy.
pub fn changed_files(
    repo: &Path,
    pair: &RevisionPair,
    source_root: &str,
) -> Result<Vec<ChangedFile>> {
    let stdout = command::run_in(
        repo,
        "git",
        &[
            "diff",
            "--name-only",
            &pair.start,
            &pair.end,
            "--",
            source_root,
        ],
        "git diff",
    )
    .map_err(|e| Error::git_command_failed(e.message))?;

    let files = stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let path = PathBuf::from(line);
            let presence = if repo.join(&path).exists() {
                Presence::Present
            } else {
                Presence::Deleted
            };
            ChangedFile { path, presence }
        })
        .collect();

    Ok(files)
}

pub(crate) fn is_git_repo(path: &Path) -> bool {
    command::succeeded_in(path, "git", &["rev-parse", "--git-dir"])
}

/// Locate the repository root containing `path`.
pub fn repo_root(path: &Path) -> Result<PathBuf> {
    if !is_git_repo(path) {
        return Err(Error::git_command_failed(format!(
            "{} is not inside a git repository",
            path.display()
        )));
    }
    let root = command::run_in(path, "git", &["rev-parse", "--show-toplevel"], "git rev-parse")
        .map_err(|e| Error::git_command_failed(e.message))?;
    Ok(PathBuf::from(root))
}
