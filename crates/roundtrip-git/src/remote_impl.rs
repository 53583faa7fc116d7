//! Fetch and push via the git CLI.
//!
//! Remote transfer stays a subprocess: it needs the user's credential helpers
//! and transport configuration, which the `git` binary already honours.

use std::process::Command;

use crate::error::GitError;
use crate::gix_repo::GixRepo;

fn run_remote(
    repo: &GixRepo,
    operation: &'static str,
    remote: &str,
    refspec: &str,
) -> Result<(), GitError> {
    tracing::debug!(operation, remote, refspec, "running git remote transfer");
    let output = Command::new("git")
        .arg("-C")
        .arg(repo.command_dir())
        .args([operation, "--quiet", remote, refspec])
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(GitError::RemoteFailed {
            operation,
            remote: remote.to_owned(),
            refspec: refspec.to_owned(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

pub fn fetch_ref(repo: &GixRepo, remote: &str, refspec: &str) -> Result<(), GitError> {
    run_remote(repo, "fetch", remote, refspec)
}

pub fn push_ref(repo: &GixRepo, remote: &str, refspec: &str) -> Result<(), GitError> {
    run_remote(repo, "push", remote, refspec)
}
