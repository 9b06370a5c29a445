//! Wiki mirror synchronization via the system `git` binary.
//!
//! The mirror lives at `<data_dir>/<repo_key>/mirror`. A healthy clone
//! is fast-forwarded in place; any pull failure demotes to a delete
//! plus shallow reclone. Every subprocess call runs under a bounded
//! deadline with combined stdout+stderr captured for diagnostics.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::GIT_TIMEOUT;
use crate::error::{RagError, RagResult};

/// Filesystem-safe key for a repo: `owner/name` -> `owner__name`.
pub fn repo_key(repo: &str) -> String {
    repo.replace('/', "__")
}

pub fn wiki_remote_url(repo: &str) -> String {
    format!("https://github.com/{repo}.wiki.git")
}

/// Bring the local mirror of `repo`'s wiki up to date and return its
/// path. Two-shot: fast-forward the existing clone, else reclone.
pub async fn sync_mirror(data_dir: &Path, repo: &str) -> RagResult<PathBuf> {
    let mirror = data_dir.join(repo_key(repo)).join("mirror");

    if mirror.join(".git").exists() {
        match fast_forward(&mirror, repo).await {
            Ok(()) => {
                info!(repo, "wiki mirror fast-forwarded");
                return Ok(mirror);
            }
            Err(e) => {
                warn!(repo, error = %e, "fast-forward failed, recloning mirror");
            }
        }
    }

    if mirror.exists() {
        std::fs::remove_dir_all(&mirror)?;
    }
    if let Some(parent) = mirror.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let target = mirror.to_string_lossy().to_string();
    run_git(
        None,
        &["clone", "--depth", "1", &wiki_remote_url(repo), &target],
        repo,
    )
    .await?;
    info!(repo, "wiki mirror cloned");
    Ok(mirror)
}

async fn fast_forward(mirror: &Path, repo: &str) -> RagResult<()> {
    // The remote URL tracks the repo argument, so a repo rename or a
    // recycled data dir cannot keep pulling the old wiki.
    run_git(
        Some(mirror),
        &["remote", "set-url", "origin", &wiki_remote_url(repo)],
        repo,
    )
    .await?;
    run_git(Some(mirror), &["pull", "--ff-only"], repo).await?;
    Ok(())
}

async fn run_git(cwd: Option<&Path>, args: &[&str], repo: &str) -> RagResult<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(GIT_TIMEOUT, cmd.output())
        .await
        .map_err(|_| RagError::MirrorSync {
            repo: repo.to_string(),
            detail: format!(
                "git {} timed out after {}s",
                args.join(" "),
                GIT_TIMEOUT.as_secs()
            ),
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RagError::GitMissing("install git or add it to PATH".to_string())
            } else {
                RagError::Io(e)
            }
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(RagError::MirrorSync {
            repo: repo.to_string(),
            detail: format!(
                "git {} failed ({}): {}",
                args.join(" "),
                output.status,
                combined.trim()
            ),
        });
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_key_replaces_slashes() {
        assert_eq!(repo_key("acme/widgets"), "acme__widgets");
        assert_eq!(repo_key("no-slash"), "no-slash");
    }

    #[test]
    fn wiki_url_shape() {
        assert_eq!(
            wiki_remote_url("acme/widgets"),
            "https://github.com/acme/widgets.wiki.git"
        );
    }

    #[tokio::test]
    async fn failed_git_call_reports_combined_output() {
        // `git` resolving a nonsense subcommand fails fast without any
        // network access; the error must carry git's own message.
        let err = run_git(None, &["definitely-not-a-subcommand"], "acme/widgets")
            .await
            .unwrap_err();
        match err {
            RagError::MirrorSync { repo, detail } => {
                assert_eq!(repo, "acme/widgets");
                assert!(detail.contains("definitely-not-a-subcommand"));
            }
            RagError::GitMissing(_) => {} // acceptable on hosts without git
            other => panic!("unexpected error: {other}"),
        }
    }
}
