//! Discovery and build of the signal worker's versioned repository.
//!
//! The repository is fetched shallow to
//! `<user-cache>/clusterman/clusterman_signals_<sha>`, resolved by
//! asking the remote for the ref's SHA. Existence of the path is the
//! cache key; cache is never evicted automatically.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{SignalError, SignalResult};

const SIGNALS_REPO: &str = "git@git.example.com:clusterman_signals";

pub fn cache_root() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("clusterman")
}

async fn sha_from_branch_or_tag(branch_or_tag: &str) -> SignalResult<String> {
    let output = Command::new("git")
        .args(["ls-remote", "--exit-code", SIGNALS_REPO, branch_or_tag])
        .output()
        .await
        .map_err(|e| SignalError::Connection(format!("git ls-remote failed to spawn: {e}")))?;
    if !output.status.success() {
        return Err(SignalError::Connection(format!("git ls-remote failed for ref {branch_or_tag}")));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let sha = stdout.split('\t').next().unwrap_or_default().trim().to_string();
    if sha.is_empty() {
        return Err(SignalError::Connection(format!("could not resolve SHA for ref {branch_or_tag}")));
    }
    Ok(sha)
}

/// Ensure a local, built copy of the signal repository at
/// `branch_or_tag` exists, returning its path. Always rebuilds the
/// worker's isolated execution environment (clean + prod targets)
/// even when the clone was already cached.
pub async fn ensure_local_signal_directory(branch_or_tag: &str) -> SignalResult<PathBuf> {
    let sha = sha_from_branch_or_tag(branch_or_tag).await?;
    let local_path = cache_root().join(format!("clusterman_signals_{sha}"));

    if !local_path.exists() {
        tokio::fs::create_dir_all(&local_path).await.map_err(|e| SignalError::Connection(format!("failed to create cache dir: {e}")))?;
        run_logged(&local_path, &["git", "clone", "--depth", "1", "--branch", branch_or_tag, SIGNALS_REPO, local_path.to_str().unwrap_or_default()]).await?;
    } else {
        tracing::debug!(sha, "signal version exists in cache, not re-cloning");
    }

    run_logged(&local_path, &["make", "clean"]).await?;
    run_logged(&local_path, &["make", "prod"]).await?;

    Ok(local_path)
}

async fn run_logged(cwd: &Path, argv: &[&str]) -> SignalResult<()> {
    let output = Command::new(argv[0])
        .args(&argv[1..])
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| SignalError::Connection(format!("failed to spawn {}: {e}", argv[0])))?;
    tracing::info!(cmd = argv.join(" "), stdout = %String::from_utf8_lossy(&output.stdout).trim(), "ran signal repo command");
    if !output.status.success() {
        return Err(SignalError::Connection(format!("command {} failed with status {}", argv.join(" "), output.status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_root_is_namespaced_under_clusterman() {
        let root = cache_root();
        assert!(root.ends_with("clusterman"));
    }
}
