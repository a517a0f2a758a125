//! The local working copy being published.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::GitError;

/// Entries written to a new `.gitignore`.
pub const DEFAULT_GITIGNORE: &str = "\
.DS_Store
node_modules
/dist

# local env files
.env.local
.env.*.local

# Log files
npm-debug.log*
yarn-debug.log*
yarn-error.log*

# Editor directories and files
.idea
.vscode
*.suo
*.ntvs*
*.njsproj
*.sln
*.sw?
";

/// Wrapper around the `git` CLI for one working directory.
#[derive(Debug, Clone)]
pub struct LocalRepo {
    dir: PathBuf,
}

impl LocalRepo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the directory has its own `.git`.
    pub fn is_repo(&self) -> bool {
        self.dir.join(".git").exists()
    }

    /// `git init` unless the directory is already a repository.
    pub async fn ensure_init(&self) -> Result<(), GitError> {
        if self.is_repo() {
            return Ok(());
        }

        info!(dir = %self.dir.display(), "Initializing git repository");
        self.git(&["init"]).await?;
        Ok(())
    }

    /// Point `name` at `url`, adding the remote when missing.
    pub async fn ensure_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        match self.remote_url(name).await? {
            Some(current) if current == url => Ok(()),
            Some(current) => {
                info!(remote = name, from = %current, to = %url, "Updating remote URL");
                self.git(&["remote", "set-url", name, url]).await?;
                Ok(())
            }
            None => {
                info!(remote = name, url = %url, "Adding remote");
                self.git(&["remote", "add", name, url]).await?;
                Ok(())
            }
        }
    }

    pub async fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        let output = self.git_raw(&["remote", "get-url", name]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if url.is_empty() { None } else { Some(url) })
    }

    /// Write [`DEFAULT_GITIGNORE`] unless a `.gitignore` exists.
    /// Returns whether a file was written.
    pub async fn ensure_gitignore(&self) -> Result<bool, GitError> {
        let path = self.dir.join(".gitignore");
        if path.exists() {
            return Ok(false);
        }

        tokio::fs::write(&path, DEFAULT_GITIGNORE).await?;
        info!(path = %path.display(), "Created .gitignore");
        Ok(true)
    }

    /// Paths with unresolved merge conflicts.
    pub async fn conflicted_files(&self) -> Result<Vec<String>, GitError> {
        let stdout = self
            .git(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Whether the working tree differs from HEAD (untracked files included).
    pub async fn has_changes(&self) -> Result<bool, GitError> {
        let stdout = self.git(&["status", "--porcelain"]).await?;
        Ok(!stdout.trim().is_empty())
    }

    /// Whether HEAD points at a commit.
    pub async fn has_commits(&self) -> Result<bool, GitError> {
        let output = self.git_raw(&["rev-parse", "--verify", "--quiet", "HEAD"]).await?;
        Ok(output.status.success())
    }

    pub async fn current_branch(&self) -> Result<Option<String>, GitError> {
        let output = self.git_raw(&["symbolic-ref", "--short", "HEAD"]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let reference = format!("refs/heads/{}", branch);
        let output = self
            .git_raw(&["rev-parse", "--verify", "--quiet", &reference])
            .await?;
        Ok(output.status.success())
    }

    /// Switch to `branch`, creating it from the current HEAD when needed.
    pub async fn checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        if self.current_branch().await?.as_deref() == Some(branch) {
            return Ok(());
        }

        if !self.has_commits().await? {
            // Nothing to branch from yet; repoint the unborn HEAD.
            let reference = format!("refs/heads/{}", branch);
            self.git(&["symbolic-ref", "HEAD", &reference]).await?;
        } else if self.branch_exists(branch).await? {
            self.switch_to_existing(branch).await?;
        } else {
            self.git(&["checkout", "-b", branch]).await?;
        }

        info!(branch, "Checked out branch");
        Ok(())
    }

    /// Check out an existing `branch` so that it contains the current HEAD.
    ///
    /// A branch behind HEAD is fast-forwarded to it first; a branch that has
    /// diverged from HEAD is refused.
    async fn switch_to_existing(&self, branch: &str) -> Result<(), GitError> {
        let head = self.git(&["rev-parse", "HEAD"]).await?.trim().to_string();
        let reference = format!("refs/heads/{}", branch);

        if self.is_ancestor(&head, &reference).await? {
            self.git(&["checkout", branch]).await?;
        } else if self.is_ancestor(&reference, &head).await? {
            info!(branch, head = %head, "Fast-forwarding branch to HEAD");
            self.git(&["branch", "--force", branch, &head]).await?;
            self.git(&["checkout", branch]).await?;
        } else {
            return Err(GitError::Diverged {
                branch: branch.to_string(),
            });
        }
        Ok(())
    }

    /// Whether `ancestor` is reachable from `descendant`.
    pub async fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let output = self
            .git_raw(&["merge-base", "--is-ancestor", ancestor, descendant])
            .await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::CommandFailed {
                command: "merge-base".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    /// Stage everything and commit. Returns `false` when there was nothing to
    /// commit; conflicts are an error.
    pub async fn commit_all(&self, message: &str) -> Result<bool, GitError> {
        let conflicts = self.conflicted_files().await?;
        if !conflicts.is_empty() {
            return Err(GitError::Conflicts(conflicts));
        }

        if !self.has_changes().await? {
            debug!("Working tree clean, nothing to commit");
            return Ok(false);
        }

        self.git(&["add", "-A"]).await?;
        self.git(&["commit", "-m", message]).await?;
        info!(message, "Committed changes");
        Ok(true)
    }

    pub async fn tag_exists(&self, tag: &str) -> Result<bool, GitError> {
        let reference = format!("refs/tags/{}", tag);
        let output = self
            .git_raw(&["rev-parse", "--verify", "--quiet", &reference])
            .await?;
        Ok(output.status.success())
    }

    /// Tag HEAD. Returns `false` when the tag already exists.
    pub async fn tag(&self, tag: &str) -> Result<bool, GitError> {
        if self.tag_exists(tag).await? {
            debug!(tag, "Tag already exists");
            return Ok(false);
        }

        self.git(&["tag", tag]).await?;
        info!(tag, "Created tag");
        Ok(true)
    }

    /// Push a branch (setting upstream) to `remote`.
    pub async fn push_branch(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        info!(remote, branch, "Pushing branch");
        self.git(&["push", "-u", remote, branch]).await?;
        Ok(())
    }

    pub async fn push_tag(&self, remote: &str, tag: &str) -> Result<(), GitError> {
        info!(remote, tag, "Pushing tag");
        let reference = format!("refs/tags/{}", tag);
        self.git(&["push", remote, &reference]).await?;
        Ok(())
    }

    /// Run git and return stdout, failing on a non-zero exit.
    async fn git(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.git_raw(args).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn git_raw(&self, args: &[&str]) -> Result<std::process::Output, GitError> {
        debug!(?args, dir = %self.dir.display(), "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(output)
    }
}
