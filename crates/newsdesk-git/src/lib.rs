//! Git publish sink.
//!
//! Publishing = `git add` the rendered site, the article collection and the
//! media directory, `git commit` when something changed, then `git push`.

use std::{
    collections::VecDeque,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use newsdesk_core::{
    errors::Error,
    publish::{PublishSink, SiteArtifact},
    Result,
};

const STDERR_TAIL_MAX_BYTES: usize = 4 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 20;

#[derive(Clone, Debug)]
pub struct GitSinkConfig {
    /// `git` executable.
    pub git_path: PathBuf,
    /// Working tree the site lives in.
    pub repo_dir: PathBuf,
    pub remote: String,
    /// Branch to push; `None` pushes the current branch's upstream.
    pub branch: Option<String>,
    /// Files committed together with the site (the article collection).
    pub extra_paths: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct GitPublishSink {
    cfg: GitSinkConfig,
}

impl GitPublishSink {
    pub fn new(cfg: GitSinkConfig) -> Self {
        Self { cfg }
    }

    /// `add -A -- <paths>` for every publishable path that exists.
    fn add_args(&self, site: &SiteArtifact, media_dir: &Path) -> Option<Vec<OsString>> {
        let mut candidates = vec![site.index_path.clone(), media_dir.to_path_buf()];
        candidates.extend(self.cfg.extra_paths.iter().cloned());

        let paths: Vec<OsString> = candidates
            .iter()
            .filter(|p| p.exists())
            .map(|p| relative_to(&self.cfg.repo_dir, p).into_os_string())
            .collect();
        if paths.is_empty() {
            return None;
        }

        let mut args: Vec<OsString> = vec!["add".into(), "-A".into(), "--".into()];
        args.extend(paths);
        Some(args)
    }

    fn commit_args(summary: &str) -> Vec<OsString> {
        let msg = if summary.trim().is_empty() {
            "Update site"
        } else {
            summary.trim()
        };
        vec!["commit".into(), "-m".into(), msg.into()]
    }

    fn push_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["push".into(), self.cfg.remote.clone().into()];
        if let Some(branch) = &self.cfg.branch {
            args.push(format!("HEAD:{branch}").into());
        }
        args
    }

    async fn git(&self, args: &[OsString]) -> Result<std::process::Output> {
        debug!(args = ?args, "running git");
        let output = Command::new(&self.cfg.git_path)
            .args(args)
            .current_dir(&self.cfg.repo_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::Publish(format!(
                    "cannot run {}: {e}",
                    self.cfg.git_path.display()
                ))
            })?;
        Ok(output)
    }

    async fn git_ok(&self, args: &[OsString]) -> Result<()> {
        let output = self.git(args).await?;
        if output.status.success() {
            return Ok(());
        }
        let sub = args
            .first()
            .map(|a| a.to_string_lossy().to_string())
            .unwrap_or_default();
        let tail = stderr_tail(&output.stderr);
        let mut msg = format!("git {sub} exited with status {}", output.status);
        if !tail.trim().is_empty() {
            msg.push_str(": ");
            msg.push_str(&tail);
        }
        Err(Error::Publish(msg))
    }
}

#[async_trait]
impl PublishSink for GitPublishSink {
    fn name(&self) -> &str {
        "git"
    }

    async fn publish(&self, site: &SiteArtifact, media_dir: &Path) -> Result<()> {
        let Some(add) = self.add_args(site, media_dir) else {
            return Err(Error::Publish("nothing to publish".to_string()));
        };
        self.git_ok(&add).await?;

        // `diff --cached --quiet` exits 1 when something is staged.
        let staged = self
            .git(&["diff".into(), "--cached".into(), "--quiet".into()])
            .await?;
        if staged.status.success() {
            info!("no site changes to commit");
        } else {
            self.git_ok(&Self::commit_args(&site.summary)).await?;
        }

        // Push even without a new commit so an earlier failed push is retried.
        self.git_ok(&self.push_args()).await?;
        info!(remote = %self.cfg.remote, articles = site.article_count, "site pushed");
        Ok(())
    }
}

fn relative_to(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(|p| {
            if p.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                p.to_path_buf()
            }
        })
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Last lines of a process's stderr, bounded in lines and bytes.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let mut lines: VecDeque<&str> = VecDeque::new();
    let mut bytes = 0usize;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        bytes = bytes.saturating_add(line.len() + 1);
        lines.push_back(line);
        while lines.len() > STDERR_TAIL_MAX_LINES || bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = lines.pop_front() {
                bytes = bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }
    lines.into_iter().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        let dir = std::env::temp_dir().join(format!("{prefix}-{pid}-{ts}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sink(repo: &Path, branch: Option<&str>) -> GitPublishSink {
        GitPublishSink::new(GitSinkConfig {
            git_path: PathBuf::from("git"),
            repo_dir: repo.to_path_buf(),
            remote: "origin".to_string(),
            branch: branch.map(|s| s.to_string()),
            extra_paths: vec![repo.join("articles.json")],
        })
    }

    fn artifact(repo: &Path) -> SiteArtifact {
        SiteArtifact {
            index_path: repo.join("index.html"),
            article_count: 2,
            summary: "Add article #2: Hello".to_string(),
        }
    }

    #[test]
    fn add_uses_repo_relative_paths_and_skips_missing() {
        let repo = tmp_dir("newsdesk-git-add");
        std::fs::write(repo.join("index.html"), "<html>").unwrap();
        std::fs::create_dir_all(repo.join("media")).unwrap();

        let args = sink(&repo, None)
            .add_args(&artifact(&repo), &repo.join("media"))
            .unwrap();
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, vec!["add", "-A", "--", "index.html", "media"]);
    }

    #[test]
    fn nothing_to_add_when_no_files_exist() {
        let repo = tmp_dir("newsdesk-git-empty");
        assert!(sink(&repo, None)
            .add_args(&artifact(&repo), &repo.join("media"))
            .is_none());
    }

    #[test]
    fn push_targets_configured_branch() {
        let repo = PathBuf::from("/srv/site");
        let plain: Vec<String> = sink(&repo, None)
            .push_args()
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(plain, vec!["push", "origin"]);

        let branch: Vec<String> = sink(&repo, Some("gh-pages"))
            .push_args()
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(branch, vec!["push", "origin", "HEAD:gh-pages"]);
    }

    #[test]
    fn commit_message_falls_back_for_blank_summary() {
        let args = GitPublishSink::commit_args("  ");
        assert_eq!(args[2], OsString::from("Update site"));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let raw = (0..50)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let tail = stderr_tail(raw.as_bytes());
        assert_eq!(tail.lines().count(), STDERR_TAIL_MAX_LINES);
        assert!(tail.ends_with("line 49"));
    }

    #[tokio::test]
    async fn missing_git_binary_is_a_publish_error() {
        let repo = tmp_dir("newsdesk-git-nobin");
        std::fs::write(repo.join("index.html"), "<html>").unwrap();
        let sink = GitPublishSink::new(GitSinkConfig {
            git_path: repo.join("no-such-git"),
            repo_dir: repo.clone(),
            remote: "origin".to_string(),
            branch: None,
            extra_paths: vec![],
        });

        let err = sink
            .publish(&artifact(&repo), &repo.join("media"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Publish(_)), "{err}");
    }
}
