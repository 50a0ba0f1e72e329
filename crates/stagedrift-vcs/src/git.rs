use std::path::Path;
use std::time::Duration;

use stagedrift_core::{DriftError, Outcome, Reference, ToolsConfig};
use tracing::{debug, info};

use crate::process::{run_tool, ToolOutput};

/// Version-control operations needed to compare two references.
///
/// Every call takes the repository path explicitly, so an implementation
/// never depends on the current directory and can serve several
/// workspaces at once.
pub trait VersionControl: Send + Sync {
    /// Make a full copy of `source` at `dest`.
    fn clone_repo(&self, source: &Path, dest: &Path) -> Outcome<()>;

    /// Switch the working tree of `repo` to `reference`.
    ///
    /// Fails with [`DriftError::CheckoutFailed`] if the reference does not
    /// resolve; callers treat that as fatal.
    fn checkout(&self, repo: &Path, reference: &Reference) -> Outcome<()>;

    /// The commit currently checked out in `repo`.
    fn rev_parse_head(&self, repo: &Path) -> Outcome<Reference>;

    /// The commit `name` points at, without touching the working tree.
    ///
    /// `name` may be a commit, a tag, a branch of the cloned repository or
    /// `HEAD`. Fails with [`DriftError::CheckoutFailed`] if it resolves to
    /// nothing.
    fn resolve(&self, repo: &Path, name: &str) -> Outcome<Reference>;

    /// Raw numeric diff report for `file` between two references.
    fn diff_numstat(
        &self,
        repo: &Path,
        old: &Reference,
        new: &Reference,
        file: &str,
    ) -> Outcome<String>;

    /// The last `count` commits reachable from HEAD, oldest first.
    fn recent_commits(&self, repo: &Path, count: usize) -> Outcome<Vec<Reference>>;
}

/// [`VersionControl`] backed by the `git` command line.
///
/// # Examples
///
/// ```
/// use stagedrift_core::ToolsConfig;
/// use stagedrift_vcs::git::GitCli;
///
/// let git = GitCli::from_config(&ToolsConfig::default());
/// assert_eq!(git.program(), "git");
/// ```
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Option<Duration>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

impl GitCli {
    /// Use `program` as the git executable, killing calls that outlive `timeout`.
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Build from the `[tools]` config table.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(tools.git.clone(), tools.timeout())
    }

    /// The git executable in use.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, cwd: &Path, args: &[&str]) -> Outcome<ToolOutput> {
        run_tool(&self.program, args, cwd, self.timeout)
    }

    fn run_ok(&self, cwd: &Path, args: &[&str]) -> Outcome<String> {
        let output = self.run(cwd, args)?;
        if !output.success() {
            return Err(DriftError::Git(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                output.failure_detail()
            )));
        }
        Ok(output.stdout)
    }
}

impl VersionControl for GitCli {
    fn clone_repo(&self, source: &Path, dest: &Path) -> Outcome<()> {
        // clone runs next to dest, so a relative source must be made absolute
        let source = std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let cwd = dest.parent().unwrap_or(dest);
        info!(source = %source.display(), dest = %dest.display(), "cloning repository");
        self.run_ok(
            cwd,
            &[
                "clone",
                "--quiet",
                &source.to_string_lossy(),
                &dest.to_string_lossy(),
            ],
        )?;
        Ok(())
    }

    fn checkout(&self, repo: &Path, reference: &Reference) -> Outcome<()> {
        debug!(reference = %reference.short(), "checking out");
        let output = self.run(
            repo,
            &[
                "-c",
                "advice.detachedHead=false",
                "checkout",
                "--quiet",
                reference.as_str(),
            ],
        )?;
        if !output.success() {
            return Err(DriftError::CheckoutFailed {
                reference: reference.to_string(),
                detail: output.failure_detail(),
            });
        }
        Ok(())
    }

    fn rev_parse_head(&self, repo: &Path) -> Outcome<Reference> {
        let stdout = self.run_ok(repo, &["rev-parse", "HEAD"])?;
        Ok(Reference::new(stdout.trim()))
    }

    fn resolve(&self, repo: &Path, name: &str) -> Outcome<Reference> {
        // branches of the source repository only exist as remote refs in a clone
        let candidates = [format!("{name}^{{commit}}"), format!("origin/{name}^{{commit}}")];
        for candidate in &candidates {
            let output = self.run(repo, &["rev-parse", "--verify", "--quiet", candidate])?;
            if output.success() {
                let commit = Reference::new(output.stdout.trim());
                debug!(name, commit = %commit.short(), "resolved reference");
                return Ok(commit);
            }
        }
        Err(DriftError::CheckoutFailed {
            reference: name.to_string(),
            detail: "unknown revision or branch".to_string(),
        })
    }

    fn diff_numstat(
        &self,
        repo: &Path,
        old: &Reference,
        new: &Reference,
        file: &str,
    ) -> Outcome<String> {
        self.run_ok(
            repo,
            &["diff", "--numstat", old.as_str(), new.as_str(), "--", file],
        )
    }

    fn recent_commits(&self, repo: &Path, count: usize) -> Outcome<Vec<Reference>> {
        let limit = count.to_string();
        let stdout = self.run_ok(repo, &["log", "--format=%H", "-n", &limit])?;
        let mut commits: Vec<Reference> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Reference::new)
            .collect();
        commits.reverse();
        Ok(commits)
    }
}
