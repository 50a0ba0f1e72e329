use std::path::Path;
use std::time::Duration;

use stagedrift_core::{CacheConfig, DriftError, Outcome};
use tracing::info;

use crate::process::run_tool;

/// Fetches large files tracked outside version control into a working tree.
pub trait CachePuller: Send + Sync {
    /// Populate `repo` with the cached content of the current checkout.
    ///
    /// Failures are [`DriftError::CacheUnavailable`]; the caller logs them
    /// and continues with whatever is already on disk.
    fn pull(&self, repo: &Path) -> Outcome<()>;
}

/// Runs a configured command (by default `dvc pull`) inside the repository.
#[derive(Debug, Clone)]
pub struct CommandCachePuller {
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandCachePuller {
    /// Run `command` (program first) with an optional timeout.
    pub fn new(command: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl CachePuller for CommandCachePuller {
    fn pull(&self, repo: &Path) -> Outcome<()> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(DriftError::CacheUnavailable("no cache command configured".into()));
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        info!(command = %self.command.join(" "), "pulling data cache");

        let output = run_tool(program, &args, repo, self.timeout)
            .map_err(|e| DriftError::CacheUnavailable(e.to_string()))?;
        if !output.success() {
            return Err(DriftError::CacheUnavailable(format!(
                "'{}' failed: {}",
                self.command.join(" "),
                output.failure_detail()
            )));
        }
        Ok(())
    }
}

/// A puller that does nothing, for repositories without a data cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CachePuller for NoCache {
    fn pull(&self, _repo: &Path) -> Outcome<()> {
        Ok(())
    }
}

/// Build the puller selected by the `[cache]` config table.
pub fn from_config(cache: &CacheConfig, timeout: Option<Duration>) -> Box<dyn CachePuller> {
    if cache.enabled {
        Box::new(CommandCachePuller::new(cache.command.clone(), timeout))
    } else {
        Box::new(NoCache)
    }
}
