//! Version-control and data-cache plumbing.
//!
//! Wraps the external tools a comparison shells out to: `git` for clones,
//! checkouts, commit listing and numeric diffs, and the data-versioning
//! cache puller. Every call takes an explicit working directory and runs
//! under an optional timeout.

pub mod cache;
pub mod git;
pub mod numstat;
pub mod process;

pub use cache::{CachePuller, CommandCachePuller, NoCache};
pub use git::{GitCli, VersionControl};
pub use numstat::{code_diff_stats, parse_numstat};
