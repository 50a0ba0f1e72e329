//! Historical comparison engine.
//!
//! Clones the repository into an isolated workspace, materializes every path
//! a pipeline stage declares at two references, scores data drift and code
//! churn per stage, and persists the result as a JSON report.

pub mod aggregate;
pub mod compare;
pub mod report;
pub mod snapshot;
pub mod stages;
pub mod summary;
pub mod workspace;

#[cfg(test)]
mod fakes;

pub use compare::{Comparator, Comparison};
pub use summary::{ComparisonSummary, StageSummary};
pub use workspace::{with_isolated_workspace, IsolatedWorkspace};
