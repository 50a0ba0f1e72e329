//! Core types, configuration, and error handling for stagedrift.
//!
//! This crate provides the shared foundation used by all other stagedrift crates:
//! - [`DriftError`]: the failure taxonomy of a comparison, using `thiserror`
//! - [`DriftConfig`]: configuration loaded from `.stagedrift.toml`
//! - Shared types: [`Reference`], [`StageSpec`], [`RiskWeights`],
//!   [`CodeDiffStat`], [`FileMetric`], [`ComparisonResult`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{CacheConfig, DriftConfig, OutputConfig, PipelineConfig, ToolsConfig};
pub use error::DriftError;
pub use types::{
    CodeDiffStat, ComparisonResult, FileMetric, OutputFormat, Reference, RiskWeights, StageSpec,
};

/// A convenience `Result` type for stagedrift operations.
pub type Result<T> = std::result::Result<T, DriftError>;

/// Result of a best-effort call.
///
/// The caller decides per call-site whether an `Err` aborts the comparison
/// (checkout) or is logged and tolerated (cache pull, single-file diff,
/// single-file parse).
pub type Outcome<T> = std::result::Result<T, DriftError>;
