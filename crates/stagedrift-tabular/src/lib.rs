//! Table loading and drift risk scoring.
//!
//! Loads a dataset file of any supported format into a [`matrix::TabularMatrix`]
//! and scores how far two snapshots of it drifted apart: relative changes in
//! row count, column count, duplicates and nulls, the latter two counted over
//! numeric columns only.

pub mod loader;
pub mod matrix;
pub mod risk;

pub use loader::{load_or_empty, load_table, TableFormat};
pub use matrix::{Cell, TabularMatrix};
pub use risk::{risk, risk_breakdown, RiskBreakdown, RiskLevel};
