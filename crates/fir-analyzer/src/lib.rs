//! Severity analyzer
//!
//! Scores one observation in [0, 10] across three axes: errors surfaced by
//! the target (bug), latency degradation (performance), and changes in
//! trace structure against a baseline (structure). A sub-scorer failure
//! contributes 0 and never halts the loop.

mod scoring;

pub use scoring::{SeverityAnalyzer, SeverityScore};
