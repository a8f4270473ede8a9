//! # Core I/O Module
//!
//! Reading and writing the user-facing file formats:
//!
//! - [`dataset`] - The TOML system definition (spins, pairs, alignments)
//! - [`table`] - Tabular RDC input with configurable column layout
//! - [`report`] - The fixed-format multi-section tensor report
//! - [`grace`] - Measured vs. back-calculated correlation plots, optionally
//!   in the Grace plotting-tool dialect

pub mod dataset;
pub mod grace;
pub mod report;
pub mod table;
