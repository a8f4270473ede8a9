//! # Core Models Module
//!
//! This module contains the fundamental data structures representing one
//! alignment analysis: tensors, their registry, spins and interatomic pairs
//! carrying the measured RDC data, and the analysis context tying them
//! together.
//!
//! ## Key Components
//!
//! - [`tensor`] - The `AlignTensor` container with its canonical 5-parameter
//!   storage and on-demand derived forms
//! - [`registry`] - The ordered, name-unique tensor collection with domain
//!   reduction relationships
//! - [`spin`] - Spins, interatomic pairs, and per-alignment RDC data
//! - [`context`] - The explicit `AnalysisContext` replacing any notion of a
//!   global current analysis

pub mod context;
pub mod registry;
pub mod spin;
pub mod tensor;
