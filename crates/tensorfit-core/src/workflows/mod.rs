//! High-level analysis workflows.
//!
//! These are the entry points tying the data model and the engine together:
//! model selection, the grid search and minimisation drivers, the Monte
//! Carlo error estimation cycle, and the diagnostic outputs (Q-factors,
//! inter-tensor angles, SVD condition numbers, reports and plots).

pub mod diagnostics;
pub mod fit;
