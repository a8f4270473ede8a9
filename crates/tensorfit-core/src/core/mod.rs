//! # Core Module
//!
//! This module provides the fundamental building blocks for alignment-tensor
//! analysis in tensorfit, serving as the computational core of the library.
//!
//! ## Overview
//!
//! The core module implements the essential data structures, pure mathematical
//! routines, and I/O utilities required for N-state model analysis of residual
//! dipolar coupling data. Everything here is stateless with respect to the
//! optimisation process: it either describes data or transforms it
//! deterministically.
//!
//! ## Architecture
//!
//! The module is organized into specialized submodules that handle different
//! aspects of the analysis:
//!
//! - **Tensor & Spin Representation** ([`models`]) - Alignment tensors, the tensor
//!   registry, spins, interatomic pairs, and the analysis context
//! - **Pure Mathematics** ([`math`]) - Basis conversions, Euler angle handling,
//!   and RDC back-calculation
//! - **Physical Constants** ([`constants`]) - Gyromagnetic ratios and dipolar
//!   coupling constants
//! - **File I/O** ([`io`]) - Tabular RDC input, fixed-format tensor reports, and
//!   correlation plot output
//!
//! ## Scientific Foundation
//!
//! The core module implements the standard formalism of partial molecular
//! alignment in a magnetic field:
//!
//! - **Saupe order matrix** and the equivalent alignment and probability tensor
//!   parameterisations of a rank-2, symmetric, traceless 3x3 tensor
//! - **Irreducible spherical tensor** decomposition of the order matrix
//! - **Residual dipolar couplings** back-calculated from ensemble bond vectors
//!   weighted by state populations

pub mod constants;
pub mod io;
pub mod math;
pub mod models;
