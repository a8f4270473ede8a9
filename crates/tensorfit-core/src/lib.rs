//! # tensorfit Core Library
//!
//! A library for the representation of molecular alignment tensors and the
//! optimisation of N-state ensemble models against residual dipolar coupling
//! (RDC) data, as used in NMR dynamics analysis.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear separation of concerns,
//! making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`AlignTensor`, `TensorRegistry`,
//!   the spin and RDC containers), pure mathematical routines (tensor basis conversions, Euler
//!   angle folding, RDC back-calculation), and I/O utilities.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer orchestrates the optimisation process.
//!   It includes the parameter vector codec, the linear constraint builder, the chi-squared
//!   target functions, the grid search and quasi-Newton minimiser, and the Monte Carlo
//!   simulation machinery.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level, user-facing layer. It ties the
//!   `engine` and `core` together to execute complete analysis procedures, such as fitting an
//!   N-state model to RDC data and propagating errors. It provides a simple and powerful entry
//!   point for end-users of the library.

pub mod core;
pub mod engine;
pub mod workflows;
