//! The optimisation engine.
//!
//! This layer turns the data model into a numerical problem: it assembles
//! per-alignment RDC arrays, packs tensor parameters into a flat vector,
//! builds linear population constraints, and drives the grid search, the
//! quasi-Newton minimiser, and the Monte Carlo replicate machinery.

pub mod config;
pub mod constraints;
pub mod data;
pub mod error;
pub mod mc;
pub mod minimise;
pub mod objective;
pub mod params;
pub mod progress;

pub use error::EngineError;
pub use progress::{Progress, ProgressCallback, ProgressReporter};
