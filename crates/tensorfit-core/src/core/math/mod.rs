//! # Core Mathematics Module
//!
//! Pure, stateless mathematical routines for alignment tensor analysis.
//!
//! - [`basis`] - Conversions between the equivalent 5-parameter tensor bases
//!   (Saupe order matrix, alignment tensor, probability tensor, irreducible
//!   spherical components) and derived geometric descriptors
//! - [`euler`] - zyz Euler angle construction, decomposition, and folding into
//!   principal ranges
//! - [`rdc`] - Ensemble-averaged residual dipolar coupling back-calculation
//!   and its gradient with respect to tensor elements

pub mod basis;
pub mod euler;
pub mod rdc;
