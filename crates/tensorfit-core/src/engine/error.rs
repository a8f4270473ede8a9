use thiserror::Error;

use crate::core::constants::IsotopeError;
use crate::core::models::registry::RegistryError;
use crate::core::models::tensor::TensorError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No N-state model has been selected")]
    ModelUnset,

    #[error("The number of states has not been set")]
    StatesUnset,

    #[error("The reference domain has not been set")]
    RefDomainUnset,

    #[error("No alignment tensor data is available for optimisation")]
    NoTensorData,

    #[error("No RDC data is available for optimisation")]
    NoRdcData,

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Isotope error: {0}")]
    Isotope(#[from] IsotopeError),

    #[error("The chi-squared value after optimisation is not finite: {chi2}")]
    NonFiniteChi2 { chi2: f64 },

    #[error(
        "The grid search bound count {bounds} does not match the parameter count {params}"
    )]
    BoundCountMismatch { bounds: usize, params: usize },

    #[error("The Monte Carlo replicate count has not been set")]
    SimCountUnset,

    #[error("Every grid point violates the population constraints")]
    InfeasibleGrid,

    #[error("Internal logic error: {0}")]
    Internal(String),
}
