//! Linear population constraints in the form A.x >= b.
//!
//! For each of the N-1 free populations two rows bound 0 <= pc <= 1, and two
//! aggregate rows bound the implied N-th population 0 <= 1 - sum(pc) <= 1.
//! The b entries are divided by the conditioning factors so the rows stay
//! valid in scaled parameter space.

use crate::core::models::context::{AnalysisContext, ModelType};
use crate::engine::error::EngineError;
use crate::engine::params;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraints {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl LinearConstraints {
    /// Whether every inequality holds at `x`.
    pub fn satisfied(&self, x: &DVector<f64>) -> bool {
        let ax = &self.a * x;
        ax.iter().zip(self.b.iter()).all(|(lhs, rhs)| lhs >= rhs)
    }

    /// The summed squared violation, zero inside the feasible region.
    pub fn violation(&self, x: &DVector<f64>) -> f64 {
        let ax = &self.a * x;
        ax.iter()
            .zip(self.b.iter())
            .map(|(lhs, rhs)| (rhs - lhs).max(0.0).powi(2))
            .sum()
    }
}

/// Builds the population constraints for the current model.
///
/// The fixed model has no population parameters and yields `None`.
pub fn population_constraints(
    context: &AnalysisContext,
    scaling_diag: &DVector<f64>,
) -> Result<Option<LinearConstraints>, EngineError> {
    let model = context.model.ok_or(EngineError::ModelUnset)?;
    if model == ModelType::Fixed {
        return Ok(None);
    }
    let n = context.n_states.ok_or(EngineError::StatesUnset)?;
    let count = params::param_count(context)?;

    // Populations lead the 2-domain vector; in the population model they
    // follow the tensor blocks and precede an optimised centre triple.
    let pop_start = match model {
        ModelType::TwoDomain => 0,
        _ if !context.paramag_centre_fixed => count - (n - 1) - 3,
        _ => count - (n - 1),
    };

    let rows = 2 * (n - 1) + 2;
    let mut a = DMatrix::zeros(rows, count);
    let mut b = DVector::zeros(rows);

    let mut j = 0;
    for c in 0..n - 1 {
        let i = pop_start + c;
        a[(j, i)] = 1.0;
        a[(j + 1, i)] = -1.0;
        b[j] = 0.0;
        b[j + 1] = -1.0 / scaling_diag[i];
        j += 2;
    }

    let last = pop_start + n - 2;
    for i in pop_start..pop_start + n - 1 {
        a[(j, i)] = -1.0;
        a[(j + 1, i)] = 1.0;
    }
    b[j] = -1.0 / scaling_diag[last];
    b[j + 1] = 0.0;

    Ok(Some(LinearConstraints { a, b }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population_context(n: usize) -> AnalysisContext {
        let mut context = AnalysisContext::new();
        context.model = Some(ModelType::Population);
        context.n_states = Some(n);
        context.add_rdc_id("Dy");
        context.tensors_mut().add("Dy").set_params([1e-4; 5]);
        context
    }

    #[test]
    fn four_state_matrix_shape_and_content() {
        let context = population_context(4);
        let scaling = params::scaling_diagonal(&context, false).unwrap();
        let constraints = population_constraints(&context, &scaling).unwrap().unwrap();

        // 5 tensor columns + 3 populations; 2 rows each + 2 aggregates.
        assert_eq!(constraints.a.shape(), (8, 8));
        assert_eq!(constraints.a[(0, 5)], 1.0);
        assert_eq!(constraints.a[(1, 5)], -1.0);
        assert_eq!(constraints.b[1], -1.0);
        // Aggregate rows span all three population columns.
        for i in 5..8 {
            assert_eq!(constraints.a[(6, i)], -1.0);
            assert_eq!(constraints.a[(7, i)], 1.0);
        }
        assert_eq!(constraints.b[6], -1.0);
        assert_eq!(constraints.b[7], 0.0);
    }

    #[test]
    fn scaling_divides_the_bounds() {
        let context = population_context(3);
        let scaling = params::scaling_diagonal(&context, true).unwrap();
        let constraints = population_constraints(&context, &scaling).unwrap().unwrap();
        // Populations are scaled by 0.1, so the upper-bound rows become -10.
        assert_eq!(constraints.b[1], -10.0);
        assert_eq!(constraints.b[3], -10.0);
        assert_eq!(constraints.b[4], -10.0);
    }

    #[test]
    fn feasibility_and_violation() {
        let context = population_context(3);
        let scaling = params::scaling_diagonal(&context, false).unwrap();
        let constraints = population_constraints(&context, &scaling).unwrap().unwrap();

        let mut x = DVector::zeros(7);
        x[5] = 0.3;
        x[6] = 0.4;
        assert!(constraints.satisfied(&x));
        assert_eq!(constraints.violation(&x), 0.0);

        x[5] = 0.9;
        x[6] = 0.9;
        assert!(!constraints.satisfied(&x));
        assert!(constraints.violation(&x) > 0.0);
    }

    #[test]
    fn optimised_centre_shifts_the_population_columns() {
        let mut context = population_context(4);
        context.paramag_centre_fixed = false;
        let scaling = params::scaling_diagonal(&context, false).unwrap();
        let constraints = population_constraints(&context, &scaling).unwrap().unwrap();

        // 5 tensor + 3 population + 3 centre columns; populations at 5..8.
        assert_eq!(constraints.a.shape(), (8, 11));
        assert_eq!(constraints.a[(0, 5)], 1.0);
        for i in 8..11 {
            assert_eq!(constraints.a[(6, i)], 0.0);
        }
    }

    #[test]
    fn fixed_model_has_no_constraints() {
        let mut context = population_context(3);
        context.model = Some(ModelType::Fixed);
        let scaling = params::scaling_diagonal(&context, false).unwrap();
        assert!(population_constraints(&context, &scaling).unwrap().is_none());
    }
}
