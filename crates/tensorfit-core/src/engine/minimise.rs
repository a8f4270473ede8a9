//! The quasi-Newton minimiser and the grid search.
//!
//! Both operate on an [`Objective`] in real parameter space. The BFGS run
//! internally works in scaled coordinates (x_real = S . x_scaled) with the
//! population constraints applied as a quadratic penalty; the grid search
//! evaluates raw points and skips constraint-violating ones.

use crate::engine::config::{GridSearchConfig, MinimiseConfig};
use crate::engine::constraints::LinearConstraints;
use crate::engine::error::EngineError;
use crate::engine::objective::Objective;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::{DMatrix, DVector};

/// The weight of the quadratic constraint penalty, in scaled space.
const PENALTY_WEIGHT: f64 = 1e6;

/// The result of a search or minimisation, in real parameter space.
#[derive(Debug, Clone)]
pub struct MinimiseOutcome {
    pub x: DVector<f64>,
    pub chi2: f64,
    pub iterations: usize,
    pub f_count: usize,
    pub g_count: usize,
    pub h_count: usize,
    pub warning: Option<String>,
}

/// The seam between the model layer and the numerical optimiser.
pub trait Minimiser {
    fn minimise(
        &self,
        objective: &mut dyn Objective,
        x0: DVector<f64>,
        reporter: &ProgressReporter,
    ) -> Result<MinimiseOutcome, EngineError>;
}

/// BFGS with a backtracking line search.
pub struct Bfgs {
    pub config: MinimiseConfig,
    /// The diagonal of the conditioning matrix S.
    pub scaling: DVector<f64>,
    /// Population constraints in scaled space, applied as a penalty.
    pub constraints: Option<LinearConstraints>,
}

impl Bfgs {
    fn penalty(&self, x_scaled: &DVector<f64>) -> f64 {
        match (&self.constraints, self.config.constraints) {
            (Some(c), true) => PENALTY_WEIGHT * c.violation(x_scaled),
            _ => 0.0,
        }
    }

    fn penalty_grad(&self, x_scaled: &DVector<f64>) -> DVector<f64> {
        match (&self.constraints, self.config.constraints) {
            (Some(c), true) => {
                // d/dx of sum(max(b - Ax, 0)^2) carries the -A from the residual.
                let residual = &c.b - &c.a * x_scaled;
                let active = residual.map(|r| r.max(0.0));
                -2.0 * PENALTY_WEIGHT * c.a.transpose() * active
            }
            _ => DVector::zeros(x_scaled.len()),
        }
    }
}

impl Minimiser for Bfgs {
    fn minimise(
        &self,
        objective: &mut dyn Objective,
        x0: DVector<f64>,
        reporter: &ProgressReporter,
    ) -> Result<MinimiseOutcome, EngineError> {
        let dims = x0.len();
        if dims == 0 {
            let chi2 = objective.chi2(&x0);
            return Ok(MinimiseOutcome {
                x: x0,
                chi2,
                iterations: 0,
                f_count: 1,
                g_count: 0,
                h_count: 0,
                warning: None,
            });
        }

        let s = &self.scaling;
        let unscale = |x: &DVector<f64>| x.component_mul(s);

        let mut f_count = 0usize;
        let mut g_count = 0usize;

        let mut x = x0.component_div(s);
        let mut f = {
            f_count += 1;
            objective.chi2(&unscale(&x)) + self.penalty(&x)
        };
        let mut g = {
            g_count += 1;
            objective.gradient(&unscale(&x)).component_mul(s) + self.penalty_grad(&x)
        };

        let mut h_inv = DMatrix::<f64>::identity(dims, dims);
        let mut iterations = 0;
        let mut warning = None;

        for _ in 0..self.config.max_iterations {
            if g.norm() < self.config.grad_tol {
                break;
            }

            let direction = -(&h_inv * &g);
            let slope = g.dot(&direction);
            let direction = if slope < 0.0 { direction } else { -g.clone() };
            let slope = g.dot(&direction).min(-f64::EPSILON);

            // Backtracking with the Armijo condition.
            let mut alpha = 1.0;
            let mut x_new = &x + alpha * &direction;
            let mut f_new = {
                f_count += 1;
                objective.chi2(&unscale(&x_new)) + self.penalty(&x_new)
            };
            let mut halvings = 0;
            while !(f_new.is_finite() && f_new <= f + 1e-4 * alpha * slope) && halvings < 60 {
                alpha *= 0.5;
                x_new = &x + alpha * &direction;
                f_new = {
                    f_count += 1;
                    objective.chi2(&unscale(&x_new)) + self.penalty(&x_new)
                };
                halvings += 1;
            }
            if halvings == 60 {
                warning = Some("The line search failed to find a descent step".to_string());
                break;
            }

            let g_new = {
                g_count += 1;
                objective.gradient(&unscale(&x_new)).component_mul(s) + self.penalty_grad(&x_new)
            };

            let step = &x_new - &x;
            let y = &g_new - &g;
            let sy = step.dot(&y);
            if sy > 1e-12 {
                let rho = 1.0 / sy;
                let identity = DMatrix::<f64>::identity(dims, dims);
                let left = &identity - rho * &step * y.transpose();
                let right = &identity - rho * &y * step.transpose();
                h_inv = &left * h_inv * &right + rho * &step * step.transpose();
            }

            let converged =
                (f - f_new).abs() <= self.config.func_tol * (f.abs() + f_new.abs() + 1e-30);
            x = x_new;
            f = f_new;
            g = g_new;
            iterations += 1;
            reporter.report(Progress::Iteration {
                iteration: iterations,
                chi2: f,
            });
            if converged {
                break;
            }
        }

        if iterations == self.config.max_iterations {
            warning = Some("Maximum number of iterations reached".to_string());
        }

        let x_real = unscale(&x);
        let chi2 = {
            f_count += 1;
            objective.chi2(&x_real)
        };
        reporter.report(Progress::MinimiseFinish { chi2 });
        Ok(MinimiseOutcome {
            x: x_real,
            chi2,
            iterations,
            f_count,
            g_count,
            h_count: 0,
            warning,
        })
    }
}

/// Exhaustive search over a regular grid between per-parameter bounds.
///
/// Points violating the constraints are skipped, never evaluated. The
/// constraints here are expected in real space (identity scaling).
pub fn grid_search(
    objective: &mut dyn Objective,
    lower: &[f64],
    upper: &[f64],
    config: &GridSearchConfig,
    constraints: Option<&LinearConstraints>,
    reporter: &ProgressReporter,
) -> Result<MinimiseOutcome, EngineError> {
    let dims = lower.len();
    if upper.len() != dims {
        return Err(EngineError::BoundCountMismatch {
            bounds: upper.len(),
            params: dims,
        });
    }
    if dims == 0 {
        let chi2 = objective.chi2(&DVector::zeros(0));
        return Ok(MinimiseOutcome {
            x: DVector::zeros(0),
            chi2,
            iterations: 1,
            f_count: 1,
            g_count: 0,
            h_count: 0,
            warning: None,
        });
    }

    let inc = config.increments;
    let total = (inc as u64).pow(dims as u32);
    reporter.report(Progress::GridStart { total_points: total });

    let steps: Vec<f64> = (0..dims)
        .map(|i| (upper[i] - lower[i]) / (inc - 1) as f64)
        .collect();

    let mut indices = vec![0usize; dims];
    let mut point = DVector::zeros(dims);
    let mut best: Option<(DVector<f64>, f64)> = None;
    let mut f_count = 0usize;

    loop {
        for i in 0..dims {
            point[i] = lower[i] + steps[i] * indices[i] as f64;
        }
        reporter.report(Progress::GridPoint);

        let feasible = match (constraints, config.constraints) {
            (Some(c), true) => c.satisfied(&point),
            _ => true,
        };
        if feasible {
            f_count += 1;
            let chi2 = objective.chi2(&point);
            if chi2.is_finite() && best.as_ref().is_none_or(|(_, b)| chi2 < *b) {
                best = Some((point.clone(), chi2));
            }
        }

        // Odometer advance.
        let mut dim = 0;
        loop {
            indices[dim] += 1;
            if indices[dim] < inc {
                break;
            }
            indices[dim] = 0;
            dim += 1;
            if dim == dims {
                let (x, chi2) = best.ok_or(EngineError::InfeasibleGrid)?;
                reporter.report(Progress::GridFinish { chi2 });
                return Ok(MinimiseOutcome {
                    x,
                    chi2,
                    iterations: total as usize,
                    f_count,
                    g_count: 0,
                    h_count: 0,
                    warning: None,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{GridSearchConfigBuilder, MinimiseConfigBuilder};

    struct Quadratic;
    impl Objective for Quadratic {
        fn chi2(&mut self, x: &DVector<f64>) -> f64 {
            (x[0] - 1.5).powi(2) + 10.0 * (x[1] + 0.5).powi(2)
        }
    }

    fn bfgs(dims: usize) -> Bfgs {
        Bfgs {
            config: MinimiseConfigBuilder::new()
                .max_iterations(200)
                .constraints(false)
                .build()
                .unwrap(),
            scaling: DVector::from_element(dims, 1.0),
            constraints: None,
        }
    }

    #[test]
    fn bfgs_minimises_a_quadratic() {
        let reporter = ProgressReporter::new();
        let outcome = bfgs(2)
            .minimise(&mut Quadratic, DVector::zeros(2), &reporter)
            .unwrap();
        assert!((outcome.x[0] - 1.5).abs() < 1e-6);
        assert!((outcome.x[1] + 0.5).abs() < 1e-6);
        assert!(outcome.chi2 < 1e-10);
        assert!(outcome.f_count > 0);
        assert!(outcome.warning.is_none());
    }

    #[test]
    fn bfgs_respects_a_penalised_constraint() {
        // One parameter, constrained to x >= 2 while the target sits at 1.5.
        let constraints = LinearConstraints {
            a: DMatrix::from_row_slice(1, 1, &[1.0]),
            b: DVector::from_vec(vec![2.0]),
        };
        struct OneD;
        impl Objective for OneD {
            fn chi2(&mut self, x: &DVector<f64>) -> f64 {
                (x[0] - 1.5).powi(2)
            }
        }
        let minimiser = Bfgs {
            config: MinimiseConfigBuilder::new().max_iterations(500).build().unwrap(),
            scaling: DVector::from_element(1, 1.0),
            constraints: Some(constraints),
        };
        let outcome = minimiser
            .minimise(&mut OneD, DVector::from_vec(vec![3.0]), &ProgressReporter::new())
            .unwrap();
        assert!(outcome.x[0] > 1.9);
    }

    #[test]
    fn penalty_pushes_an_infeasible_start_into_the_feasible_region() {
        // Start at x = 0 with the constraint x >= 2 violated; the penalty
        // gradient must point towards the feasible region, not away from it.
        let constraints = LinearConstraints {
            a: DMatrix::from_row_slice(1, 1, &[1.0]),
            b: DVector::from_vec(vec![2.0]),
        };
        struct OneD;
        impl Objective for OneD {
            fn chi2(&mut self, x: &DVector<f64>) -> f64 {
                (x[0] - 1.5).powi(2)
            }
        }
        let minimiser = Bfgs {
            config: MinimiseConfigBuilder::new().max_iterations(500).build().unwrap(),
            scaling: DVector::from_element(1, 1.0),
            constraints: Some(constraints),
        };
        let outcome = minimiser
            .minimise(&mut OneD, DVector::zeros(1), &ProgressReporter::new())
            .unwrap();
        assert!(outcome.iterations > 0);
        assert!(outcome.x[0] > 1.9);
        assert!(outcome.warning.is_none());
    }

    #[test]
    fn scaled_space_round_trips_to_the_same_minimum() {
        let mut minimiser = bfgs(2);
        minimiser.scaling = DVector::from_vec(vec![0.1, 100.0]);
        let outcome = minimiser
            .minimise(&mut Quadratic, DVector::zeros(2), &ProgressReporter::new())
            .unwrap();
        assert!((outcome.x[0] - 1.5).abs() < 1e-5);
        assert!((outcome.x[1] + 0.5).abs() < 1e-5);
    }

    #[test]
    fn grid_search_finds_the_best_cell() {
        struct OffGrid;
        impl Objective for OffGrid {
            fn chi2(&mut self, x: &DVector<f64>) -> f64 {
                (x[0] - 1.2).powi(2) + 10.0 * (x[1] + 0.4).powi(2)
            }
        }
        let config = GridSearchConfigBuilder::new().increments(7).build().unwrap();
        let outcome = grid_search(
            &mut OffGrid,
            &[-3.0, -3.0],
            &[3.0, 3.0],
            &config,
            None,
            &ProgressReporter::new(),
        )
        .unwrap();
        // The 7-point grid over [-3, 3] steps by 1, so (1, 0) is the closest cell.
        assert_eq!(outcome.x[0], 1.0);
        assert_eq!(outcome.x[1], 0.0);
        assert_eq!(outcome.iterations, 49);
    }

    #[test]
    fn grid_search_skips_infeasible_points() {
        let constraints = LinearConstraints {
            a: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            b: DVector::from_vec(vec![2.0]),
        };
        let config = GridSearchConfigBuilder::new().increments(7).build().unwrap();
        let outcome = grid_search(
            &mut Quadratic,
            &[-3.0, -3.0],
            &[3.0, 3.0],
            &config,
            Some(&constraints),
            &ProgressReporter::new(),
        )
        .unwrap();
        // x0 >= 2 excludes the unconstrained optimum at 1.5.
        assert_eq!(outcome.x[0], 2.0);
        assert!(outcome.f_count < 49);
    }

    #[test]
    fn fully_infeasible_grid_is_an_error() {
        let constraints = LinearConstraints {
            a: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            b: DVector::from_vec(vec![100.0]),
        };
        let config = GridSearchConfigBuilder::new().increments(3).build().unwrap();
        let result = grid_search(
            &mut Quadratic,
            &[-3.0, -3.0],
            &[3.0, 3.0],
            &config,
            Some(&constraints),
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::InfeasibleGrid)));
    }

    #[test]
    fn bound_count_mismatch_is_an_error() {
        let config = GridSearchConfigBuilder::new().increments(3).build().unwrap();
        let result = grid_search(
            &mut Quadratic,
            &[-1.0, -1.0],
            &[1.0],
            &config,
            None,
            &ProgressReporter::new(),
        );
        assert!(matches!(
            result,
            Err(EngineError::BoundCountMismatch { bounds: 1, params: 2 })
        ));
    }
}
