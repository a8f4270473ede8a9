//! The N-state fit driver.
//!
//! The optimisation cycle is: select the model and state count, grid search
//! for a starting point, quasi-Newton minimisation, then optionally Monte
//! Carlo replicates for error estimates. All state lives on the
//! [`AnalysisContext`]; every step here reads and writes it explicitly.

use crate::core::math::basis::matrix_form;
use crate::core::math::euler::{fold_zyz, fold_zyz_relative};
use crate::core::math::rdc::complete_weights;
use crate::core::models::context::{AnalysisContext, ModelType, OptStats};
use crate::engine::config::{GridSearchConfig, MinimiseConfig};
use crate::engine::constraints::population_constraints;
use crate::engine::data::{self, back_calc_row};
use crate::engine::error::EngineError;
use crate::engine::minimise::{self, Bfgs, Minimiser, MinimiseOutcome};
use crate::engine::objective::{Objective, RdcObjective, ReductionPair, TwoDomainObjective};
use crate::engine::params;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::workflows::diagnostics;
use rand::Rng;
use std::f64::consts::PI;
use tracing::{info, instrument, warn};

/// Selects the N-state model type for the analysis.
pub fn select_model(context: &mut AnalysisContext, model: ModelType) {
    info!(model = %model, "Selecting the N-state model");
    context.model = Some(model);
}

/// Sets the number of states N.
pub fn number_of_states(context: &mut AnalysisContext, n: usize) -> Result<(), EngineError> {
    if n == 0 {
        return Err(EngineError::Internal(
            "the state count must be at least 1".to_string(),
        ));
    }
    context.n_states = Some(n);
    Ok(())
}

/// Sets the reference domain of the 2-domain model.
///
/// The domain label must belong to at least one loaded tensor.
pub fn set_ref_domain(context: &mut AnalysisContext, domain: &str) -> Result<(), EngineError> {
    if context.model != Some(ModelType::TwoDomain) {
        return Err(EngineError::ModelUnset);
    }
    let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;
    if !registry
        .iter()
        .any(|t| t.domain.as_deref() == Some(domain))
    {
        return Err(EngineError::Internal(format!(
            "no tensor belongs to the domain '{domain}'"
        )));
    }
    context.ref_domain = Some(domain.to_string());
    Ok(())
}

/// The default grid search bounds for the current model layout.
///
/// Populations span [0, 1], alpha and gamma [0, 2 pi], beta [0, pi], tensor
/// components +/- 1e-3, and the paramagnetic centre +/- 100 Angstrom.
pub fn default_grid_bounds(
    context: &AnalysisContext,
) -> Result<(Vec<f64>, Vec<f64>), EngineError> {
    let model = context.model.ok_or(EngineError::ModelUnset)?;
    let count = params::param_count(context)?;
    let mut lower = Vec::with_capacity(count);
    let mut upper = Vec::with_capacity(count);

    match model {
        ModelType::TwoDomain => {
            let n = context.n_states.ok_or(EngineError::StatesUnset)?;
            for _ in 0..n - 1 {
                lower.push(0.0);
                upper.push(1.0);
            }
            for _ in 0..n {
                lower.extend([0.0, 0.0, 0.0]);
                upper.extend([2.0 * PI, PI, 2.0 * PI]);
            }
        }
        ModelType::Population | ModelType::Fixed => {
            let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;
            let tensor_count = registry
                .iter()
                .filter(|t| params::opt_uses_tensor(context, t))
                .count();
            for _ in 0..5 * tensor_count {
                lower.push(-1e-3);
                upper.push(1e-3);
            }
            if model == ModelType::Population {
                let n = context.n_states.ok_or(EngineError::StatesUnset)?;
                for _ in 0..n - 1 {
                    lower.push(0.0);
                    upper.push(1.0);
                }
            }
            if !context.paramag_centre_fixed {
                for _ in 0..3 {
                    lower.push(-100.0);
                    upper.push(100.0);
                }
            }
        }
    }
    Ok((lower, upper))
}

fn build_objective(
    context: &AnalysisContext,
    sim_index: Option<usize>,
) -> Result<Box<dyn Objective>, EngineError> {
    let model = context.model.ok_or(EngineError::ModelUnset)?;
    if model != ModelType::TwoDomain {
        let rdc_data = data::assemble(context, sim_index)?;
        return Ok(Box::new(RdcObjective::new(context, rdc_data)?));
    }

    let n = context.n_states.ok_or(EngineError::StatesUnset)?;
    let ref_domain = context
        .ref_domain
        .as_deref()
        .ok_or(EngineError::RefDomainUnset)?;
    let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;

    let mut pairs = Vec::new();
    for &(full_index, reduced_index) in registry.reduction_pairs() {
        let full = registry.by_index(full_index)?;
        let reduced = registry.by_index(reduced_index)?;
        pairs.push(ReductionPair {
            full_params: *full.require_params()?,
            reduced_params: *reduced.require_params()?,
            reduced_errors: reduced.errors().copied().unwrap_or([1.0; 5]),
            full_in_ref: full.domain.as_deref() == Some(ref_domain),
        });
    }
    if pairs.is_empty() {
        return Err(EngineError::NoTensorData);
    }
    Ok(Box::new(TwoDomainObjective::new(pairs, n)))
}

fn store_stats(context: &mut AnalysisContext, sim_index: Option<usize>, outcome: &MinimiseOutcome) {
    let stats = OptStats {
        chi2: Some(outcome.chi2),
        iterations: outcome.iterations,
        f_count: outcome.f_count,
        g_count: outcome.g_count,
        h_count: outcome.h_count,
        warning: outcome.warning.clone(),
    };
    match sim_index {
        None => context.stats = stats,
        Some(i) => {
            if context.sim_stats.len() <= i {
                context.sim_stats.resize(i + 1, OptStats::default());
            }
            context.sim_stats[i] = stats;
        }
    }
}

/// Back-calculates all RDC values from the current tensors and populations
/// and stores them on the pair containers.
pub fn back_calc(context: &mut AnalysisContext) -> Result<(), EngineError> {
    let rdc_data = data::assemble(context, None)?;
    let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;

    let weights = match (context.model, context.probs.as_ref()) {
        (Some(ModelType::Population), Some(probs)) => Some(probs.clone()),
        _ => None,
    };

    let mut stored = Vec::new();
    for align in &rdc_data {
        let tensor = registry.by_index(align.tensor_index)?;
        let a = matrix_form(tensor.require_params()?);
        let values: Vec<(usize, f64)> = align
            .rows
            .iter()
            .map(|row| (row.pair_index, back_calc_row(row, &a, weights.as_deref())))
            .collect();
        stored.push((align.align_id.clone(), values));
    }
    for (align_id, values) in stored {
        data::store_back_calc(context, &align_id, &values);
    }
    Ok(())
}

/// Runs the grid search and stores the best point on the context.
///
/// For the fixed model with several optimised tensors and a fixed
/// paramagnetic centre, the search decomposes into independent per-tensor
/// sub-grids; the per-tensor objective contributions are independent there,
/// so the result matches the joint search.
#[instrument(skip_all, name = "grid_search")]
pub fn grid_search(
    context: &mut AnalysisContext,
    config: &GridSearchConfig,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    let model = context.model.ok_or(EngineError::ModelUnset)?;

    let optimised: Vec<String> = match context.tensors.as_ref() {
        Some(registry) => registry
            .iter()
            .filter(|t| params::opt_uses_tensor(context, t))
            .map(|t| t.name.clone())
            .collect(),
        None => Vec::new(),
    };

    let decompose = model == ModelType::Fixed
        && optimised.len() > 1
        && context.paramag_centre_fixed
        && config.lower.is_none()
        && config.upper.is_none();
    if decompose {
        info!(
            tensors = optimised.len(),
            "Decomposing the grid search into per-tensor sub-grids"
        );
        return sub_grid_search(context, &optimised, config, reporter);
    }

    let (mut lower, mut upper) = default_grid_bounds(context)?;
    if let Some(bounds) = &config.lower {
        if bounds.len() != lower.len() {
            return Err(EngineError::BoundCountMismatch {
                bounds: bounds.len(),
                params: lower.len(),
            });
        }
        lower = bounds.clone();
    }
    if let Some(bounds) = &config.upper {
        if bounds.len() != upper.len() {
            return Err(EngineError::BoundCountMismatch {
                bounds: bounds.len(),
                params: upper.len(),
            });
        }
        upper = bounds.clone();
    }

    // Grid points are raw parameter values, so the constraint rows are
    // built with identity scaling.
    let identity = params::scaling_diagonal(context, false)?;
    let constraints = if config.constraints {
        population_constraints(context, &identity)?
    } else {
        None
    };

    let mut objective = build_objective(context, None)?;
    let outcome = minimise::grid_search(
        objective.as_mut(),
        &lower,
        &upper,
        config,
        constraints.as_ref(),
        reporter,
    )?;
    info!(chi2 = outcome.chi2, "Grid search complete");
    params::disassemble(context, outcome.x.as_slice(), None)?;
    store_stats(context, None, &outcome);
    Ok(())
}

fn sub_grid_search(
    context: &mut AnalysisContext,
    optimised: &[String],
    config: &GridSearchConfig,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    for name in optimised {
        context.tensors_mut().get_mut(name)?.set_fixed(true);
    }

    let result = (|| {
        let mut f_count = 0;
        let mut points = 0;
        for name in optimised {
            context.tensors_mut().get_mut(name)?.set_fixed(false);

            let (lower, upper) = default_grid_bounds(context)?;
            let mut objective = build_objective(context, None)?;
            let outcome = minimise::grid_search(
                objective.as_mut(),
                &lower,
                &upper,
                config,
                None,
                reporter,
            )?;
            params::disassemble(context, outcome.x.as_slice(), None)?;
            f_count += outcome.f_count;
            points += outcome.iterations;

            context.tensors_mut().get_mut(name)?.set_fixed(true);
        }
        Ok::<(usize, usize), EngineError>((f_count, points))
    })();

    for name in optimised {
        context.tensors_mut().get_mut(name)?.set_fixed(false);
    }
    let (f_count, points) = result?;

    // The joint chi2 of the combined per-tensor optima.
    let mut objective = build_objective(context, None)?;
    let x = params::assemble(context)?;
    let chi2 = objective.chi2(&x);
    info!(chi2, "Sub-grid search complete");
    store_stats(
        context,
        None,
        &MinimiseOutcome {
            x,
            chi2,
            iterations: points,
            f_count: f_count + 1,
            g_count: 0,
            h_count: 0,
            warning: None,
        },
    );
    Ok(())
}

/// Runs the quasi-Newton minimisation and stores the result.
///
/// Constraints are forced on for the population model and forced off for
/// the fixed model, warning when this overrides the caller. A non-finite
/// chi-squared after optimisation is fatal. For the primary fit the RDC
/// back-calculated values and Q-factors are refreshed afterwards.
#[instrument(skip_all, name = "minimise", fields(sim = ?sim_index))]
pub fn minimise(
    context: &mut AnalysisContext,
    config: &MinimiseConfig,
    sim_index: Option<usize>,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    let model = context.model.ok_or(EngineError::ModelUnset)?;

    let mut config = config.clone();
    match model {
        ModelType::Fixed if config.constraints => {
            warn!("Constraints are meaningless for the fixed model, turning them off");
            config.constraints = false;
        }
        ModelType::Population if !config.constraints => {
            warn!("The population model requires constraints, turning them on");
            config.constraints = true;
        }
        _ => {}
    }

    let scaling = params::scaling_diagonal(context, config.scaling)?;
    let constraints = if config.constraints {
        population_constraints(context, &scaling)?
    } else {
        None
    };

    let mut objective = build_objective(context, sim_index)?;
    let x0 = params::assemble(context)?;
    let minimiser = Bfgs {
        config,
        scaling,
        constraints,
    };
    let outcome = minimiser.minimise(objective.as_mut(), x0, reporter)?;
    if !outcome.chi2.is_finite() {
        return Err(EngineError::NonFiniteChi2 {
            chi2: outcome.chi2,
        });
    }

    params::disassemble(context, outcome.x.as_slice(), sim_index)?;
    store_stats(context, sim_index, &outcome);
    info!(chi2 = outcome.chi2, iterations = outcome.iterations, "Minimisation complete");

    if sim_index.is_none() && model != ModelType::TwoDomain {
        back_calc(context)?;
        diagnostics::q_factors(context)?;
    }
    Ok(())
}

/// The full Monte Carlo cycle: setup, synthetic data creation, one fit per
/// replicate, and the final error analysis.
#[instrument(skip_all, name = "monte_carlo")]
pub fn monte_carlo<R: Rng + ?Sized>(
    context: &mut AnalysisContext,
    replicates: usize,
    config: &MinimiseConfig,
    rng: &mut R,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    crate::engine::mc::setup(context, replicates)?;
    crate::engine::mc::create_data(context, rng)?;

    reporter.report(Progress::SimulationStart {
        replicates: replicates as u64,
    });
    for i in 0..replicates {
        minimise(context, config, Some(i), reporter)?;
        reporter.report(Progress::SimulationStep);
    }
    reporter.report(Progress::SimulationFinish);

    crate::engine::mc::error_analysis(context)
}

/// Folds the 2-domain state rotations into canonical angle ranges.
///
/// The primary angles fold into alpha, gamma in [0, 2 pi) and beta in
/// [0, pi); replicate angles fold relative to the primary values so the
/// error analysis sees a single cluster.
pub fn fold_angles(context: &mut AnalysisContext) {
    for angles in &mut context.state_euler {
        *angles = fold_zyz(angles.0, angles.1, angles.2);
    }
    let centres = context.state_euler.clone();
    for sims in &mut context.state_euler_sims {
        for (c, sim) in sims.iter_mut().enumerate() {
            if let Some(centre) = centres.get(c) {
                *sim = fold_zyz_relative(*sim, *centre);
            }
        }
    }
}

/// The population weights completed to N states, for callers that need the
/// implied final state explicitly.
pub fn full_populations(context: &AnalysisContext) -> Option<Vec<f64>> {
    let n = context.n_states?;
    let probs = context.probs.as_ref()?;
    if probs.len() == n {
        Some(probs.clone())
    } else {
        Some(complete_weights(Some(probs), n))
    }
}
