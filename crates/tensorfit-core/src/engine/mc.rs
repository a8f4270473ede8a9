//! Monte Carlo simulation replicates for parameter error estimation.
//!
//! The cycle is: `setup` fixes the replicate count and sizes every replicate
//! slot, `create_data` draws synthetic measurements as Gaussian noise around
//! the back-calculated values with the measured errors, each replicate is
//! then fitted by the driver, and `error_analysis` turns the spread of the
//! replicate fits into parameter error estimates.

use crate::core::models::context::{AnalysisContext, OptStats};
use crate::engine::error::EngineError;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::warn;

/// The sample standard deviation, with the n-1 denominator.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (ss / (n - 1.0)).sqrt()
}

/// Fixes the replicate count and sizes all replicate storage.
///
/// Fails if a tensor already carries replicate data from an earlier setup.
pub fn setup(context: &mut AnalysisContext, replicates: usize) -> Result<(), EngineError> {
    if let Some(registry) = context.tensors.as_mut() {
        for tensor in registry.iter_mut() {
            tensor.set_sim_count(replicates)?;
        }
    }
    for pair in &mut context.pairs {
        for datum in pair.rdc.values_mut() {
            datum.sims = vec![None; replicates];
        }
    }
    context.sim_number = Some(replicates);
    context.sim_stats = vec![OptStats::default(); replicates];
    Ok(())
}

/// Draws the synthetic replicate measurements.
///
/// Each datum with both a back-calculated value and an error gets one
/// Gaussian draw per replicate, centred on the back-calculated value with
/// the measured error as the width. Data without a back-calculated value
/// keep empty replicate slots and are skipped with a warning.
pub fn create_data<R: Rng + ?Sized>(
    context: &mut AnalysisContext,
    rng: &mut R,
) -> Result<(), EngineError> {
    let replicates = context.sim_number.ok_or(EngineError::SimCountUnset)?;

    for pair in &mut context.pairs {
        for (align_id, datum) in pair.rdc.iter_mut() {
            let (Some(back_calc), Some(error)) = (datum.back_calc, datum.error) else {
                warn!(
                    align_id = %align_id,
                    spin_id1 = %pair.spin_id1,
                    spin_id2 = %pair.spin_id2,
                    "No back-calculated value or error, leaving the replicates empty"
                );
                continue;
            };
            let normal = match Normal::new(back_calc, error) {
                Ok(normal) => normal,
                Err(_) => {
                    warn!(
                        align_id = %align_id,
                        error,
                        "The measurement error cannot parameterise a Gaussian, skipping"
                    );
                    continue;
                }
            };
            datum.sims = (0..replicates).map(|_| Some(normal.sample(rng))).collect();
        }
    }
    Ok(())
}

/// Converts the replicate fit spread into parameter errors.
///
/// Tensor parameter errors are the per-component standard deviations over
/// the replicates, population errors likewise.
pub fn error_analysis(context: &mut AnalysisContext) -> Result<(), EngineError> {
    let replicates = context.sim_number.ok_or(EngineError::SimCountUnset)?;

    if let Some(registry) = context.tensors.as_mut() {
        for tensor in registry.iter_mut() {
            if tensor.sim_count().is_none() {
                continue;
            }
            let mut per_param: [Vec<f64>; 5] = Default::default();
            for i in 0..replicates {
                if let Some(params) = tensor.sim_params(i)? {
                    for (m, value) in params.iter().enumerate() {
                        per_param[m].push(*value);
                    }
                }
            }
            if per_param[0].is_empty() {
                continue;
            }
            let mut errors = [0.0; 5];
            for (m, values) in per_param.iter().enumerate() {
                errors[m] = std_dev(values);
            }
            tensor.set_errors(errors);
        }
    }

    if !context.probs_sims.is_empty() {
        let n = context.probs_sims[0].len();
        let mut errors = Vec::with_capacity(n);
        for c in 0..n {
            let values: Vec<f64> = context
                .probs_sims
                .iter()
                .filter(|p| p.len() == n)
                .map(|p| p[c])
                .collect();
            errors.push(std_dev(&values));
        }
        context.probs_errors = Some(errors);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::spin::{InteratomicPair, RdcDatum};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn context() -> AnalysisContext {
        let mut context = AnalysisContext::new();
        context.tensors_mut().add("Dy").set_params([1e-4; 5]);
        context.add_rdc_id("Dy");
        let mut pair = InteratomicPair::new(":1@N", ":1@H");
        let mut datum = RdcDatum::new(Some(5.0), Some(0.5));
        datum.back_calc = Some(4.8);
        pair.rdc.insert("Dy".to_string(), datum);
        context.pairs.push(pair);
        context
    }

    #[test]
    fn setup_sizes_every_replicate_slot() {
        let mut context = context();
        setup(&mut context, 10).unwrap();
        assert_eq!(context.sim_number, Some(10));
        assert_eq!(context.sim_stats.len(), 10);
        assert_eq!(context.pairs[0].rdc["Dy"].sims.len(), 10);
        let tensor = context.tensors.as_ref().unwrap().get("Dy").unwrap();
        assert_eq!(tensor.sim_count(), Some(10));
    }

    #[test]
    fn repeated_setup_is_rejected() {
        let mut context = context();
        setup(&mut context, 5).unwrap();
        assert!(setup(&mut context, 5).is_err());
    }

    #[test]
    fn create_data_draws_around_the_back_calculated_value() {
        let mut context = context();
        setup(&mut context, 500).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        create_data(&mut context, &mut rng).unwrap();

        let sims: Vec<f64> = context.pairs[0].rdc["Dy"]
            .sims
            .iter()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(sims.len(), 500);
        let mean = sims.iter().sum::<f64>() / sims.len() as f64;
        assert!((mean - 4.8).abs() < 0.1);
        let sd = std_dev(&sims);
        assert!((sd - 0.5).abs() < 0.1);
    }

    #[test]
    fn create_data_without_setup_is_an_error() {
        let mut context = context();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            create_data(&mut context, &mut rng),
            Err(EngineError::SimCountUnset)
        ));
    }

    #[test]
    fn error_analysis_takes_the_replicate_spread() {
        let mut context = context();
        setup(&mut context, 3).unwrap();
        {
            let tensor = context.tensors_mut().get_mut("Dy").unwrap();
            tensor.set_sim_params(0, [1e-4, 0.0, 0.0, 0.0, 0.0]).unwrap();
            tensor.set_sim_params(1, [2e-4, 0.0, 0.0, 0.0, 0.0]).unwrap();
            tensor.set_sim_params(2, [3e-4, 0.0, 0.0, 0.0, 0.0]).unwrap();
        }
        context.probs_sims = vec![vec![0.2, 0.8], vec![0.4, 0.6], vec![0.3, 0.7]];
        error_analysis(&mut context).unwrap();

        let errors = *context
            .tensors
            .as_ref()
            .unwrap()
            .get("Dy")
            .unwrap()
            .errors()
            .unwrap();
        assert!((errors[0] - 1e-4).abs() < 1e-9);
        assert_eq!(errors[1], 0.0);
        let prob_errors = context.probs_errors.as_ref().unwrap();
        assert!((prob_errors[0] - 0.1).abs() < 1e-9);
    }
}
