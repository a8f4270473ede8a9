//! Packing and unpacking of the flat optimisation parameter vector.
//!
//! The layout is a fixed contract with the minimiser and must be reproduced
//! exactly by both directions:
//!
//! - `2-domain`: populations p_0..p_(N-2), then one zyz Euler triple per
//!   state.
//! - `population`: one 5-parameter block per optimised tensor in registry
//!   order, then populations p_0..p_(N-2), then the paramagnetic centre xyz
//!   when it is being optimised.
//! - `fixed`: the tensor blocks, then the optional centre.
//!
//! Disassembly must be called under the same model configuration that
//! produced the vector; this is a documented caller contract, not a runtime
//! check. `None` values assemble as 0.0.

use crate::core::models::context::{AnalysisContext, ModelType};
use crate::core::models::tensor::AlignTensor;
use crate::engine::error::EngineError;
use nalgebra::{DVector, Vector3};

/// Whether a tensor contributes a block to the parameter vector.
///
/// Fixed tensors are frozen out, as are tensors whose alignment has no RDC
/// or PCS data to drive them.
pub fn opt_uses_tensor(context: &AnalysisContext, tensor: &AlignTensor) -> bool {
    if tensor.fixed {
        return false;
    }
    let id = tensor.align_id.as_deref().unwrap_or(&tensor.name);
    context.rdc_ids.iter().any(|i| i == id) || context.pcs_ids.iter().any(|i| i == id)
}

fn optimised_tensor_indices(context: &AnalysisContext) -> Vec<usize> {
    let Some(registry) = context.tensors.as_ref() else {
        return Vec::new();
    };
    registry
        .iter()
        .enumerate()
        .filter(|(_, t)| opt_uses_tensor(context, t))
        .map(|(i, _)| i)
        .collect()
}

fn model_and_states(context: &AnalysisContext) -> Result<(ModelType, usize), EngineError> {
    let model = context.model.ok_or(EngineError::ModelUnset)?;
    let n = match model {
        ModelType::Fixed => context.n_states.unwrap_or(1),
        _ => context.n_states.ok_or(EngineError::StatesUnset)?,
    };
    Ok((model, n))
}

/// The length of the parameter vector for the current model configuration.
pub fn param_count(context: &AnalysisContext) -> Result<usize, EngineError> {
    let (model, n) = model_and_states(context)?;
    Ok(match model {
        ModelType::TwoDomain => (n - 1) + 3 * n,
        ModelType::Population => {
            let mut count = 5 * optimised_tensor_indices(context).len() + (n - 1);
            if !context.paramag_centre_fixed {
                count += 3;
            }
            count
        }
        ModelType::Fixed => {
            let mut count = 5 * optimised_tensor_indices(context).len();
            if !context.paramag_centre_fixed {
                count += 3;
            }
            count
        }
    })
}

/// Packs the current model state into a flat vector.
pub fn assemble(context: &AnalysisContext) -> Result<DVector<f64>, EngineError> {
    let (model, n) = model_and_states(context)?;
    let mut vector = Vec::with_capacity(param_count(context)?);

    // The 2-domain vector carries no tensor blocks: the full alignment
    // tensors are inputs held in the measured reduction pairs, and only the
    // populations and per-state rotations are optimised.
    if model == ModelType::TwoDomain {
        for c in 0..n - 1 {
            vector.push(
                context
                    .probs
                    .as_ref()
                    .and_then(|p| p.get(c))
                    .copied()
                    .unwrap_or(0.0),
            );
        }
        for c in 0..n {
            let (alpha, beta, gamma) = context.state_euler.get(c).copied().unwrap_or_default();
            vector.extend([alpha, beta, gamma]);
        }
        return Ok(DVector::from_vec(vector));
    }

    let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;
    for index in optimised_tensor_indices(context) {
        let params = registry.by_index(index)?.params().copied().unwrap_or([0.0; 5]);
        vector.extend(params);
    }

    if model == ModelType::Population {
        for c in 0..n - 1 {
            vector.push(
                context
                    .probs
                    .as_ref()
                    .and_then(|p| p.get(c))
                    .copied()
                    .unwrap_or(0.0),
            );
        }
    }

    if !context.paramag_centre_fixed {
        let centre = context.paramag_centre.unwrap_or_else(Vector3::zeros);
        vector.extend([centre[0], centre[1], centre[2]]);
    }

    Ok(DVector::from_vec(vector))
}

/// Unpacks a flat vector back into the model state.
///
/// With `sim_index` set the values land in the Monte Carlo replicate slots
/// instead of the primary ones.
pub fn disassemble(
    context: &mut AnalysisContext,
    vector: &[f64],
    sim_index: Option<usize>,
) -> Result<(), EngineError> {
    let (model, n) = model_and_states(context)?;
    let expected = param_count(context)?;
    if vector.len() != expected {
        return Err(EngineError::Internal(format!(
            "parameter vector length {} does not match the model layout length {expected}",
            vector.len()
        )));
    }

    if model == ModelType::TwoDomain {
        let mut probs: Vec<f64> = vector[..n - 1].to_vec();
        probs.push(1.0 - probs.iter().sum::<f64>());
        let mut euler = Vec::with_capacity(n);
        for c in 0..n {
            let base = (n - 1) + 3 * c;
            euler.push((vector[base], vector[base + 1], vector[base + 2]));
        }
        match sim_index {
            None => {
                context.probs = Some(probs);
                context.state_euler = euler;
            }
            Some(i) => {
                grow(&mut context.probs_sims, i + 1);
                grow(&mut context.state_euler_sims, i + 1);
                context.probs_sims[i] = probs;
                context.state_euler_sims[i] = euler;
            }
        }
        return Ok(());
    }

    let indices = optimised_tensor_indices(context);
    let mut offset = 0;
    for index in indices {
        let mut params = [0.0; 5];
        params.copy_from_slice(&vector[offset..offset + 5]);
        offset += 5;
        let registry = context.tensors.as_mut().ok_or(EngineError::NoTensorData)?;
        let name = registry.by_index(index)?.name.clone();
        let tensor = registry.get_mut(&name)?;
        match sim_index {
            None => tensor.set_params(params),
            Some(i) => tensor.set_sim_params(i, params)?,
        }
    }

    if model == ModelType::Population {
        let mut probs: Vec<f64> = vector[offset..offset + n - 1].to_vec();
        offset += n - 1;
        probs.push(1.0 - probs.iter().sum::<f64>());
        match sim_index {
            None => context.probs = Some(probs),
            Some(i) => {
                grow(&mut context.probs_sims, i + 1);
                context.probs_sims[i] = probs;
            }
        }
    }

    if !context.paramag_centre_fixed {
        let centre = Vector3::new(vector[offset], vector[offset + 1], vector[offset + 2]);
        match sim_index {
            None => context.paramag_centre = Some(centre),
            Some(i) => {
                if context.paramag_centre_sims.len() < i + 1 {
                    context.paramag_centre_sims.resize(i + 1, Vector3::zeros());
                }
                context.paramag_centre_sims[i] = centre;
            }
        }
    }

    Ok(())
}

fn grow<T: Default + Clone>(v: &mut Vec<T>, len: usize) {
    if v.len() < len {
        v.resize(len, T::default());
    }
}

/// The diagonal of the conditioning matrix: 1.0 for tensor parameters and
/// Euler angles, 0.1 for populations, 100 for the paramagnetic centre.
/// Identity when scaling is disabled.
pub fn scaling_diagonal(context: &AnalysisContext, scaling: bool) -> Result<DVector<f64>, EngineError> {
    let count = param_count(context)?;
    if !scaling {
        return Ok(DVector::from_element(count, 1.0));
    }

    let (model, n) = model_and_states(context)?;
    let mut diag = Vec::with_capacity(count);
    match model {
        ModelType::TwoDomain => {
            diag.extend(std::iter::repeat_n(0.1, n - 1));
            diag.extend(std::iter::repeat_n(1.0, 3 * n));
        }
        ModelType::Population | ModelType::Fixed => {
            diag.extend(std::iter::repeat_n(
                1.0,
                5 * optimised_tensor_indices(context).len(),
            ));
            if model == ModelType::Population {
                diag.extend(std::iter::repeat_n(0.1, n - 1));
            }
            if !context.paramag_centre_fixed {
                diag.extend(std::iter::repeat_n(100.0, 3));
            }
        }
    }
    Ok(DVector::from_vec(diag))
}
