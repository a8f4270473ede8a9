//! Assembly of the per-alignment RDC arrays consumed by the objective.
//!
//! The data model is pair-oriented; the objective wants flat per-alignment
//! arrays of measured values, errors, dipolar constants and bond vectors.
//! Pseudo-atoms are expanded here into one component per member atom, to be
//! arithmetically averaged during back-calculation.

use crate::core::constants::{dipolar_constant, gyromagnetic_ratio};
use crate::core::math::rdc::{ave_rdc_tensor, ave_rdc_tensor_grad};
use crate::core::models::context::AnalysisContext;
use crate::core::models::spin::{InteratomicPair, RdcDataType, Spin};
use crate::engine::error::EngineError;
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;
use tracing::warn;

/// One physical atom pair contributing to an RDC. A plain pair has exactly
/// one component; a pseudo-atom pair has one per member atom.
#[derive(Debug, Clone)]
pub struct RdcComponent {
    /// The dipolar constant dj = 3/(2 pi) d', in Hz.
    pub dj: f64,
    /// Unit bond vectors, one per ensemble structure.
    pub vectors: Vec<Vector3<f64>>,
}

/// One measured RDC, flattened for the objective.
#[derive(Debug, Clone)]
pub struct RdcRow {
    pub pair_index: usize,
    /// The measured value in the stored representation (T data includes J).
    pub value: f64,
    pub error: f64,
    pub weight: f64,
    pub absolute: bool,
    pub t_type: bool,
    pub j_coupling: f64,
    pub components: Vec<RdcComponent>,
}

/// All RDC rows for one alignment, bound to its registry tensor.
#[derive(Debug, Clone)]
pub struct AlignData {
    pub align_id: String,
    /// Index of the matching tensor in the registry.
    pub tensor_index: usize,
    pub fixed: bool,
    pub rows: Vec<RdcRow>,
}

fn pair_dj(pair: &InteratomicPair, spin1: &Spin, spin2: &Spin) -> Result<Option<f64>, EngineError> {
    let (Some(iso1), Some(iso2)) = (spin1.isotope.as_deref(), spin2.isotope.as_deref()) else {
        warn!(
            spin_id1 = %pair.spin_id1,
            spin_id2 = %pair.spin_id2,
            "Skipping a pair with an unset isotope type"
        );
        return Ok(None);
    };
    let Some(r) = pair.r else {
        warn!(
            spin_id1 = %pair.spin_id1,
            spin_id2 = %pair.spin_id2,
            "Skipping a pair with no internuclear distance"
        );
        return Ok(None);
    };
    let g1 = gyromagnetic_ratio(iso1)?;
    let g2 = gyromagnetic_ratio(iso2)?;
    Ok(Some(3.0 / (2.0 * PI) * dipolar_constant(g1, g2, r)))
}

/// Expands one pair into its physical components.
///
/// Both spins being pseudo-atoms is not supported and the pair is skipped.
/// For a pseudo-atom, each member atom must itself have a pair container
/// against the partner spin carrying vectors and a distance.
fn components(
    context: &AnalysisContext,
    pair: &InteratomicPair,
) -> Result<Option<Vec<RdcComponent>>, EngineError> {
    let (Some(spin1), Some(spin2)) = (context.spin(&pair.spin_id1), context.spin(&pair.spin_id2))
    else {
        warn!(
            spin_id1 = %pair.spin_id1,
            spin_id2 = %pair.spin_id2,
            "Skipping a pair with an unresolved spin"
        );
        return Ok(None);
    };

    if spin1.is_pseudo() && spin2.is_pseudo() {
        warn!(
            spin_id1 = %pair.spin_id1,
            spin_id2 = %pair.spin_id2,
            "Skipping a pair between two pseudo-atoms"
        );
        return Ok(None);
    }

    // The pseudo-atom case: one component per member atom.
    if spin1.is_pseudo() || spin2.is_pseudo() {
        let (pseudo, partner) = if spin1.is_pseudo() {
            (spin1, spin2)
        } else {
            (spin2, spin1)
        };
        let member_ids = pseudo.members.as_deref().unwrap_or_default();

        let mut parts = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            let Some(member_pair) = context.pair(member_id, &partner.id) else {
                warn!(
                    member = %member_id,
                    partner = %partner.id,
                    "Skipping a pseudo-atom pair with a member lacking a pair container"
                );
                return Ok(None);
            };
            let Some(member_spin) = context.spin(member_id) else {
                warn!(member = %member_id, "Skipping a pseudo-atom pair with an unresolved member");
                return Ok(None);
            };
            let Some(vectors) = member_pair.vectors.clone() else {
                warn!(member = %member_id, "Skipping a pseudo-atom pair with a member missing vectors");
                return Ok(None);
            };
            let Some(dj) = pair_dj(member_pair, member_spin, partner)? else {
                return Ok(None);
            };
            parts.push(RdcComponent { dj, vectors });
        }
        if parts.is_empty() {
            warn!(
                spin_id1 = %pair.spin_id1,
                spin_id2 = %pair.spin_id2,
                "Skipping a pseudo-atom pair with no members"
            );
            return Ok(None);
        }
        return Ok(Some(parts));
    }

    // The plain two-atom case.
    let Some(vectors) = pair.vectors.clone() else {
        warn!(
            spin_id1 = %pair.spin_id1,
            spin_id2 = %pair.spin_id2,
            "Skipping a pair with no bond vectors"
        );
        return Ok(None);
    };
    let Some(dj) = pair_dj(pair, spin1, spin2)? else {
        return Ok(None);
    };
    Ok(Some(vec![RdcComponent { dj, vectors }]))
}

/// Flattens the context's RDC data into per-alignment arrays.
///
/// When `sim_index` is set, the replicate values take the place of the
/// measured ones; rows whose replicate is missing are dropped.
pub fn assemble(
    context: &AnalysisContext,
    sim_index: Option<usize>,
) -> Result<Vec<AlignData>, EngineError> {
    let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;

    let mut data = Vec::new();
    for align_id in &context.rdc_ids {
        let Some(tensor_index) = registry
            .iter()
            .position(|t| t.align_id.as_deref() == Some(align_id) || t.name == *align_id)
        else {
            warn!(align_id = %align_id, "No tensor matches this alignment, skipping its RDC data");
            continue;
        };
        let fixed = registry.by_index(tensor_index)?.fixed;

        let mut rows = Vec::new();
        for (pair_index, pair) in context.pairs.iter().enumerate() {
            if !pair.select {
                continue;
            }
            let Some(datum) = pair.rdc.get(align_id) else {
                continue;
            };
            let value = match sim_index {
                None => datum.value,
                Some(i) => datum.sims.get(i).copied().flatten(),
            };
            let Some(value) = value else {
                continue;
            };
            let t_type = datum.data_type == RdcDataType::T;
            let j_coupling = if t_type {
                match pair.j_coupling {
                    Some(j) => j,
                    None => {
                        warn!(
                            spin_id1 = %pair.spin_id1,
                            spin_id2 = %pair.spin_id2,
                            "Skipping a T-type RDC with no scalar coupling"
                        );
                        continue;
                    }
                }
            } else {
                0.0
            };
            let Some(components) = components(context, pair)? else {
                continue;
            };
            rows.push(RdcRow {
                pair_index,
                value,
                error: datum.error.unwrap_or(1.0),
                weight: datum.weight,
                absolute: datum.absolute,
                t_type,
                j_coupling,
                components,
            });
        }
        if rows.is_empty() {
            warn!(align_id = %align_id, "No usable RDC rows for this alignment");
            continue;
        }
        data.push(AlignData {
            align_id: align_id.clone(),
            tensor_index,
            fixed,
            rows,
        });
    }

    if data.is_empty() {
        return Err(EngineError::NoRdcData);
    }
    Ok(data)
}

/// Back-calculates one row against a tensor, in the stored representation.
///
/// Pseudo-atom components are arithmetically averaged. T-type rows gain the
/// scalar coupling; rows flagged absolute lose their sign.
pub fn back_calc_row(row: &RdcRow, a: &Matrix3<f64>, weights: Option<&[f64]>) -> f64 {
    let mut d = 0.0;
    for component in &row.components {
        d += ave_rdc_tensor(
            component.dj,
            &component.vectors,
            component.vectors.len(),
            a,
            weights,
        );
    }
    d /= row.components.len() as f64;

    if row.t_type {
        d += row.j_coupling;
    }
    if row.absolute {
        d = d.abs();
    }
    d
}

/// The derivative of one row's back-calculated value with respect to one
/// tensor element, with `da` the matching dA/dAmn matrix.
pub fn back_calc_row_grad(row: &RdcRow, da: &Matrix3<f64>, weights: Option<&[f64]>) -> f64 {
    let mut g = 0.0;
    for component in &row.components {
        g += ave_rdc_tensor_grad(
            component.dj,
            &component.vectors,
            component.vectors.len(),
            da,
            weights,
        );
    }
    g / row.components.len() as f64
}

/// Writes back-calculated values into the pair containers.
pub fn store_back_calc(context: &mut AnalysisContext, align_id: &str, values: &[(usize, f64)]) {
    for &(pair_index, value) in values {
        if let Some(pair) = context.pairs.get_mut(pair_index) {
            if let Some(datum) = pair.rdc.get_mut(align_id) {
                datum.back_calc = Some(value);
            }
        }
    }
}
