//! Fit diagnostics: Q-factors, inter-tensor angles, and SVD conditioning.

use crate::core::constants::{dipolar_constant, gyromagnetic_ratio};
use crate::core::io::grace::{PlotError, PlotFormat, corr_plot as write_corr_plot};
use crate::core::io::report;
use crate::core::math::basis::{irreducible, to_saupe};
use crate::core::models::context::AnalysisContext;
use crate::core::models::spin::RdcDataType;
use crate::core::models::tensor::TensorError;
use crate::engine::error::EngineError;
use nalgebra::{Complex, DMatrix};
use std::f64::consts::PI;
use std::io;
use tracing::warn;

/// Computes both RDC Q-factor definitions for every alignment.
///
/// The first definition normalises the residual sum by N.2Da^2(4+3R^2)/5
/// from the tensor's own eigenvalues scaled by the dipolar constant; it is
/// skipped (stored as 0.0) with a warning when pseudo-atoms are involved or
/// the dipolar constant differs between pairs. The second normalises by the
/// sum of squared measured values, with the scalar coupling removed for T
/// data. The totals aggregate per-alignment values by root-mean-square.
pub fn q_factors(context: &mut AnalysisContext) -> Result<(), EngineError> {
    if context.rdc_ids.is_empty() {
        warn!("No RDC data exists, Q factors cannot be calculated");
        return Ok(());
    }

    context.q_rdc.clear();
    context.q_rdc_norm2.clear();

    let align_ids: Vec<String> = context.rdc_ids.clone();
    for align_id in &align_ids {
        let mut sse = 0.0;
        let mut d2_sum = 0.0;
        let mut n = 0usize;
        let mut dj: Option<f64> = None;
        let mut tensor_norm = true;

        for pair in &context.pairs {
            if !pair.select {
                continue;
            }
            let Some(datum) = pair.rdc.get(align_id) else {
                continue;
            };
            let (Some(value), Some(back_calc)) = (datum.value, datum.back_calc) else {
                continue;
            };
            if datum.data_type == RdcDataType::T && pair.j_coupling.is_none() {
                warn!(
                    spin_id1 = %pair.spin_id1,
                    spin_id2 = %pair.spin_id2,
                    "T-type data with no scalar coupling, skipping the pair"
                );
                continue;
            }

            sse += (value - back_calc).powi(2);
            if datum.data_type == RdcDataType::T {
                // The J check above guarantees the coupling here.
                d2_sum += (value - pair.j_coupling.unwrap_or(0.0)).powi(2);
            } else {
                d2_sum += value.powi(2);
            }

            // The tensor-based normalisation needs one common dipolar
            // constant over plain two-atom pairs.
            if tensor_norm {
                let spin1 = context.spin(&pair.spin_id1);
                let spin2 = context.spin(&pair.spin_id2);
                let pseudo = spin1.is_some_and(|s| s.is_pseudo())
                    || spin2.is_some_and(|s| s.is_pseudo());
                if pseudo {
                    warn!(
                        "Pseudo-atoms are present, skipping the Q factor normalised with 2Da^2(4 + 3R^2)/5"
                    );
                    tensor_norm = false;
                } else {
                    let isotopes = spin1
                        .and_then(|s| s.isotope.as_deref())
                        .zip(spin2.and_then(|s| s.isotope.as_deref()));
                    match (isotopes, pair.r) {
                        (Some((iso1, iso2)), Some(r)) => {
                            let g1 = gyromagnetic_ratio(iso1)?;
                            let g2 = gyromagnetic_ratio(iso2)?;
                            let dj_new = 3.0 / (2.0 * PI) * dipolar_constant(g1, g2, r);
                            match dj {
                                Some(existing) if existing != dj_new => {
                                    warn!(
                                        "The dipolar constant is not the same for all RDCs, skipping the Q factor normalised with 2Da^2(4 + 3R^2)/5"
                                    );
                                    tensor_norm = false;
                                }
                                _ => dj = Some(dj_new),
                            }
                        }
                        _ => {
                            warn!(
                                align_id = %align_id,
                                "Missing isotope or distance data, skipping the tensor-normalised Q factor"
                            );
                            tensor_norm = false;
                        }
                    }
                }
            }
            n += 1;
        }

        if n == 0 {
            warn!(align_id = %align_id, "No RDC data for this alignment, skipping its Q factors");
            continue;
        }

        let q1 = match (tensor_norm, dj) {
            (true, Some(dj)) => {
                let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;
                let tensor = registry
                    .iter()
                    .find(|t| t.align_id.as_deref() == Some(align_id) || t.name == *align_id)
                    .ok_or(EngineError::NoTensorData)?;
                let eig = tensor.eigenvalues()?;
                let d = [dj * eig[0], dj * eig[1], dj * eig[2]];
                let da = (d[2] - (d[0] + d[1]) / 2.0) / 3.0;
                let dr = (d[0] - d[1]) / 3.0;
                let norm = if da == 0.0 {
                    1e-15
                } else {
                    let r = dr / da;
                    2.0 * da * da * (4.0 + 3.0 * r * r) / 5.0
                };
                (sse / n as f64 / norm).sqrt()
            }
            _ => 0.0,
        };
        context.q_rdc.insert(align_id.clone(), q1);
        context
            .q_rdc_norm2
            .insert(align_id.clone(), (sse / d2_sum).sqrt());
    }

    let rms = |values: &std::collections::HashMap<String, f64>| {
        if values.is_empty() {
            None
        } else {
            Some(
                (values.values().map(|q| q * q).sum::<f64>() / values.len() as f64).sqrt(),
            )
        }
    };
    context.q_rdc_total = rms(&context.q_rdc);
    context.q_rdc_norm2_total = rms(&context.q_rdc_norm2);
    Ok(())
}

/// The vector basis used for inter-tensor angles and the SVD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorBasis {
    /// The 3x3 matrices themselves, compared by the Euclidean inner product
    /// over the Frobenius norms.
    Matrix,
    /// {Sxx, Sxy, Sxz, Syx, Syy, Syz, Szx, Szy, Szz}.
    Unitary9D,
    /// {A-2, A-1, A0, A1, A2} with the (-1)^m S-m conjugate inner product.
    Irreducible5D,
    /// {Sxx, Syy, Sxy, Sxz, Syz}.
    Unitary5D,
    /// {Szz, Sxx-yy, Sxy, Sxz, Syz}, the Pales standard notation.
    Geometric5D,
}

/// The real-valued row for a basis; the matrix and irreducible bases are
/// handled separately by the callers.
fn real_vector(basis: TensorBasis, params: &[f64; 5]) -> Vec<f64> {
    let [sxx, syy, sxy, sxz, syz] = to_saupe(params);
    let szz = -sxx - syy;
    match basis {
        TensorBasis::Unitary9D => vec![sxx, sxy, sxz, sxy, syy, syz, sxz, syz, szz],
        TensorBasis::Geometric5D => vec![szz, sxx - syy, sxy, sxz, syz],
        _ => vec![sxx, syy, sxy, sxz, syz],
    }
}

fn irreducible_conjugate(v: &[Complex<f64>; 5]) -> [Complex<f64>; 5] {
    // The (-1)^m S-m conjugate vector.
    [v[4], -v[3], v[2], -v[1], v[0]]
}

fn complex_angle(
    v1: &[Complex<f64>; 5],
    v2: &[Complex<f64>; 5],
    v1_conj: &[Complex<f64>; 5],
    v2_conj: &[Complex<f64>; 5],
) -> f64 {
    let inner = |a: &[Complex<f64>; 5], b: &[Complex<f64>; 5]| {
        a.iter().zip(b).map(|(x, y)| x * y).sum::<Complex<f64>>()
    };
    let norm1 = inner(v1, v1_conj).re.sqrt();
    let norm2 = inner(v2, v2_conj).re.sqrt();
    (inner(v1, v2_conj).re / (norm1 * norm2)).clamp(-1.0, 1.0).acos()
}

/// The pairwise inter-tensor angles in radians, over all tensors with data.
pub fn matrix_angles(
    context: &AnalysisContext,
    basis: TensorBasis,
) -> Result<DMatrix<f64>, EngineError> {
    let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;
    let params: Vec<[f64; 5]> = registry
        .iter()
        .map(|t| t.require_params().copied())
        .collect::<Result<_, _>>()?;
    let count = params.len();
    if count == 0 {
        return Err(EngineError::NoTensorData);
    }

    let mut angles = DMatrix::zeros(count, count);
    match basis {
        TensorBasis::Matrix => {
            let matrices: Vec<_> = params.iter().map(crate::core::math::basis::matrix_form).collect();
            for i in 0..count {
                for j in 0..count {
                    let nom = matrices[i].dot(&matrices[j]);
                    let denom = matrices[i].norm() * matrices[j].norm();
                    angles[(i, j)] = (nom / denom).clamp(-1.0, 1.0).acos();
                }
            }
        }
        TensorBasis::Irreducible5D => {
            let vectors: Vec<_> = params.iter().map(irreducible).collect();
            let conjugates: Vec<_> = vectors.iter().map(irreducible_conjugate).collect();
            for i in 0..count {
                for j in 0..count {
                    angles[(i, j)] =
                        complex_angle(&vectors[i], &vectors[j], &conjugates[i], &conjugates[j]);
                }
            }
        }
        _ => {
            let vectors: Vec<Vec<f64>> = params
                .iter()
                .map(|p| {
                    let v = real_vector(basis, p);
                    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
                    v.into_iter().map(|x| x / norm).collect()
                })
                .collect();
            for i in 0..count {
                for j in 0..count {
                    let delta: f64 = vectors[i]
                        .iter()
                        .zip(&vectors[j])
                        .map(|(a, b)| a * b)
                        .sum();
                    angles[(i, j)] = delta.clamp(-1.0, 1.0).acos();
                }
            }
        }
    }
    Ok(angles)
}

/// Singular values and condition number of the stacked tensor vectors.
///
/// The rows are the per-tensor vectors in the chosen basis; the condition
/// number is the ratio of the largest to the smallest singular value. The
/// full matrix basis has no vector form and is rejected.
pub fn svd(
    context: &AnalysisContext,
    basis: TensorBasis,
) -> Result<(Vec<f64>, f64), EngineError> {
    if basis == TensorBasis::Matrix {
        return Err(EngineError::Internal(
            "the full matrix basis has no vector form for SVD".to_string(),
        ));
    }
    let registry = context.tensors.as_ref().ok_or(EngineError::NoTensorData)?;
    let params: Vec<[f64; 5]> = registry
        .iter()
        .map(|t| t.require_params().copied())
        .collect::<Result<_, _>>()?;
    if params.is_empty() {
        return Err(EngineError::NoTensorData);
    }

    let mut singular: Vec<f64> = if basis == TensorBasis::Irreducible5D {
        let rows: Vec<[Complex<f64>; 5]> = params.iter().map(irreducible).collect();
        let matrix = DMatrix::from_fn(rows.len(), 5, |i, j| rows[i][j]);
        matrix.svd(false, false).singular_values.iter().copied().collect()
    } else {
        let rows: Vec<Vec<f64>> = params.iter().map(|p| real_vector(basis, p)).collect();
        let matrix = DMatrix::from_fn(rows.len(), rows[0].len(), |i, j| rows[i][j]);
        matrix.svd(false, false).singular_values.iter().copied().collect()
    };
    singular.sort_by(|a, b| b.total_cmp(a));

    let smallest = singular.last().copied().unwrap_or(0.0);
    let condition = singular[0] / smallest;
    Ok((singular, condition))
}

/// Renders the full tensor report, for one tensor or all of them.
pub fn display(context: &AnalysisContext, name: Option<&str>) -> Result<String, TensorError> {
    report::display(context, name)
}

/// Writes the measured versus back-calculated correlation plot.
pub fn corr_plot<W: io::Write>(
    context: &AnalysisContext,
    format: PlotFormat,
    writer: &mut W,
) -> Result<(), PlotError> {
    write_corr_plot(context, format, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::spin::{InteratomicPair, RdcDatum, Spin};

    fn context_with_fit(residual: f64) -> AnalysisContext {
        let mut context = AnalysisContext::new();
        context.add_rdc_id("Dy");
        context
            .tensors_mut()
            .add("Dy")
            .set_params([2e-4, -1e-4, 5e-5, -3e-5, 8e-5]);
        for (i, value) in [5.0, -3.0, 8.0].into_iter().enumerate() {
            let n_id = format!(":{}@N", i + 1);
            let h_id = format!(":{}@H", i + 1);
            context.spins.push(Spin::new(&n_id, Some("15N")));
            context.spins.push(Spin::new(&h_id, Some("1H")));
            let mut pair = InteratomicPair::new(&n_id, &h_id);
            pair.r = Some(1.041e-10);
            let mut datum = RdcDatum::new(Some(value), Some(0.5));
            datum.back_calc = Some(value + residual);
            pair.rdc.insert("Dy".to_string(), datum);
            context.pairs.push(pair);
        }
        context
    }

    #[test]
    fn q_norm2_is_zero_only_at_a_perfect_fit() {
        let mut perfect = context_with_fit(0.0);
        q_factors(&mut perfect).unwrap();
        assert_eq!(perfect.q_rdc_norm2["Dy"], 0.0);
        assert_eq!(perfect.q_rdc_norm2_total, Some(0.0));

        let mut imperfect = context_with_fit(0.5);
        q_factors(&mut imperfect).unwrap();
        assert!(imperfect.q_rdc_norm2["Dy"] > 0.0);
        assert!(imperfect.q_rdc["Dy"] > 0.0);
    }

    #[test]
    fn pseudo_atoms_suppress_the_tensor_normalised_q() {
        let mut context = context_with_fit(0.5);
        context.spins[0].members = Some(vec![":9@H1".to_string()]);
        q_factors(&mut context).unwrap();
        assert_eq!(context.q_rdc["Dy"], 0.0);
        assert!(context.q_rdc_norm2["Dy"] > 0.0);
    }

    #[test]
    fn inconsistent_dipolar_constants_suppress_the_tensor_normalised_q() {
        let mut context = context_with_fit(0.5);
        context.pairs[1].r = Some(1.2e-10);
        q_factors(&mut context).unwrap();
        assert_eq!(context.q_rdc["Dy"], 0.0);
    }

    #[test]
    fn self_angles_are_zero_in_every_basis() {
        let context = context_with_fit(0.0);
        for basis in [
            TensorBasis::Matrix,
            TensorBasis::Unitary9D,
            TensorBasis::Irreducible5D,
            TensorBasis::Unitary5D,
            TensorBasis::Geometric5D,
        ] {
            let angles = matrix_angles(&context, basis).unwrap();
            assert!(angles[(0, 0)].abs() < 1e-7, "basis {basis:?}");
        }
    }

    #[test]
    fn orthogonal_tensors_sit_at_ninety_degrees() {
        let mut context = AnalysisContext::new();
        {
            let registry = context.tensors_mut();
            // Axy only against Axz only: orthogonal in the 5D basis.
            registry.add("a").set_params([0.0, 0.0, 1e-4, 0.0, 0.0]);
            registry.add("b").set_params([0.0, 0.0, 0.0, 1e-4, 0.0]);
        }
        let angles = matrix_angles(&context, TensorBasis::Unitary5D).unwrap();
        assert!((angles[(0, 1)] - PI / 2.0).abs() < 1e-10);
        let matrix_based = matrix_angles(&context, TensorBasis::Matrix).unwrap();
        assert!((matrix_based[(0, 1)] - PI / 2.0).abs() < 1e-10);
    }

    #[test]
    fn svd_of_identical_tensors_is_singular() {
        let mut context = AnalysisContext::new();
        {
            let registry = context.tensors_mut();
            registry.add("a").set_params([2e-4, -1e-4, 5e-5, -3e-5, 8e-5]);
            registry.add("b").set_params([2e-4, -1e-4, 5e-5, -3e-5, 8e-5]);
        }
        let (values, condition) = svd(&context, TensorBasis::Unitary5D).unwrap();
        assert_eq!(values.len(), 2);
        assert!(values[1].abs() < 1e-12);
        assert!(condition > 1e10);
    }

    #[test]
    fn svd_rejects_the_matrix_basis() {
        let context = context_with_fit(0.0);
        assert!(svd(&context, TensorBasis::Matrix).is_err());
    }
}
