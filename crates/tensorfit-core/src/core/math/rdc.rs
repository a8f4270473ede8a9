//! Ensemble-averaged residual dipolar coupling back-calculation.
//!
//! The RDC for one spin pair under one alignment is
//!
//! ```text
//!              _N_
//!              \            T
//! Dij  =  dj    >   pc . mu_jc . A . mu_jc ,
//!              /__
//!              c=1
//! ```
//!
//! where dj is the dipolar constant, pc the population of state c, mu_jc the
//! unit bond vector in state c, and A the alignment tensor.

use nalgebra::{Matrix3, Vector3};

/// Completes a population weight list to length `n`.
///
/// `None` means uniform 1/N weighting; a short list has its final weight
/// inferred as one minus the sum of the others.
pub fn complete_weights(weights: Option<&[f64]>, n: usize) -> Vec<f64> {
    match weights {
        None => vec![1.0 / n as f64; n],
        Some(w) if w.len() == n => w.to_vec(),
        Some(w) => {
            let mut full = w.to_vec();
            let sum: f64 = w.iter().sum();
            full.resize(n, 0.0);
            full[n - 1] = 1.0 - sum;
            full
        }
    }
}

/// Back-calculates the ensemble-averaged RDC from the 3x3 tensor form.
pub fn ave_rdc_tensor(
    dj: f64,
    vectors: &[Vector3<f64>],
    n: usize,
    a: &Matrix3<f64>,
    weights: Option<&[f64]>,
) -> f64 {
    let weights = complete_weights(weights, n);

    let mut val = 0.0;
    for c in 0..n {
        let mu = &vectors[c];
        val += weights[c] * (mu.transpose() * a * mu)[(0, 0)];
    }

    dj * val
}

/// Back-calculates the ensemble-averaged RDC directly from the 5 canonical
/// tensor parameters {Axx, Ayy, Axy, Axz, Ayz}:
///
/// ```text
/// Dij = dj . sum_c wc . [ (x^2 - z^2) Axx + (y^2 - z^2) Ayy
///                         + 2xy Axy + 2xz Axz + 2yz Ayz ]
/// ```
///
/// Algebraically identical to [`ave_rdc_tensor`] with the traceless 3x3 form.
pub fn ave_rdc_5d(
    dj: f64,
    vectors: &[Vector3<f64>],
    n: usize,
    params: &[f64; 5],
    weights: Option<&[f64]>,
) -> f64 {
    let weights = complete_weights(weights, n);
    let [axx, ayy, axy, axz, ayz] = *params;

    let mut val = 0.0;
    for c in 0..n {
        let (x, y, z) = (vectors[c][0], vectors[c][1], vectors[c][2]);
        val += weights[c]
            * ((x * x - z * z) * axx
                + (y * y - z * z) * ayy
                + 2.0 * x * y * axy
                + 2.0 * x * z * axz
                + 2.0 * y * z * ayz);
    }

    dj * val
}

/// The derivative of the ensemble-averaged RDC with respect to one tensor
/// element, obtained by substituting the partial derivative matrix dA/dAmn
/// for the tensor itself.
pub fn ave_rdc_tensor_grad(
    dj: f64,
    vectors: &[Vector3<f64>],
    n: usize,
    da: &Matrix3<f64>,
    weights: Option<&[f64]>,
) -> f64 {
    ave_rdc_tensor(dj, vectors, n, da, weights)
}

/// The partial derivative matrices dA/dAmn of the traceless symmetric tensor
/// with respect to each of the 5 canonical parameters, in canonical order.
pub fn tensor_derivative_matrices() -> [Matrix3<f64>; 5] {
    [
        // dA/dAxx
        Matrix3::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0),
        // dA/dAyy
        Matrix3::new(0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0),
        // dA/dAxy
        Matrix3::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
        // dA/dAxz
        Matrix3::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
        // dA/dAyz
        Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0),
    ]
}
