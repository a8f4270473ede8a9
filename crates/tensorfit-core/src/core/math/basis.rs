//! Conversions between the equivalent 5-parameter alignment tensor bases.
//!
//! The canonical internal representation throughout the library is the
//! alignment tensor form `{Axx, Ayy, Axy, Axz, Ayz}` with the traceless
//! condition `Azz = -Axx - Ayy`. The Saupe order matrix is `S = 3/2 A`, the
//! probability tensor is `P = A + I/3`, and the geometric variants substitute
//! the zz component and the xx-yy difference for the two diagonal elements.

use nalgebra::{Complex, Matrix3};
use std::f64::consts::PI;

/// Index order of the canonical 5D parameter array.
pub const CANONICAL_NAMES: [&str; 5] = ["Axx", "Ayy", "Axy", "Axz", "Ayz"];

/// Builds the full symmetric traceless 3x3 matrix from the canonical 5
/// parameters, deriving the zz element.
pub fn matrix_form(p: &[f64; 5]) -> Matrix3<f64> {
    let [axx, ayy, axy, axz, ayz] = *p;
    let azz = -axx - ayy;
    Matrix3::new(axx, axy, axz, axy, ayy, ayz, axz, ayz, azz)
}

/// The Saupe order matrix parameters {Sxx, Syy, Sxy, Sxz, Syz} = 3/2 A.
pub fn to_saupe(p: &[f64; 5]) -> [f64; 5] {
    p.map(|v| 1.5 * v)
}

/// Canonical parameters from the Saupe set {Sxx, Syy, Sxy, Sxz, Syz}.
pub fn from_saupe(s: &[f64; 5]) -> [f64; 5] {
    s.map(|v| 2.0 / 3.0 * v)
}

/// Canonical parameters from the geometric Saupe set {Szz, Sxxyy, Sxy, Sxz, Syz}.
pub fn from_saupe_geometric(s: &[f64; 5]) -> [f64; 5] {
    let [szz, sxxyy, sxy, sxz, syz] = *s;
    [
        2.0 / 3.0 * -0.5 * (szz - sxxyy),
        2.0 / 3.0 * -0.5 * (szz + sxxyy),
        2.0 / 3.0 * sxy,
        2.0 / 3.0 * sxz,
        2.0 / 3.0 * syz,
    ]
}

/// Canonical parameters from the geometric alignment set {Azz, Axxyy, Axy, Axz, Ayz}.
pub fn from_align_geometric(a: &[f64; 5]) -> [f64; 5] {
    let [azz, axxyy, axy, axz, ayz] = *a;
    [
        -0.5 * (azz - axxyy),
        -0.5 * (azz + axxyy),
        axy,
        axz,
        ayz,
    ]
}

/// Canonical parameters from the probability set {Pxx, Pyy, Pxy, Pxz, Pyz}.
pub fn from_probability(p: &[f64; 5]) -> [f64; 5] {
    let [pxx, pyy, pxy, pxz, pyz] = *p;
    [pxx - 1.0 / 3.0, pyy - 1.0 / 3.0, pxy, pxz, pyz]
}

/// Canonical parameters from the geometric probability set {Pzz, Pxxyy, Pxy, Pxz, Pyz}.
pub fn from_probability_geometric(p: &[f64; 5]) -> [f64; 5] {
    let [pzz, pxxyy, pxy, pxz, pyz] = *p;
    [
        -0.5 * (pzz - pxxyy) - 1.0 / 3.0,
        -0.5 * (pzz + pxxyy) - 1.0 / 3.0,
        pxy,
        pxz,
        pyz,
    ]
}

/// The probability tensor matrix P = A + I/3.
pub fn probability_matrix(p: &[f64; 5]) -> Matrix3<f64> {
    matrix_form(p) + Matrix3::identity() / 3.0
}

/// The Saupe order matrix in 3x3 form.
pub fn saupe_matrix(p: &[f64; 5]) -> Matrix3<f64> {
    1.5 * matrix_form(p)
}

/// The five irreducible spherical components {A-2, A-1, A0, A1, A2} of the
/// Saupe order matrix:
///
/// ```text
/// A0  =  sqrt(4pi/5) Szz
/// A+1 =  sqrt(8pi/15) (Sxz + iSyz),    A-1 = -sqrt(8pi/15) (Sxz - iSyz)
/// A+2 =  sqrt(2pi/15) (Sxx - Syy + 2iSxy)
/// A-2 =  sqrt(2pi/15) (Sxx - Syy - 2iSxy)
/// ```
pub fn irreducible(p: &[f64; 5]) -> [Complex<f64>; 5] {
    let fact_a0 = (4.0 * PI / 5.0).sqrt();
    let fact_a1 = (8.0 * PI / 15.0).sqrt();
    let fact_a2 = (2.0 * PI / 15.0).sqrt();

    let [sxx, syy, sxy, sxz, syz] = to_saupe(p);
    let szz = -sxx - syy;

    let a0 = Complex::new(fact_a0 * szz, 0.0);
    let a1 = fact_a1 * Complex::new(sxz, syz);
    let am1 = -fact_a1 * Complex::new(sxz, -syz);
    let a2 = fact_a2 * Complex::new(sxx - syy, 2.0 * sxy);
    let am2 = fact_a2 * Complex::new(sxx - syy, -2.0 * sxy);

    [am2, am1, a0, a1, a2]
}

/// Eigenvalues of the tensor sorted into |Axx'| <= |Ayy'| <= |Azz'| order.
pub fn sorted_eigenvalues(a: &Matrix3<f64>) -> [f64; 3] {
    let vals = a.symmetric_eigen().eigenvalues;
    let perm = abs_sort_indices(&[vals[0], vals[1], vals[2]]);
    [vals[perm[0]], vals[perm[1]], vals[perm[2]]]
}

/// The rotation matrix from the molecular frame to the tensor frame, with
/// eigenvector columns permuted into |Axx'| <= |Ayy'| <= |Azz'| order and the
/// first column negated if the result is left-handed.
pub fn rotation(a: &Matrix3<f64>) -> Matrix3<f64> {
    let eig = a.symmetric_eigen();
    let vals = eig.eigenvalues;
    let perm = abs_sort_indices(&[vals[0], vals[1], vals[2]]);

    let mut rot = Matrix3::zeros();
    for (j, &src) in perm.iter().enumerate() {
        rot.set_column(j, &eig.eigenvectors.column(src).into_owned());
    }

    if (rot.determinant() - 1.0).abs() > 1e-7 {
        let negated = -rot.column(0);
        rot.set_column(0, &negated);
    }

    rot
}

fn abs_sort_indices(vals: &[f64; 3]) -> [usize; 3] {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| {
        vals[a]
            .abs()
            .partial_cmp(&vals[b].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    idx
}

/// The anisotropic parameter Aa = 3/2 Azz' = Szz', from the sorted eigenvalues.
pub fn anisotropy(eigvals: &[f64; 3]) -> f64 {
    1.5 * eigvals[2]
}

/// The rhombic parameter Ar = Axx' - Ayy', from the sorted eigenvalues.
pub fn rhombic(eigvals: &[f64; 3]) -> f64 {
    eigvals[0] - eigvals[1]
}

/// The asymmetry parameter eta = (Axx' - Ayy') / Azz', NaN when Azz' is zero.
pub fn asymmetry(eigvals: &[f64; 3]) -> f64 {
    if eigvals[2] == 0.0 {
        return f64::NAN;
    }
    (eigvals[0] - eigvals[1]) / eigvals[2]
}

/// The rhombicity R = Ar / Aa, NaN when Aa is zero.
pub fn rhombicity(aa: f64, ar: f64) -> f64 {
    if aa == 0.0 {
        return f64::NAN;
    }
    ar / aa
}

/// The generalized degree of order, sqrt(3/2) times the Frobenius norm of A.
pub fn gdo(p: &[f64; 5]) -> f64 {
    (1.5f64).sqrt() * matrix_form(p).norm()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn arrays_approx_equal(a: &[f64; 5], b: &[f64; 5]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| f64_approx_equal(*x, *y))
    }

    const PARAMS: [f64; 5] = [-16.6278e-5, 6.13037e-5, 7.65639e-5, -1.89157e-5, 19.2561e-5];

    #[test]
    fn matrix_form_is_symmetric_and_traceless() {
        let a = matrix_form(&PARAMS);
        assert!(f64_approx_equal(a[(0, 1)], a[(1, 0)]));
        assert!(f64_approx_equal(a[(0, 2)], a[(2, 0)]));
        assert!(f64_approx_equal(a[(1, 2)], a[(2, 1)]));
        assert!(f64_approx_equal(a.trace(), 0.0));
    }

    #[test]
    fn saupe_round_trip_recovers_canonical_parameters() {
        let s = to_saupe(&PARAMS);
        assert!(arrays_approx_equal(&from_saupe(&s), &PARAMS));
    }

    #[test]
    fn saupe_geometric_set_recovers_canonical_parameters() {
        let [sxx, syy, sxy, sxz, syz] = to_saupe(&PARAMS);
        let szz = -sxx - syy;
        let sxxyy = sxx - syy;
        let p = from_saupe_geometric(&[szz, sxxyy, sxy, sxz, syz]);
        assert!(arrays_approx_equal(&p, &PARAMS));
    }

    #[test]
    fn align_geometric_set_recovers_canonical_parameters() {
        let [axx, ayy, axy, axz, ayz] = PARAMS;
        let p = from_align_geometric(&[-axx - ayy, axx - ayy, axy, axz, ayz]);
        assert!(arrays_approx_equal(&p, &PARAMS));
    }

    #[test]
    fn probability_set_recovers_canonical_parameters() {
        let [axx, ayy, axy, axz, ayz] = PARAMS;
        let p = from_probability(&[axx + 1.0 / 3.0, ayy + 1.0 / 3.0, axy, axz, ayz]);
        assert!(arrays_approx_equal(&p, &PARAMS));
    }

    #[test]
    fn probability_matrix_has_unit_trace() {
        let p = probability_matrix(&PARAMS);
        assert!(f64_approx_equal(p.trace(), 1.0));
    }

    #[test]
    fn zero_saupe_parameters_give_zero_tensor_and_eigenvalues() {
        let p = from_saupe(&[0.0; 5]);
        assert!(arrays_approx_equal(&p, &[0.0; 5]));
        let eigvals = sorted_eigenvalues(&matrix_form(&p));
        for v in eigvals {
            assert!(f64_approx_equal(v, 0.0));
        }
    }

    #[test]
    fn eigenvalues_are_sorted_by_absolute_value() {
        // diag(1, -2, 1) after the traceless completion of Axx=1, Ayy=-2.
        let eigvals = sorted_eigenvalues(&matrix_form(&[1.0, -2.0, 0.0, 0.0, 0.0]));
        assert!(f64_approx_equal(eigvals[0], 1.0));
        assert!(f64_approx_equal(eigvals[1], 1.0));
        assert!(f64_approx_equal(eigvals[2], -2.0));
    }

    #[test]
    fn rotation_matrix_is_right_handed() {
        let rot = rotation(&matrix_form(&PARAMS));
        assert!((rot.determinant() - 1.0).abs() < 1e-7);
    }

    #[test]
    fn rotation_diagonalises_the_tensor() {
        let a = matrix_form(&PARAMS);
        let rot = rotation(&a);
        let diag = rot.transpose() * a * rot;
        let eigvals = sorted_eigenvalues(&a);
        for i in 0..3 {
            for j in 0..3 {
                if i == j {
                    assert!((diag[(i, j)] - eigvals[i]).abs() < 1e-10);
                } else {
                    assert!(diag[(i, j)].abs() < 1e-10);
                }
            }
        }
    }

    #[test]
    fn irreducible_a0_matches_szz() {
        let weights = irreducible(&PARAMS);
        let [sxx, syy, ..] = to_saupe(&PARAMS);
        let szz = -sxx - syy;
        assert!(f64_approx_equal(weights[2].re, (4.0 * PI / 5.0).sqrt() * szz));
        assert!(f64_approx_equal(weights[2].im, 0.0));
    }

    #[test]
    fn irreducible_plus_minus_components_are_conjugate_up_to_sign() {
        let w = irreducible(&PARAMS);
        // A-1 = -conj(A1) and A-2 = conj(A2) for a real symmetric tensor.
        assert!(f64_approx_equal(w[1].re, -w[3].re));
        assert!(f64_approx_equal(w[1].im, w[3].im));
        assert!(f64_approx_equal(w[0].re, w[4].re));
        assert!(f64_approx_equal(w[0].im, -w[4].im));
    }

    #[test]
    fn asymmetry_is_nan_for_zero_azz_eigenvalue() {
        assert!(asymmetry(&[0.0, 0.0, 0.0]).is_nan());
    }

    #[test]
    fn rhombicity_is_nan_for_zero_anisotropy() {
        assert!(rhombicity(0.0, 1.0).is_nan());
    }

    #[test]
    fn gdo_of_zero_tensor_is_zero() {
        assert!(f64_approx_equal(gdo(&[0.0; 5]), 0.0));
    }

    #[test]
    fn gdo_of_axial_tensor_matches_closed_form() {
        // diag(1, 1, -2): Frobenius norm sqrt(6), GDO = sqrt(3/2)*sqrt(6) = 3.
        let g = gdo(&[1.0, 1.0, 0.0, 0.0, 0.0]);
        assert!(f64_approx_equal(g, 3.0));
    }
}
