//! zyz Euler angle handling.
//!
//! The zyz convention rotates about the z-axis by gamma, the new y-axis by
//! beta, then the new z-axis by alpha. The decomposition of a symmetric
//! tensor's eigenframe is degenerate under the glide symmetry
//! (alpha, beta, gamma) -> (pi - alpha, beta - pi, gamma), so angles are
//! folded into the principal ranges [0, 2pi) x [0, pi) x [0, 2pi).

use nalgebra::Matrix3;
use std::f64::consts::PI;

/// Builds the rotation matrix for the zyz Euler angles (alpha, beta, gamma).
pub fn rotation_zyz(alpha: f64, beta: f64, gamma: f64) -> Matrix3<f64> {
    let (sa, ca) = alpha.sin_cos();
    let (sb, cb) = beta.sin_cos();
    let (sg, cg) = gamma.sin_cos();

    Matrix3::new(
        -sa * sg + ca * cb * cg,
        -sa * cg - ca * cb * sg,
        ca * sb,
        ca * sg + sa * cb * cg,
        ca * cg - sa * cb * sg,
        sa * sb,
        -sb * cg,
        sb * sg,
        cb,
    )
}

/// Decomposes a rotation matrix into zyz Euler angles.
///
/// At the gimbal singularities (beta = 0 or pi) gamma is set to zero and the
/// full z rotation is absorbed into alpha.
pub fn euler_zyz(r: &Matrix3<f64>) -> (f64, f64, f64) {
    let cb = r[(2, 2)].clamp(-1.0, 1.0);
    let beta = cb.acos();

    if beta.sin().abs() < 1e-10 {
        // Singular: only alpha + gamma (or alpha - gamma) is determined.
        let alpha = r[(1, 0)].atan2(r[(0, 0)]);
        return (wrap_angle(alpha, 0.0, 2.0 * PI), beta, 0.0);
    }

    let alpha = r[(1, 2)].atan2(r[(0, 2)]);
    let gamma = r[(2, 1)].atan2(-r[(2, 0)]);
    (
        wrap_angle(alpha, 0.0, 2.0 * PI),
        beta,
        wrap_angle(gamma, 0.0, 2.0 * PI),
    )
}

/// Shifts an angle by multiples of 2pi until it lies in [lower, upper).
pub fn wrap_angle(mut angle: f64, lower: f64, upper: f64) -> f64 {
    while angle >= upper {
        angle -= 2.0 * PI;
    }
    while angle < lower {
        angle += 2.0 * PI;
    }
    angle
}

/// Folds zyz Euler angles into the principal ranges [0, 2pi) x [0, pi) x [0, 2pi).
///
/// Each angle is first wrapped into [0, 2pi); if beta then lies in the upper
/// half-period the glide symmetry is applied: alpha -> pi - alpha,
/// beta -> beta - pi.
pub fn fold_zyz(alpha: f64, beta: f64, gamma: f64) -> (f64, f64, f64) {
    let mut alpha = wrap_angle(alpha, 0.0, 2.0 * PI);
    let mut beta = wrap_angle(beta, 0.0, 2.0 * PI);
    let gamma = wrap_angle(gamma, 0.0, 2.0 * PI);

    if beta >= PI {
        alpha = wrap_angle(PI - alpha, 0.0, 2.0 * PI);
        beta -= PI;
    }

    (alpha, beta, gamma)
}

/// Folds a simulation replicate angle to within one half-period of its
/// central value, rather than into the absolute principal range.
pub fn fold_relative(sim: f64, centre: f64, half_period: f64) -> f64 {
    let mut sim = sim;
    while sim >= centre + half_period {
        sim -= 2.0 * half_period;
    }
    while sim < centre - half_period {
        sim += 2.0 * half_period;
    }
    sim
}

/// Folds replicate zyz angles relative to central values.
///
/// Alpha and gamma fold within +/- pi of their centres; beta folds within
/// +/- pi/2, applying the glide reflection to the replicate alpha whenever
/// the replicate beta crosses out of the centred half-period.
pub fn fold_zyz_relative(
    sim: (f64, f64, f64),
    centre: (f64, f64, f64),
) -> (f64, f64, f64) {
    let (mut alpha, mut beta, mut gamma) = sim;
    let (alpha_c, beta_c, gamma_c) = centre;

    alpha = fold_relative(alpha, alpha_c, PI);
    gamma = fold_relative(gamma, gamma_c, PI);

    while beta >= beta_c + PI / 2.0 {
        alpha = PI - alpha;
        beta -= PI;
    }
    while beta < beta_c - PI / 2.0 {
        alpha = PI - alpha;
        beta += PI;
    }

    (alpha, beta, gamma)
}
