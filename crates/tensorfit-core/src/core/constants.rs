//! Physical constants and isotope data for dipolar coupling calculations.
//!
//! All values are in SI units (2019 redefinition where applicable).
//! Gyromagnetic ratios are in rad.s^-1.T^-1.

use std::f64::consts::PI;
use thiserror::Error;

/// Planck's constant.
pub const H: f64 = 6.626_070_15e-34; // In J.s

/// Dirac's constant (h / 2pi).
pub const H_BAR: f64 = H / (2.0 * PI);

/// The permeability of free space.
pub const MU0: f64 = 4.0 * PI * 1e-7; // In N.A^-2

/// Boltzmann's constant.
pub const KB: f64 = 1.380_649e-23; // In J.K^-1

/// The gyromagnetic ratio of the proton.
pub const G1H: f64 = 26.752_221_2e7;

/// The gyromagnetic ratio of the 13C isotope.
pub const G13C: f64 = 6.728_284e7;

/// The gyromagnetic ratio of the 15N isotope.
pub const G15N: f64 = -2.712_618_04e7;

/// The gyromagnetic ratio of the 17O isotope.
pub const G17O: f64 = -3.628_08e7;

/// The gyromagnetic ratio of the 31P isotope.
pub const G31P: f64 = 10.839_4e7;

/// The gyromagnetic ratio of the deuteron.
pub const G2H: f64 = 4.106_627_91e7;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IsotopeError {
    #[error("No gyromagnetic ratio is known for the isotope '{0}'")]
    UnknownIsotope(String),
}

/// Looks up the gyromagnetic ratio for an isotope label such as "15N" or "1H".
pub fn gyromagnetic_ratio(isotope: &str) -> Result<f64, IsotopeError> {
    match isotope {
        "1H" => Ok(G1H),
        "2H" => Ok(G2H),
        "13C" => Ok(G13C),
        "15N" => Ok(G15N),
        "17O" => Ok(G17O),
        "31P" => Ok(G31P),
        other => Err(IsotopeError::UnknownIsotope(other.to_string())),
    }
}

/// The pure dipolar constant in SI units:
///
/// ```text
///        mu0   gI . gS . h_bar
/// d' = - --- . --------------- ,
///        4pi        r**3
/// ```
///
/// where `r` is the internuclear distance in meters.
pub fn dipolar_constant(g1: f64, g2: f64, r: f64) -> f64 {
    -MU0 / (4.0 * PI) * g1 * g2 * H_BAR / r.powi(3)
}

/// The RDC dipolar constant `dj = 3/(2pi) d'`, converting from rad.s^-1 to Hz
/// and folding in the factor of 3 associated with the alignment tensor.
pub fn rdc_const(g1: f64, g2: f64, r: f64) -> f64 {
    3.0 / (2.0 * PI) * dipolar_constant(g1, g2, r)
}

/// The magnetic field strength B0 corresponding to a proton spectrometer
/// frequency in Hz.
pub fn field_strength(proton_frq: f64) -> f64 {
    2.0 * PI * proton_frq / G1H
}

/// The scaling factor converting an alignment tensor element into the
/// corresponding magnetic susceptibility tensor element:
///
/// ```text
/// chi = A . 15 mu0 kB T / B0^2 ,
/// ```
///
/// with B0 derived from the proton spectrometer frequency.
pub fn chi_factor(proton_frq: f64, temperature: f64) -> f64 {
    let b0 = field_strength(proton_frq);
    15.0 * MU0 * KB * temperature / (b0 * b0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn gyromagnetic_ratio_resolves_known_isotopes() {
        assert!(f64_approx_equal(gyromagnetic_ratio("1H").unwrap(), G1H));
        assert!(f64_approx_equal(gyromagnetic_ratio("15N").unwrap(), G15N));
    }

    #[test]
    fn gyromagnetic_ratio_rejects_unknown_isotope() {
        let err = gyromagnetic_ratio("57Fe").unwrap_err();
        assert_eq!(err, IsotopeError::UnknownIsotope("57Fe".to_string()));
    }

    #[test]
    fn dipolar_constant_for_nh_bond_is_near_literature_value() {
        // The N-H dipolar coupling constant at r = 1.041 Angstrom.
        let d = dipolar_constant(G15N, G1H, 1.041e-10);
        let dj = 3.0 / (2.0 * PI) * d;
        // Roughly 3.24e4 Hz once the factor of 3 is included.
        assert!((dj - 3.24e4).abs() / 3.24e4 < 0.01);
    }

    #[test]
    fn dipolar_constant_sign_follows_ratio_signs() {
        // 15N has a negative ratio so the N-H constant is positive.
        assert!(dipolar_constant(G15N, G1H, 1.041e-10) > 0.0);
        assert!(dipolar_constant(G1H, G1H, 2.0e-10) < 0.0);
    }

    #[test]
    fn field_strength_for_600mhz_spectrometer() {
        let b0 = field_strength(600.0e6);
        assert!((b0 - 14.09).abs() < 0.01);
    }
}
