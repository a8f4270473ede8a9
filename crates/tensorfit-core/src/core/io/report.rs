//! The fixed-format, multi-section alignment tensor report.
//!
//! The numeric formats (25-character, 12-digit scientific and fixed notation)
//! are part of the user-facing output contract and must not be changed.

use crate::core::constants::chi_factor;
use crate::core::models::context::AnalysisContext;
use crate::core::models::tensor::{AlignTensor, TensorError};
use nalgebra::Matrix3;
use std::fmt::Write;

/// C-style `%.12e` formatting: signed two-digit exponent, right-aligned to 25
/// characters.
fn fmt_e(v: f64) -> String {
    if v.is_nan() {
        return format!("{:>25}", "nan");
    }
    let s = format!("{v:.12e}");
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{:>25}", format!("{}e{}{:02}", mantissa, sign, exp.abs()))
}

/// C-style `%-25.12e` (left-aligned) formatting.
fn fmt_e_left(v: f64) -> String {
    format!("{:<25}", fmt_e(v).trim_start())
}

/// C-style `%25.12f` formatting.
fn fmt_f(v: f64) -> String {
    if v.is_nan() {
        return format!("{:>25}", "nan");
    }
    format!("{v:>25.12}")
}

/// C-style `%-25.12f` formatting.
fn fmt_f_left(v: f64) -> String {
    format!("{v:<25.12}")
}

fn five_d_line(values: [f64; 5]) -> String {
    format!(
        "[{}, {}, {}, {}, {}]\n",
        fmt_e(values[0]),
        fmt_e(values[1]),
        fmt_e(values[2]),
        fmt_e(values[3]),
        fmt_e(values[4])
    )
}

fn three_d_line(values: [f64; 3]) -> String {
    format!(
        "[{}, {}, {}]\n",
        fmt_e(values[0]),
        fmt_e(values[1]),
        fmt_e(values[2])
    )
}

fn matrix_block(m: &Matrix3<f64>) -> String {
    let mut out = String::new();
    for i in 0..3 {
        let _ = writeln!(
            out,
            "[{}, {}, {}]",
            fmt_e(m[(i, 0)]),
            fmt_e(m[(i, 1)]),
            fmt_e(m[(i, 2)])
        );
    }
    out
}

fn section(out: &mut String, text: &str) {
    let _ = write!(out, "\n\n\n{}\n{}\n\n", text, "=".repeat(text.len()));
}

fn subsection(out: &mut String, text: &str, prespace: usize) {
    let _ = write!(
        out,
        "{}{}\n{}\n\n",
        "\n".repeat(prespace),
        text,
        "-".repeat(text.len())
    );
}

/// Renders the full report for one tensor.
///
/// The susceptibility tensor section is only populated when both the
/// spectrometer frequency and temperature are supplied.
pub fn tensor_report(
    tensor: &AlignTensor,
    frq: Option<f64>,
    temperature: Option<f64>,
) -> Result<String, TensorError> {
    let mut out = String::new();

    let [axx, ayy, axy, axz, ayz] = *tensor.require_params()?;
    let azz = -axx - ayy;
    let axxyy = axx - ayy;

    section(&mut out, &format!("Tensor '{}'", tensor.name));

    // The Saupe matrix.
    subsection(&mut out, "Saupe order matrix", 0);
    let s = [1.5 * axx, 1.5 * ayy, 1.5 * axy, 1.5 * axz, 1.5 * ayz];
    out.push_str("# 5D, rank-1 notation {Sxx, Syy, Sxy, Sxz, Syz}:\n");
    out.push_str(&five_d_line(s));
    out.push_str("# 5D, rank-1 notation {Szz, Sxx-yy, Sxy, Sxz, Syz} (the Pales default format).\n");
    out.push_str(&five_d_line([1.5 * azz, 1.5 * axxyy, s[2], s[3], s[4]]));
    out.push_str("# 3D, rank-2 notation.\n");
    out.push_str(&matrix_block(&tensor.saupe()?));

    // The alignment tensor.
    subsection(&mut out, "Alignment tensor", 2);
    out.push_str("# 5D, rank-1 notation {Axx, Ayy, Axy, Axz, Ayz}:\n");
    out.push_str(&five_d_line([axx, ayy, axy, axz, ayz]));
    out.push_str("# 5D, rank-1 notation {Azz, Axx-yy, Axy, Axz, Ayz} (the Pales default format).\n");
    out.push_str(&five_d_line([azz, axxyy, axy, axz, ayz]));
    out.push_str("# 3D, rank-2 notation.\n");
    out.push_str(&matrix_block(&tensor.tensor()?));

    // The probability tensor.
    subsection(&mut out, "Probability tensor", 2);
    let third = 1.0 / 3.0;
    out.push_str("# 5D, rank-1 notation {Pxx, Pyy, Pxy, Pxz, Pyz}:\n");
    out.push_str(&five_d_line([axx + third, ayy + third, axy, axz, ayz]));
    out.push_str("# 5D, rank-1 notation {Pzz, Pxx-yy, Pxy, Pxz, Pyz}.\n");
    out.push_str(&five_d_line([azz + third, axxyy, axy, axz, ayz]));
    out.push_str("# 3D, rank-2 notation.\n");
    out.push_str(&matrix_block(&tensor.probability()?));

    // The magnetic susceptibility tensor.
    subsection(&mut out, "Magnetic susceptibility tensor", 2);
    out.push_str("# The magnetic field strength (MHz):\n");
    match frq {
        Some(frq) => {
            let _ = writeln!(out, "{}\n", frq / 1e6);
        }
        None => out.push_str("Not set.\n\n"),
    }
    out.push_str("# The temperature (K):\n");
    match temperature {
        Some(t) => {
            let _ = writeln!(out, "{t}\n");
        }
        None => out.push_str("Not set.\n\n"),
    }

    let field_data = frq.zip(temperature);
    match field_data {
        None => out.push_str("# The chi tensor:\nN/A.\n"),
        Some((frq, t)) => {
            let factor = chi_factor(frq, t);
            out.push_str("# 5D, rank-1 notation {chi_xx, chi_yy, chi_xy, chi_xz, chi_yz}:\n");
            out.push_str(&five_d_line([
                factor * axx,
                factor * ayy,
                factor * axy,
                factor * axz,
                factor * ayz,
            ]));
            out.push_str("# 5D, rank-1 notation {chi_zz, chi_xx-yy, chi_xy, chi_xz, chi_yz}.\n");
            out.push_str(&five_d_line([
                factor * azz,
                factor * axxyy,
                factor * axy,
                factor * axz,
                factor * ayz,
            ]));
            out.push_str("# 3D, rank-2 notation.\n");
            out.push_str(&matrix_block(&tensor.chi_tensor(frq, t)?));
        }
    }

    // The irreducible weights.
    subsection(&mut out, "Irreducible spherical tensor coefficients", 2);
    out.push_str("# The spherical harmonic decomposition weights are:\n");
    out.push_str("#     A0 = (4pi/5)^(1/2) Szz,\n");
    out.push_str("#     A+/-1 = +/- (8pi/15)^(1/2)(Sxz +/- iSyz),\n");
    out.push_str("#     A+/-2 = (2pi/15)^(1/2)(Sxx - Syy +/- 2iSxy).\n");
    let [am2, am1, a0, a1, a2] = tensor.irreducible()?;
    let _ = writeln!(out, "A-2 =  {} {}i", fmt_e(am2.re), fmt_e(am2.im));
    let _ = writeln!(out, "A-1 =  {} {}i", fmt_e(am1.re), fmt_e(am1.im));
    let _ = writeln!(out, "A0  =  {}", fmt_e(a0.re));
    let _ = writeln!(out, "A1  =  {} {}i", fmt_e(a1.re), fmt_e(a1.im));
    let _ = writeln!(out, "A2  =  {} {}i", fmt_e(a2.re), fmt_e(a2.im));

    // The eigensystem.
    subsection(&mut out, "Eigensystem", 2);
    let eigvals = tensor.eigenvalues()?;
    out.push_str("# Saupe order matrix eigenvalues {Sxx, Syy, Szz}.\n");
    out.push_str(&three_d_line([1.5 * eigvals[0], 1.5 * eigvals[1], 1.5 * eigvals[2]]));
    out.push_str("# Alignment tensor eigenvalues {Axx, Ayy, Azz}.\n");
    out.push_str(&three_d_line(eigvals));
    out.push_str("# Probability tensor eigenvalues {Pxx, Pyy, Pzz}.\n");
    out.push_str(&three_d_line([
        eigvals[0] + third,
        eigvals[1] + third,
        eigvals[2] + third,
    ]));
    if let Some((frq, t)) = field_data {
        let factor = chi_factor(frq, t);
        out.push_str("# Magnetic susceptibility eigenvalues {chi_xx, chi_yy, chi_zz}.\n");
        out.push_str(&three_d_line([
            factor * eigvals[0],
            factor * eigvals[1],
            factor * eigvals[2],
        ]));
    }

    let [unit_x, unit_y, unit_z] = tensor.unit_axes()?;
    for (label, axis) in [("x", unit_x), ("y", unit_y), ("z", unit_z)] {
        let _ = writeln!(out, "# Eigenvector {label}.");
        let _ = writeln!(
            out,
            "[{}, {}, {}]\n",
            fmt_f(axis[0]),
            fmt_f(axis[1]),
            fmt_f(axis[2])
        );
    }

    out.push_str("# Rotation matrix.\n");
    out.push_str(&matrix_block(&tensor.rotation()?));
    out.push('\n');

    let (alpha, beta, gamma) = tensor.euler()?;
    out.push_str("# Euler angles in zyz notation {alpha, beta, gamma}.\n");
    let _ = writeln!(
        out,
        "[{}, {}, {}]\n",
        fmt_f(alpha),
        fmt_f(beta),
        fmt_f(gamma)
    );

    // Geometric description.
    subsection(&mut out, "Geometric description", 2);
    out.push_str("# Generalized degree of order (GDO).\n");
    let _ = writeln!(out, "GDO = {}\n", fmt_e_left(tensor.gdo()?));
    out.push_str(
        "# Alignment tensor axial component (Aa = 3/2 * Azz, where Aii are the eigenvalues).\n",
    );
    let _ = writeln!(out, "Aa = {}\n", fmt_e_left(tensor.aa()?));
    out.push_str("# Rhombic component (Ar = Axx - Ayy, where Aii are the eigenvalues).\n");
    let _ = writeln!(out, "Ar = {}\n", fmt_e_left(tensor.ar()?));
    out.push_str("# Rhombicity (R = Ar / Aa).\n");
    let _ = writeln!(out, "R = {}\n", fmt_f_left(tensor.rhombicity()?));
    out.push_str("# Asymmetry parameter (eta = (Axx - Ayy) / Azz, where Aii are the eigenvalues).\n");
    let _ = writeln!(out, "eta = {}\n", fmt_f_left(tensor.eta()?));

    if let Some((frq, t)) = field_data {
        let factor = chi_factor(frq, t);
        let chi_diag = [factor * eigvals[0], factor * eigvals[1], factor * eigvals[2]];
        out.push_str("# Magnetic susceptibility axial parameter (chi_ax = chi_zz - (chi_xx + chi_yy)/2, where chi_ii are the eigenvalues).\n");
        let _ = writeln!(
            out,
            "chi_ax = {}\n",
            fmt_e_left(chi_diag[2] - (chi_diag[0] + chi_diag[1]) / 2.0)
        );
        out.push_str("# Magnetic susceptibility rhombicity parameter (chi_rh = chi_xx - chi_yy, where chi_ii are the eigenvalues).\n");
        let _ = writeln!(out, "chi_rh = {}\n", fmt_e_left(chi_diag[0] - chi_diag[1]));
    }

    Ok(out)
}

/// Renders reports for one named tensor or, when `name` is `None`, for every
/// tensor in the context's registry.
pub fn display(context: &AnalysisContext, name: Option<&str>) -> Result<String, TensorError> {
    let Some(registry) = context.tensors.as_ref() else {
        return Err(TensorError::MissingData(
            name.unwrap_or("alignment").to_string(),
        ));
    };

    let mut out = String::new();
    for tensor in registry.iter() {
        if let Some(name) = name {
            if tensor.name != name {
                continue;
            }
        }
        let key = tensor.align_id.as_deref().unwrap_or(&tensor.name);
        let frq = context.spectrometer_frq.get(key).copied();
        let temperature = context.temperature.get(key).copied();
        out.push_str(&tensor_report(tensor, frq, temperature)?);
    }

    if out.is_empty() {
        return Err(TensorError::MissingData(
            name.unwrap_or("alignment").to_string(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: [f64; 5] = [-16.6278e-5, 6.13037e-5, 7.65639e-5, -1.89157e-5, 19.2561e-5];

    fn tensor() -> AlignTensor {
        let mut tensor = AlignTensor::new("Dy");
        tensor.set_params(PARAMS);
        tensor
    }

    #[test]
    fn scientific_format_matches_c_conventions() {
        assert_eq!(fmt_e(0.0), format!("{:>25}", "0.000000000000e+00"));
        assert_eq!(fmt_e(-1.5e-4), format!("{:>25}", "-1.500000000000e-04"));
        assert_eq!(fmt_e(2.0), format!("{:>25}", "2.000000000000e+00"));
        assert_eq!(fmt_e(f64::NAN), format!("{:>25}", "nan"));
    }

    #[test]
    fn fixed_format_is_25_wide_with_12_digits() {
        let s = fmt_f(1.5);
        assert_eq!(s.len(), 25);
        assert!(s.ends_with("1.500000000000"));
    }

    #[test]
    fn report_contains_all_sections() {
        let report = tensor_report(&tensor(), None, None).unwrap();
        for heading in [
            "Saupe order matrix",
            "Alignment tensor",
            "Probability tensor",
            "Magnetic susceptibility tensor",
            "Irreducible spherical tensor coefficients",
            "Eigensystem",
            "Geometric description",
        ] {
            assert!(report.contains(heading), "missing section '{heading}'");
        }
        assert!(report.contains("N/A."));
    }

    #[test]
    fn susceptibility_section_requires_frequency_and_temperature() {
        let partial = tensor_report(&tensor(), Some(600.0e6), None).unwrap();
        assert!(partial.contains("N/A."));

        let full = tensor_report(&tensor(), Some(600.0e6), Some(298.0)).unwrap();
        assert!(!full.contains("N/A."));
        assert!(full.contains("chi_ax ="));
        assert!(full.contains("chi_rh ="));
    }

    #[test]
    fn display_renders_every_registry_tensor() {
        let mut context = AnalysisContext::new();
        context.tensors_mut().add("Dy").set_params(PARAMS);
        context.tensors_mut().add("Tb").set_params(PARAMS);

        let all = display(&context, None).unwrap();
        assert!(all.contains("Tensor 'Dy'"));
        assert!(all.contains("Tensor 'Tb'"));

        let one = display(&context, Some("Tb")).unwrap();
        assert!(!one.contains("Tensor 'Dy'"));
    }

    #[test]
    fn display_of_unknown_tensor_is_an_error() {
        let mut context = AnalysisContext::new();
        context.tensors_mut().add("Dy").set_params(PARAMS);
        assert!(display(&context, Some("Er")).is_err());
    }
}
