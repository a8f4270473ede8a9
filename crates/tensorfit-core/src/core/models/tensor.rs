//! The alignment tensor data container.
//!
//! One `AlignTensor` holds the canonical 5-parameter representation
//! {Axx, Ayy, Axy, Axz, Ayz} of a rank-2, symmetric, traceless 3x3 tensor
//! for one alignment medium, together with per-parameter error estimates and
//! Monte Carlo simulation replicates. Every other form (Saupe matrix,
//! probability tensor, irreducible components, eigensystem, geometric
//! descriptors) is derived on demand and can never go stale.

use crate::core::constants::chi_factor;
use crate::core::math::basis;
use crate::core::math::euler;
use nalgebra::{Complex, Matrix3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TensorError {
    #[error("The alignment tensor parameter '{0}' is derived and cannot be set directly")]
    DerivedParameter(String),

    #[error("Unknown alignment tensor parameter '{0}'")]
    UnknownParameter(String),

    #[error("Unknown {set_type} combination {names:?}")]
    UnknownParamCombination {
        set_type: &'static str,
        names: Vec<String>,
    },

    #[error("The value count {values} does not match the parameter count {names}")]
    CountMismatch { names: usize, values: usize },

    #[error("The alignment tensor '{0}' has no parameter values")]
    MissingData(String),

    #[error("The simulation replicate count for tensor '{0}' has already been set")]
    SimCountAlreadySet(String),

    #[error("The simulation replicate count for tensor '{0}' has not been set")]
    SimCountUnset(String),

    #[error("Simulation replicate index {index} is out of range for {count} replicates")]
    SimIndexOutOfRange { index: usize, count: usize },

    #[error(
        "The spectrometer frequency or temperature needed for the susceptibility tensor of '{0}' is not set"
    )]
    MissingFieldData(String),
}

/// Whether a set operation writes parameter values or their error estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Value,
    Error,
}

/// A rank-2, symmetric, traceless alignment tensor for one alignment medium.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignTensor {
    pub name: String,
    pub align_id: Option<String>,
    pub domain: Option<String>,
    pub fixed: bool,
    params: Option<[f64; 5]>,
    errors: Option<[f64; 5]>,
    sims: Option<Vec<Option<[f64; 5]>>>,
    euler_override: Option<(f64, f64, f64)>,
    euler_sims: Option<Vec<Option<(f64, f64, f64)>>>,
}

impl AlignTensor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            align_id: None,
            domain: None,
            fixed: false,
            params: None,
            errors: None,
            sims: None,
            euler_override: None,
            euler_sims: None,
        }
    }

    /// The canonical parameters {Axx, Ayy, Axy, Axz, Ayz}, if initialised.
    pub fn params(&self) -> Option<&[f64; 5]> {
        self.params.as_ref()
    }

    pub fn errors(&self) -> Option<&[f64; 5]> {
        self.errors.as_ref()
    }

    pub fn require_params(&self) -> Result<&[f64; 5], TensorError> {
        self.params
            .as_ref()
            .ok_or_else(|| TensorError::MissingData(self.name.clone()))
    }

    /// Overwrites all five canonical parameters at once.
    pub fn set_params(&mut self, params: [f64; 5]) {
        self.params = Some(params);
        self.euler_override = None;
    }

    pub fn set_errors(&mut self, errors: [f64; 5]) {
        self.errors = Some(errors);
    }

    /// Returns the tensor to the uninitialized state.
    pub fn clear_params(&mut self) {
        self.params = None;
        self.euler_override = None;
    }

    /// Sets tensor parameters from any recognized basis.
    ///
    /// `names` must be either a single settable component, one of the six
    /// recognized geometric 5-tuples, or a subset of the orientation set
    /// {alpha, beta, gamma}. Validation is completed before any mutation, so
    /// a failed call leaves the tensor untouched.
    pub fn set(
        &mut self,
        names: &[&str],
        values: &[f64],
        category: Category,
    ) -> Result<(), TensorError> {
        if names.len() != values.len() {
            return Err(TensorError::CountMismatch {
                names: names.len(),
                values: values.len(),
            });
        }

        let mut geo_names = Vec::new();
        let mut geo_values = Vec::new();
        let mut orient_names = Vec::new();
        let mut orient_values = Vec::new();

        for (i, &name) in names.iter().enumerate() {
            if GEO_PARAMS.contains(&name) {
                geo_names.push(name);
                geo_values.push(values[i]);
            } else if ORIENT_PARAMS.contains(&name) {
                orient_names.push(name);
                orient_values.push(values[i]);
            } else {
                return Err(TensorError::UnknownParameter(name.to_string()));
            }
        }

        if !geo_names.is_empty() {
            self.set_geometric(&geo_names, &geo_values, category)?;
        }
        if !orient_names.is_empty() {
            self.set_orientation(&orient_names, &orient_values)?;
        }

        Ok(())
    }

    fn set_geometric(
        &mut self,
        names: &[&str],
        values: &[f64],
        category: Category,
    ) -> Result<(), TensorError> {
        match names.len() {
            1 => self.set_single(names[0], values[0], category),
            5 => {
                let canonical = canonical_from_combination(names, values)?;
                match category {
                    Category::Value => self.set_params(canonical),
                    Category::Error => self.errors = Some(canonical),
                }
                Ok(())
            }
            _ => Err(TensorError::UnknownParamCombination {
                set_type: "geometric parameter set",
                names: names.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    fn set_single(
        &mut self,
        name: &str,
        value: f64,
        category: Category,
    ) -> Result<(), TensorError> {
        // Derived components can never be assigned on their own.
        if matches!(name, "Szz" | "Sxxyy" | "Azz" | "Axxyy" | "Pzz" | "Pxxyy") {
            return Err(TensorError::DerivedParameter(name.to_string()));
        }

        let (index, canonical_value) = match name {
            "Axx" => (0, value),
            "Ayy" => (1, value),
            "Axy" => (2, value),
            "Axz" => (3, value),
            "Ayz" => (4, value),
            "Sxx" => (0, 2.0 / 3.0 * value),
            "Syy" => (1, 2.0 / 3.0 * value),
            "Sxy" => (2, 2.0 / 3.0 * value),
            "Sxz" => (3, 2.0 / 3.0 * value),
            "Syz" => (4, 2.0 / 3.0 * value),
            "Pxx" => (0, value - 1.0 / 3.0),
            "Pyy" => (1, value - 1.0 / 3.0),
            "Pxy" => (2, value),
            "Pxz" => (3, value),
            "Pyz" => (4, value),
            other => return Err(TensorError::UnknownParameter(other.to_string())),
        };

        match category {
            Category::Value => {
                let mut params = self.params.unwrap_or([0.0; 5]);
                params[index] = canonical_value;
                self.set_params(params);
            }
            Category::Error => {
                let mut errors = self.errors.unwrap_or([0.0; 5]);
                errors[index] = canonical_value;
                self.errors = Some(errors);
            }
        }
        Ok(())
    }

    fn set_orientation(&mut self, names: &[&str], values: &[f64]) -> Result<(), TensorError> {
        // Duplicate names form an unknown combination.
        let mut seen = Vec::new();
        for &name in names {
            if seen.contains(&name) {
                return Err(TensorError::UnknownParamCombination {
                    set_type: "orientational parameter set",
                    names: names.iter().map(|s| s.to_string()).collect(),
                });
            }
            seen.push(name);
        }

        let mut angles = self
            .euler_override
            .or_else(|| self.euler().ok())
            .unwrap_or((0.0, 0.0, 0.0));

        for (i, &name) in names.iter().enumerate() {
            match name {
                "alpha" => angles.0 = values[i],
                "beta" => angles.1 = values[i],
                "gamma" => angles.2 = values[i],
                other => return Err(TensorError::UnknownParameter(other.to_string())),
            }
        }

        self.euler_override = Some(angles);
        Ok(())
    }

    /// The full 3x3 alignment tensor form.
    pub fn tensor(&self) -> Result<Matrix3<f64>, TensorError> {
        Ok(basis::matrix_form(self.require_params()?))
    }

    /// The Saupe order matrix S = 3/2 A.
    pub fn saupe(&self) -> Result<Matrix3<f64>, TensorError> {
        Ok(basis::saupe_matrix(self.require_params()?))
    }

    /// The probability tensor P = A + I/3.
    pub fn probability(&self) -> Result<Matrix3<f64>, TensorError> {
        Ok(basis::probability_matrix(self.require_params()?))
    }

    /// The irreducible spherical components {A-2, A-1, A0, A1, A2}.
    pub fn irreducible(&self) -> Result<[Complex<f64>; 5], TensorError> {
        Ok(basis::irreducible(self.require_params()?))
    }

    /// The eigenvalues sorted into |Axx'| <= |Ayy'| <= |Azz'| order.
    pub fn eigenvalues(&self) -> Result<[f64; 3], TensorError> {
        Ok(basis::sorted_eigenvalues(&self.tensor()?))
    }

    /// The rotation matrix from the molecular frame to the tensor frame.
    pub fn rotation(&self) -> Result<Matrix3<f64>, TensorError> {
        Ok(basis::rotation(&self.tensor()?))
    }

    /// The unit eigenvectors as the columns of the rotation matrix.
    pub fn unit_axes(&self) -> Result<[Vector3<f64>; 3], TensorError> {
        let rot = self.rotation()?;
        Ok([
            rot.column(0).into_owned(),
            rot.column(1).into_owned(),
            rot.column(2).into_owned(),
        ])
    }

    /// The zyz Euler angles, either the explicitly set (folded) values or the
    /// angles derived from the eigenframe rotation.
    pub fn euler(&self) -> Result<(f64, f64, f64), TensorError> {
        if let Some(angles) = self.euler_override {
            return Ok(angles);
        }
        Ok(euler::euler_zyz(&self.rotation()?))
    }

    /// Replaces the derived Euler angles, used by angle folding.
    pub fn set_euler(&mut self, angles: (f64, f64, f64)) {
        self.euler_override = Some(angles);
    }

    /// The anisotropic parameter Aa = 3/2 Azz'.
    pub fn aa(&self) -> Result<f64, TensorError> {
        Ok(basis::anisotropy(&self.eigenvalues()?))
    }

    /// The rhombic parameter Ar = Axx' - Ayy'.
    pub fn ar(&self) -> Result<f64, TensorError> {
        Ok(basis::rhombic(&self.eigenvalues()?))
    }

    /// The asymmetry parameter eta.
    pub fn eta(&self) -> Result<f64, TensorError> {
        Ok(basis::asymmetry(&self.eigenvalues()?))
    }

    /// The rhombicity R = Ar / Aa.
    pub fn rhombicity(&self) -> Result<f64, TensorError> {
        Ok(basis::rhombicity(self.aa()?, self.ar()?))
    }

    /// The generalized degree of order.
    pub fn gdo(&self) -> Result<f64, TensorError> {
        Ok(basis::gdo(self.require_params()?))
    }

    /// The magnetic susceptibility tensor for the given proton spectrometer
    /// frequency (Hz) and temperature (K).
    pub fn chi_tensor(&self, frq: f64, temperature: f64) -> Result<Matrix3<f64>, TensorError> {
        Ok(self.tensor()? * chi_factor(frq, temperature))
    }

    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Fixes the simulation replicate count. May only be called once.
    pub fn set_sim_count(&mut self, count: usize) -> Result<(), TensorError> {
        if self.sims.is_some() {
            return Err(TensorError::SimCountAlreadySet(self.name.clone()));
        }
        self.sims = Some(vec![None; count]);
        self.euler_sims = Some(vec![None; count]);
        Ok(())
    }

    pub fn sim_count(&self) -> Option<usize> {
        self.sims.as_ref().map(|s| s.len())
    }

    pub fn set_sim_params(&mut self, index: usize, params: [f64; 5]) -> Result<(), TensorError> {
        let sims = self
            .sims
            .as_mut()
            .ok_or_else(|| TensorError::SimCountUnset(self.name.clone()))?;
        let count = sims.len();
        let slot = sims
            .get_mut(index)
            .ok_or(TensorError::SimIndexOutOfRange { index, count })?;
        *slot = Some(params);
        Ok(())
    }

    pub fn sim_params(&self, index: usize) -> Result<Option<&[f64; 5]>, TensorError> {
        let sims = self
            .sims
            .as_ref()
            .ok_or_else(|| TensorError::SimCountUnset(self.name.clone()))?;
        let count = sims.len();
        sims.get(index)
            .map(|s| s.as_ref())
            .ok_or(TensorError::SimIndexOutOfRange { index, count })
    }

    /// The zyz Euler angles of one simulation replicate, derived from the
    /// replicate parameters unless folding stored explicit values.
    pub fn sim_euler(&self, index: usize) -> Result<Option<(f64, f64, f64)>, TensorError> {
        if let Some(stored) = self.euler_sims.as_ref().and_then(|e| e.get(index)) {
            if stored.is_some() {
                return Ok(*stored);
            }
        }
        match self.sim_params(index)? {
            Some(params) => Ok(Some(euler::euler_zyz(&basis::rotation(
                &basis::matrix_form(params),
            )))),
            None => Ok(None),
        }
    }

    pub fn set_sim_euler(
        &mut self,
        index: usize,
        angles: (f64, f64, f64),
    ) -> Result<(), TensorError> {
        let sims = self
            .euler_sims
            .as_mut()
            .ok_or_else(|| TensorError::SimCountUnset(self.name.clone()))?;
        let count = sims.len();
        let slot = sims
            .get_mut(index)
            .ok_or(TensorError::SimIndexOutOfRange { index, count })?;
        *slot = Some(angles);
        Ok(())
    }
}

const GEO_PARAMS: [&str; 21] = [
    "Sxx", "Syy", "Szz", "Sxxyy", "Sxy", "Sxz", "Syz", "Axx", "Ayy", "Azz", "Axxyy", "Axy",
    "Axz", "Ayz", "Pxx", "Pyy", "Pzz", "Pxxyy", "Pxy", "Pxz", "Pyz",
];

const ORIENT_PARAMS: [&str; 3] = ["alpha", "beta", "gamma"];

/// Validates a 5-name geometric combination and converts the values to the
/// canonical parameters. The recognized combinations are the full and
/// geometric variants of the Saupe, alignment, and probability bases.
fn canonical_from_combination(names: &[&str], values: &[f64]) -> Result<[f64; 5], TensorError> {
    let pick = |wanted: [&str; 5]| -> Option<[f64; 5]> {
        if !wanted.iter().all(|w| names.contains(w)) {
            return None;
        }
        let mut out = [0.0; 5];
        for (slot, w) in wanted.iter().enumerate() {
            let i = names.iter().position(|n| n == w)?;
            out[slot] = values[i];
        }
        Some(out)
    };

    if let Some(v) = pick(["Sxx", "Syy", "Sxy", "Sxz", "Syz"]) {
        return Ok(basis::from_saupe(&v));
    }
    if let Some(v) = pick(["Szz", "Sxxyy", "Sxy", "Sxz", "Syz"]) {
        return Ok(basis::from_saupe_geometric(&v));
    }
    if let Some(v) = pick(["Axx", "Ayy", "Axy", "Axz", "Ayz"]) {
        return Ok(v);
    }
    if let Some(v) = pick(["Azz", "Axxyy", "Axy", "Axz", "Ayz"]) {
        return Ok(basis::from_align_geometric(&v));
    }
    if let Some(v) = pick(["Pxx", "Pyy", "Pxy", "Pxz", "Pyz"]) {
        return Ok(basis::from_probability(&v));
    }
    if let Some(v) = pick(["Pzz", "Pxxyy", "Pxy", "Pxz", "Pyz"]) {
        return Ok(basis::from_probability_geometric(&v));
    }

    Err(TensorError::UnknownParamCombination {
        set_type: "geometric parameter set",
        names: names.iter().map(|s| s.to_string()).collect(),
    })
}
