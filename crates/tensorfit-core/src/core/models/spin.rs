//! Spin and interatomic pair containers holding the measured RDC data.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The unit the RDC value of a datum is expressed in.
///
/// `D` is the canonical internal representation. `TwoD` values are doubled
/// (as measured in certain experiments) and are halved on read and doubled
/// on write-out. `T` values are the composite splitting J + D and are
/// compared against back-calculated values with the scalar coupling added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RdcDataType {
    #[default]
    D,
    #[serde(rename = "2D")]
    TwoD,
    T,
}

/// One measured RDC for one spin pair under one alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct RdcDatum {
    /// The measured value in the canonical 'D' representation, in Hz.
    pub value: Option<f64>,
    pub error: Option<f64>,
    pub back_calc: Option<f64>,
    pub weight: f64,
    /// Whether only the absolute value of the coupling is known.
    pub absolute: bool,
    pub data_type: RdcDataType,
    /// Monte Carlo replicate values, in the canonical representation.
    pub sims: Vec<Option<f64>>,
}

impl Default for RdcDatum {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
            back_calc: None,
            weight: 1.0,
            absolute: false,
            data_type: RdcDataType::D,
            sims: Vec::new(),
        }
    }
}

impl RdcDatum {
    pub fn new(value: Option<f64>, error: Option<f64>) -> Self {
        Self {
            value,
            error,
            ..Default::default()
        }
    }
}

/// A single spin, possibly a pseudo-atom built from several members.
#[derive(Debug, Clone, PartialEq)]
pub struct Spin {
    pub id: String,
    pub isotope: Option<String>,
    /// Member spin IDs when this spin is a pseudo-atom.
    pub members: Option<Vec<String>>,
}

impl Spin {
    pub fn new(id: &str, isotope: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            isotope: isotope.map(str::to_string),
            members: None,
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.members.is_some()
    }
}

/// The interatomic container for one spin pair.
#[derive(Debug, Clone, PartialEq)]
pub struct InteratomicPair {
    pub spin_id1: String,
    pub spin_id2: String,
    /// Deselected pairs are excluded from all computation.
    pub select: bool,
    /// Unit bond vectors, one per ensemble structure.
    pub vectors: Option<Vec<Vector3<f64>>>,
    /// Internuclear distance in meters.
    pub r: Option<f64>,
    pub j_coupling: Option<f64>,
    /// RDC data keyed by alignment ID.
    pub rdc: HashMap<String, RdcDatum>,
}

impl InteratomicPair {
    pub fn new(spin_id1: &str, spin_id2: &str) -> Self {
        Self {
            spin_id1: spin_id1.to_string(),
            spin_id2: spin_id2.to_string(),
            select: true,
            vectors: None,
            r: None,
            j_coupling: None,
            rdc: HashMap::new(),
        }
    }

    pub fn matches(&self, id1: &str, id2: &str) -> bool {
        (self.spin_id1 == id1 && self.spin_id2 == id2)
            || (self.spin_id1 == id2 && self.spin_id2 == id1)
    }
}

/// Conversion factors between RDC representations. Values stored internally
/// are always 'D'; the factor maps external values to internal on read, and
/// its inverse applies on write-out.
pub fn unit_conversion_factor(data_type: RdcDataType) -> f64 {
    match data_type {
        RdcDataType::TwoD => 0.5,
        RdcDataType::D | RdcDataType::T => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_datum_defaults_to_unit_weight_and_d_type() {
        let datum = RdcDatum::new(Some(1.0), Some(0.1));
        assert_eq!(datum.weight, 1.0);
        assert_eq!(datum.data_type, RdcDataType::D);
        assert!(!datum.absolute);
    }

    #[test]
    fn pair_matching_is_order_insensitive() {
        let pair = InteratomicPair::new(":1@N", ":1@H");
        assert!(pair.matches(":1@N", ":1@H"));
        assert!(pair.matches(":1@H", ":1@N"));
        assert!(!pair.matches(":1@N", ":2@H"));
    }

    #[test]
    fn two_d_data_is_halved_on_read() {
        assert_eq!(unit_conversion_factor(RdcDataType::TwoD), 0.5);
        assert_eq!(unit_conversion_factor(RdcDataType::D), 1.0);
        assert_eq!(unit_conversion_factor(RdcDataType::T), 1.0);
    }
}
