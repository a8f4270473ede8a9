//! The TOML system definition.
//!
//! A dataset file declares everything about the molecular system that is not
//! measured data: the spins and their isotopes, the interatomic pairs with
//! their bond vectors and distances, and the alignments with their optional
//! experimental conditions. Measured RDCs are kept in separate tabular files
//! (see [`super::table`]) and referenced per alignment by the front end.

use crate::core::models::context::AnalysisContext;
use crate::core::models::spin::{InteratomicPair, Spin};
use nalgebra::Vector3;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Cannot read dataset file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse dataset file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Pair '{spin_id1}'-'{spin_id2}' references an undeclared spin '{spin_id}'")]
    UnknownSpin {
        spin_id1: String,
        spin_id2: String,
        spin_id: String,
    },

    #[error("Pair '{spin_id1}'-'{spin_id2}' has a zero-length bond vector")]
    ZeroVector { spin_id1: String, spin_id2: String },
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct SpinDef {
    id: String,
    isotope: Option<String>,
    /// Member spin IDs when this spin is a pseudo-atom.
    members: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PairDef {
    spin1: String,
    spin2: String,
    /// Internuclear distance in meters.
    r: Option<f64>,
    j_coupling: Option<f64>,
    /// Bond vectors, one per ensemble structure; normalised on load.
    vectors: Option<Vec<[f64; 3]>>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct AlignmentDef {
    id: String,
    domain: Option<String>,
    #[serde(default)]
    fixed: bool,
    /// Initial canonical parameters {Axx, Ayy, Axy, Axz, Ayz}.
    params: Option<[f64; 5]>,
    /// Proton spectrometer frequency in Hz.
    frequency: Option<f64>,
    /// Sample temperature in K.
    temperature: Option<f64>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct DatasetFile {
    /// Paramagnetic centre position in meters, for lanthanide systems.
    paramag_centre: Option<[f64; 3]>,
    #[serde(default)]
    spins: Vec<SpinDef>,
    #[serde(default)]
    pairs: Vec<PairDef>,
    #[serde(default)]
    alignments: Vec<AlignmentDef>,
}

/// Parses a dataset definition and populates the context from it.
pub fn load_str(context: &mut AnalysisContext, text: &str) -> Result<(), DatasetError> {
    let file: DatasetFile = toml::from_str(text)?;

    for def in &file.spins {
        let mut spin = Spin::new(&def.id, def.isotope.as_deref());
        spin.members = def.members.clone();
        context.spins.push(spin);
    }

    for def in &file.pairs {
        for id in [&def.spin1, &def.spin2] {
            if context.spin(id).is_none() {
                return Err(DatasetError::UnknownSpin {
                    spin_id1: def.spin1.clone(),
                    spin_id2: def.spin2.clone(),
                    spin_id: id.clone(),
                });
            }
        }
        let mut pair = InteratomicPair::new(&def.spin1, &def.spin2);
        pair.r = def.r;
        pair.j_coupling = def.j_coupling;
        if let Some(vectors) = &def.vectors {
            let mut unit = Vec::with_capacity(vectors.len());
            for v in vectors {
                let v = Vector3::new(v[0], v[1], v[2]);
                let norm = v.norm();
                if norm == 0.0 {
                    return Err(DatasetError::ZeroVector {
                        spin_id1: def.spin1.clone(),
                        spin_id2: def.spin2.clone(),
                    });
                }
                unit.push(v / norm);
            }
            pair.vectors = Some(unit);
        }
        context.pairs.push(pair);
    }

    for def in &file.alignments {
        context.add_align_id(&def.id);
        let tensor = context.tensors_mut().add(&def.id);
        tensor.align_id = Some(def.id.clone());
        tensor.domain = def.domain.clone();
        tensor.fixed = def.fixed;
        if let Some(params) = def.params {
            tensor.set_params(params);
        }
        if let Some(frq) = def.frequency {
            context.spectrometer_frq.insert(def.id.clone(), frq);
        }
        if let Some(temperature) = def.temperature {
            context.temperature.insert(def.id.clone(), temperature);
        }
    }

    if let Some(centre) = file.paramag_centre {
        context.paramag_centre = Some(Vector3::new(centre[0], centre[1], centre[2]));
    }

    Ok(())
}

/// Reads and applies a dataset definition file.
pub fn load_file(context: &mut AnalysisContext, path: &Path) -> Result<(), DatasetError> {
    let text = fs::read_to_string(path)?;
    load_str(context, &text)
}
