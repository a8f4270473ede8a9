//! The analysis context.
//!
//! All registry and data-store operations act on an explicit
//! `AnalysisContext` passed by reference, rather than process-wide state.
//! One context corresponds to one analysis "pipe": one tensor registry, one
//! set of spins and interatomic pairs, one model configuration, and the
//! optimisation statistics of the most recent fit.

use super::registry::TensorRegistry;
use super::spin::{InteratomicPair, Spin};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The N-state model type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    /// Two rigid-body domains related by per-state rotations.
    TwoDomain,
    /// Flexible ensemble with optimised state populations.
    Population,
    /// Fixed ensemble, tensors only.
    Fixed,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::TwoDomain => write!(f, "2-domain"),
            ModelType::Population => write!(f, "population"),
            ModelType::Fixed => write!(f, "fixed"),
        }
    }
}

/// Statistics stored after a grid search or minimisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptStats {
    pub chi2: Option<f64>,
    pub iterations: usize,
    pub f_count: usize,
    pub g_count: usize,
    pub h_count: usize,
    pub warning: Option<String>,
}

/// The explicit analysis context ("pipe").
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    /// The tensor registry; dropped entirely when its last tensor is deleted.
    pub tensors: Option<TensorRegistry>,

    pub align_ids: Vec<String>,
    pub rdc_ids: Vec<String>,
    pub pcs_ids: Vec<String>,

    pub spins: Vec<Spin>,
    pub pairs: Vec<InteratomicPair>,

    pub model: Option<ModelType>,
    pub n_states: Option<usize>,
    /// Optimised state populations, length N.
    pub probs: Option<Vec<f64>>,
    /// Standard deviations of the populations over simulation replicates.
    pub probs_errors: Option<Vec<f64>>,
    /// Monte Carlo replicate copies of the populations.
    pub probs_sims: Vec<Vec<f64>>,
    pub ref_domain: Option<String>,

    /// Per-state domain rotations as zyz Euler angles, 2-domain model only.
    pub state_euler: Vec<(f64, f64, f64)>,
    /// Monte Carlo replicate copies of the per-state rotations.
    pub state_euler_sims: Vec<Vec<(f64, f64, f64)>>,

    pub paramag_centre: Option<Vector3<f64>>,
    pub paramag_centre_fixed: bool,
    /// Monte Carlo replicate copies of an optimised paramagnetic centre.
    pub paramag_centre_sims: Vec<Vector3<f64>>,

    /// Proton spectrometer frequencies in Hz, keyed by alignment ID.
    pub spectrometer_frq: HashMap<String, f64>,
    /// Sample temperatures in K, keyed by alignment ID.
    pub temperature: HashMap<String, f64>,

    pub stats: OptStats,
    /// The Monte Carlo replicate count, set by the simulation setup.
    pub sim_number: Option<usize>,
    /// Per-replicate statistics from Monte Carlo simulation fits.
    pub sim_stats: Vec<OptStats>,

    /// RDC Q-factor with the tensor-derived normalisation, per alignment.
    pub q_rdc: HashMap<String, f64>,
    /// RDC Q-factor normalised by the sum of squared measured values.
    pub q_rdc_norm2: HashMap<String, f64>,
    /// The RMS aggregates over all alignments.
    pub q_rdc_total: Option<f64>,
    pub q_rdc_norm2_total: Option<f64>,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self {
            paramag_centre_fixed: true,
            ..Default::default()
        }
    }

    /// The registry, created on first use.
    pub fn tensors_mut(&mut self) -> &mut TensorRegistry {
        self.tensors.get_or_insert_with(TensorRegistry::new)
    }

    /// Drops the registry if it has emptied.
    pub fn prune_registry(&mut self) {
        if self.tensors.as_ref().is_some_and(|r| r.is_empty()) {
            self.tensors = None;
        }
    }

    pub fn spin(&self, id: &str) -> Option<&Spin> {
        self.spins.iter().find(|s| s.id == id)
    }

    pub fn pair(&self, id1: &str, id2: &str) -> Option<&InteratomicPair> {
        self.pairs.iter().find(|p| p.matches(id1, id2))
    }

    pub fn pair_mut(&mut self, id1: &str, id2: &str) -> Option<&mut InteratomicPair> {
        self.pairs.iter_mut().find(|p| p.matches(id1, id2))
    }

    pub fn add_align_id(&mut self, align_id: &str) {
        if !self.align_ids.iter().any(|id| id == align_id) {
            self.align_ids.push(align_id.to_string());
        }
    }

    pub fn add_rdc_id(&mut self, align_id: &str) {
        self.add_align_id(align_id);
        if !self.rdc_ids.iter().any(|id| id == align_id) {
            self.rdc_ids.push(align_id.to_string());
        }
    }

    /// Copies all RDC data for one alignment ID from another context.
    ///
    /// Returns the number of data points copied. Pairs present in the source
    /// but absent here are skipped with a warning.
    pub fn copy_rdc(&mut self, source: &AnalysisContext, align_id: &str) -> usize {
        let mut count = 0;
        for pair in &source.pairs {
            let Some(datum) = pair.rdc.get(align_id) else {
                continue;
            };
            let Some(dest) = self.pair_mut(&pair.spin_id1, &pair.spin_id2) else {
                tracing::warn!(
                    spin_id1 = %pair.spin_id1,
                    spin_id2 = %pair.spin_id2,
                    "no interatomic pair in the destination, skipping its RDC data"
                );
                continue;
            };
            dest.rdc.insert(align_id.to_string(), datum.clone());
            count += 1;
        }
        if count > 0 {
            self.add_rdc_id(align_id);
        }
        count
    }

    /// Removes all RDC data for one alignment ID. The ID itself is removed
    /// from the alignment list only if no PCS data still references it.
    pub fn delete_rdc(&mut self, align_id: &str) {
        for pair in &mut self.pairs {
            pair.rdc.remove(align_id);
        }
        self.rdc_ids.retain(|id| id != align_id);
        if !self.pcs_ids.iter().any(|id| id == align_id) {
            self.align_ids.retain(|id| id != align_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::spin::RdcDatum;

    #[test]
    fn model_type_display_matches_user_facing_names() {
        assert_eq!(ModelType::TwoDomain.to_string(), "2-domain");
        assert_eq!(ModelType::Population.to_string(), "population");
        assert_eq!(ModelType::Fixed.to_string(), "fixed");
    }

    #[test]
    fn registry_is_created_on_first_use_and_pruned_when_empty() {
        let mut context = AnalysisContext::new();
        assert!(context.tensors.is_none());

        context.tensors_mut().add("Dy");
        assert!(context.tensors.is_some());

        context.tensors_mut().delete("Dy").unwrap();
        context.prune_registry();
        assert!(context.tensors.is_none());
    }

    #[test]
    fn delete_rdc_keeps_align_id_while_pcs_data_remains() {
        let mut context = AnalysisContext::new();
        context.add_rdc_id("Dy");
        context.pcs_ids.push("Dy".to_string());

        let mut pair = InteratomicPair::new(":1@N", ":1@H");
        pair.rdc.insert("Dy".to_string(), RdcDatum::new(Some(1.0), Some(0.1)));
        context.pairs.push(pair);

        context.delete_rdc("Dy");
        assert!(context.pairs[0].rdc.is_empty());
        assert!(context.rdc_ids.is_empty());
        assert_eq!(context.align_ids, vec!["Dy".to_string()]);

        context.pcs_ids.clear();
        context.add_rdc_id("Dy");
        context.delete_rdc("Dy");
        assert!(context.align_ids.is_empty());
    }

    #[test]
    fn copy_rdc_moves_only_matching_pairs() {
        let mut source = AnalysisContext::new();
        source.add_rdc_id("Dy");
        for ids in [(":1@N", ":1@H"), (":2@N", ":2@H")] {
            let mut pair = InteratomicPair::new(ids.0, ids.1);
            pair.rdc.insert("Dy".to_string(), RdcDatum::new(Some(2.5), Some(0.2)));
            source.pairs.push(pair);
        }

        let mut dest = AnalysisContext::new();
        dest.pairs.push(InteratomicPair::new(":1@N", ":1@H"));

        let count = dest.copy_rdc(&source, "Dy");
        assert_eq!(count, 1);
        assert_eq!(dest.rdc_ids, vec!["Dy".to_string()]);
        assert_eq!(dest.pairs[0].rdc["Dy"].value, Some(2.5));
    }

    #[test]
    fn paramagnetic_centre_is_fixed_by_default() {
        let context = AnalysisContext::new();
        assert!(context.paramag_centre_fixed);
        assert!(context.paramag_centre.is_none());
    }
}
