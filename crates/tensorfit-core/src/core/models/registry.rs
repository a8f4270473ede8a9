//! The ordered, name-unique collection of alignment tensors for one analysis
//! context, together with the full-to-reduced domain reduction pairs.

use super::tensor::AlignTensor;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("No alignment tensor named '{0}' exists")]
    TensorNotFound(String),

    #[error("An alignment tensor named '{0}' already exists in the destination")]
    DuplicateTensor(String),

    #[error("The alignment ID '{align_id}' matches {count} tensors, a unique match is required")]
    AmbiguousAlignId { align_id: String, count: usize },

    #[error("The source has no alignment tensor data")]
    NoTensorData,

    #[error("Tensor index {index} is out of range for {count} tensors")]
    IndexOutOfRange { index: usize, count: usize },
}

/// An append-ordered registry of alignment tensors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorRegistry {
    tensors: Vec<AlignTensor>,
    /// (full_tensor_index, reduced_tensor_index) domain reduction pairs.
    reduction: Vec<(usize, usize)>,
}

impl TensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlignTensor> {
        self.tensors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AlignTensor> {
        self.tensors.iter_mut()
    }

    /// Adds a tensor under `name`, returning the existing one when the name
    /// is already present.
    pub fn add(&mut self, name: &str) -> &mut AlignTensor {
        match self.position(name) {
            Some(pos) => &mut self.tensors[pos],
            None => {
                self.tensors.push(AlignTensor::new(name));
                let last = self.tensors.len() - 1;
                &mut self.tensors[last]
            }
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.tensors.iter().position(|t| t.name == name)
    }

    pub fn get(&self, name: &str) -> Result<&AlignTensor, RegistryError> {
        self.tensors
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::TensorNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut AlignTensor, RegistryError> {
        self.tensors
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::TensorNotFound(name.to_string()))
    }

    pub fn by_index(&self, index: usize) -> Result<&AlignTensor, RegistryError> {
        let count = self.tensors.len();
        self.tensors
            .get(index)
            .ok_or(RegistryError::IndexOutOfRange { index, count })
    }

    /// Resolves a tensor by its experimental alignment ID.
    ///
    /// More than one match is an ambiguity error; zero matches return `None`
    /// after logging a warning, since some callers treat this as a skip.
    pub fn by_align_id(&self, align_id: &str) -> Result<Option<&AlignTensor>, RegistryError> {
        let matches: Vec<&AlignTensor> = self
            .tensors
            .iter()
            .filter(|t| t.align_id.as_deref() == Some(align_id))
            .collect();

        match matches.len() {
            0 => {
                warn!(align_id, "no alignment tensor matches the alignment ID");
                Ok(None)
            }
            1 => Ok(Some(matches[0])),
            count => Err(RegistryError::AmbiguousAlignId {
                align_id: align_id.to_string(),
                count,
            }),
        }
    }

    /// Removes the named tensor and drops any reduction pairs referencing it.
    pub fn delete(&mut self, name: &str) -> Result<(), RegistryError> {
        let index = self
            .position(name)
            .ok_or_else(|| RegistryError::TensorNotFound(name.to_string()))?;
        self.tensors.remove(index);

        self.reduction.retain(|&(full, red)| full != index && red != index);
        for pair in &mut self.reduction {
            if pair.0 > index {
                pair.0 -= 1;
            }
            if pair.1 > index {
                pair.1 -= 1;
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.tensors.clear();
        self.reduction.clear();
    }

    /// The number of tensors, optionally skipping those marked fixed.
    pub fn count(&self, skip_fixed: bool) -> usize {
        self.tensors
            .iter()
            .filter(|t| !(skip_fixed && t.fixed))
            .count()
    }

    pub fn set_domain(&mut self, name: &str, domain: &str) -> Result<(), RegistryError> {
        self.get_mut(name)?.domain = Some(domain.to_string());
        Ok(())
    }

    /// Records a full-to-reduced domain reduction relationship by tensor name.
    pub fn set_reduction(&mut self, full: &str, reduced: &str) -> Result<(), RegistryError> {
        let full_index = self
            .position(full)
            .ok_or_else(|| RegistryError::TensorNotFound(full.to_string()))?;
        let reduced_index = self
            .position(reduced)
            .ok_or_else(|| RegistryError::TensorNotFound(reduced.to_string()))?;
        self.reduction.push((full_index, reduced_index));
        Ok(())
    }

    pub fn reduction_pairs(&self) -> &[(usize, usize)] {
        &self.reduction
    }

    /// Iterates the reduction pairs, yielding the reduced member of each pair
    /// when `red` is true and the full member otherwise.
    pub fn tensor_loop(&self, red: bool) -> impl Iterator<Item = &AlignTensor> {
        self.reduction.iter().map(move |&(full, reduced)| {
            let index = if red { reduced } else { full };
            &self.tensors[index]
        })
    }

    /// Copies one tensor (or all, when `name` is `None`) from `source`.
    ///
    /// Fails if the source holds no data for the request or if a destination
    /// tensor of the same name already exists.
    pub fn copy_from(
        &mut self,
        source: &TensorRegistry,
        name: Option<&str>,
    ) -> Result<(), RegistryError> {
        let to_copy: Vec<&AlignTensor> = match name {
            Some(name) => vec![source.get(name)?],
            None => {
                if source.is_empty() {
                    return Err(RegistryError::NoTensorData);
                }
                source.iter().collect()
            }
        };

        for tensor in &to_copy {
            if self.position(&tensor.name).is_some() {
                return Err(RegistryError::DuplicateTensor(tensor.name.clone()));
            }
        }
        for tensor in to_copy {
            self.tensors.push(tensor.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> TensorRegistry {
        let mut registry = TensorRegistry::new();
        for name in names {
            registry.add(name).set_params([1.0, 2.0, 3.0, 4.0, 5.0]);
        }
        registry
    }

    #[test]
    fn add_is_idempotent_for_existing_names() {
        let mut registry = registry_with(&["full", "red"]);
        registry.add("full");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn count_skips_fixed_tensors_on_request() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.get_mut("b").unwrap().set_fixed(true);
        assert_eq!(registry.count(false), 3);
        assert_eq!(registry.count(true), 2);
    }

    #[test]
    fn by_align_id_requires_a_unique_match() {
        let mut registry = registry_with(&["a", "b"]);
        registry.get_mut("a").unwrap().align_id = Some("Dy".to_string());
        assert_eq!(
            registry.by_align_id("Dy").unwrap().unwrap().name,
            "a".to_string()
        );
        assert_eq!(registry.by_align_id("Tb").unwrap(), None);

        registry.get_mut("b").unwrap().align_id = Some("Dy".to_string());
        assert_eq!(
            registry.by_align_id("Dy").unwrap_err(),
            RegistryError::AmbiguousAlignId {
                align_id: "Dy".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn tensor_loop_yields_reduction_members_in_declaration_order() {
        let mut registry = registry_with(&["full_a", "red_a", "full_b", "red_b"]);
        registry.set_reduction("full_a", "red_a").unwrap();
        registry.set_reduction("full_b", "red_b").unwrap();

        let reduced: Vec<&str> = registry.tensor_loop(true).map(|t| t.name.as_str()).collect();
        assert_eq!(reduced, vec!["red_a", "red_b"]);

        let full: Vec<&str> = registry.tensor_loop(false).map(|t| t.name.as_str()).collect();
        assert_eq!(full, vec!["full_a", "full_b"]);
    }

    #[test]
    fn delete_removes_tensor_and_renumbers_reduction_pairs() {
        let mut registry = registry_with(&["x", "full", "red"]);
        registry.set_reduction("full", "red").unwrap();
        registry.delete("x").unwrap();
        assert_eq!(registry.reduction_pairs(), &[(0, 1)]);
        assert!(registry.get("x").is_err());
    }

    #[test]
    fn copy_from_rejects_duplicates_and_empty_sources() {
        let source = registry_with(&["a"]);
        let mut dest = registry_with(&["a"]);
        assert_eq!(
            dest.copy_from(&source, Some("a")).unwrap_err(),
            RegistryError::DuplicateTensor("a".to_string())
        );

        let empty = TensorRegistry::new();
        let mut dest = TensorRegistry::new();
        assert_eq!(
            dest.copy_from(&empty, None).unwrap_err(),
            RegistryError::NoTensorData
        );

        let mut dest = TensorRegistry::new();
        dest.copy_from(&source, None).unwrap();
        assert_eq!(dest.len(), 1);
    }
}
