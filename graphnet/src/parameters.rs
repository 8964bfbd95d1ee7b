//! Trained parameters, keyed by the module naming convention of the trained model.
//!
//! A multilayer perceptron declared under module `m` reads, for its layer `i`, the
//! tensors `"{m}.linear_{i}.weight"` and `"{m}.linear_{i}.bias"`. Layers are paired
//! with their (weight, bias) tensors in declared order.

use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{Element, GnnError, Result};

/// Memory layout of a dense layer weight tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightLayout {
    /// `[in, out]` row-major, so that `y = x·W + b`.
    #[default]
    InOut,
    /// `[out, in]` row-major, as stored by PyTorch `Linear` modules.
    OutIn,
}

impl WeightLayout {
    /// Reorders `weight` into the `[in, out]` layout used for evaluation.
    pub fn to_in_out(
        &self,
        weight: Vec<Element>,
        input_width: usize,
        output_width: usize,
    ) -> Vec<Element> {
        match self {
            WeightLayout::InOut => weight,
            WeightLayout::OutIn => (0..input_width)
                .flat_map(|i| (0..output_width).map(move |o| (i, o)))
                .map(|(i, o)| weight[o * input_width + i])
                .collect(),
        }
    }
}

/// Anything able to list its learnable tensors by name, flattened.
///
/// This is the seam to trained-model introspection: the engine never reaches into a
/// training framework itself, it only consumes what an implementor of this trait
/// hands over.
pub trait StateDict {
    fn named_parameters(&self) -> Vec<(String, Vec<Element>)>;
}

/// Extracts every parameter of `model` into a [`ParameterMap`], keeping its names verbatim.
pub fn extract_parameters<M: StateDict + ?Sized>(model: &M) -> ParameterMap {
    model.named_parameters().into_iter().collect()
}

/// Names of the weight and bias tensors of every layer of the MLP declared as `module`.
pub fn layer_slot_names(module: &str, num_layers: usize) -> Vec<(String, String)> {
    (0..num_layers)
        .map(|i| {
            (
                format!("{module}.linear_{i}.weight"),
                format!("{module}.linear_{i}.bias"),
            )
        })
        .collect()
}

/// Mapping from tensor name to its flat values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, Vec<Element>>);

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON object of the form `{ "name": [values, ...], ... }`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening parameter file {}", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("decoding parameter file {}", path.display()))
    }

    pub fn insert<S: Into<String>>(
        &mut self,
        name: S,
        values: Vec<Element>,
    ) -> Option<Vec<Element>> {
        self.0.insert(name.into(), values)
    }

    pub fn get(&self, name: &str) -> Option<&[Element]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Removes the tensor `name`, checking that it holds exactly `expected_len` finite values.
    pub fn take(&mut self, name: &str, expected_len: usize) -> Result<Vec<Element>> {
        let values = self.0.remove(name).ok_or_else(|| {
            GnnError::ParameterMismatch(format!("tensor '{name}' is missing"))
        })?;
        if values.len() != expected_len {
            return Err(GnnError::ParameterMismatch(format!(
                "tensor '{name}' has {} values, expected {expected_len}",
                values.len()
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(GnnError::ParameterMismatch(format!(
                "tensor '{name}' holds a non finite value at position {pos}"
            )));
        }
        Ok(values)
    }
}

impl FromIterator<(String, Vec<Element>)> for ParameterMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<Element>)>>(iter: T) -> Self {
        ParameterMap(iter.into_iter().collect())
    }
}

impl IntoIterator for ParameterMap {
    type Item = (String, Vec<Element>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<Element>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Extend<(String, Vec<Element>)> for ParameterMap {
    fn extend<T: IntoIterator<Item = (String, Vec<Element>)>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}
