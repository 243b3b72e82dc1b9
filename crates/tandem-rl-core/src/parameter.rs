//! Trainable parameters and their gradients

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::tensor::{self, Tensor};
use crate::{RLError, Result};

/// A named trainable tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique name, prefixed by the owning module (`icm/forward_w`)
    pub name: String,
    /// Current value
    pub value: Tensor,
}

impl Parameter {
    /// Create a named parameter
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Number of scalar entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the parameter holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Gradients keyed by parameter name, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gradients(IndexMap<String, Tensor>);

impl Gradients {
    /// Empty gradient set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gradient of `name`, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, grad: Tensor) {
        self.0.insert(name.into(), grad);
    }

    /// Gradient of `name`, if any
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.0.get(name)
    }

    /// Number of parameters with a gradient
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no gradient is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameter names, in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(name, gradient)` pairs, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Accumulate `other` into `self`. Shared names are summed and must agree in shape.
    pub fn merge(&mut self, other: Gradients) -> Result<()> {
        for (name, grad) in other.0 {
            match self.0.get_mut(&name) {
                Some(existing) => {
                    if existing.shape() != grad.shape() {
                        return Err(RLError::Computation(format!(
                            "gradient shapes for {name} disagree: {:?} vs {:?}",
                            existing.shape(),
                            grad.shape()
                        )));
                    }
                    *existing += &grad;
                }
                None => {
                    self.0.insert(name, grad);
                }
            }
        }
        Ok(())
    }

    /// Subset of gradients whose names appear in `names`, in the order of `names`
    #[must_use]
    pub fn select<'a, I>(&self, names: I) -> Gradients
    where
        I: IntoIterator<Item = &'a str>,
    {
        Gradients(
            names
                .into_iter()
                .filter_map(|n| self.0.get(n).map(|g| (n.to_string(), g.clone())))
                .collect(),
        )
    }

    /// L2 norm over every gradient entry
    #[must_use]
    pub fn global_norm(&self) -> f32 {
        self.0
            .values()
            .map(|g| g.iter().map(|x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }

    /// Multiply every gradient by `factor`
    pub fn scale(&mut self, factor: f32) {
        for grad in self.0.values_mut() {
            grad.mapv_inplace(|x| x * factor);
        }
    }

    /// Rescale each gradient so its own L2 norm is at most `max_norm`
    pub fn clip_per_tensor(&mut self, max_norm: f32) {
        for grad in self.0.values_mut() {
            let norm = grad.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > max_norm {
                let factor = max_norm / norm;
                grad.mapv_inplace(|x| x * factor);
            }
        }
    }
}

impl FromIterator<(String, Tensor)> for Gradients {
    fn from_iter<T: IntoIterator<Item = (String, Tensor)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
