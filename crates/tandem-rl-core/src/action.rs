//! Action specifications

use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Describes the actions an algorithm must produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Scalar discrete action in `0..n`
    Discrete {
        /// Number of discrete actions
        n: usize,
    },
    /// Bounded continuous action vector
    Continuous {
        /// Lower bounds for each dimension
        low: Vec<f32>,
        /// Upper bounds for each dimension
        high: Vec<f32>,
    },
}

impl ActionSpec {
    /// Create a discrete action spec
    #[must_use]
    pub fn discrete(n: usize) -> Self {
        Self::Discrete { n }
    }

    /// Create a continuous action spec
    pub fn continuous(low: Vec<f32>, high: Vec<f32>) -> crate::Result<Self> {
        if low.len() != high.len() {
            return Err(crate::RLError::DimensionMismatch {
                expected: low.len(),
                actual: high.len(),
            });
        }
        Ok(Self::Continuous { low, high })
    }

    /// Number of discrete actions, `None` for continuous specs
    #[must_use]
    pub fn num_actions(&self) -> Option<usize> {
        match self {
            Self::Discrete { n } => Some(*n),
            Self::Continuous { .. } => None,
        }
    }

    /// Whether the spec is discrete
    #[must_use]
    pub fn is_discrete(&self) -> bool {
        matches!(self, Self::Discrete { .. })
    }

    /// Dimensionality of a single action
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            Self::Discrete { .. } => 1,
            Self::Continuous { low, .. } => low.len(),
        }
    }

    /// Sample a batch of uniformly random actions
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Tensor {
        match self {
            Self::Discrete { n } => {
                let n = (*n).max(1);
                Array1::from_shape_fn(batch_size, |_| rng.gen_range(0..n) as f32).into_dyn()
            }
            Self::Continuous { low, high } => {
                Array2::from_shape_fn((batch_size, low.len()), |(_, j)| {
                    if low[j] < high[j] {
                        rng.gen_range(low[j]..high[j])
                    } else {
                        low[j]
                    }
                })
                .into_dyn()
            }
        }
    }

    /// Check whether every action in a batch lies inside the spec
    #[must_use]
    pub fn contains(&self, actions: &Tensor) -> bool {
        match self {
            Self::Discrete { n } => actions
                .iter()
                .all(|a| a.fract() == 0.0 && *a >= 0.0 && (*a as usize) < *n),
            Self::Continuous { low, high } => {
                actions.shape().last() == Some(&low.len())
                    && actions
                        .iter()
                        .zip(low.iter().zip(high).cycle())
                        .all(|(x, (l, h))| x >= l && x <= h)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_discrete_sample_is_contained() {
        let spec = ActionSpec::discrete(3);
        let mut rng = StdRng::seed_from_u64(7);
        let actions = spec.sample(16, &mut rng);
        assert_eq!(actions.shape(), &[16]);
        assert!(spec.contains(&actions));
        assert_eq!(spec.num_actions(), Some(3));
    }

    #[test]
    fn test_continuous_spec_validates_bounds() {
        assert!(ActionSpec::continuous(vec![0.0], vec![1.0, 2.0]).is_err());
        let spec = ActionSpec::continuous(vec![-1.0, 0.0], vec![1.0, 2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let actions = spec.sample(4, &mut rng);
        assert_eq!(actions.shape(), &[4, 2]);
        assert!(spec.contains(&actions));
        assert!(!spec.is_discrete());
        assert_eq!(spec.dim(), 2);
    }

    #[test]
    fn test_spec_serializes_with_kind_tag() {
        let spec = ActionSpec::discrete(2);
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, r#"{"kind":"discrete","n":2}"#);
    }
}
