//! Action distributions produced by policies

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::tensor::{self, Tensor};
use crate::{RLError, Result};

/// Batched categorical distribution parameterized by unnormalized logits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorical {
    /// Logits with the category axis last, `[.., n]`
    logits: Tensor,
}

impl Categorical {
    /// Create a distribution from logits of shape `[.., n]`
    pub fn new(logits: Tensor) -> Result<Self> {
        match logits.shape().last() {
            Some(&n) if n > 0 => Ok(Self { logits }),
            _ => Err(RLError::Computation(format!(
                "categorical logits need a non-empty category axis, got shape {:?}",
                logits.shape()
            ))),
        }
    }

    /// Raw logits
    #[must_use]
    pub fn logits(&self) -> &Tensor {
        &self.logits
    }

    /// Number of categories
    #[must_use]
    pub fn num_categories(&self) -> usize {
        self.logits.shape().last().copied().unwrap_or(0)
    }

    fn batch_shape(&self) -> &[usize] {
        let shape = self.logits.shape();
        &shape[..shape.len() - 1]
    }

    /// Row-wise probabilities, `[N, n]` with all batch axes flattened
    pub fn probs_matrix(&self) -> Result<Array2<f32>> {
        Ok(softmax_rows(&tensor::to_matrix(&self.logits)?))
    }

    /// Probabilities with the same shape as the logits
    pub fn probs(&self) -> Result<Tensor> {
        let probs = self.probs_matrix()?;
        tensor::from_shape_vec(self.logits.shape(), probs.iter().copied().collect())
    }

    /// Entropy per batch entry, shape `[..]`
    pub fn entropy(&self) -> Result<Tensor> {
        let probs = self.probs_matrix()?;
        let entropy: Array1<f32> = probs
            .rows()
            .into_iter()
            .map(|row| -row.iter().map(|&p| if p > 0.0 { p * p.ln() } else { 0.0 }).sum::<f32>())
            .collect();
        tensor::from_shape_vec(self.batch_shape(), entropy.to_vec())
    }

    /// Log probability of the given category indices, shape `[..]`
    pub fn log_prob(&self, actions: &Tensor) -> Result<Tensor> {
        let probs = self.probs_matrix()?;
        let actions = tensor::to_vector(actions);
        if actions.len() != probs.nrows() {
            return Err(RLError::DimensionMismatch {
                expected: probs.nrows(),
                actual: actions.len(),
            });
        }
        let n = probs.ncols();
        let log_probs = probs
            .rows()
            .into_iter()
            .zip(actions.iter())
            .map(|(row, &a)| {
                let idx = category_index(a, n)?;
                Ok(row[idx].max(f32::MIN_POSITIVE).ln())
            })
            .collect::<Result<Vec<f32>>>()?;
        tensor::from_shape_vec(self.batch_shape(), log_probs)
    }

    /// Most likely category per batch entry, shape `[..]`
    pub fn mode(&self) -> Result<Tensor> {
        let logits = tensor::to_matrix(&self.logits)?;
        let modes = logits
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0 as f32
            })
            .collect::<Vec<f32>>();
        tensor::from_shape_vec(self.batch_shape(), modes)
    }

    /// Sample one category per batch entry, shape `[..]`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Tensor> {
        let probs = self.probs_matrix()?;
        let samples = probs
            .rows()
            .into_iter()
            .map(|row| {
                let dist = WeightedIndex::new(row.iter().copied())
                    .map_err(|e| RLError::Computation(format!("invalid probabilities: {e}")))?;
                Ok(dist.sample(rng) as f32)
            })
            .collect::<Result<Vec<f32>>>()?;
        tensor::from_shape_vec(self.batch_shape(), samples)
    }
}

/// Convert a float-encoded category to an index in `0..n`
pub fn category_index(action: f32, n: usize) -> Result<usize> {
    if action < 0.0 || action.fract() != 0.0 || action as usize >= n {
        return Err(RLError::Computation(format!(
            "action {action} is not a category in 0..{n}"
        )));
    }
    Ok(action as usize)
}

/// Numerically stable softmax over the last axis of a matrix
#[must_use]
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max_logit = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|x| (x - max_logit).exp());
        let sum_exp = row.sum();
        row.mapv_inplace(|x| x / sum_exp);
    }
    probs
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn uniform_pair() -> Categorical {
        Categorical::new(tensor::zeros(&[3, 2])).unwrap()
    }

    #[test]
    fn test_uniform_entropy_is_log_n() {
        let entropy = uniform_pair().entropy().unwrap();
        assert_eq!(entropy.shape(), &[3]);
        for h in entropy.iter() {
            assert_relative_eq!(*h, 2f32.ln(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_mode_picks_largest_logit() {
        let logits = tensor::from_shape_vec(&[2, 3], vec![0.1, 2.0, -1.0, 3.0, 0.0, 0.0]).unwrap();
        let dist = Categorical::new(logits).unwrap();
        let mode = dist.mode().unwrap();
        assert_eq!(mode.as_slice().unwrap(), &[1.0, 0.0]);
    }

    #[test]
    fn test_log_prob_rejects_out_of_range_actions() {
        let dist = uniform_pair();
        let bad = tensor::from_shape_vec(&[3], vec![0.0, 1.0, 2.0]).unwrap();
        assert!(dist.log_prob(&bad).is_err());
        let good = tensor::from_shape_vec(&[3], vec![0.0, 1.0, 1.0]).unwrap();
        let lp = dist.log_prob(&good).unwrap();
        assert_relative_eq!(lp[[0]], 0.5f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_sample_is_deterministic_for_a_seed() {
        let dist = uniform_pair();
        let a = dist.sample(&mut StdRng::seed_from_u64(11)).unwrap();
        let b = dist.sample(&mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|x| *x == 0.0 || *x == 1.0));
    }

    #[test]
    fn test_empty_category_axis_is_rejected() {
        assert!(Categorical::new(tensor::zeros(&[2, 0])).is_err());
        assert!(Categorical::new(tensor::scalar(1.0)).is_err());
    }
}
