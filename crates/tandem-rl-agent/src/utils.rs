//! Numeric helpers shared by the reference algorithms

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use tandem_rl_core::distribution::category_index;
use tandem_rl_core::tensor;
use tandem_rl_core::{Parameter, RLError, Result};

/// Compute GAE (Generalized Advantage Estimation) along the time axis.
///
/// `rewards[t]` and `discounts[t]` belong to the transition from step `t` to
/// step `t + 1`; a zero discount cuts the bootstrap at an episode boundary.
/// Returns one advantage per transition.
#[must_use]
pub fn compute_gae(
    rewards: &[f32],
    discounts: &[f32],
    values: &[f32],
    next_value: f32,
    gamma: f32,
    lambda: f32,
) -> Vec<f32> {
    let n = rewards.len();
    let mut advantages = vec![0.0; n];
    let mut running_advantage = 0.0;

    for i in (0..n).rev() {
        let next_v = if i == n - 1 { next_value } else { values[i + 1] };
        let discount = gamma * discounts[i];
        let td_error = rewards[i] + discount * next_v - values[i];
        running_advantage = td_error + discount * lambda * running_advantage;
        advantages[i] = running_advantage;
    }

    advantages
}

/// Running mean and variance over a stream of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    /// Mean
    pub mean: f64,
    /// Variance
    pub var: f64,
    /// Count
    pub count: usize,
}

impl RunningMeanStd {
    /// Create new running statistics
    #[must_use]
    pub fn new() -> Self {
        Self {
            mean: 0.0,
            var: 1.0,
            count: 0,
        }
    }

    /// Update with a new value
    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.var += (delta * delta2 - self.var) / self.count as f64;
    }

    /// Update with a batch of values
    pub fn update_batch<'a, I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = &'a f32>,
    {
        for &x in batch {
            self.update(f64::from(x));
        }
    }

    /// Get standard deviation
    #[must_use]
    pub fn std(&self) -> f64 {
        self.var.max(0.0).sqrt()
    }

    /// Normalize a value
    #[must_use]
    pub fn normalize(&self, x: f32) -> f32 {
        ((f64::from(x) - self.mean) / (self.std() + 1e-8)) as f32
    }
}

impl Default for RunningMeanStd {
    fn default() -> Self {
        Self::new()
    }
}

/// Xavier-uniform initialized weight matrix
pub fn xavier_init<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Array2<f32> {
    let limit = (6.0 / (in_dim + out_dim).max(1) as f32).sqrt();
    Array2::from_shape_fn((in_dim, out_dim), |_| rng.gen_range(-limit..limit))
}

/// One-hot encode float category indices into `[N, n]`
pub fn one_hot(actions: ArrayView1<'_, f32>, n: usize) -> Result<Array2<f32>> {
    let mut out = Array2::zeros((actions.len(), n));
    for (i, &a) in actions.iter().enumerate() {
        out[[i, category_index(a, n)?]] = 1.0;
    }
    Ok(out)
}

/// Concatenate two matrices along the feature axis
#[must_use]
pub fn concat_features(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Array2<f32> {
    let (rows, da) = a.dim();
    let db = b.ncols();
    Array2::from_shape_fn((rows, da + db), |(i, j)| {
        if j < da {
            a[[i, j]]
        } else {
            b[[i, j - da]]
        }
    })
}

/// Affine map `x W + b` with the weight and bias stored as parameters
pub fn affine(x: &Array2<f32>, weight: &Parameter, bias: &Parameter) -> Result<Array2<f32>> {
    let w = tensor::to_matrix(&weight.value)?;
    if x.ncols() != w.nrows() {
        return Err(RLError::DimensionMismatch {
            expected: w.nrows(),
            actual: x.ncols(),
        });
    }
    let b = tensor::to_vector(&bias.value);
    Ok(x.dot(&w) + &b)
}

/// Gradients of an affine map's weight and bias given the output gradient `g`
#[must_use]
pub fn affine_grads(x: &Array2<f32>, g: &Array2<f32>) -> (Array2<f32>, Array1<f32>) {
    (x.t().dot(g), g.sum_axis(ndarray::Axis(0)))
}
