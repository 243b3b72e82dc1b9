//! First-order optimizers over named parameters

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parameter::{Gradients, Parameter};
use crate::tensor::Tensor;
use crate::{RLError, Result};

/// Optimizer hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// Plain gradient descent
    Sgd {
        /// Step size
        learning_rate: f32,
    },
    /// Adam with bias correction
    Adam {
        /// Step size
        learning_rate: f32,
        /// First-moment decay
        beta1: f32,
        /// Second-moment decay
        beta2: f32,
        /// Denominator offset
        epsilon: f32,
    },
}

impl OptimizerConfig {
    /// Adam with the usual moment decays
    #[must_use]
    pub fn adam(learning_rate: f32) -> Self {
        Self::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// Plain gradient descent
    #[must_use]
    pub fn sgd(learning_rate: f32) -> Self {
        Self::Sgd { learning_rate }
    }

    /// Step size
    #[must_use]
    pub fn learning_rate(&self) -> f32 {
        match self {
            Self::Sgd { learning_rate } | Self::Adam { learning_rate, .. } => *learning_rate,
        }
    }

    /// Check that the hyperparameters describe a usable optimizer
    pub fn validate(&self) -> Result<()> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(RLError::Config(format!(
                "learning rate must be positive, got {lr}"
            )));
        }
        if let Self::Adam { beta1, beta2, .. } = self {
            if !(0.0..1.0).contains(beta1) || !(0.0..1.0).contains(beta2) {
                return Err(RLError::Config(format!(
                    "adam betas must lie in [0, 1), got {beta1} and {beta2}"
                )));
            }
        }
        Ok(())
    }

    /// Build a fresh optimizer
    pub fn build(&self) -> Result<Optimizer> {
        self.validate()?;
        Ok(Optimizer::new(self.clone()))
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::adam(3e-4)
    }
}

#[derive(Debug, Clone)]
struct Moments {
    momentum: Tensor,
    velocity: Tensor,
}

/// Optimizer with per-parameter state keyed by parameter name
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    moments: IndexMap<String, Moments>,
    t: i32,
}

impl Optimizer {
    /// Create an optimizer with empty state
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            moments: IndexMap::new(),
            t: 0,
        }
    }

    /// Hyperparameters
    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Number of updates applied so far
    #[must_use]
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Apply one update to every parameter that has a gradient.
    ///
    /// Returns the number of parameters that changed. Parameters without a
    /// gradient are left untouched.
    pub fn apply<'a, I>(&mut self, params: I, grads: &Gradients) -> Result<usize>
    where
        I: IntoIterator<Item = &'a mut Parameter>,
    {
        self.t += 1;
        let mut updated = 0;
        for param in params {
            let Some(grad) = grads.get(&param.name) else {
                continue;
            };
            if grad.shape() != param.value.shape() {
                return Err(RLError::Computation(format!(
                    "gradient for {} has shape {:?}, parameter has {:?}",
                    param.name,
                    grad.shape(),
                    param.value.shape()
                )));
            }
            match self.config {
                OptimizerConfig::Sgd { learning_rate } => {
                    param.value.scaled_add(-learning_rate, grad);
                }
                OptimizerConfig::Adam {
                    learning_rate,
                    beta1,
                    beta2,
                    epsilon,
                } => {
                    let state = self
                        .moments
                        .entry(param.name.clone())
                        .or_insert_with(|| Moments {
                            momentum: Tensor::zeros(grad.raw_dim()),
                            velocity: Tensor::zeros(grad.raw_dim()),
                        });
                    state.momentum.zip_mut_with(grad, |m, &g| {
                        *m = beta1 * *m + (1.0 - beta1) * g;
                    });
                    state.velocity.zip_mut_with(grad, |v, &g| {
                        *v = beta2 * *v + (1.0 - beta2) * g * g;
                    });

                    let bias1 = 1.0 - beta1.powi(self.t);
                    let bias2 = 1.0 - beta2.powi(self.t);
                    ndarray::Zip::from(&mut param.value)
                        .and(&state.momentum)
                        .and(&state.velocity)
                        .for_each(|p, &m, &v| {
                            let m_hat = m / bias1;
                            let v_hat = v / bias2;
                            *p -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                        });
                }
            }
            updated += 1;
        }
        debug!(step = self.t, updated, "applied optimizer update");
        Ok(updated)
    }
}

/// Gradient clipping policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientClipping {
    /// Largest allowed norm
    pub max_norm: f32,
    /// Clip by the norm over all gradients instead of per tensor
    pub by_global_norm: bool,
}

impl GradientClipping {
    /// Clip `grads` in place and return the norm measured before clipping
    pub fn clip(&self, grads: &mut Gradients) -> f32 {
        let norm = grads.global_norm();
        if self.by_global_norm {
            if norm > self.max_norm {
                grads.scale(self.max_norm / norm);
            }
        } else {
            grads.clip_per_tensor(self.max_norm);
        }
        norm
    }
}
