//! Entropy-target controller
//!
//! Keeps the policy's entropy from collapsing by weighting an entropy bonus
//! with a coefficient `alpha`. After every update `log_alpha` is nudged up
//! when the batch entropy sits below the target and down otherwise.

use serde::{Deserialize, Serialize};
use tracing::debug;

use tandem_rl_core::tensor::{self, stack_field, Stack, Tensor};
use tandem_rl_core::{
    ActionSpec, AlgStep, Algorithm, Categorical, LossInfo, Parameter, RLError, Result,
};

/// Configuration for [`EntropyTargetAlgorithm`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyTargetConfig {
    /// Entropy to maintain. `None` uses `0.89 * ln(n)` for `n` discrete actions.
    pub target_entropy: Option<f32>,
    /// Starting value of `alpha`
    pub initial_alpha: f32,
    /// Step applied to `log_alpha` after each update
    pub slow_update_rate: f32,
    /// Lower bound for `alpha`
    pub min_alpha: f32,
    /// Upper bound for `log_alpha`
    pub max_log_alpha: f32,
}

impl Default for EntropyTargetConfig {
    fn default() -> Self {
        Self {
            target_entropy: None,
            initial_alpha: 0.01,
            slow_update_rate: 0.01,
            min_alpha: 1e-4,
            max_log_alpha: 0.0,
        }
    }
}

/// Per-step entropy of the action distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyTargetInfo {
    /// Entropy, `[B]`
    pub entropy: Tensor,
}

impl Stack for EntropyTargetInfo {
    fn stack(items: &[&Self]) -> Result<Self> {
        Ok(Self {
            entropy: stack_field(items, |x| &x.entropy)?,
        })
    }
}

/// Entropy-target loss diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntropyTargetLossExtra {
    /// Coefficient used for the loss
    pub alpha: f32,
    /// Mean negative entropy of the batch
    pub neg_entropy: f32,
}

/// Adaptive entropy regularization over discrete actions
#[derive(Debug, Clone)]
pub struct EntropyTargetAlgorithm {
    config: EntropyTargetConfig,
    target_entropy: f32,
    log_alpha: f32,
}

impl EntropyTargetAlgorithm {
    /// Create a controller for `action_spec`
    pub fn new(action_spec: &ActionSpec, config: EntropyTargetConfig) -> Result<Self> {
        let n = match action_spec {
            ActionSpec::Discrete { n } if *n > 0 => *n,
            ActionSpec::Discrete { .. } => {
                return Err(RLError::Config(
                    "entropy target needs at least one action".to_string(),
                ))
            }
            ActionSpec::Continuous { .. } => {
                return Err(RLError::Config(
                    "entropy target only supports discrete action specs".to_string(),
                ))
            }
        };
        if !(config.initial_alpha > 0.0 && config.min_alpha > 0.0) {
            return Err(RLError::Config(
                "entropy target alphas must be positive".to_string(),
            ));
        }
        if config.min_alpha.ln() > config.max_log_alpha {
            return Err(RLError::Config(format!(
                "min_alpha {} exceeds exp(max_log_alpha {})",
                config.min_alpha, config.max_log_alpha
            )));
        }

        let target_entropy = config
            .target_entropy
            .unwrap_or_else(|| 0.89 * (n as f32).ln());
        let log_alpha = config
            .initial_alpha
            .ln()
            .clamp(config.min_alpha.ln(), config.max_log_alpha);
        Ok(Self {
            config,
            target_entropy,
            log_alpha,
        })
    }

    /// Current coefficient
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.log_alpha.exp()
    }

    /// Entropy the controller maintains
    #[must_use]
    pub fn target_entropy(&self) -> f32 {
        self.target_entropy
    }

    /// Record the entropy of the distribution the policy acted from
    pub fn train_step(&self, distribution: &Categorical) -> Result<AlgStep<(), EntropyTargetInfo>> {
        Ok(AlgStep {
            state: (),
            info: EntropyTargetInfo {
                entropy: distribution.entropy()?,
            },
        })
    }

    /// Loss `alpha * -entropy` per step
    pub fn calc_loss(&self, info: &EntropyTargetInfo) -> Result<LossInfo<EntropyTargetLossExtra>> {
        let alpha = self.alpha();
        let neg_entropy = info.entropy.mapv(|h| -h);
        let extra = EntropyTargetLossExtra {
            alpha,
            neg_entropy: tensor::mean(&neg_entropy),
        };
        Ok(LossInfo::new(neg_entropy * alpha, extra))
    }

    /// Move `log_alpha` one step toward keeping `mean_entropy` at the target
    /// and return the new `alpha`
    pub fn adjust_alpha(&mut self, mean_entropy: f32) -> f32 {
        let step = if mean_entropy < self.target_entropy {
            self.config.slow_update_rate
        } else {
            -self.config.slow_update_rate
        };
        self.log_alpha = (self.log_alpha + step)
            .clamp(self.config.min_alpha.ln(), self.config.max_log_alpha);
        debug!(
            mean_entropy,
            target = self.target_entropy,
            alpha = self.alpha(),
            "adjusted entropy coefficient"
        );
        self.alpha()
    }
}

impl Algorithm for EntropyTargetAlgorithm {
    fn name(&self) -> &str {
        "entropy_target"
    }

    fn trainable_variables(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    fn trainable_variables_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }
}
