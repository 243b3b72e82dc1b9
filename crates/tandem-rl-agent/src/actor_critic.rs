//! Actor-critic policy learner with a linear softmax policy and value head
//!
//! The policy and value function are affine maps of the (already encoded)
//! observation. Advantages are computed with GAE over each time-major batch
//! and the loss gradients are derived in closed form, so the algorithm can be
//! trained by any [`tandem_rl_core::Optimizer`].

use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tandem_rl_core::tensor::{self, stack_field, Stack, Tensor};
use tandem_rl_core::{
    ActionSpec, Algorithm, Categorical, Gradients, LossInfo, OptimizerConfig, Parameter,
    PolicyStep, RLError, Result, RlAlgorithm, StepType, TimeStep, TrainingInfo,
};

use crate::utils::{affine, affine_grads, compute_gae, xavier_init};

/// Configuration for [`ActorCriticAlgorithm`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCriticConfig {
    /// Discount factor
    pub gamma: f32,
    /// GAE lambda parameter
    pub gae_lambda: f32,
    /// Value loss coefficient
    pub value_loss_coef: f32,
    /// Entropy bonus coefficient
    pub entropy_coef: f32,
    /// Seed for parameter init and action sampling
    pub seed: u64,
    /// Optimizer of its own; `None` trains with the agent's primary optimizer
    pub optimizer: Option<OptimizerConfig>,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            gae_lambda: 0.95,
            value_loss_coef: 0.5,
            entropy_coef: 0.01,
            seed: 0,
            optimizer: None,
        }
    }
}

/// Per-step info kept for the actor-critic loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCriticInfo {
    /// Features the policy acted on, `[B, D]`
    pub features: Tensor,
    /// Value estimate at rollout time, `[B]`
    pub value: Tensor,
}

impl Stack for ActorCriticInfo {
    fn stack(items: &[&Self]) -> Result<Self> {
        Ok(Self {
            features: stack_field(items, |x| &x.features)?,
            value: stack_field(items, |x| &x.value)?,
        })
    }
}

/// Loss diagnostics, averaged over the steps that contribute to the loss
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorCriticLossExtra {
    /// Policy-gradient term
    pub pg_loss: f32,
    /// Squared value error term
    pub value_loss: f32,
    /// Policy entropy
    pub entropy: f32,
}

/// Actor-critic over discrete actions
#[derive(Debug, Clone)]
pub struct ActorCriticAlgorithm {
    action_spec: ActionSpec,
    config: ActorCriticConfig,
    policy_w: Parameter,
    policy_b: Parameter,
    value_w: Parameter,
    value_b: Parameter,
    rng: StdRng,
}

struct Forward {
    logits: Array2<f32>,
    values: Array1<f32>,
}

impl ActorCriticAlgorithm {
    /// Create an actor-critic acting on `feature_dim` input features
    pub fn new(
        action_spec: &ActionSpec,
        feature_dim: usize,
        config: ActorCriticConfig,
    ) -> Result<Self> {
        let n = match action_spec {
            ActionSpec::Discrete { n } if *n > 0 => *n,
            ActionSpec::Discrete { .. } => {
                return Err(RLError::Config(
                    "actor-critic needs at least one action".to_string(),
                ))
            }
            ActionSpec::Continuous { .. } => {
                return Err(RLError::Config(
                    "actor-critic only supports discrete action specs".to_string(),
                ))
            }
        };
        if let Some(optimizer) = &config.optimizer {
            optimizer.validate()?;
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let policy_w = xavier_init(feature_dim, n, &mut rng).into_dyn();
        let value_w = xavier_init(feature_dim, 1, &mut rng).into_dyn();

        Ok(Self {
            action_spec: action_spec.clone(),
            policy_w: Parameter::new("actor_critic/policy_w", policy_w),
            policy_b: Parameter::new("actor_critic/policy_b", tensor::zeros(&[n])),
            value_w: Parameter::new("actor_critic/value_w", value_w),
            value_b: Parameter::new("actor_critic/value_b", tensor::zeros(&[1])),
            config,
            rng,
        })
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &ActorCriticConfig {
        &self.config
    }

    fn forward(&self, features: &Array2<f32>) -> Result<Forward> {
        let logits = affine(features, &self.policy_w, &self.policy_b)?;
        let values = affine(features, &self.value_w, &self.value_b)?.column(0).to_owned();
        Ok(Forward { logits, values })
    }

    fn features(observation: &Tensor) -> Result<Array2<f32>> {
        if observation.ndim() != 2 {
            return Err(RLError::Computation(format!(
                "actor-critic expects [batch, features] observations, got shape {:?}",
                observation.shape()
            )));
        }
        tensor::to_matrix(observation)
    }

    fn distribution(logits: Array2<f32>) -> Result<Categorical> {
        Categorical::new(logits.into_dyn())
    }
}

impl Algorithm for ActorCriticAlgorithm {
    fn name(&self) -> &str {
        "actor_critic"
    }

    fn optimizer(&self) -> Option<&OptimizerConfig> {
        self.config.optimizer.as_ref()
    }

    fn trainable_variables(&self) -> Vec<&Parameter> {
        vec![&self.policy_w, &self.policy_b, &self.value_w, &self.value_b]
    }

    fn trainable_variables_mut(&mut self) -> Vec<&mut Parameter> {
        vec![
            &mut self.policy_w,
            &mut self.policy_b,
            &mut self.value_w,
            &mut self.value_b,
        ]
    }
}

impl RlAlgorithm for ActorCriticAlgorithm {
    type State = ();
    type Info = ActorCriticInfo;
    type LossExtra = ActorCriticLossExtra;

    fn action_spec(&self) -> &ActionSpec {
        &self.action_spec
    }

    fn initial_state(&self, _batch_size: usize) -> Self::State {}

    fn predict(&self, time_step: &TimeStep, _state: &()) -> Result<PolicyStep<(), ()>> {
        let features = Self::features(&time_step.observation)?;
        let out = self.forward(&features)?;
        let dist = Self::distribution(out.logits)?;
        Ok(PolicyStep {
            action: dist.mode()?,
            action_distribution: dist,
            state: (),
            info: (),
        })
    }

    fn rollout(
        &mut self,
        time_step: &TimeStep,
        _state: &(),
    ) -> Result<PolicyStep<(), ActorCriticInfo>> {
        let features = Self::features(&time_step.observation)?;
        let out = self.forward(&features)?;
        let dist = Self::distribution(out.logits)?;
        let action = dist.sample(&mut self.rng)?;
        Ok(PolicyStep {
            action,
            action_distribution: dist,
            state: (),
            info: ActorCriticInfo {
                features: features.into_dyn(),
                value: out.values.into_dyn(),
            },
        })
    }

    fn calc_loss(
        &self,
        training_info: &TrainingInfo<ActorCriticInfo>,
    ) -> Result<LossInfo<ActorCriticLossExtra>> {
        let shape = training_info.reward.shape();
        let (steps, batch) = match *shape {
            [t, b] => (t, b),
            _ => {
                return Err(RLError::Computation(format!(
                    "actor-critic loss expects [T, B] rewards, got shape {shape:?}"
                )))
            }
        };
        let n = steps * batch;
        let features = tensor::to_matrix(&training_info.info.features)?;
        if features.nrows() != n {
            return Err(RLError::DimensionMismatch {
                expected: n,
                actual: features.nrows(),
            });
        }
        let out = self.forward(&features)?;
        let dist = Self::distribution(out.logits)?;
        let probs = dist.probs_matrix()?;
        let entropy = tensor::to_vector(&dist.entropy()?);
        let actions = tensor::to_vector(&training_info.action);
        let log_probs = tensor::to_vector(&dist.log_prob(&training_info.action)?);

        let rewards = tensor::to_matrix(&training_info.reward)?;
        let discounts = tensor::to_matrix(&training_info.discount)?;
        let values = Array2::from_shape_vec((steps, batch), out.values.to_vec())?;
        let is_last = training_info.step_type.mapv(|s| s == StepType::Last);

        // Row t uses the transition t -> t+1; the final row has none.
        let mut advantages = Array2::<f32>::zeros((steps, batch));
        let mut mask = Array2::<f32>::zeros((steps, batch));
        if steps > 1 {
            for b in 0..batch {
                let r: Vec<f32> = (1..steps).map(|t| rewards[[t, b]]).collect();
                let d: Vec<f32> = (1..steps)
                    .map(|t| {
                        if is_last[[t - 1, b]] {
                            0.0
                        } else {
                            discounts[[t, b]]
                        }
                    })
                    .collect();
                let v: Vec<f32> = (0..steps - 1).map(|t| values[[t, b]]).collect();
                let adv = compute_gae(
                    &r,
                    &d,
                    &v,
                    values[[steps - 1, b]],
                    self.config.gamma,
                    self.config.gae_lambda,
                );
                for (t, a) in adv.into_iter().enumerate() {
                    if !is_last[[t, b]] {
                        advantages[[t, b]] = a;
                        mask[[t, b]] = 1.0;
                    }
                }
            }
        }

        let num_actions = probs.ncols();
        let inv_n = 1.0 / n as f32;
        let c_v = self.config.value_loss_coef;
        let c_h = self.config.entropy_coef;
        let mut loss = Array1::<f32>::zeros(n);
        let mut grad_logits = Array2::<f32>::zeros((n, num_actions));
        let mut grad_values = Array2::<f32>::zeros((n, 1));
        let (mut pg_sum, mut value_sum, mut entropy_sum) = (0.0, 0.0, 0.0);

        for i in 0..n {
            let (t, b) = (i / batch, i % batch);
            let m = mask[[t, b]];
            if m == 0.0 {
                continue;
            }
            let adv = advantages[[t, b]];
            let ret = adv + values[[t, b]];
            let value_err = values[[t, b]] - ret;
            let pg = -adv * log_probs[i];
            let vl = 0.5 * value_err * value_err;
            loss[i] = pg + c_v * vl - c_h * entropy[i];
            pg_sum += pg;
            value_sum += vl;
            entropy_sum += entropy[i];

            let action = actions[i] as usize;
            let h = entropy[i];
            for j in 0..num_actions {
                let p = probs[[i, j]];
                let indicator = if j == action { 1.0 } else { 0.0 };
                let d_entropy = -p * (p.max(f32::MIN_POSITIVE).ln() + h);
                grad_logits[[i, j]] = (-adv * (indicator - p) - c_h * d_entropy) * inv_n;
            }
            grad_values[[i, 0]] = c_v * value_err * inv_n;
        }

        let (gw, gb) = affine_grads(&features, &grad_logits);
        let (vw, vb) = affine_grads(&features, &grad_values);
        let mut gradients = Gradients::new();
        gradients.insert(self.policy_w.name.clone(), gw.into_dyn());
        gradients.insert(self.policy_b.name.clone(), gb.into_dyn());
        gradients.insert(self.value_w.name.clone(), vw.into_dyn());
        gradients.insert(self.value_b.name.clone(), vb.into_dyn());

        let count = mask.sum().max(1.0);
        let extra = ActorCriticLossExtra {
            pg_loss: pg_sum / count,
            value_loss: value_sum / count,
            entropy: entropy_sum / count,
        };
        debug!(
            pg_loss = extra.pg_loss,
            value_loss = extra.value_loss,
            entropy = extra.entropy,
            "actor-critic loss"
        );

        let loss = loss.into_shape((steps, batch))?.into_dyn();
        Ok(LossInfo::new(loss, extra).with_gradients(gradients))
    }

    fn entropy_gradients(
        &self,
        training_info: &TrainingInfo<ActorCriticInfo>,
        coef: f32,
    ) -> Result<Gradients> {
        let features = tensor::to_matrix(&training_info.info.features)?;
        let n = features.nrows();
        let out = self.forward(&features)?;
        let dist = Self::distribution(out.logits)?;
        let probs = dist.probs_matrix()?;
        let entropy = tensor::to_vector(&dist.entropy()?);

        // d(-H)/dlogit_j = p_j * (ln p_j + H)
        let scale = coef / n.max(1) as f32;
        let mut grad_logits = probs.clone();
        for (mut row, h) in grad_logits.rows_mut().into_iter().zip(entropy.iter()) {
            row.mapv_inplace(|p| scale * p * (p.max(f32::MIN_POSITIVE).ln() + h));
        }

        let (gw, gb) = affine_grads(&features, &grad_logits);
        let mut gradients = Gradients::new();
        gradients.insert(self.policy_w.name.clone(), gw.into_dyn());
        gradients.insert(self.policy_b.name.clone(), gb.into_dyn());
        Ok(gradients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tandem_rl_core::tensor::stack_steps;

    fn obs(batch: usize, dim: usize) -> Tensor {
        tensor::from_shape_vec(
            &[batch, dim],
            (0..batch * dim).map(|v| v as f32 * 0.1).collect(),
        )
        .unwrap()
    }

    fn collect(alg: &mut ActorCriticAlgorithm, steps: usize) -> TrainingInfo<ActorCriticInfo> {
        let mut records = Vec::new();
        let mut step = TimeStep::first(obs(2, 3));
        for _ in 0..steps {
            let out = alg.rollout(&step, &()).unwrap();
            records.push(TrainingInfo::from_step(&step, out.action.clone(), out.info));
            step = TimeStep::transition(
                obs(2, 3),
                out.action,
                tensor::from_shape_vec(&[2], vec![1.0, 0.0]).unwrap(),
                &[false, false],
            );
        }
        stack_steps(&records).unwrap()
    }

    #[test]
    fn test_continuous_spec_is_a_config_error() {
        let spec = ActionSpec::continuous(vec![-1.0], vec![1.0]).unwrap();
        let err = ActorCriticAlgorithm::new(&spec, 3, ActorCriticConfig::default()).unwrap_err();
        assert!(matches!(err, RLError::Config(_)));
    }

    #[test]
    fn test_predict_is_greedy_and_repeatable() {
        let alg =
            ActorCriticAlgorithm::new(&ActionSpec::discrete(4), 3, ActorCriticConfig::default())
                .unwrap();
        let step = TimeStep::first(obs(2, 3));
        let a = alg.predict(&step, &()).unwrap();
        let b = alg.predict(&step, &()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.action, a.action_distribution.mode().unwrap());
    }

    #[test]
    fn test_rollout_actions_are_in_spec() {
        let spec = ActionSpec::discrete(4);
        let mut alg = ActorCriticAlgorithm::new(&spec, 3, ActorCriticConfig::default()).unwrap();
        let out = alg.rollout(&TimeStep::first(obs(5, 3)), &()).unwrap();
        assert_eq!(out.action.shape(), &[5]);
        assert!(spec.contains(&out.action));
        assert_eq!(out.info.features.shape(), &[5, 3]);
    }

    #[test]
    fn test_loss_has_time_major_shape_and_zero_final_row() {
        let mut alg =
            ActorCriticAlgorithm::new(&ActionSpec::discrete(2), 3, ActorCriticConfig::default())
                .unwrap();
        let batch = collect(&mut alg, 4);
        let loss = alg.calc_loss(&batch).unwrap();
        let per_step = loss.loss.as_ref().unwrap();
        assert_eq!(per_step.shape(), &[4, 2]);
        assert_relative_eq!(per_step[[3, 0]], 0.0);
        assert_relative_eq!(per_step[[3, 1]], 0.0);
        assert_eq!(loss.gradients.len(), 4);
        assert!(loss.extra.entropy > 0.0);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut alg = ActorCriticAlgorithm::new(
            &ActionSpec::discrete(2),
            3,
            ActorCriticConfig {
                entropy_coef: 0.1,
                ..ActorCriticConfig::default()
            },
        )
        .unwrap();
        let batch = collect(&mut alg, 3);
        let analytic = alg.calc_loss(&batch).unwrap();
        let grad = analytic.gradients.get("actor_critic/policy_b").unwrap()[[1]];

        // Advantages are treated as constants, so perturb only the policy bias.
        let eps = 1e-3;
        let mut shifted = alg.clone();
        shifted.policy_b.value[[1]] += eps;
        let base_total = analytic.total();
        let shifted_loss = shifted.calc_loss(&batch).unwrap();
        let numeric = (shifted_loss.total() - base_total) / eps;
        assert_relative_eq!(grad, numeric, epsilon = 1e-2);
    }

    #[test]
    fn test_entropy_gradient_step_raises_entropy() {
        let mut alg =
            ActorCriticAlgorithm::new(&ActionSpec::discrete(3), 3, ActorCriticConfig::default())
                .unwrap();
        alg.policy_b.value[[0]] = 2.0;
        let batch = collect(&mut alg, 3);
        let mean_entropy = |alg: &ActorCriticAlgorithm| {
            let features = tensor::to_matrix(&batch.info.features).unwrap();
            let logits = alg.forward(&features).unwrap().logits;
            let dist = ActorCriticAlgorithm::distribution(logits).unwrap();
            tensor::mean(&dist.entropy().unwrap())
        };

        let grads = alg.entropy_gradients(&batch, 0.5).unwrap();
        assert_eq!(grads.len(), 2);
        assert!(grads.get("actor_critic/value_w").is_none());

        let before = mean_entropy(&alg);
        let mut optimizer = OptimizerConfig::sgd(0.5).build().unwrap();
        optimizer.apply(alg.trainable_variables_mut(), &grads).unwrap();
        assert!(mean_entropy(&alg) > before);
    }

    #[test]
    fn test_entropy_gradient_matches_finite_difference() {
        let mut alg =
            ActorCriticAlgorithm::new(&ActionSpec::discrete(2), 3, ActorCriticConfig::default())
                .unwrap();
        let batch = collect(&mut alg, 2);
        let coef = 0.3;
        let neg_entropy = |alg: &ActorCriticAlgorithm| {
            let features = tensor::to_matrix(&batch.info.features).unwrap();
            let logits = alg.forward(&features).unwrap().logits;
            let dist = ActorCriticAlgorithm::distribution(logits).unwrap();
            -coef * tensor::mean(&dist.entropy().unwrap())
        };
        let grad = alg.entropy_gradients(&batch, coef).unwrap();
        let analytic = grad.get("actor_critic/policy_b").unwrap()[[0]];

        let eps = 1e-3;
        let mut shifted = alg.clone();
        shifted.policy_b.value[[0]] += eps;
        let numeric = (neg_entropy(&shifted) - neg_entropy(&alg)) / eps;
        assert_relative_eq!(analytic, numeric, epsilon = 1e-2);
    }

    #[test]
    fn test_episode_end_masks_cross_episode_transitions() {
        let mut alg =
            ActorCriticAlgorithm::new(&ActionSpec::discrete(2), 3, ActorCriticConfig::default())
                .unwrap();
        let mut batch = collect(&mut alg, 3);
        batch.step_type[[1, 0]] = StepType::Last;
        let loss = alg.calc_loss(&batch).unwrap();
        assert_relative_eq!(loss.loss.as_ref().unwrap()[[1, 0]], 0.0);
    }
}
