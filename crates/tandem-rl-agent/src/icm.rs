//! Intrinsic curiosity module
//!
//! A forward model predicts the current features from the previous features
//! and the action taken in between; an inverse model recovers that action from
//! the two feature vectors. The forward model's prediction error is paid out
//! as intrinsic reward, so transitions the agent cannot yet predict are
//! rewarding to visit.

use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use tandem_rl_core::distribution::softmax_rows;
use tandem_rl_core::tensor::{self, stack_field, Stack, Tensor};
use tandem_rl_core::{
    ActionSpec, AlgStep, Algorithm, CuriosityModule, Gradients, LossInfo, OptimizerConfig,
    Parameter, RLError, Result, StateSpec,
};

use crate::utils::{affine, affine_grads, concat_features, one_hot, xavier_init, RunningMeanStd};

/// Configuration for [`IcmAlgorithm`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcmConfig {
    /// Multiplier applied to the forward-model error to form the reward
    pub reward_scale: f32,
    /// Normalize intrinsic rewards by a running mean and std
    pub normalize_reward: bool,
    /// Seed for parameter init
    pub seed: u64,
    /// Optimizer of its own; `None` trains with the agent's primary optimizer
    pub optimizer: Option<OptimizerConfig>,
}

impl Default for IcmConfig {
    fn default() -> Self {
        Self {
            reward_scale: 1.0,
            normalize_reward: false,
            seed: 1,
            optimizer: None,
        }
    }
}

/// Per-step curiosity info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcmInfo {
    /// Intrinsic reward, `None` when its computation was skipped
    pub reward: Option<Tensor>,
    /// Features of the previous step, `[B, D]`
    pub prev_feature: Tensor,
    /// Features of this step, `[B, D]`
    pub feature: Tensor,
    /// Action taken between the two steps, `[B]`
    pub prev_action: Tensor,
}

impl Stack for IcmInfo {
    fn stack(items: &[&Self]) -> Result<Self> {
        Ok(Self {
            reward: stack_field(items, |x| &x.reward)?,
            prev_feature: stack_field(items, |x| &x.prev_feature)?,
            feature: stack_field(items, |x| &x.feature)?,
            prev_action: stack_field(items, |x| &x.prev_action)?,
        })
    }
}

/// Curiosity loss diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcmLossExtra {
    /// Mean forward-model error
    pub forward_loss: f32,
    /// Mean inverse-model cross entropy
    pub inverse_loss: f32,
}

/// Intrinsic curiosity module over discrete actions
#[derive(Debug, Clone)]
pub struct IcmAlgorithm {
    feature_dim: usize,
    num_actions: usize,
    config: IcmConfig,
    forward_w: Parameter,
    forward_b: Parameter,
    inverse_w: Parameter,
    inverse_b: Parameter,
    reward_stats: RunningMeanStd,
}

struct Errors {
    /// Forward prediction error, `[N, D]`
    forward: Array2<f32>,
    /// Inverse-model probabilities, `[N, n]`
    inverse_probs: Array2<f32>,
    forward_inputs: Array2<f32>,
    inverse_inputs: Array2<f32>,
    prev_action: Array1<f32>,
}

impl IcmAlgorithm {
    /// Create a curiosity module over `feature_dim` features
    pub fn new(action_spec: &ActionSpec, feature_dim: usize, config: IcmConfig) -> Result<Self> {
        let Some(n) = action_spec.num_actions().filter(|n| *n > 0) else {
            return Err(RLError::Config(
                "curiosity module needs a non-empty discrete action spec".to_string(),
            ));
        };
        if let Some(optimizer) = &config.optimizer {
            optimizer.validate()?;
        }
        let mut rng = StdRng::seed_from_u64(config.seed);
        let forward_w = xavier_init(feature_dim + n, feature_dim, &mut rng).into_dyn();
        let inverse_w = xavier_init(2 * feature_dim, n, &mut rng).into_dyn();
        Ok(Self {
            feature_dim,
            num_actions: n,
            forward_w: Parameter::new("icm/forward_w", forward_w),
            forward_b: Parameter::new("icm/forward_b", tensor::zeros(&[feature_dim])),
            inverse_w: Parameter::new("icm/inverse_w", inverse_w),
            inverse_b: Parameter::new("icm/inverse_b", tensor::zeros(&[n])),
            config,
            reward_stats: RunningMeanStd::new(),
        })
    }

    /// Running statistics of the raw intrinsic rewards seen so far
    #[must_use]
    pub fn reward_stats(&self) -> &RunningMeanStd {
        &self.reward_stats
    }

    fn errors(&self, prev_feature: &Tensor, feature: &Tensor, prev_action: &Tensor) -> Result<Errors> {
        let prev = tensor::to_matrix(prev_feature)?;
        let cur = tensor::to_matrix(feature)?;
        if prev.ncols() != self.feature_dim || cur.dim() != prev.dim() {
            return Err(RLError::DimensionMismatch {
                expected: self.feature_dim,
                actual: cur.ncols(),
            });
        }
        let prev_action = tensor::to_vector(prev_action);
        let actions = one_hot(prev_action.view(), self.num_actions)?;

        let forward_inputs = concat_features(prev.view(), actions.view());
        let forward = affine(&forward_inputs, &self.forward_w, &self.forward_b)? - &cur;

        let inverse_inputs = concat_features(prev.view(), cur.view());
        let logits = affine(&inverse_inputs, &self.inverse_w, &self.inverse_b)?;

        Ok(Errors {
            forward,
            inverse_probs: softmax_rows(&logits),
            forward_inputs,
            inverse_inputs,
            prev_action,
        })
    }

    fn forward_loss(&self, forward_error: &Array2<f32>) -> Array1<f32> {
        let d = self.feature_dim.max(1) as f32;
        forward_error
            .rows()
            .into_iter()
            .map(|row| 0.5 * row.iter().map(|e| e * e).sum::<f32>() / d)
            .collect()
    }
}

impl Algorithm for IcmAlgorithm {
    fn name(&self) -> &str {
        "icm"
    }

    fn train_state_spec(&self) -> StateSpec {
        StateSpec::tensor(&[self.feature_dim])
    }

    fn optimizer(&self) -> Option<&OptimizerConfig> {
        self.config.optimizer.as_ref()
    }

    fn trainable_variables(&self) -> Vec<&Parameter> {
        vec![&self.forward_w, &self.forward_b, &self.inverse_w, &self.inverse_b]
    }

    fn trainable_variables_mut(&mut self) -> Vec<&mut Parameter> {
        vec![
            &mut self.forward_w,
            &mut self.forward_b,
            &mut self.inverse_w,
            &mut self.inverse_b,
        ]
    }
}

impl CuriosityModule for IcmAlgorithm {
    type State = Tensor;
    type Info = IcmInfo;
    type LossExtra = IcmLossExtra;

    fn initial_state(&self, batch_size: usize) -> Tensor {
        tensor::zeros(&[batch_size, self.feature_dim])
    }

    fn reset_at_first_steps(&self, state: &Tensor, is_first: &[bool]) -> Tensor {
        let mut state = state.clone();
        for (mut row, _) in state
            .outer_iter_mut()
            .zip(is_first)
            .filter(|(_, first)| **first)
        {
            row.fill(0.0);
        }
        state
    }

    fn train_step(
        &mut self,
        (feature, prev_action): (&Tensor, &Tensor),
        state: &Tensor,
        calc_intrinsic_reward: bool,
    ) -> Result<AlgStep<Tensor, IcmInfo>> {
        let reward = if calc_intrinsic_reward {
            let errors = self.errors(state, feature, prev_action)?;
            let raw = self.forward_loss(&errors.forward) * self.config.reward_scale;
            let reward = if self.config.normalize_reward {
                self.reward_stats.update_batch(raw.iter());
                raw.mapv(|r| self.reward_stats.normalize(r))
            } else {
                raw
            };
            Some(reward.into_dyn())
        } else {
            None
        };

        Ok(AlgStep {
            state: feature.clone(),
            info: IcmInfo {
                reward,
                prev_feature: state.clone(),
                feature: feature.clone(),
                prev_action: prev_action.clone(),
            },
        })
    }

    fn intrinsic_reward<'a>(&self, info: &'a IcmInfo) -> Option<&'a Tensor> {
        info.reward.as_ref()
    }

    fn take_intrinsic_reward(&self, info: &mut IcmInfo) -> Option<Tensor> {
        info.reward.take()
    }

    fn recompute_intrinsic_reward(&self, info: &IcmInfo) -> Result<Option<Tensor>> {
        let errors = self.errors(&info.prev_feature, &info.feature, &info.prev_action)?;
        let mut reward = self.forward_loss(&errors.forward) * self.config.reward_scale;
        if self.config.normalize_reward {
            reward.mapv_inplace(|r| self.reward_stats.normalize(r));
        }
        Ok(Some(tensor::from_shape_vec(
            info.prev_action.shape(),
            reward.to_vec(),
        )?))
    }

    fn calc_loss(&self, info: &IcmInfo) -> Result<LossInfo<IcmLossExtra>> {
        let errors = self.errors(&info.prev_feature, &info.feature, &info.prev_action)?;
        let n = errors.forward.nrows();
        let inv_n = 1.0 / n.max(1) as f32;
        let d = self.feature_dim.max(1) as f32;

        let forward_loss = self.forward_loss(&errors.forward);
        let inverse_loss: Array1<f32> = errors
            .inverse_probs
            .rows()
            .into_iter()
            .zip(errors.prev_action.iter())
            .map(|(row, &a)| -row[a as usize].max(f32::MIN_POSITIVE).ln())
            .collect();

        let grad_forward = &errors.forward * (inv_n / d);
        let mut grad_inverse = errors.inverse_probs.clone();
        for (i, &a) in errors.prev_action.iter().enumerate() {
            grad_inverse[[i, a as usize]] -= 1.0;
        }
        grad_inverse.mapv_inplace(|g| g * inv_n);

        let (fw, fb) = affine_grads(&errors.forward_inputs, &grad_forward);
        let (iw, ib) = affine_grads(&errors.inverse_inputs, &grad_inverse);
        let mut gradients = Gradients::new();
        gradients.insert(self.forward_w.name.clone(), fw.into_dyn());
        gradients.insert(self.forward_b.name.clone(), fb.into_dyn());
        gradients.insert(self.inverse_w.name.clone(), iw.into_dyn());
        gradients.insert(self.inverse_b.name.clone(), ib.into_dyn());

        let extra = IcmLossExtra {
            forward_loss: forward_loss.mean().unwrap_or(0.0),
            inverse_loss: inverse_loss.mean().unwrap_or(0.0),
        };
        let total = &forward_loss + &inverse_loss;
        let loss = tensor::from_shape_vec(info.prev_action.shape(), total.to_vec())?;
        Ok(LossInfo::new(loss, extra).with_gradients(gradients))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tandem_rl_core::tensor::stack_steps;

    fn module() -> IcmAlgorithm {
        IcmAlgorithm::new(&ActionSpec::discrete(3), 4, IcmConfig::default()).unwrap()
    }

    fn features(seed: f32) -> Tensor {
        tensor::from_shape_vec(&[2, 4], (0..8).map(|v| (v as f32 + seed).sin()).collect()).unwrap()
    }

    fn actions() -> Tensor {
        tensor::from_shape_vec(&[2], vec![2.0, 0.0]).unwrap()
    }

    #[test]
    fn test_state_is_previous_feature() {
        let mut icm = module();
        let state = icm.initial_state(2);
        assert_eq!(state.shape(), &[2, 4]);
        let step = icm.train_step((&features(0.0), &actions()), &state, true).unwrap();
        assert_eq!(step.state, features(0.0));
        assert_eq!(step.info.prev_feature, state);
        assert_eq!(icm.train_state_spec(), StateSpec::tensor(&[4]));
    }

    #[test]
    fn test_reward_is_skipped_on_request() {
        let mut icm = module();
        let state = icm.initial_state(2);
        let live = icm.train_step((&features(0.0), &actions()), &state, true).unwrap();
        let reward = icm.intrinsic_reward(&live.info).unwrap();
        assert_eq!(reward.shape(), &[2]);
        assert!(reward.iter().all(|r| *r >= 0.0));

        let replay = icm.train_step((&features(0.0), &actions()), &state, false).unwrap();
        assert!(icm.intrinsic_reward(&replay.info).is_none());
    }

    #[test]
    fn test_deferred_reward_matches_live_reward() {
        let mut icm = module();
        let state = icm.initial_state(2);
        let live = icm.train_step((&features(0.3), &actions()), &state, true).unwrap();
        let deferred = icm.train_step((&features(0.3), &actions()), &state, false).unwrap();
        let recomputed = icm.recompute_intrinsic_reward(&deferred.info).unwrap().unwrap();
        assert_eq!(Some(recomputed), live.info.reward);
    }

    #[test]
    fn test_recompute_leaves_reward_stats_alone() {
        let mut icm = IcmAlgorithm::new(
            &ActionSpec::discrete(3),
            4,
            IcmConfig {
                normalize_reward: true,
                ..IcmConfig::default()
            },
        )
        .unwrap();
        let state = icm.initial_state(2);
        icm.train_step((&features(0.1), &actions()), &state, true).unwrap();
        let seen = icm.reward_stats().clone();
        assert_eq!(seen.count, 2);

        let deferred = icm.train_step((&features(0.7), &actions()), &state, false).unwrap();
        let first = icm.recompute_intrinsic_reward(&deferred.info).unwrap().unwrap();
        let second = icm.recompute_intrinsic_reward(&deferred.info).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(icm.reward_stats().count, seen.count);
        assert_eq!(icm.reward_stats().mean, seen.mean);
    }

    #[test]
    fn test_first_steps_reset_previous_feature() {
        let mut icm = module();
        let state = icm
            .train_step((&features(0.2), &actions()), &icm.initial_state(2), true)
            .unwrap()
            .state;
        let reset = icm.reset_at_first_steps(&state, &[true, false]);
        assert!(reset.index_axis(ndarray::Axis(0), 0).iter().all(|v| *v == 0.0));
        assert_eq!(
            reset.index_axis(ndarray::Axis(0), 1),
            state.index_axis(ndarray::Axis(0), 1)
        );

        let mut info = icm.train_step((&features(0.4), &actions()), &reset, true).unwrap().info;
        assert!(info.prev_feature.index_axis(ndarray::Axis(0), 0).iter().all(|v| *v == 0.0));
        assert!(icm.take_intrinsic_reward(&mut info).is_some());
        assert!(info.reward.is_none());
        assert!(icm.take_intrinsic_reward(&mut info).is_none());
    }

    #[test]
    fn test_reward_scale_multiplies_forward_error() {
        let mut plain = module();
        let mut scaled = IcmAlgorithm::new(
            &ActionSpec::discrete(3),
            4,
            IcmConfig {
                reward_scale: 3.0,
                ..IcmConfig::default()
            },
        )
        .unwrap();
        let state = plain.initial_state(2);
        let a = plain.train_step((&features(1.0), &actions()), &state, true).unwrap();
        let b = scaled.train_step((&features(1.0), &actions()), &state, true).unwrap();
        let (a, b) = (a.info.reward.unwrap(), b.info.reward.unwrap());
        assert_relative_eq!(b[[0]], 3.0 * a[[0]], epsilon = 1e-5);
    }

    #[test]
    fn test_loss_over_stacked_steps() {
        let mut icm = module();
        let mut state = icm.initial_state(2);
        let mut infos = Vec::new();
        for t in 0..3 {
            let step = icm
                .train_step((&features(t as f32), &actions()), &state, false)
                .unwrap();
            state = step.state;
            infos.push(step.info);
        }
        let batch = stack_steps(&infos).unwrap();
        assert!(batch.reward.is_none());

        let loss = icm.calc_loss(&batch).unwrap();
        assert_eq!(loss.loss.as_ref().unwrap().shape(), &[3, 2]);
        assert_eq!(loss.gradients.len(), 4);
        assert!(loss.extra.inverse_loss > 0.0);
        assert_relative_eq!(
            loss.total(),
            loss.extra.forward_loss + loss.extra.inverse_loss,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut icm = module();
        let state = icm.initial_state(2);
        let info = icm
            .train_step((&features(0.5), &actions()), &state, false)
            .unwrap()
            .info;
        let mut optimizer = OptimizerConfig::sgd(0.1).build().unwrap();
        let before = icm.calc_loss(&info).unwrap().total();
        for _ in 0..20 {
            let grads = icm.calc_loss(&info).unwrap().gradients;
            optimizer.apply(icm.trainable_variables_mut(), &grads).unwrap();
        }
        let after = icm.calc_loss(&info).unwrap().total();
        assert!(after < before);
    }

    #[test]
    fn test_continuous_spec_is_rejected() {
        let spec = ActionSpec::continuous(vec![0.0], vec![1.0]).unwrap();
        assert!(matches!(
            IcmAlgorithm::new(&spec, 4, IcmConfig::default()),
            Err(RLError::Config(_))
        ));
    }
}
