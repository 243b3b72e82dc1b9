//! Time-major training batches
//!
//! [`TrainingInfo`] is what on-policy algorithms compute their loss from: the
//! step bookkeeping of a rollout plus the per-step info each algorithm
//! produced. [`Experience`] additionally keeps the observation and previous
//! action so a replayed batch can be re-run through the algorithms.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::tensor::{stack_field, Stack, Tensor};
use crate::time_step::{StepType, TimeStep};
use crate::Result;

/// Rollout record used to compute a loss, `[T, B, ..]` once stacked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingInfo<I> {
    /// Step types
    pub step_type: ArrayD<StepType>,
    /// Rewards, possibly already shaped
    pub reward: Tensor,
    /// Discounts
    pub discount: Tensor,
    /// Action chosen at each step
    pub action: Tensor,
    /// Per-step algorithm info
    pub info: I,
}

impl<I> TrainingInfo<I> {
    /// Per-step record from a time step, the action taken on it and its info
    #[must_use]
    pub fn from_step(step: &TimeStep, action: Tensor, info: I) -> Self {
        Self {
            step_type: step.step_type.clone(),
            reward: step.reward.clone(),
            discount: step.discount.clone(),
            action,
            info,
        }
    }

    /// Copy with the reward replaced
    #[must_use]
    pub fn with_reward(&self, reward: Tensor) -> Self
    where
        I: Clone,
    {
        Self {
            step_type: self.step_type.clone(),
            reward,
            discount: self.discount.clone(),
            action: self.action.clone(),
            info: self.info.clone(),
        }
    }

    /// Borrow the bookkeeping fields and swap in a different info
    #[must_use]
    pub fn with_info<J>(&self, info: J) -> TrainingInfo<J> {
        TrainingInfo {
            step_type: self.step_type.clone(),
            reward: self.reward.clone(),
            discount: self.discount.clone(),
            action: self.action.clone(),
            info,
        }
    }

    /// Number of time steps in a stacked batch
    #[must_use]
    pub fn num_steps(&self) -> usize {
        self.step_type.shape().first().copied().unwrap_or(0)
    }
}

impl<I: Stack> Stack for TrainingInfo<I> {
    fn stack(items: &[&Self]) -> Result<Self> {
        Ok(Self {
            step_type: stack_field(items, |x| &x.step_type)?,
            reward: stack_field(items, |x| &x.reward)?,
            discount: stack_field(items, |x| &x.discount)?,
            action: stack_field(items, |x| &x.action)?,
            info: stack_field(items, |x| &x.info)?,
        })
    }
}

/// Replayable record of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience<I> {
    /// Step types
    pub step_type: ArrayD<StepType>,
    /// Reward as stored, before any shaping
    pub reward: Tensor,
    /// Discounts
    pub discount: Tensor,
    /// Raw observation
    pub observation: Tensor,
    /// Action taken on the previous step
    pub prev_action: Tensor,
    /// Action chosen at this step
    pub action: Tensor,
    /// Per-step algorithm info
    pub info: I,
}

impl<I> Experience<I> {
    /// Record a step with the action and info produced for it
    #[must_use]
    pub fn from_step(step: &TimeStep, action: Tensor, info: I) -> Self {
        Self {
            step_type: step.step_type.clone(),
            reward: step.reward.clone(),
            discount: step.discount.clone(),
            observation: step.observation.clone(),
            prev_action: step.prev_action.clone(),
            action,
            info,
        }
    }

    /// Copy with the reward replaced
    #[must_use]
    pub fn with_reward(&self, reward: Tensor) -> Self
    where
        I: Clone,
    {
        self.with_reward_and_info(reward, self.info.clone())
    }

    /// Copy with the reward and info replaced
    #[must_use]
    pub fn with_reward_and_info<J>(&self, reward: Tensor, info: J) -> Experience<J> {
        Experience {
            step_type: self.step_type.clone(),
            reward,
            discount: self.discount.clone(),
            observation: self.observation.clone(),
            prev_action: self.prev_action.clone(),
            action: self.action.clone(),
            info,
        }
    }

    /// Transform the info, keeping everything else
    #[must_use]
    pub fn map_info<J, F>(self, f: F) -> Experience<J>
    where
        F: FnOnce(I) -> J,
    {
        Experience {
            step_type: self.step_type,
            reward: self.reward,
            discount: self.discount,
            observation: self.observation,
            prev_action: self.prev_action,
            action: self.action,
            info: f(self.info),
        }
    }

    /// Split into the bookkeeping with a unit info and the info itself
    pub fn into_parts(self) -> (Experience<()>, I) {
        let Self {
            step_type,
            reward,
            discount,
            observation,
            prev_action,
            action,
            info,
        } = self;
        (
            Experience {
                step_type,
                reward,
                discount,
                observation,
                prev_action,
                action,
                info: (),
            },
            info,
        )
    }

    /// Drop the observation and keep what a loss needs
    #[must_use]
    pub fn to_training_info(&self) -> TrainingInfo<I>
    where
        I: Clone,
    {
        TrainingInfo {
            step_type: self.step_type.clone(),
            reward: self.reward.clone(),
            discount: self.discount.clone(),
            action: self.action.clone(),
            info: self.info.clone(),
        }
    }
}

impl<I: Stack> Stack for Experience<I> {
    fn stack(items: &[&Self]) -> Result<Self> {
        Ok(Self {
            step_type: stack_field(items, |x| &x.step_type)?,
            reward: stack_field(items, |x| &x.reward)?,
            discount: stack_field(items, |x| &x.discount)?,
            observation: stack_field(items, |x| &x.observation)?,
            prev_action: stack_field(items, |x| &x.prev_action)?,
            action: stack_field(items, |x| &x.action)?,
            info: stack_field(items, |x| &x.info)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{self, stack_steps};

    #[test]
    fn test_stacked_training_info_is_time_major() {
        let step = TimeStep::first(tensor::zeros(&[4, 3]));
        let steps: Vec<TrainingInfo<()>> = (0..5)
            .map(|_| TrainingInfo::from_step(&step, tensor::zeros(&[4]), ()))
            .collect();
        let batch = stack_steps(&steps).unwrap();
        assert_eq!(batch.reward.shape(), &[5, 4]);
        assert_eq!(batch.step_type.shape(), &[5, 4]);
        assert_eq!(batch.num_steps(), 5);
    }

    #[test]
    fn test_experience_parts() {
        let step = TimeStep::first(tensor::zeros(&[2, 3]));
        let exp = Experience::from_step(&step, tensor::zeros(&[2]), tensor::scalar(1.0));
        assert_eq!(exp.observation, step.observation);
        assert_eq!(exp.prev_action, step.prev_action);

        let replaced = exp.with_reward(tensor::from_shape_vec(&[2], vec![1.0, 2.0]).unwrap());
        assert_eq!(replaced.reward[[1]], 2.0);
        assert_eq!(replaced.info, exp.info);

        let training = exp.to_training_info();
        assert_eq!(training.action, exp.action);
        assert_eq!(training.reward, exp.reward);

        let (bare, info) = exp.into_parts();
        assert_eq!(bare.observation.shape(), &[2, 3]);
        assert_eq!(info, tensor::scalar(1.0));
    }
}
