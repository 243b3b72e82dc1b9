//! Batched environment time steps

use ndarray::{Array1, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::tensor::{self, stack_field, Stack, Tensor};

/// Position of a time step inside its episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    /// First step of an episode, the reward is meaningless
    First,
    /// Intermediate step
    Mid,
    /// Final step (terminal or truncated)
    Last,
}

impl StepType {
    /// Check whether the step opens an episode
    #[must_use]
    pub fn is_first(&self) -> bool {
        matches!(self, Self::First)
    }

    /// Check whether the step closes an episode
    #[must_use]
    pub fn is_last(&self) -> bool {
        matches!(self, Self::Last)
    }
}

/// One step of a batch of environments, as seen by an algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStep {
    /// Step types, `[B]`
    pub step_type: ArrayD<StepType>,
    /// Reward received for the previous action, `[B]`
    pub reward: Tensor,
    /// Discount applied to the value of this step, `[B]`
    pub discount: Tensor,
    /// Observation, `[B, ..]`
    pub observation: Tensor,
    /// Action taken on the previous step, `[B]` or `[B, A]`
    pub prev_action: Tensor,
}

impl TimeStep {
    /// Start a batch of episodes from their first observation
    #[must_use]
    pub fn first(observation: Tensor) -> Self {
        let batch_size = observation.shape().first().copied().unwrap_or(1);
        Self {
            step_type: ArrayD::from_elem(IxDyn(&[batch_size]), StepType::First),
            reward: tensor::zeros(&[batch_size]),
            discount: ArrayD::from_elem(IxDyn(&[batch_size]), 1.0),
            observation,
            prev_action: tensor::zeros(&[batch_size]),
        }
    }

    /// Build an intermediate or final step after `prev_action` was applied
    #[must_use]
    pub fn transition(
        observation: Tensor,
        prev_action: Tensor,
        reward: Tensor,
        done: &[bool],
    ) -> Self {
        let step_type = done
            .iter()
            .map(|&d| if d { StepType::Last } else { StepType::Mid })
            .collect::<Array1<_>>();
        let discount = done
            .iter()
            .map(|&d| if d { 0.0 } else { 1.0 })
            .collect::<Array1<f32>>();
        Self {
            step_type: step_type.into_dyn(),
            reward,
            discount: discount.into_dyn(),
            observation,
            prev_action,
        }
    }

    /// Number of environments in the batch
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.step_type.len()
    }

    /// Copy of this step carrying a different observation
    #[must_use]
    pub fn with_observation(&self, observation: Tensor) -> Self {
        Self {
            step_type: self.step_type.clone(),
            reward: self.reward.clone(),
            discount: self.discount.clone(),
            observation,
            prev_action: self.prev_action.clone(),
        }
    }

    /// Copy of this step carrying a different reward
    #[must_use]
    pub fn with_reward(&self, reward: Tensor) -> Self {
        Self {
            step_type: self.step_type.clone(),
            reward,
            discount: self.discount.clone(),
            observation: self.observation.clone(),
            prev_action: self.prev_action.clone(),
        }
    }
}

impl Stack for TimeStep {
    fn stack(items: &[&Self]) -> crate::Result<Self> {
        Ok(Self {
            step_type: stack_field(items, |x| &x.step_type)?,
            reward: stack_field(items, |x| &x.reward)?,
            discount: stack_field(items, |x| &x.discount)?,
            observation: stack_field(items, |x| &x.observation)?,
            prev_action: stack_field(items, |x| &x.prev_action)?,
        })
    }
}
