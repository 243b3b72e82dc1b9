//! Contracts for composable learning algorithms
//!
//! An agent is assembled from sub-algorithms that each own their parameters
//! and their recurrent state. The traits here are the seams the agent drives:
//!
//! - [`Algorithm`]: what every trainable unit exposes (state specs, an
//!   optional optimizer of its own, its parameters).
//! - [`RlAlgorithm`]: a policy learner producing actions.
//! - [`CuriosityModule`]: a module producing an intrinsic reward from
//!   consecutive observations.

use std::fmt::Debug;

use serde::Serialize;

use crate::action::ActionSpec;
use crate::distribution::Categorical;
use crate::experience::{Experience, TrainingInfo};
use crate::loss::LossInfo;
use crate::optimizer::OptimizerConfig;
use crate::parameter::{Gradients, Parameter};
use crate::state::StateSpec;
use crate::tensor::{Stack, Tensor};
use crate::time_step::TimeStep;
use crate::Result;

/// Output of a policy step
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStep<S, I> {
    /// Chosen actions, `[B]` for discrete specs
    pub action: Tensor,
    /// Distribution the action was drawn from
    pub action_distribution: Categorical,
    /// Next recurrent state
    pub state: S,
    /// Per-step info kept for the loss
    pub info: I,
}

/// Output of a non-policy training step
#[derive(Debug, Clone, PartialEq)]
pub struct AlgStep<S, I> {
    /// Next recurrent state
    pub state: S,
    /// Per-step info kept for the loss
    pub info: I,
}

/// Common surface of every trainable unit
pub trait Algorithm: Send {
    /// Name used as the parameter prefix and in diagnostics
    fn name(&self) -> &str;

    /// Shape of the state threaded through training steps
    fn train_state_spec(&self) -> StateSpec {
        StateSpec::Empty
    }

    /// Shape of the state threaded through inference steps
    fn predict_state_spec(&self) -> StateSpec {
        self.train_state_spec()
    }

    /// Optimizer this unit wants for itself.
    ///
    /// `None` means its parameters are trained by the owner's primary optimizer.
    fn optimizer(&self) -> Option<&OptimizerConfig> {
        None
    }

    /// Parameters trained by gradient descent
    fn trainable_variables(&self) -> Vec<&Parameter>;

    /// Mutable access to the trainable parameters, in the same order
    fn trainable_variables_mut(&mut self) -> Vec<&mut Parameter>;
}

/// A policy learner
pub trait RlAlgorithm: Algorithm {
    /// Recurrent state
    type State: Clone + Debug + PartialEq;
    /// Per-step info collected during rollout
    type Info: Clone + Debug + Stack;
    /// Loss diagnostics
    type LossExtra: Clone + Debug + Serialize;

    /// Actions this algorithm produces
    fn action_spec(&self) -> &ActionSpec;

    /// State at the start of an episode for `batch_size` environments
    fn initial_state(&self, batch_size: usize) -> Self::State;

    /// Inference step. Must not change the algorithm.
    fn predict(&self, time_step: &TimeStep, state: &Self::State)
        -> Result<PolicyStep<Self::State, ()>>;

    /// Data-collection step
    fn rollout(
        &mut self,
        time_step: &TimeStep,
        state: &Self::State,
    ) -> Result<PolicyStep<Self::State, Self::Info>>;

    /// Loss and gradients of a time-major batch
    fn calc_loss(
        &self,
        training_info: &TrainingInfo<Self::Info>,
    ) -> Result<LossInfo<Self::LossExtra>>;

    /// Gradients of `coef * -H` with respect to this algorithm's parameters,
    /// where `H` is the mean entropy of the policy over the batch.
    ///
    /// An entropy controller owned by the agent calls this to push its
    /// weighted term into the policy. The default contributes nothing.
    fn entropy_gradients(
        &self,
        _training_info: &TrainingInfo<Self::Info>,
        _coef: f32,
    ) -> Result<Gradients> {
        Ok(Gradients::new())
    }

    /// Prepare a replayed batch before its loss is computed
    fn preprocess_experience(
        &self,
        experience: Experience<Self::Info>,
    ) -> Result<Experience<Self::Info>> {
        Ok(experience)
    }
}

/// A module rewarding the agent for visiting poorly predicted transitions
pub trait CuriosityModule: Algorithm {
    /// Recurrent state
    type State: Clone + Debug + PartialEq;
    /// Per-step info collected during rollout
    type Info: Clone + Debug + Stack;
    /// Loss diagnostics
    type LossExtra: Clone + Debug + Serialize;

    /// State at the start of an episode for `batch_size` environments
    fn initial_state(&self, batch_size: usize) -> Self::State;

    /// Reset the entries of `state` whose step opens a new episode
    fn reset_at_first_steps(&self, state: &Self::State, _is_first: &[bool]) -> Self::State {
        state.clone()
    }

    /// Training step on `(observation, prev_action)`.
    ///
    /// When `calc_intrinsic_reward` is false the returned info carries no
    /// reward and the caller is expected to recompute it later.
    fn train_step(
        &mut self,
        inputs: (&Tensor, &Tensor),
        state: &Self::State,
        calc_intrinsic_reward: bool,
    ) -> Result<AlgStep<Self::State, Self::Info>>;

    /// Intrinsic reward stored in a step's info, if one was computed
    fn intrinsic_reward<'a>(&self, info: &'a Self::Info) -> Option<&'a Tensor>;

    /// Move the stored intrinsic reward out of `info`, leaving it deferred
    fn take_intrinsic_reward(&self, info: &mut Self::Info) -> Option<Tensor>;

    /// Compute the intrinsic reward of a stored info from its inputs.
    ///
    /// Used for records collected without a live reward. Any running
    /// normalization is applied with its current statistics and is not
    /// updated. The default has no way to recompute and returns `None`.
    fn recompute_intrinsic_reward(&self, _info: &Self::Info) -> Result<Option<Tensor>> {
        Ok(None)
    }

    /// Loss and gradients of a batch of infos
    fn calc_loss(&self, info: &Self::Info) -> Result<LossInfo<Self::LossExtra>>;
}
