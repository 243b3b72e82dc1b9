//! Composable reinforcement-learning agents
//!
//! An [`Agent`] drives one policy learner together with an optional
//! observation encoder, an optional intrinsic-curiosity module and an optional
//! entropy-target controller:
//! - rollout runs curiosity, then the policy, then entropy control
//! - the training reward adds the weighted curiosity bonus to the environment reward
//! - losses of all members are summed and their diagnostics kept per member
//! - each member is trained by the optimizer of its group
//!
//! Reference members ship with the crate: [`ActorCriticAlgorithm`],
//! [`IcmAlgorithm`], [`EntropyTargetAlgorithm`] and [`LinearEncoder`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod actor_critic;
pub mod agent;
pub mod config;
pub mod encoder;
pub mod entropy_target;
pub mod icm;
pub mod registry;
pub mod reward;
pub mod utils;

// Re-export the agent surface
pub use agent::{
    Agent, AgentBuilder, AgentInfo, AgentLossExtra, AgentState, InfoOf, LossExtraOf, StateOf,
    TensorFn,
};
pub use config::AgentConfig;
pub use registry::{Member, OptimizerGroup, OptimizerRegistry};
pub use reward::{RewardComposer, TrainingReward};

// Re-export reference members
pub use actor_critic::{ActorCriticAlgorithm, ActorCriticConfig, ActorCriticInfo};
pub use encoder::{Encoder, LinearEncoder};
pub use entropy_target::{EntropyTargetAlgorithm, EntropyTargetConfig, EntropyTargetInfo};
pub use icm::{IcmAlgorithm, IcmConfig, IcmInfo};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ActorCriticAlgorithm, ActorCriticConfig, Agent, AgentBuilder, AgentConfig, AgentInfo,
        AgentState, EntropyTargetConfig, IcmAlgorithm, IcmConfig, LinearEncoder,
    };
    pub use tandem_rl_core::prelude::*;
}
