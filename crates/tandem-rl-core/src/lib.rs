//! Core types and contracts for composable reinforcement-learning agents
//!
//! This crate provides the building blocks shared by every algorithm in the
//! workspace: dense tensors, state and action specs, batched time steps,
//! training records, loss records with gradients, optimizers, and the traits
//! sub-algorithms implement so an agent can drive them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod action;
pub mod algorithm;
pub mod distribution;
pub mod error;
pub mod experience;
pub mod loss;
pub mod optimizer;
pub mod parameter;
pub mod state;
pub mod summary;
pub mod telemetry;
pub mod tensor;
pub mod time_step;

pub use action::ActionSpec;
pub use algorithm::{AlgStep, Algorithm, CuriosityModule, PolicyStep, RlAlgorithm};
pub use distribution::Categorical;
pub use error::{RLError, Result};
pub use experience::{Experience, TrainingInfo};
pub use loss::LossInfo;
pub use optimizer::{GradientClipping, Optimizer, OptimizerConfig};
pub use parameter::{Gradients, Parameter};
pub use state::StateSpec;
pub use summary::{MemorySink, SummaryRecord, SummarySink, TracingSink};
pub use tensor::{Stack, Tensor};
pub use time_step::{StepType, TimeStep};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ActionSpec, AlgStep, Algorithm, Categorical, CuriosityModule, Experience, Gradients,
        LossInfo, Parameter, PolicyStep, RLError, Result, RlAlgorithm, StateSpec, Tensor,
        TimeStep, TrainingInfo,
    };
}
