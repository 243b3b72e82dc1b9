//! Composition of extrinsic and intrinsic rewards

use std::borrow::Cow;

use tandem_rl_core::summary::{summarize_tensor, SummarySink};
use tandem_rl_core::tensor::{self, Tensor};
use tandem_rl_core::Result;

/// Reward used for training, together with whether it differs from the input
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReward<'a> {
    reward: Cow<'a, Tensor>,
    is_modified: bool,
}

impl<'a> TrainingReward<'a> {
    /// The composed reward
    #[must_use]
    pub fn reward(&self) -> &Tensor {
        &self.reward
    }

    /// Whether scaling or an intrinsic term changed the reward
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    /// Whether the result is the caller's tensor itself
    #[must_use]
    pub fn is_borrowed(&self) -> bool {
        matches!(self.reward, Cow::Borrowed(_))
    }

    /// Take ownership of the composed reward
    #[must_use]
    pub fn into_owned(self) -> Tensor {
        self.reward.into_owned()
    }
}

/// Weighted sum `extrinsic_coef * r + intrinsic_coef * i`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardComposer {
    /// Weight of the environment reward
    pub extrinsic_coef: f32,
    /// Weight of the intrinsic reward
    pub intrinsic_coef: f32,
}

impl Default for RewardComposer {
    fn default() -> Self {
        Self {
            extrinsic_coef: 1.0,
            intrinsic_coef: 1.0,
        }
    }
}

impl RewardComposer {
    /// Create a composer with the given weights
    #[must_use]
    pub fn new(extrinsic_coef: f32, intrinsic_coef: f32) -> Self {
        Self {
            extrinsic_coef,
            intrinsic_coef,
        }
    }

    /// Compose the training reward.
    ///
    /// A unit extrinsic weight leaves the environment reward untouched, and an
    /// absent intrinsic reward adds nothing. When neither changes the reward
    /// the input tensor is returned as is.
    #[allow(clippy::float_cmp)]
    pub fn compose<'a>(
        &self,
        extrinsic: &'a Tensor,
        intrinsic: Option<&Tensor>,
        sink: &dyn SummarySink,
    ) -> Result<TrainingReward<'a>> {
        let mut reward = Cow::Borrowed(extrinsic);
        let mut is_modified = false;

        if self.extrinsic_coef != 1.0 {
            reward = Cow::Owned(extrinsic * self.extrinsic_coef);
            is_modified = true;
        }

        if let Some(intrinsic) = intrinsic {
            summarize_tensor(sink, "reward/icm", intrinsic);
            let scaled = intrinsic * self.intrinsic_coef;
            reward = Cow::Owned(tensor::add(&reward, &scaled)?);
            is_modified = true;
        }

        if is_modified {
            summarize_tensor(sink, "reward/overall", &reward);
        }

        Ok(TrainingReward {
            reward,
            is_modified,
        })
    }
}
