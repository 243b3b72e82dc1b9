//! Loss records returned by sub-algorithms
//!
//! A [`LossInfo`] carries the per-step loss tensor, an optional scalar loss,
//! algorithm-specific diagnostics and the gradients of the loss with respect
//! to the algorithm's parameters. Absent losses count as zero when records
//! are folded together.

use serde::{Deserialize, Serialize};

use crate::parameter::Gradients;
use crate::tensor::{self, Tensor};
use crate::Result;

/// Loss of one training batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossInfo<E> {
    /// Per-step loss, usually `[T, B]`
    pub loss: Option<Tensor>,
    /// Loss term that is not shaped per step
    pub scalar_loss: Option<f32>,
    /// Algorithm-specific diagnostics
    pub extra: E,
    /// Gradients of the loss with respect to the owning algorithm's parameters
    #[serde(skip)]
    pub gradients: Gradients,
}

impl<E> LossInfo<E> {
    /// Loss record with a per-step loss and no gradients
    pub fn new(loss: Tensor, extra: E) -> Self {
        Self {
            loss: Some(loss),
            scalar_loss: None,
            extra,
            gradients: Gradients::new(),
        }
    }

    /// Attach gradients
    #[must_use]
    pub fn with_gradients(mut self, gradients: Gradients) -> Self {
        self.gradients = gradients;
        self
    }

    /// Attach a scalar loss
    #[must_use]
    pub fn with_scalar_loss(mut self, scalar_loss: f32) -> Self {
        self.scalar_loss = Some(scalar_loss);
        self
    }

    /// Replace the diagnostics, keeping the losses and gradients
    pub fn map_extra<F, G>(self, f: G) -> LossInfo<F>
    where
        G: FnOnce(E) -> F,
    {
        LossInfo {
            loss: self.loss,
            scalar_loss: self.scalar_loss,
            extra: f(self.extra),
            gradients: self.gradients,
        }
    }

    /// Add another record's losses and gradients into this one.
    ///
    /// The other record's diagnostics are handed to `attach` so the caller can
    /// file them under their own key.
    pub fn fold<O, G>(mut self, other: LossInfo<O>, attach: G) -> Result<Self>
    where
        G: FnOnce(&mut E, O),
    {
        self.loss = tensor::add_optional(self.loss.as_ref(), other.loss.as_ref())?;
        self.scalar_loss = match (self.scalar_loss, other.scalar_loss) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        self.gradients.merge(other.gradients)?;
        attach(&mut self.extra, other.extra);
        Ok(self)
    }

    /// Mean of the per-step loss plus the scalar loss
    #[must_use]
    pub fn total(&self) -> f32 {
        self.loss.as_ref().map_or(0.0, tensor::mean) + self.scalar_loss.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fold_sums_losses_and_treats_absent_as_zero() {
        let base = LossInfo::new(tensor::from_shape_vec(&[2], vec![1.0, 2.0]).unwrap(), vec!["rl"]);
        let other = LossInfo {
            loss: None,
            scalar_loss: Some(0.5),
            extra: "icm",
            gradients: Gradients::new(),
        };
        let folded = base.fold(other, |extra, o| extra.push(o)).unwrap();
        assert_eq!(folded.extra, vec!["rl", "icm"]);
        assert_eq!(folded.scalar_loss, Some(0.5));
        assert_relative_eq!(folded.total(), 2.0);
    }

    #[test]
    fn test_fold_propagates_shape_errors() {
        let a = LossInfo::new(tensor::zeros(&[2]), ());
        let b = LossInfo::new(tensor::zeros(&[3]), ());
        assert!(a.fold(b, |_, ()| {}).is_err());
    }

    #[test]
    fn test_map_extra_keeps_loss() {
        let info = LossInfo::new(tensor::scalar(1.5), 3).with_scalar_loss(0.5);
        let mapped = info.map_extra(|n| n.to_string());
        assert_eq!(mapped.extra, "3");
        assert_relative_eq!(mapped.total(), 2.0);
    }
}
