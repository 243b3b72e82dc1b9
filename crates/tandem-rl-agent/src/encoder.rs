//! Observation encoders applied before any sub-algorithm sees a time step

use ndarray::Array1;
use rand::{rngs::StdRng, SeedableRng};

use tandem_rl_core::tensor::{self, Tensor};
use tandem_rl_core::{Parameter, Result};

use crate::utils::{affine, xavier_init};

/// Maps raw observations to the features sub-algorithms consume
pub trait Encoder: Send {
    /// Encode a batch of observations `[B, ..]`
    fn encode(&self, observation: &Tensor) -> Result<Tensor>;

    /// Parameters trained with the agent's primary optimizer
    fn trainable_variables(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    /// Mutable access to the trainable parameters
    fn trainable_variables_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }
}

impl<F> Encoder for F
where
    F: Fn(&Tensor) -> Result<Tensor> + Send,
{
    fn encode(&self, observation: &Tensor) -> Result<Tensor> {
        self(observation)
    }
}

/// Single dense layer with a `tanh` activation: `tanh(x W + b)`
#[derive(Debug, Clone)]
pub struct LinearEncoder {
    weight: Parameter,
    bias: Parameter,
}

impl LinearEncoder {
    /// Xavier-initialized encoder from `input_dim` to `output_dim` features
    #[must_use]
    pub fn new(input_dim: usize, output_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            weight: Parameter::new(
                "encoder/weight",
                xavier_init(input_dim, output_dim, &mut rng).into_dyn(),
            ),
            bias: Parameter::new("encoder/bias", Array1::<f32>::zeros(output_dim).into_dyn()),
        }
    }

    /// Number of input features
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.weight.value.shape()[0]
    }

    /// Number of output features
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.weight.value.shape()[1]
    }
}

impl Encoder for LinearEncoder {
    fn encode(&self, observation: &Tensor) -> Result<Tensor> {
        let x = tensor::to_matrix(observation)?;
        let y = affine(&x, &self.weight, &self.bias)?.mapv(f32::tanh);

        let mut shape = observation.shape().to_vec();
        if let Some(last) = shape.last_mut() {
            *last = self.output_dim();
        }
        tensor::from_shape_vec(&shape, y.iter().copied().collect())
    }

    fn trainable_variables(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn trainable_variables_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_rl_core::RLError;

    #[test]
    fn test_linear_encoder_keeps_leading_axes() {
        let encoder = LinearEncoder::new(3, 5, 1);
        let features = encoder.encode(&tensor::zeros(&[4, 2, 3])).unwrap();
        assert_eq!(features.shape(), &[4, 2, 5]);
        assert!(features.iter().all(|v| *v == 0.0));
        assert_eq!(encoder.trainable_variables().len(), 2);
    }

    #[test]
    fn test_linear_encoder_rejects_wrong_width() {
        let encoder = LinearEncoder::new(3, 5, 1);
        assert!(matches!(
            encoder.encode(&tensor::zeros(&[4, 2])),
            Err(RLError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_closures_are_encoders() {
        let double = |x: &Tensor| -> Result<Tensor> { Ok(x * 2.0) };
        let out = double.encode(&tensor::scalar(1.5)).unwrap();
        assert_eq!(out, tensor::scalar(3.0));
        assert!(Encoder::trainable_variables(&double).is_empty());
    }
}
