//! Dense tensors and time-stacking helpers
//!
//! Per-step values carry a leading batch axis `[B, ..]`. Training batches are
//! time-major `[T, B, ..]` and are produced by stacking per-step records with
//! [`Stack`].

use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis, IxDyn};

use crate::{RLError, Result};

/// Dense `f32` tensor with a dynamic number of axes
pub type Tensor = ArrayD<f32>;

/// Zero-dimensional tensor holding `value`
#[must_use]
pub fn scalar(value: f32) -> Tensor {
    ArrayD::from_elem(IxDyn(&[]), value)
}

/// Tensor of the given shape filled with zeros
#[must_use]
pub fn zeros(shape: &[usize]) -> Tensor {
    ArrayD::zeros(IxDyn(shape))
}

/// Build a tensor of `shape` from row-major `data`
pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Tensor> {
    Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
}

/// Mean over all elements, `0.0` for an empty tensor
#[must_use]
pub fn mean(x: &Tensor) -> f32 {
    x.mean().unwrap_or(0.0)
}

/// Flatten all leading axes and keep the last one: `[.., d] -> [n, d]`
pub fn to_matrix(x: &Tensor) -> Result<Array2<f32>> {
    let Some(&cols) = x.shape().last() else {
        return Err(RLError::Computation(
            "cannot view a scalar tensor as a matrix".to_string(),
        ));
    };
    let rows = if cols == 0 { 0 } else { x.len() / cols };
    Ok(Array2::from_shape_vec(
        (rows, cols),
        x.iter().copied().collect(),
    )?)
}

/// Flatten every axis: `[..] -> [n]`
#[must_use]
pub fn to_vector(x: &Tensor) -> Array1<f32> {
    x.iter().copied().collect()
}

/// Element-wise sum. One operand may broadcast to the other's shape.
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape() == b.shape() {
        return Ok(a + b);
    }
    if let Some(bv) = b.broadcast(a.raw_dim()) {
        return Ok(a + &bv);
    }
    if let Some(av) = a.broadcast(b.raw_dim()) {
        return Ok(&av + b);
    }
    Err(RLError::Computation(format!(
        "cannot add tensors of shape {:?} and {:?}",
        a.shape(),
        b.shape()
    )))
}

/// Sum of two optional tensors where an absent operand counts as zero
pub fn add_optional(a: Option<&Tensor>, b: Option<&Tensor>) -> Result<Option<Tensor>> {
    match (a, b) {
        (Some(a), Some(b)) => add(a, b).map(Some),
        (Some(x), None) | (None, Some(x)) => Ok(Some(x.clone())),
        (None, None) => Ok(None),
    }
}

/// Records that can be stacked along a new leading time axis
pub trait Stack: Sized {
    /// Stack per-step `items` into one time-major record
    fn stack(items: &[&Self]) -> Result<Self>;
}

/// Stack an owned sequence of per-step records
pub fn stack_steps<T: Stack>(items: &[T]) -> Result<T> {
    let refs: Vec<&T> = items.iter().collect();
    T::stack(&refs)
}

/// Stack one field of a sequence of per-step records
pub fn stack_field<'a, P, T, F>(items: &[&'a P], field: F) -> Result<T>
where
    T: Stack + 'a,
    F: Fn(&'a P) -> &'a T,
{
    let refs: Vec<&T> = items.iter().map(|x| field(*x)).collect();
    T::stack(&refs)
}

impl<A: Clone> Stack for ArrayD<A> {
    fn stack(items: &[&Self]) -> Result<Self> {
        if items.is_empty() {
            return Err(RLError::InvalidState("cannot stack zero steps".to_string()));
        }
        let views: Vec<ArrayViewD<'_, A>> = items.iter().map(|x| x.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}

impl Stack for () {
    fn stack(_items: &[&Self]) -> Result<Self> {
        Ok(())
    }
}

impl<T: Stack> Stack for Option<T> {
    fn stack(items: &[&Self]) -> Result<Self> {
        let present: Vec<&T> = items.iter().filter_map(|x| x.as_ref()).collect();
        if present.is_empty() {
            return Ok(None);
        }
        if present.len() != items.len() {
            return Err(RLError::InvalidState(format!(
                "{} of {} steps carry a value for an optional record",
                present.len(),
                items.len()
            )));
        }
        T::stack(&present).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_broadcasts_scalar() {
        let batch = from_shape_vec(&[3], vec![1.0, 2.0, 3.0]).unwrap();
        let sum = add(&batch, &scalar(0.5)).unwrap();
        assert_eq!(sum.shape(), &[3]);
        assert_relative_eq!(sum[[2]], 3.5);

        let sum = add(&scalar(1.0), &batch).unwrap();
        assert_eq!(sum.shape(), &[3]);
        assert_relative_eq!(sum[[0]], 2.0);
    }

    #[test]
    fn test_add_rejects_incompatible_shapes() {
        let a = zeros(&[2]);
        let b = zeros(&[3]);
        assert!(matches!(add(&a, &b), Err(RLError::Computation(_))));
    }

    #[test]
    fn test_add_optional_treats_absent_as_zero() {
        let a = scalar(2.0);
        assert_eq!(add_optional(Some(&a), None).unwrap(), Some(scalar(2.0)));
        assert_eq!(add_optional(None, None).unwrap(), None);
    }

    #[test]
    fn test_stack_adds_time_axis() {
        let steps = vec![zeros(&[2, 4]), zeros(&[2, 4]), zeros(&[2, 4])];
        let stacked = stack_steps(&steps).unwrap();
        assert_eq!(stacked.shape(), &[3, 2, 4]);
        assert!(stack_steps::<Tensor>(&[]).is_err());
    }

    #[test]
    fn test_stack_option_rejects_mixed_presence() {
        let steps = vec![Some(scalar(1.0)), None];
        assert!(matches!(
            stack_steps(&steps),
            Err(RLError::InvalidState(_))
        ));
        let steps: Vec<Option<Tensor>> = vec![None, None];
        assert_eq!(stack_steps(&steps).unwrap(), None);
    }

    #[test]
    fn test_to_matrix_flattens_leading_axes() {
        let x = from_shape_vec(&[2, 3, 2], (0..12).map(|v| v as f32).collect()).unwrap();
        let m = to_matrix(&x).unwrap();
        assert_eq!(m.dim(), (6, 2));
        assert_relative_eq!(m[[5, 1]], 11.0);
        assert!(to_matrix(&scalar(1.0)).is_err());
    }
}
