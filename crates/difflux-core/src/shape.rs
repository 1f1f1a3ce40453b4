//! Tensor shapes and the combined-batch-size rule.

use crate::error::{BackendError, Result};
use std::fmt;

/// Ordered sequence of axis extents.
///
/// A rank-0 shape describes a scalar tensor with exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Creates a shape from axis extents.
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    /// The rank-0 scalar shape.
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Axis extents as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of elements.
    pub fn volume(&self) -> usize {
        self.0.iter().product()
    }

    /// Extent of one axis.
    pub fn dim(&self, axis: usize) -> Result<usize> {
        self.0.get(axis).copied().ok_or_else(|| {
            BackendError::invalid_argument("shape", format!("axis {axis} out of range for rank {}", self.rank()))
        })
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.rank()];
        for axis in (0..self.rank().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.0[axis + 1];
        }
        strides
    }

    /// Shape with one axis removed.
    pub fn without(&self, axis: usize) -> Self {
        let mut dims = self.0.clone();
        dims.remove(axis);
        Self(dims)
    }

    /// Shape with an extra axis of the given extent inserted.
    pub fn inserted(&self, axis: usize, extent: usize) -> Self {
        let mut dims = self.0.clone();
        dims.insert(axis, extent);
        Self(dims)
    }

    /// Shape with one axis replaced by a new extent.
    pub fn replaced(&self, axis: usize, extent: usize) -> Self {
        let mut dims = self.0.clone();
        dims[axis] = extent;
        Self(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

/// Resolves two batch sizes under the combined-batch-size rule.
///
/// Equal sizes combine to themselves; a size of 1 broadcasts to the other
/// side; any other mismatch is an error.
pub fn combined_dim(a: usize, b: usize) -> Result<usize> {
    if a == b {
        Ok(a)
    } else if a == 1 {
        Ok(b)
    } else if b == 1 {
        Ok(a)
    } else {
        Err(BackendError::dimension_mismatch(
            format!("batch size {a} or 1"),
            format!("batch size {b}"),
        ))
    }
}

/// Folds [`combined_dim`] over a sequence of batch sizes.
pub fn combined_batch(sizes: &[usize]) -> Result<usize> {
    let mut result = 1;
    for &s in sizes {
        result = combined_dim(result, s)?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_row_major() {
        let shape = Shape::from([2, 3, 4]);
        assert_eq!(shape.strides(), vec![12, 4, 1]);
        assert_eq!(shape.volume(), 24);
    }

    #[test]
    fn test_scalar_shape() {
        let shape = Shape::scalar();
        assert_eq!(shape.rank(), 0);
        assert_eq!(shape.volume(), 1);
        assert!(shape.strides().is_empty());
    }

    #[test]
    fn test_combined_dim() {
        assert_eq!(combined_dim(4, 4).unwrap(), 4);
        assert_eq!(combined_dim(1, 4).unwrap(), 4);
        assert_eq!(combined_dim(4, 1).unwrap(), 4);
        assert!(combined_dim(4, 3).is_err());
    }

    #[test]
    fn test_combined_batch() {
        assert_eq!(combined_batch(&[1, 4, 1, 4]).unwrap(), 4);
        assert!(combined_batch(&[2, 3]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from([4, 16]).to_string(), "(4, 16)");
        assert_eq!(Shape::scalar().to_string(), "()");
    }
}
