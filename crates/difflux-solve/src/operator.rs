//! Linear operators for iterative solvers.
//!
//! Solvers never see a matrix directly; they apply a [`LinearOperator`],
//! which may be backed by a dense matrix, a batch of matrices or an
//! arbitrary matrix-free function.

use difflux_core::backend::Backend;
use difflux_core::error::{BackendError, Result};
use difflux_core::shape::Shape;
use difflux_core::tensor::Tensor;

/// A linear map applied per batch element.
pub trait LinearOperator: Send + Sync {
    /// Applies the operator for batch element `batch` to the vector `x`
    /// of shape `[m]`.
    fn apply(&self, backend: &dyn Backend, x: &Tensor, batch: usize) -> Result<Tensor>;

    /// Number of batch elements the operator itself carries, if any.
    ///
    /// `None` means one operator shared by every batch element.
    fn batch_size(&self) -> Option<usize>;
}

/// One dense `[n, m]` matrix shared by all batch elements.
#[derive(Debug, Clone)]
pub struct DenseOperator {
    matrix: Tensor,
}

impl DenseOperator {
    /// Wraps a dense `[n, m]` matrix.
    pub fn new(matrix: Tensor) -> Result<Self> {
        if matrix.rank() != 2 {
            return Err(BackendError::dimension_mismatch("[n, m] matrix", matrix.shape()));
        }
        Ok(Self { matrix })
    }
}

impl LinearOperator for DenseOperator {
    fn apply(&self, backend: &dyn Backend, x: &Tensor, _batch: usize) -> Result<Tensor> {
        let m = x.volume();
        let row = backend.reshape(x, &Shape::from([1, m]))?;
        let out = backend.matmul(&self.matrix, &row)?;
        let n = out.volume();
        backend.reshape(&out, &Shape::from([n]))
    }

    fn batch_size(&self) -> Option<usize> {
        None
    }
}

/// A `[batch, n, m]` stack of dense matrices, one per batch element.
///
/// A stack of size 1 broadcasts over any batch; otherwise the requested
/// batch index is clamped into the stack, so a short stack pairs its last
/// matrix with all remaining batch elements.
#[derive(Debug, Clone)]
pub struct BatchedOperator {
    matrices: Tensor,
}

impl BatchedOperator {
    /// Wraps a `[batch, n, m]` matrix stack.
    pub fn new(matrices: Tensor) -> Result<Self> {
        if matrices.rank() != 3 {
            return Err(BackendError::dimension_mismatch("[batch, n, m] matrices", matrices.shape()));
        }
        Ok(Self { matrices })
    }
}

impl LinearOperator for BatchedOperator {
    fn apply(&self, backend: &dyn Backend, x: &Tensor, batch: usize) -> Result<Tensor> {
        let [count, n, m] = self.matrices.shape().dims() else {
            return Err(BackendError::dimension_mismatch("[batch, n, m]", self.matrices.shape()));
        };
        let selected = batch.min(count - 1);
        let matrix = backend.gather(&self.matrices, &Tensor::from_i64s(vec![selected as i64]))?;
        let matrix = backend.reshape(&matrix, &Shape::from([*n, *m]))?;
        let row = backend.reshape(x, &Shape::from([1, x.volume()]))?;
        let out = backend.matmul(&matrix, &row)?;
        backend.reshape(&out, &Shape::from([*n]))
    }

    fn batch_size(&self) -> Option<usize> {
        Some(self.matrices.shape().dims()[0])
    }
}

/// A matrix-free operator given as a function on vectors.
pub struct FnOperator<F> {
    f: F,
}

impl<F> FnOperator<F>
where
    F: Fn(&dyn Backend, &Tensor) -> Result<Tensor> + Send + Sync,
{
    /// Wraps a function applied identically to every batch element.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> LinearOperator for FnOperator<F>
where
    F: Fn(&dyn Backend, &Tensor) -> Result<Tensor> + Send + Sync,
{
    fn apply(&self, backend: &dyn Backend, x: &Tensor, _batch: usize) -> Result<Tensor> {
        (self.f)(backend, x)
    }

    fn batch_size(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use difflux_core::cpu::CpuBackend;
    use difflux_core::tensor::TensorData;

    #[test]
    fn test_dense_operator_applies_matrix() {
        let b = CpuBackend::with_seed(0);
        let a = Tensor::new(
            Shape::from([2, 2]),
            TensorData::F64(vec![2.0, 0.0, 0.0, 3.0]),
        )
        .unwrap();
        let op = DenseOperator::new(a).unwrap();
        let y = op.apply(&b, &Tensor::from_f64s(vec![1.0, 1.0]), 0).unwrap();
        assert_eq!(y.to_f64_vec().unwrap(), vec![2.0, 3.0]);
        assert_eq!(op.batch_size(), None);
    }

    #[test]
    fn test_batched_operator_clamps_short_stack() {
        let b = CpuBackend::with_seed(0);
        let stack = Tensor::new(
            Shape::from([2, 1, 1]),
            TensorData::F64(vec![2.0, 5.0]),
        )
        .unwrap();
        let op = BatchedOperator::new(stack).unwrap();
        let x = Tensor::from_f64s(vec![1.0]);
        assert_eq!(op.apply(&b, &x, 0).unwrap().to_f64_vec().unwrap(), vec![2.0]);
        assert_eq!(op.apply(&b, &x, 1).unwrap().to_f64_vec().unwrap(), vec![5.0]);
        // Batch index past the stack reuses the last matrix.
        assert_eq!(op.apply(&b, &x, 7).unwrap().to_f64_vec().unwrap(), vec![5.0]);
    }

    #[test]
    fn test_fn_operator() {
        let b = CpuBackend::with_seed(0);
        let op = FnOperator::new(|backend: &dyn Backend, x: &Tensor| {
            backend.mul(x, &Tensor::scalar_from_f64(4.0))
        });
        let y = op.apply(&b, &Tensor::from_f64s(vec![1.0, 2.0]), 3).unwrap();
        assert_eq!(y.to_f64_vec().unwrap(), vec![4.0, 8.0]);
    }
}
