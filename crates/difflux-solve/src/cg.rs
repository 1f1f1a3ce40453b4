//! Batched conjugate-gradient solver.
//!
//! Solves `A x = y` for symmetric positive-definite operators, one
//! independent solve per batch element. Numerical non-convergence is not
//! an error: the solver always returns its best iterate and reports
//! convergence through [`Solve::result`].

use crate::operator::LinearOperator;
use difflux_core::backend::Backend;
use difflux_core::error::{BackendError, Result};
use difflux_core::shape::{combined_batch, Shape};
use difflux_core::tensor::Tensor;
use rayon::prelude::*;

/// Threshold below which batches are solved sequentially.
const PARALLEL_THRESHOLD: usize = 4;

/// Outcome of one batched solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveResult {
    /// Whether every batch element reached its residual tolerance.
    pub success: bool,
    /// Iterations used by the slowest batch element, or -1 when unknown.
    pub iterations: i64,
}

/// Parameters and outcome record of a linear solve.
#[derive(Debug, Clone)]
pub struct Solve {
    /// Residual tolerance relative to the norm of the right-hand side.
    pub relative_tolerance: f64,
    /// Absolute residual tolerance.
    pub absolute_tolerance: f64,
    /// Iteration cap per batch element.
    pub max_iterations: usize,
    /// Filled in by the solver; `None` until a solve ran.
    pub result: Option<SolveResult>,
}

impl Solve {
    /// Creates a solve record with the given tolerances.
    pub fn new(relative_tolerance: f64, absolute_tolerance: f64, max_iterations: usize) -> Self {
        Self {
            relative_tolerance,
            absolute_tolerance,
            max_iterations,
            result: None,
        }
    }
}

impl Default for Solve {
    fn default() -> Self {
        Self::new(1e-5, 0.0, 1000)
    }
}

fn dot(backend: &dyn Backend, a: &Tensor, b: &Tensor) -> Result<f64> {
    backend.sum(&backend.mul(a, b)?, None, false)?.scalar_f64()
}

/// Row `i` of a `[rows, m]` tensor as a flat `[m]` vector, with size-1
/// broadcast for short stacks.
fn batch_row(backend: &dyn Backend, t: &Tensor, i: usize) -> Result<Tensor> {
    let rows = t.shape().dims()[0];
    let m = t.shape().dims()[1];
    let row = backend.gather(t, &Tensor::from_i64s(vec![i.min(rows - 1) as i64]))?;
    backend.reshape(&row, &Shape::from([m]))
}

/// One CG run; returns the final iterate, iterations used and whether the
/// residual tolerance was met.
fn cg_single(
    backend: &dyn Backend,
    operator: &dyn LinearOperator,
    y: &Tensor,
    x0: &Tensor,
    solve: &Solve,
    batch: usize,
) -> Result<(Tensor, usize, bool)> {
    let y_norm = dot(backend, y, y)?.sqrt();
    let threshold = (solve.relative_tolerance * y_norm).max(solve.absolute_tolerance);

    let mut x = x0.clone();
    let mut r = backend.sub(y, &operator.apply(backend, &x, batch)?)?;
    let mut p = r.clone();
    let mut rr = dot(backend, &r, &r)?;
    let mut iterations = 0;

    while rr.sqrt() > threshold && iterations < solve.max_iterations {
        let ap = operator.apply(backend, &p, batch)?;
        let pap = dot(backend, &p, &ap)?;
        if pap == 0.0 {
            // Stagnated search direction; the residual check below decides
            // success.
            break;
        }
        let alpha = Tensor::scalar_from_f64(rr / pap);
        x = backend.add(&x, &backend.mul(&p, &alpha)?)?;
        r = backend.sub(&r, &backend.mul(&ap, &alpha)?)?;
        let rr_next = dot(backend, &r, &r)?;
        let beta = Tensor::scalar_from_f64(rr_next / rr);
        p = backend.add(&r, &backend.mul(&p, &beta)?)?;
        rr = rr_next;
        iterations += 1;
    }

    Ok((x, iterations, rr.sqrt() <= threshold))
}

/// Solves `A x = y` with conjugate gradients, one solve per batch element.
///
/// `y` and `x0` are `[batch, m]` or flat `[m]`; their batch sizes and the
/// operator's combine under the combined-batch-size rule. The result has
/// the combined batch shape (flat when both inputs were flat).
/// Convergence is recorded in `solve.result`, never raised as an error.
pub fn conjugate_gradient(
    backend: &dyn Backend,
    operator: &dyn LinearOperator,
    y: &Tensor,
    x0: &Tensor,
    solve: &mut Solve,
) -> Result<Tensor> {
    let flat = y.rank() == 1 && x0.rank() == 1;
    let lift = |t: &Tensor| -> Result<Tensor> {
        match t.rank() {
            1 => backend.reshape(t, &Shape::from([1, t.volume()])),
            2 => Ok(t.clone()),
            _ => Err(BackendError::dimension_mismatch("[batch, m] or [m]", t.shape())),
        }
    };
    let y = lift(y)?;
    let x0 = lift(x0)?;
    let m = y.shape().dims()[1];
    if x0.shape().dims()[1] != m {
        return Err(BackendError::dimension_mismatch(y.shape(), x0.shape()));
    }
    let batch = combined_batch(&[
        y.shape().dims()[0],
        x0.shape().dims()[0],
        operator.batch_size().unwrap_or(1),
    ])?;

    let run = |i: usize| -> Result<(Tensor, usize, bool)> {
        let yi = batch_row(backend, &y, i)?;
        let xi = batch_row(backend, &x0, i)?;
        cg_single(backend, operator, &yi, &xi, solve, i)
    };
    let outcomes: Vec<(Tensor, usize, bool)> = if batch < PARALLEL_THRESHOLD {
        (0..batch).map(run).collect::<Result<_>>()?
    } else {
        (0..batch).into_par_iter().map(run).collect::<Result<_>>()?
    };

    let iterations = outcomes.iter().map(|(_, n, _)| *n).max().unwrap_or(0);
    let success = outcomes.iter().all(|(_, _, ok)| *ok);
    if !success {
        tracing::warn!(
            max_iterations = solve.max_iterations,
            "conjugate gradient did not reach tolerance"
        );
    }
    solve.result = Some(SolveResult {
        success,
        iterations: iterations as i64,
    });

    let rows: Vec<Tensor> = outcomes.into_iter().map(|(x, _, _)| x).collect();
    let stacked = backend.stack(&rows, 0)?;
    if flat && batch == 1 {
        backend.reshape(&stacked, &Shape::from([m]))
    } else {
        Ok(stacked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{BatchedOperator, DenseOperator, FnOperator};
    use approx::assert_relative_eq;
    use difflux_core::cpu::CpuBackend;
    use difflux_core::tensor::TensorData;

    fn spd_2x2() -> Tensor {
        Tensor::new(Shape::from([2, 2]), TensorData::F64(vec![4.0, 1.0, 1.0, 3.0])).unwrap()
    }

    #[test]
    fn test_cg_solves_spd_system() {
        let b = CpuBackend::with_seed(0);
        let op = DenseOperator::new(spd_2x2()).unwrap();
        let y = Tensor::from_f64s(vec![1.0, 2.0]);
        let x0 = Tensor::from_f64s(vec![0.0, 0.0]);
        let mut solve = Solve::new(1e-10, 0.0, 100);
        let x = conjugate_gradient(&b, &op, &y, &x0, &mut solve).unwrap();

        // Check A x = y.
        let ax = op.apply(&b, &x, 0).unwrap();
        for (a, e) in ax.to_f64_vec().unwrap().iter().zip([1.0, 2.0]) {
            assert_relative_eq!(*a, e, epsilon = 1e-8);
        }
        let result = solve.result.unwrap();
        assert!(result.success);
        // CG on a 2x2 system converges in at most 2 iterations.
        assert!(result.iterations <= 2);
    }

    #[test]
    fn test_cg_batched_right_hand_sides() {
        let b = CpuBackend::with_seed(0);
        let op = DenseOperator::new(spd_2x2()).unwrap();
        let y = Tensor::new(
            Shape::from([5, 2]),
            TensorData::F64(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, -1.0, -3.0, 0.5]),
        )
        .unwrap();
        let x0 = Tensor::new(Shape::from([1, 2]), TensorData::F64(vec![0.0, 0.0])).unwrap();
        let mut solve = Solve::new(1e-10, 0.0, 100);
        let x = conjugate_gradient(&b, &op, &y, &x0, &mut solve).unwrap();
        assert_eq!(x.shape().dims(), &[5, 2]);
        assert!(solve.result.unwrap().success);
    }

    #[test]
    fn test_cg_broadcast_x0_yields_independent_solutions() {
        let b = CpuBackend::with_seed(0);
        // 2I against four right-hand sides and a single shared start; each
        // batch element must come out as its own y / 2.
        let op = FnOperator::new(|backend: &dyn Backend, x: &Tensor| {
            backend.mul(x, &Tensor::scalar_from_f64(2.0))
        });
        let y = Tensor::new(
            Shape::from([4, 2]),
            TensorData::F64(vec![2.0, 4.0, 6.0, 8.0, -2.0, 0.0, 1.0, 3.0]),
        )
        .unwrap();
        let x0 = Tensor::new(Shape::from([1, 2]), TensorData::F64(vec![0.0, 0.0])).unwrap();
        let mut solve = Solve::new(1e-10, 0.0, 100);
        let x = conjugate_gradient(&b, &op, &y, &x0, &mut solve).unwrap();
        assert_eq!(x.shape().dims(), &[4, 2]);
        let v = x.to_f64_vec().unwrap();
        for (a, e) in v.iter().zip([1.0, 2.0, 3.0, 4.0, -1.0, 0.0, 0.5, 1.5]) {
            assert_relative_eq!(*a, e, epsilon = 1e-8);
        }
        assert!(solve.result.unwrap().success);
    }

    #[test]
    fn test_cg_batched_operator_combines_batches() {
        let b = CpuBackend::with_seed(0);
        // Two diagonal operators: 2I and 4I.
        let stack = Tensor::new(
            Shape::from([2, 2, 2]),
            TensorData::F64(vec![2.0, 0.0, 0.0, 2.0, 4.0, 0.0, 0.0, 4.0]),
        )
        .unwrap();
        let op = BatchedOperator::new(stack).unwrap();
        let y = Tensor::new(Shape::from([2, 2]), TensorData::F64(vec![2.0, 4.0, 4.0, 8.0])).unwrap();
        let x0 = Tensor::new(Shape::from([1, 2]), TensorData::F64(vec![0.0, 0.0])).unwrap();
        let mut solve = Solve::default();
        let x = conjugate_gradient(&b, &op, &y, &x0, &mut solve).unwrap();
        let v = x.to_f64_vec().unwrap();
        for (a, e) in v.iter().zip([1.0, 2.0, 1.0, 2.0]) {
            assert_relative_eq!(*a, e, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cg_mismatched_batches_error() {
        let b = CpuBackend::with_seed(0);
        let op = DenseOperator::new(spd_2x2()).unwrap();
        let y = Tensor::new(Shape::from([2, 2]), TensorData::F64(vec![1.0; 4])).unwrap();
        let x0 = Tensor::new(Shape::from([3, 2]), TensorData::F64(vec![0.0; 6])).unwrap();
        let mut solve = Solve::default();
        let err = conjugate_gradient(&b, &op, &y, &x0, &mut solve).unwrap_err();
        assert!(matches!(err, BackendError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_cg_nonconvergence_is_reported_not_raised() {
        let b = CpuBackend::with_seed(0);
        // Ill-conditioned system and a one-iteration cap.
        let op = FnOperator::new(|backend: &dyn Backend, x: &Tensor| {
            backend.mul(x, &Tensor::from_f64s(vec![1.0, 1e-8, 1e8]))
        });
        let y = Tensor::from_f64s(vec![1.0, 1.0, 1.0]);
        let x0 = Tensor::from_f64s(vec![0.0, 0.0, 0.0]);
        let mut solve = Solve::new(1e-12, 0.0, 1);
        let x = conjugate_gradient(&b, &op, &y, &x0, &mut solve).unwrap();
        assert_eq!(x.shape().dims(), &[3]);
        let result = solve.result.unwrap();
        assert!(!result.success);
        assert_eq!(result.iterations, 1);
    }
}
