//! Differentiable operations: forward evaluation and vector-Jacobian
//! products.

use difflux_core::backend::Backend;
use difflux_core::error::{BackendError, Result};
use difflux_core::tensor::Tensor;
use std::fmt::Debug;

/// A differentiable operation.
pub trait Op: Debug {
    /// Operation name for diagnostics.
    fn name(&self) -> &str;

    /// Eager forward evaluation.
    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor>;

    /// Vector-Jacobian product: the gradient flowing into each input,
    /// given the inputs, the forward output and the gradient at the
    /// output.
    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>>;
}

/// Reduces a gradient back to the shape of a broadcast input.
///
/// A single-element input broadcast against a larger operand receives the
/// sum of the incoming gradient.
pub fn unbroadcast(backend: &dyn Backend, grad: &Tensor, input: &Tensor) -> Result<Tensor> {
    if grad.shape() == input.shape() {
        Ok(grad.clone())
    } else if input.volume() == 1 {
        let total = backend.sum(grad, None, false)?;
        backend.reshape(&total, input.shape())
    } else {
        Err(BackendError::dimension_mismatch(input.shape(), grad.shape()))
    }
}

fn binary_inputs<'t>(op: &str, inputs: &'t [Tensor]) -> Result<(&'t Tensor, &'t Tensor)> {
    match inputs {
        [a, b] => Ok((a, b)),
        _ => Err(BackendError::invalid_argument(op, format!("{} inputs", inputs.len()))),
    }
}

fn unary_input<'t>(op: &str, inputs: &'t [Tensor]) -> Result<&'t Tensor> {
    match inputs {
        [x] => Ok(x),
        _ => Err(BackendError::invalid_argument(op, format!("{} inputs", inputs.len()))),
    }
}

/// Elementwise addition.
#[derive(Debug, Clone, Copy)]
pub struct Add;

impl Op for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        backend.add(a, b)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        Ok(vec![
            unbroadcast(backend, grad, a)?,
            unbroadcast(backend, grad, b)?,
        ])
    }
}

/// Elementwise subtraction.
#[derive(Debug, Clone, Copy)]
pub struct Subtract;

impl Op for Subtract {
    fn name(&self) -> &str {
        "sub"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        backend.sub(a, b)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        let neg = backend.mul(grad, &Tensor::scalar_from_f64(-1.0))?;
        Ok(vec![
            unbroadcast(backend, grad, a)?,
            unbroadcast(backend, &neg, b)?,
        ])
    }
}

/// Elementwise multiplication.
#[derive(Debug, Clone, Copy)]
pub struct Multiply;

impl Op for Multiply {
    fn name(&self) -> &str {
        "mul"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        backend.mul(a, b)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        let da = backend.mul(grad, b)?;
        let db = backend.mul(grad, a)?;
        Ok(vec![
            unbroadcast(backend, &da, a)?,
            unbroadcast(backend, &db, b)?,
        ])
    }
}

/// Elementwise division.
#[derive(Debug, Clone, Copy)]
pub struct Divide;

impl Op for Divide {
    fn name(&self) -> &str {
        "div"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        backend.div(a, b)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        // d/da (a/b) = 1/b, d/db (a/b) = -(a/b)/b.
        let da = backend.div(grad, b)?;
        let db = backend.mul(grad, &backend.div(output, b)?)?;
        let db = backend.mul(&db, &Tensor::scalar_from_f64(-1.0))?;
        Ok(vec![
            unbroadcast(backend, &da, a)?,
            unbroadcast(backend, &db, b)?,
        ])
    }
}

/// Elementwise negation.
#[derive(Debug, Clone, Copy)]
pub struct Negate;

impl Op for Negate {
    fn name(&self) -> &str {
        "neg"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        let x = unary_input(self.name(), inputs)?;
        backend.mul(x, &Tensor::scalar_from_f64(-1.0))
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        _inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        Ok(vec![backend.mul(grad, &Tensor::scalar_from_f64(-1.0))?])
    }
}

/// Elementwise square root.
#[derive(Debug, Clone, Copy)]
pub struct SqrtOp;

impl Op for SqrtOp {
    fn name(&self) -> &str {
        "sqrt"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        backend.sqrt(unary_input(self.name(), inputs)?)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        _inputs: &[Tensor],
        output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        // d/dx sqrt(x) = 1 / (2 sqrt(x)).
        let denom = backend.mul(output, &Tensor::scalar_from_f64(2.0))?;
        Ok(vec![backend.div(grad, &denom)?])
    }
}

/// Elementwise exponential.
#[derive(Debug, Clone, Copy)]
pub struct ExpOp;

impl Op for ExpOp {
    fn name(&self) -> &str {
        "exp"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        backend.exp(unary_input(self.name(), inputs)?)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        _inputs: &[Tensor],
        output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        Ok(vec![backend.mul(grad, output)?])
    }
}

/// Elementwise sine.
#[derive(Debug, Clone, Copy)]
pub struct SinOp;

impl Op for SinOp {
    fn name(&self) -> &str {
        "sin"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        backend.sin(unary_input(self.name(), inputs)?)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let x = unary_input(self.name(), inputs)?;
        Ok(vec![backend.mul(grad, &backend.cos(x)?)?])
    }
}

/// Elementwise cosine.
#[derive(Debug, Clone, Copy)]
pub struct CosOp;

impl Op for CosOp {
    fn name(&self) -> &str {
        "cos"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        backend.cos(unary_input(self.name(), inputs)?)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let x = unary_input(self.name(), inputs)?;
        let dsin = backend.sin(x)?;
        let neg = backend.mul(&dsin, &Tensor::scalar_from_f64(-1.0))?;
        Ok(vec![backend.mul(grad, &neg)?])
    }
}

/// Sum of all elements.
#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl Op for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        backend.sum(unary_input(self.name(), inputs)?, None, false)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let x = unary_input(self.name(), inputs)?;
        let ones = backend.ones(x.shape(), None)?;
        Ok(vec![backend.mul(&ones, grad)?])
    }
}

/// Mean of all elements.
#[derive(Debug, Clone, Copy)]
pub struct Mean;

impl Op for Mean {
    fn name(&self) -> &str {
        "mean"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        backend.mean(unary_input(self.name(), inputs)?, None, false)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let x = unary_input(self.name(), inputs)?;
        let ones = backend.ones(x.shape(), None)?;
        let spread = backend.mul(&ones, grad)?;
        backend
            .div(&spread, &Tensor::scalar_from_f64(x.volume() as f64))
            .map(|g| vec![g])
    }
}

/// Dense operator application `a [n, m] · b [batch, m] -> [batch, n]`.
#[derive(Debug, Clone, Copy)]
pub struct MatMul;

impl Op for MatMul {
    fn name(&self) -> &str {
        "matmul"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        backend.matmul(a, b)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        if a.rank() != 2 {
            return Err(BackendError::not_implemented("matmul gradient for batched operators"));
        }
        // grad is [batch, n]; d/da = grad^T b, d/db = grad a.
        let da = backend.einsum("bn,bm->nm", &[grad.clone(), b.clone()])?;
        let at = backend.transpose(a, &[1, 0])?;
        let db = backend.matmul(&at, grad)?;
        Ok(vec![da, db])
    }
}

/// Inner product of two flat vectors.
#[derive(Debug, Clone, Copy)]
pub struct Dot;

impl Op for Dot {
    fn name(&self) -> &str {
        "dot"
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        if a.rank() != 1 || b.rank() != 1 {
            return Err(BackendError::dimension_mismatch(
                "two 1-D vectors",
                format!("{} and {}", a.shape(), b.shape()),
            ));
        }
        backend.sum(&backend.mul(a, b)?, None, false)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        _output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        let (a, b) = binary_inputs(self.name(), inputs)?;
        Ok(vec![backend.mul(b, grad)?, backend.mul(a, grad)?])
    }
}
