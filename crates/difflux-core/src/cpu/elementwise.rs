//! Elementwise kernels of the CPU engine.
//!
//! Binary operations support equal shapes or a single-element operand
//! broadcast against the other side; float results are stored at the
//! working precision.

use crate::dtype::{DType, Kind};
use crate::error::{BackendError, Result};
use crate::registry;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorData};
use num_complex::Complex64;

/// Stores float values at the working precision.
pub(crate) fn float_tensor(shape: Shape, values: Vec<f64>) -> Result<Tensor> {
    let data = match registry::precision().float_dtype() {
        DType::FLOAT32 => TensorData::F32(values.into_iter().map(|x| x as f32).collect()),
        _ => TensorData::F64(values),
    };
    Tensor::new(shape, data)
}

/// Resolves the broadcast shape of a binary operation: equal shapes, or a
/// single-element operand against the other side.
fn broadcast_shape(op: &str, a: &Tensor, b: &Tensor) -> Result<Shape> {
    if a.shape() == b.shape() {
        Ok(a.shape().clone())
    } else if a.volume() == 1 {
        Ok(b.shape().clone())
    } else if b.volume() == 1 {
        Ok(a.shape().clone())
    } else {
        Err(BackendError::invalid_argument(
            op,
            format!("shapes {} and {} do not broadcast", a.shape(), b.shape()),
        ))
    }
}

fn zip_broadcast<T: Copy>(a: &[T], b: &[T], f: impl Fn(T, T) -> T) -> Vec<T> {
    if a.len() == b.len() {
        a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
    } else if a.len() == 1 {
        b.iter().map(|&y| f(a[0], y)).collect()
    } else {
        a.iter().map(|&x| f(x, b[0])).collect()
    }
}

/// A binary arithmetic kernel. Kinds without a handler reject the
/// operation with an UnsupportedType error.
pub(crate) struct BinaryOp {
    pub name: &'static str,
    pub int_fn: Option<fn(i64, i64) -> i64>,
    pub float_fn: fn(f64, f64) -> f64,
    pub complex_fn: Option<fn(Complex64, Complex64) -> Complex64>,
}

pub(crate) fn binary(a: &Tensor, b: &Tensor, op: &BinaryOp) -> Result<Tensor> {
    let shape = broadcast_shape(op.name, a, b)?;
    let promoted = a.dtype().promote(b.dtype());
    match promoted.kind {
        Kind::Complex => {
            let f = op.complex_fn.ok_or_else(|| {
                BackendError::unsupported_type(op.name, promoted.to_string())
            })?;
            let va = a.to_c128_vec()?;
            let vb = b.to_c128_vec()?;
            Tensor::new(shape, TensorData::C128(zip_broadcast(&va, &vb, f)))
        }
        Kind::Float => {
            let va = a.to_f64_vec()?;
            let vb = b.to_f64_vec()?;
            float_tensor(shape, zip_broadcast(&va, &vb, op.float_fn))
        }
        Kind::Int => match op.int_fn {
            Some(f) => {
                let va = a.to_i64_vec()?;
                let vb = b.to_i64_vec()?;
                let out = zip_broadcast(&va, &vb, f);
                let data = if a.dtype() == DType::INT32 && b.dtype() == DType::INT32 {
                    TensorData::I32(out.into_iter().map(|x| x as i32).collect())
                } else {
                    TensorData::I64(out)
                };
                Tensor::new(shape, data)
            }
            // Integer inputs to a float-only kernel (division and friends)
            // promote to float.
            None => {
                let va = a.to_f64_vec()?;
                let vb = b.to_f64_vec()?;
                float_tensor(shape, zip_broadcast(&va, &vb, op.float_fn))
            }
        },
        Kind::Bool => Err(BackendError::unsupported_type(op.name, "bool")),
    }
}

/// Unary kernel that promotes integers and booleans to float.
pub(crate) fn unary_float(x: &Tensor, name: &str, f: impl Fn(f64) -> f64) -> Result<Tensor> {
    if x.dtype().kind == Kind::Complex {
        return Err(BackendError::unsupported_type(name, "complex128"));
    }
    let values = x.to_f64_vec()?.into_iter().map(f).collect();
    float_tensor(x.shape().clone(), values)
}

/// Unary kernel that keeps the integer dtype of integer inputs.
pub(crate) fn unary_numeric(
    x: &Tensor,
    name: &str,
    fi: impl Fn(i64) -> i64,
    ff: impl Fn(f64) -> f64,
) -> Result<Tensor> {
    match x.data() {
        TensorData::I32(v) => Tensor::new(
            x.shape().clone(),
            TensorData::I32(v.iter().map(|&e| fi(i64::from(e)) as i32).collect()),
        ),
        TensorData::I64(v) => {
            Tensor::new(x.shape().clone(), TensorData::I64(v.iter().map(|&e| fi(e)).collect()))
        }
        TensorData::F32(_) | TensorData::F64(_) => unary_float(x, name, ff),
        other => Err(BackendError::unsupported_type(name, other.dtype().to_string())),
    }
}

pub(crate) fn abs(x: &Tensor) -> Result<Tensor> {
    match x.data() {
        // Magnitude of a complex tensor is a float tensor.
        TensorData::C128(v) => {
            float_tensor(x.shape().clone(), v.iter().map(|e| e.norm()).collect())
        }
        _ => unary_numeric(x, "abs", i64::abs, f64::abs),
    }
}

pub(crate) fn equal(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let shape = broadcast_shape("equal", a, b)?;
    let promoted = a.dtype().promote(b.dtype());
    let out = match promoted.kind {
        Kind::Complex => {
            let va = a.to_c128_vec()?;
            let vb = b.to_c128_vec()?;
            zip_bool(&va, &vb, |x, y| x == y)
        }
        Kind::Bool => match (a.data(), b.data()) {
            (TensorData::Bool(va), TensorData::Bool(vb)) => zip_bool(va, vb, |x, y| x == y),
            _ => return Err(BackendError::unsupported_type("equal", promoted.to_string())),
        },
        _ => {
            let va = a.to_f64_vec()?;
            let vb = b.to_f64_vec()?;
            #[allow(clippy::float_cmp)]
            zip_bool(&va, &vb, |x, y| x == y)
        }
    };
    Tensor::new(shape, TensorData::Bool(out))
}

fn zip_bool<T: Copy>(a: &[T], b: &[T], f: impl Fn(T, T) -> bool) -> Vec<bool> {
    if a.len() == b.len() {
        a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
    } else if a.len() == 1 {
        b.iter().map(|&y| f(a[0], y)).collect()
    } else {
        a.iter().map(|&x| f(x, b[0])).collect()
    }
}

pub(crate) fn isfinite(x: &Tensor) -> Result<Tensor> {
    let out = match x.data() {
        TensorData::Bool(v) => vec![true; v.len()],
        TensorData::I32(v) => vec![true; v.len()],
        TensorData::I64(v) => vec![true; v.len()],
        TensorData::F32(v) => v.iter().map(|e| e.is_finite()).collect(),
        TensorData::F64(v) => v.iter().map(|e| e.is_finite()).collect(),
        TensorData::C128(v) => v.iter().map(|e| e.re.is_finite() && e.im.is_finite()).collect(),
    };
    Tensor::new(x.shape().clone(), TensorData::Bool(out))
}

pub(crate) fn clip(x: &Tensor, minimum: f64, maximum: f64) -> Result<Tensor> {
    match x.data() {
        TensorData::I32(_) | TensorData::I64(_) => {
            let lo = minimum.ceil() as i64;
            let hi = maximum.floor() as i64;
            unary_numeric(x, "clip", move |e| e.clamp(lo, hi), move |e| e.clamp(minimum, maximum))
        }
        _ => unary_float(x, "clip", move |e| e.clamp(minimum, maximum)),
    }
}

pub(crate) fn where_(condition: &Tensor, x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let TensorData::Bool(cond) = condition.data() else {
        return Err(BackendError::unsupported_type("where", condition.dtype().to_string()));
    };
    let shape = condition.shape().clone();
    let pick = |branch: &Tensor, i: usize| -> usize {
        if branch.volume() == 1 {
            0
        } else {
            i
        }
    };
    for branch in [x, y] {
        if branch.volume() != 1 && branch.shape() != &shape {
            return Err(BackendError::dimension_mismatch(&shape, branch.shape()));
        }
    }
    let promoted = x.dtype().promote(y.dtype());
    match promoted.kind {
        Kind::Complex => {
            let vx = x.to_c128_vec()?;
            let vy = y.to_c128_vec()?;
            let out = cond
                .iter()
                .enumerate()
                .map(|(i, &c)| if c { vx[pick(x, i)] } else { vy[pick(y, i)] })
                .collect();
            Tensor::new(shape, TensorData::C128(out))
        }
        Kind::Int => {
            let vx = x.to_i64_vec()?;
            let vy = y.to_i64_vec()?;
            let out = cond
                .iter()
                .enumerate()
                .map(|(i, &c)| if c { vx[pick(x, i)] } else { vy[pick(y, i)] })
                .collect();
            Tensor::new(shape, TensorData::I64(out))
        }
        Kind::Float => {
            let vx = x.to_f64_vec()?;
            let vy = y.to_f64_vec()?;
            let out = cond
                .iter()
                .enumerate()
                .map(|(i, &c)| if c { vx[pick(x, i)] } else { vy[pick(y, i)] })
                .collect();
            float_tensor(shape, out)
        }
        Kind::Bool => Err(BackendError::unsupported_type("where", "bool branches")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(values: &[f64]) -> Tensor {
        Tensor::from_f64s(values.to_vec())
    }

    const ADD: BinaryOp = BinaryOp {
        name: "add",
        int_fn: Some(i64::wrapping_add),
        float_fn: |x, y| x + y,
        complex_fn: Some(|x, y| x + y),
    };

    #[test]
    fn test_binary_same_shape() {
        let out = binary(&t(&[1.0, 2.0]), &t(&[10.0, 20.0]), &ADD).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![11.0, 22.0]);
    }

    #[test]
    fn test_binary_scalar_broadcast() {
        let out = binary(&t(&[1.0, 2.0, 3.0]), &Tensor::scalar_from_f64(10.0), &ADD).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![11.0, 12.0, 13.0]);
        assert_eq!(out.shape().dims(), &[3]);
    }

    #[test]
    fn test_binary_shape_mismatch() {
        assert!(binary(&t(&[1.0, 2.0]), &t(&[1.0, 2.0, 3.0]), &ADD).is_err());
    }

    #[test]
    fn test_int_dtype_preserved() {
        let a = Tensor::from_i64s(vec![2, 3]);
        let b = Tensor::from_i64s(vec![5, 7]);
        let out = binary(&a, &b, &ADD).unwrap();
        assert_eq!(out.dtype(), DType::INT64);
        assert_eq!(out.to_i64_vec().unwrap(), vec![7, 10]);
    }

    #[test]
    fn test_bool_arithmetic_rejected() {
        let a = Tensor::from_bools(vec![true]);
        let err = binary(&a, &a, &ADD).unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedType { .. }));
    }

    #[test]
    fn test_where_scalar_branches() {
        let cond = Tensor::from_bools(vec![true, false, true]);
        let out = where_(&cond, &Tensor::scalar_from_f64(1.0), &Tensor::scalar_from_f64(-1.0)).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_complex_abs() {
        let c = Tensor::new(
            Shape::from([1]),
            TensorData::C128(vec![Complex64::new(3.0, 4.0)]),
        )
        .unwrap();
        let out = abs(&c).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![5.0]);
    }
}
