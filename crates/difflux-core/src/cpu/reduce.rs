//! Reduction kernels of the CPU engine.

use crate::dtype::{DType, Kind};
use crate::error::{BackendError, Result};
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorData};
use num_complex::Complex64;

use super::elementwise::float_tensor;

/// Which reduction to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reduction {
    Sum,
    Prod,
    Mean,
    Std,
    Max,
    Min,
    Any,
    All,
}

impl Reduction {
    fn name(self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Prod => "prod",
            Reduction::Mean => "mean",
            Reduction::Std => "std",
            Reduction::Max => "max",
            Reduction::Min => "min",
            Reduction::Any => "any",
            Reduction::All => "all",
        }
    }
}

/// (outer, axis length, inner) layout of a row-major reduction axis.
fn axis_layout(shape: &Shape, axis: usize) -> Result<(usize, usize, usize)> {
    let dims = shape.dims();
    if axis >= dims.len() {
        return Err(BackendError::invalid_argument(
            "reduce",
            format!("axis {axis} out of range for shape {shape}"),
        ));
    }
    let outer: usize = dims[..axis].iter().product();
    let inner: usize = dims[axis + 1..].iter().product();
    Ok((outer, dims[axis], inner))
}

fn out_shape(shape: &Shape, axis: Option<usize>, keepdims: bool) -> Shape {
    match axis {
        Some(a) if keepdims => shape.replaced(a, 1),
        Some(a) => shape.without(a),
        None if keepdims => Shape::from(vec![1; shape.rank()]),
        None => Shape::scalar(),
    }
}

/// Folds `data` over one axis (or all elements when `axis` is `None`).
fn fold_axis<T: Copy, A: Copy>(
    data: &[T],
    shape: &Shape,
    axis: Option<usize>,
    init: A,
    fold: impl Fn(A, T) -> A,
) -> Result<Vec<A>> {
    match axis {
        None => Ok(vec![data.iter().fold(init, |acc, &x| fold(acc, x))]),
        Some(a) => {
            let (outer, len, inner) = axis_layout(shape, a)?;
            let mut out = vec![init; outer * inner];
            for o in 0..outer {
                for k in 0..len {
                    for i in 0..inner {
                        let src = (o * len + k) * inner + i;
                        let dst = o * inner + i;
                        out[dst] = fold(out[dst], data[src]);
                    }
                }
            }
            Ok(out)
        }
    }
}

fn reduced_count(shape: &Shape, axis: Option<usize>) -> f64 {
    match axis {
        Some(a) => shape.dims()[a] as f64,
        None => shape.volume() as f64,
    }
}

pub(crate) fn reduce(x: &Tensor, op: Reduction, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
    let shape = out_shape(x.shape(), axis, keepdims);
    match (op, x.dtype().kind) {
        // Boolean reductions.
        (Reduction::Any | Reduction::All | Reduction::Prod, Kind::Bool) => {
            let TensorData::Bool(v) = x.data() else { unreachable!() };
            let and = op != Reduction::Any;
            let out = if and {
                fold_axis(v, x.shape(), axis, true, |acc, e| acc && e)?
            } else {
                fold_axis(v, x.shape(), axis, false, |acc, e| acc || e)?
            };
            Tensor::new(shape, TensorData::Bool(out))
        }
        (Reduction::Any | Reduction::All, _) => {
            Err(BackendError::unsupported_type(op.name(), x.dtype().to_string()))
        }

        // Mean and standard deviation are float-valued regardless of the
        // input dtype.
        (Reduction::Mean, kind) => match kind {
            Kind::Complex => {
                let v = x.to_c128_vec()?;
                let n = reduced_count(x.shape(), axis);
                let sums = fold_axis(&v, x.shape(), axis, Complex64::new(0.0, 0.0), |a, e| a + e)?;
                Tensor::new(shape, TensorData::C128(sums.into_iter().map(|s| s / n).collect()))
            }
            Kind::Bool => Err(BackendError::unsupported_type("mean", "bool")),
            _ => {
                let v = x.to_f64_vec()?;
                let n = reduced_count(x.shape(), axis);
                let sums = fold_axis(&v, x.shape(), axis, 0.0, |a, e| a + e)?;
                float_tensor(shape, sums.into_iter().map(|s| s / n).collect())
            }
        },
        (Reduction::Std, Kind::Float | Kind::Int) => {
            let v = x.to_f64_vec()?;
            let n = reduced_count(x.shape(), axis);
            let stats = fold_axis(&v, x.shape(), axis, (0.0, 0.0), |(s, s2), e| (s + e, s2 + e * e))?;
            let out = stats
                .into_iter()
                .map(|(s, s2)| {
                    let mean = s / n;
                    (s2 / n - mean * mean).max(0.0).sqrt()
                })
                .collect();
            float_tensor(shape, out)
        }
        (Reduction::Std, _) => Err(BackendError::unsupported_type("std", x.dtype().to_string())),

        // Sum and product keep integer dtypes and promote float results to
        // working precision.
        (Reduction::Sum | Reduction::Prod, kind) => {
            let prod = op == Reduction::Prod;
            match kind {
                Kind::Int => {
                    let v = x.to_i64_vec()?;
                    let out = if prod {
                        fold_axis(&v, x.shape(), axis, 1i64, |a, e| a.wrapping_mul(e))?
                    } else {
                        fold_axis(&v, x.shape(), axis, 0i64, |a, e| a.wrapping_add(e))?
                    };
                    let data = if x.dtype() == DType::INT32 {
                        TensorData::I32(out.into_iter().map(|e| e as i32).collect())
                    } else {
                        TensorData::I64(out)
                    };
                    Tensor::new(shape, data)
                }
                Kind::Complex => {
                    let v = x.to_c128_vec()?;
                    let out = if prod {
                        fold_axis(&v, x.shape(), axis, Complex64::new(1.0, 0.0), |a, e| a * e)?
                    } else {
                        fold_axis(&v, x.shape(), axis, Complex64::new(0.0, 0.0), |a, e| a + e)?
                    };
                    Tensor::new(shape, TensorData::C128(out))
                }
                Kind::Float => {
                    let v = x.to_f64_vec()?;
                    let out = if prod {
                        fold_axis(&v, x.shape(), axis, 1.0, |a, e| a * e)?
                    } else {
                        fold_axis(&v, x.shape(), axis, 0.0, |a, e| a + e)?
                    };
                    float_tensor(shape, out)
                }
                Kind::Bool => Err(BackendError::unsupported_type(op.name(), "bool")),
            }
        }

        // Extrema keep the input dtype.
        (Reduction::Max | Reduction::Min, kind) => {
            let is_max = op == Reduction::Max;
            match kind {
                Kind::Int => {
                    let v = x.to_i64_vec()?;
                    let out = if is_max {
                        fold_axis(&v, x.shape(), axis, i64::MIN, i64::max)?
                    } else {
                        fold_axis(&v, x.shape(), axis, i64::MAX, i64::min)?
                    };
                    let data = if x.dtype() == DType::INT32 {
                        TensorData::I32(out.into_iter().map(|e| e as i32).collect())
                    } else {
                        TensorData::I64(out)
                    };
                    Tensor::new(shape, data)
                }
                Kind::Float => {
                    let v = x.to_f64_vec()?;
                    let out = if is_max {
                        fold_axis(&v, x.shape(), axis, f64::NEG_INFINITY, f64::max)?
                    } else {
                        fold_axis(&v, x.shape(), axis, f64::INFINITY, f64::min)?
                    };
                    float_tensor(shape, out)
                }
                _ => Err(BackendError::unsupported_type(op.name(), x.dtype().to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> Tensor {
        Tensor::new(
            Shape::from([2, 3]),
            TensorData::F64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_sum_full() {
        let out = reduce(&matrix(), Reduction::Sum, None, false).unwrap();
        assert_eq!(out.shape().rank(), 0);
        assert_eq!(out.scalar_f64().unwrap(), 21.0);
    }

    #[test]
    fn test_sum_axis0() {
        let out = reduce(&matrix(), Reduction::Sum, Some(0), false).unwrap();
        assert_eq!(out.shape().dims(), &[3]);
        assert_eq!(out.to_f64_vec().unwrap(), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_sum_axis1_keepdims() {
        let out = reduce(&matrix(), Reduction::Sum, Some(1), true).unwrap();
        assert_eq!(out.shape().dims(), &[2, 1]);
        assert_eq!(out.to_f64_vec().unwrap(), vec![6.0, 15.0]);
    }

    #[test]
    fn test_mean_and_std() {
        let t = Tensor::from_f64s(vec![1.0, 3.0]);
        assert_eq!(reduce(&t, Reduction::Mean, None, false).unwrap().scalar_f64().unwrap(), 2.0);
        assert_eq!(reduce(&t, Reduction::Std, None, false).unwrap().scalar_f64().unwrap(), 1.0);
    }

    #[test]
    fn test_extrema_keep_int_dtype() {
        let t = Tensor::from_i64s(vec![3, -5, 7]);
        let out = reduce(&t, Reduction::Max, None, false).unwrap();
        assert_eq!(out.dtype(), DType::INT64);
        assert_eq!(out.scalar_i64().unwrap(), 7);
    }

    #[test]
    fn test_int_sum_and_prod_keep_dtype() {
        let t = Tensor::new(Shape::from([2, 2]), TensorData::I64(vec![1, 2, 3, 4])).unwrap();
        let sum = reduce(&t, Reduction::Sum, Some(0), false).unwrap();
        assert_eq!(sum.dtype(), DType::INT64);
        assert_eq!(sum.to_i64_vec().unwrap(), vec![4, 6]);
        let prod = reduce(&t, Reduction::Prod, None, false).unwrap();
        assert_eq!(prod.scalar_i64().unwrap(), 24);
    }

    #[test]
    fn test_bool_prod_is_all() {
        let t = Tensor::from_bools(vec![true, true, false]);
        let out = reduce(&t, Reduction::Prod, None, false).unwrap();
        assert!(!out.scalar_bool().unwrap());
        let out = reduce(&t, Reduction::Any, None, false).unwrap();
        assert!(out.scalar_bool().unwrap());
    }

    #[test]
    fn test_any_on_float_rejected() {
        let err = reduce(&matrix(), Reduction::Any, None, false).unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedType { .. }));
    }
}
