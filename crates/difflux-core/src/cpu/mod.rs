//! The eager CPU reference engine.
//!
//! Every operation executes immediately on host memory; no graph is built
//! and no compilation happens. This engine defines the reference semantics
//! that accelerated engines must reproduce.

mod elementwise;
mod fft;
mod index;
mod linalg;
mod reduce;
mod shape_ops;

use crate::backend::{Backend, PadMode};
use crate::device::{ComputeDevice, DeviceType};
use crate::dtype::{DType, Kind};
use crate::error::{BackendError, Result};
use crate::host::HostValue;
use crate::registry;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorData};
use num_complex::Complex64;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::fmt;

use elementwise::{binary, float_tensor, unary_float, unary_numeric, BinaryOp};
use reduce::Reduction;

const ADD: BinaryOp = BinaryOp {
    name: "add",
    int_fn: Some(i64::wrapping_add),
    float_fn: |a, b| a + b,
    complex_fn: Some(|a, b| a + b),
};

const SUB: BinaryOp = BinaryOp {
    name: "sub",
    int_fn: Some(i64::wrapping_sub),
    float_fn: |a, b| a - b,
    complex_fn: Some(|a, b| a - b),
};

const MUL: BinaryOp = BinaryOp {
    name: "mul",
    int_fn: Some(i64::wrapping_mul),
    float_fn: |a, b| a * b,
    complex_fn: Some(|a, b| a * b),
};

// Integer division promotes to float, matching the other arithmetic
// engines rather than Rust integer semantics.
const DIV: BinaryOp = BinaryOp {
    name: "div",
    int_fn: None,
    float_fn: |a, b| a / b,
    complex_fn: Some(|a, b| a / b),
};

const DIVIDE_NO_NAN: BinaryOp = BinaryOp {
    name: "divide_no_nan",
    int_fn: None,
    float_fn: |a, b| if b == 0.0 { 0.0 } else { a / b },
    complex_fn: Some(|a, b| if b == Complex64::new(0.0, 0.0) { Complex64::new(0.0, 0.0) } else { a / b }),
};

const MAXIMUM: BinaryOp = BinaryOp {
    name: "maximum",
    int_fn: Some(i64::max),
    float_fn: f64::max,
    complex_fn: None,
};

const MINIMUM: BinaryOp = BinaryOp {
    name: "minimum",
    int_fn: Some(i64::min),
    float_fn: f64::min,
    complex_fn: None,
};

/// Eager host-memory engine.
pub struct CpuBackend {
    rng: Mutex<SmallRng>,
}

impl CpuBackend {
    /// Creates an engine with an entropy-seeded random generator.
    pub fn new() -> Self {
        Self { rng: Mutex::new(SmallRng::from_entropy()) }
    }

    /// Creates an engine with a deterministic random generator.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(SmallRng::seed_from_u64(seed)) }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuBackend").finish_non_exhaustive()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn list_devices(&self, device_type: Option<DeviceType>) -> Vec<ComputeDevice> {
        let cpu = ComputeDevice::new(
            self.name(),
            "host processor",
            DeviceType::Cpu,
            format!("{} logical cores", num_cpus::get()),
            0,
        );
        match device_type {
            None | Some(DeviceType::Cpu) => vec![cpu],
            Some(_) => Vec::new(),
        }
    }

    fn as_tensor(&self, x: HostValue) -> Result<Tensor> {
        match x {
            HostValue::Native(t) => Ok(t),
            HostValue::Bool(b) => Tensor::new(Shape::scalar(), TensorData::Bool(vec![b])),
            HostValue::Int(i) => Ok(Tensor::scalar_from_i64(i)),
            HostValue::Float(v) => float_tensor(Shape::scalar(), vec![v]),
            HostValue::Complex(c) => Tensor::new(Shape::scalar(), TensorData::C128(vec![c])),
            HostValue::BoolVec(v) => Ok(Tensor::from_bools(v)),
            HostValue::IntVec(v) => Ok(Tensor::from_i64s(v)),
            HostValue::FloatVec(v) => float_tensor(Shape::from(vec![v.len()]), v),
            HostValue::Shaped { data, shape } => float_tensor(shape, data),
        }
    }

    fn zeros(&self, shape: &Shape, dtype: Option<DType>) -> Result<Tensor> {
        let dtype = dtype.unwrap_or_else(|| registry::precision().float_dtype());
        Tensor::new(shape.clone(), TensorData::zeros(dtype, shape.volume())?)
    }

    fn ones(&self, shape: &Shape, dtype: Option<DType>) -> Result<Tensor> {
        let dtype = dtype.unwrap_or_else(|| registry::precision().float_dtype());
        Tensor::new(shape.clone(), TensorData::ones(dtype, shape.volume())?)
    }

    fn linspace(&self, start: f64, stop: f64, number: usize) -> Result<Tensor> {
        let values = match number {
            0 => Vec::new(),
            1 => vec![start],
            n => {
                let step = (stop - start) / (n - 1) as f64;
                (0..n).map(|i| start + step * i as f64).collect()
            }
        };
        float_tensor(Shape::from(vec![number]), values)
    }

    fn arange(&self, start: i64, limit: Option<i64>, delta: i64, dtype: Option<DType>) -> Result<Tensor> {
        if delta == 0 {
            return Err(BackendError::invalid_argument("arange", "delta must be nonzero"));
        }
        // A single argument counts from zero, like the usual range builders.
        let (start, limit) = match limit {
            Some(limit) => (start, limit),
            None => (0, start),
        };
        let mut values = Vec::new();
        let mut v = start;
        while (delta > 0 && v < limit) || (delta < 0 && v > limit) {
            values.push(v);
            v += delta;
        }
        let shape = Shape::from(vec![values.len()]);
        match dtype.unwrap_or(DType::INT64) {
            DType::INT32 => Tensor::new(shape, TensorData::I32(values.into_iter().map(|e| e as i32).collect())),
            DType::INT64 => Tensor::new(shape, TensorData::I64(values)),
            DType::FLOAT32 => Tensor::new(shape, TensorData::F32(values.into_iter().map(|e| e as f32).collect())),
            DType::FLOAT64 => Tensor::new(shape, TensorData::F64(values.into_iter().map(|e| e as f64).collect())),
            other => Err(BackendError::unsupported_type("arange", other.to_string())),
        }
    }

    fn random_uniform(&self, shape: &Shape) -> Result<Tensor> {
        let mut rng = self.rng.lock();
        let values = (0..shape.volume()).map(|_| rng.gen::<f64>()).collect();
        float_tensor(shape.clone(), values)
    }

    fn random_normal(&self, shape: &Shape) -> Result<Tensor> {
        let mut rng = self.rng.lock();
        let values = (0..shape.volume()).map(|_| rng.sample(StandardNormal)).collect();
        float_tensor(shape.clone(), values)
    }

    fn cast(&self, x: &Tensor, dtype: DType) -> Result<Tensor> {
        if x.dtype() == dtype {
            return Ok(x.clone());
        }
        let shape = x.shape().clone();
        match dtype {
            DType::BOOL => {
                if x.dtype().kind == Kind::Complex {
                    return Err(BackendError::unsupported_type("cast", "complex128 -> bool"));
                }
                let values = x.to_f64_vec()?;
                Tensor::new(shape, TensorData::Bool(values.into_iter().map(|e| e != 0.0).collect()))
            }
            DType::INT32 | DType::INT64 => {
                if x.dtype().kind == Kind::Complex {
                    return Err(BackendError::unsupported_type("cast", "complex128 -> int"));
                }
                // Float to int truncates toward zero.
                let values: Vec<i64> = x.to_f64_vec()?.into_iter().map(|e| e.trunc() as i64).collect();
                if dtype == DType::INT32 {
                    Tensor::new(shape, TensorData::I32(values.into_iter().map(|e| e as i32).collect()))
                } else {
                    Tensor::new(shape, TensorData::I64(values))
                }
            }
            DType::FLOAT32 | DType::FLOAT64 => {
                if x.dtype().kind == Kind::Complex {
                    return Err(BackendError::unsupported_type("cast", "complex128 -> float"));
                }
                let values = x.to_f64_vec()?;
                if dtype == DType::FLOAT32 {
                    Tensor::new(shape, TensorData::F32(values.into_iter().map(|e| e as f32).collect()))
                } else {
                    Tensor::new(shape, TensorData::F64(values))
                }
            }
            DType::COMPLEX128 => Tensor::new(shape, TensorData::C128(x.to_c128_vec()?)),
            other => Err(BackendError::unsupported_type("cast", other.to_string())),
        }
    }

    fn copy(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.clone())
    }

    fn reshape(&self, x: &Tensor, shape: &Shape) -> Result<Tensor> {
        shape_ops::reshape(x, shape)
    }

    fn transpose(&self, x: &Tensor, axes: &[usize]) -> Result<Tensor> {
        shape_ops::transpose(x, axes)
    }

    fn expand_dims(&self, x: &Tensor, axis: usize, number: usize) -> Result<Tensor> {
        shape_ops::expand_dims(x, axis, number)
    }

    fn stack(&self, values: &[Tensor], axis: usize) -> Result<Tensor> {
        shape_ops::stack(values, axis)
    }

    fn concat(&self, values: &[Tensor], axis: usize) -> Result<Tensor> {
        shape_ops::concat(values, axis)
    }

    fn tile(&self, x: &Tensor, multiples: &[usize]) -> Result<Tensor> {
        shape_ops::tile(x, multiples)
    }

    fn boolean_mask(&self, x: &Tensor, mask: &Tensor, axis: usize) -> Result<Tensor> {
        shape_ops::boolean_mask(x, mask, axis)
    }

    fn pad(&self, x: &Tensor, widths: &[(usize, usize)], mode: PadMode) -> Result<Tensor> {
        shape_ops::pad(x, widths, mode)
    }

    fn meshgrid(&self, coordinates: &[Tensor]) -> Result<Vec<Tensor>> {
        shape_ops::meshgrid(coordinates)
    }

    fn add(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary(a, b, &ADD)
    }

    fn sub(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary(a, b, &SUB)
    }

    fn mul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary(a, b, &MUL)
    }

    fn div(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary(a, b, &DIV)
    }

    fn divide_no_nan(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary(a, b, &DIVIDE_NO_NAN)
    }

    fn maximum(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary(a, b, &MAXIMUM)
    }

    fn minimum(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        binary(a, b, &MINIMUM)
    }

    fn equal(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        elementwise::equal(a, b)
    }

    fn clip(&self, x: &Tensor, minimum: f64, maximum: f64) -> Result<Tensor> {
        elementwise::clip(x, minimum, maximum)
    }

    fn abs(&self, x: &Tensor) -> Result<Tensor> {
        elementwise::abs(x)
    }

    fn sign(&self, x: &Tensor) -> Result<Tensor> {
        unary_numeric(x, "sign", i64::signum, |e| if e == 0.0 { 0.0 } else { e.signum() })
    }

    fn round(&self, x: &Tensor) -> Result<Tensor> {
        unary_numeric(x, "round", |e| e, f64::round)
    }

    fn ceil(&self, x: &Tensor) -> Result<Tensor> {
        unary_numeric(x, "ceil", |e| e, f64::ceil)
    }

    fn floor(&self, x: &Tensor) -> Result<Tensor> {
        unary_numeric(x, "floor", |e| e, f64::floor)
    }

    fn sqrt(&self, x: &Tensor) -> Result<Tensor> {
        unary_float(x, "sqrt", f64::sqrt)
    }

    fn exp(&self, x: &Tensor) -> Result<Tensor> {
        unary_float(x, "exp", f64::exp)
    }

    fn sin(&self, x: &Tensor) -> Result<Tensor> {
        unary_float(x, "sin", f64::sin)
    }

    fn cos(&self, x: &Tensor) -> Result<Tensor> {
        unary_float(x, "cos", f64::cos)
    }

    fn isfinite(&self, x: &Tensor) -> Result<Tensor> {
        elementwise::isfinite(x)
    }

    fn where_(&self, condition: &Tensor, x: &Tensor, y: &Tensor) -> Result<Tensor> {
        elementwise::where_(condition, x, y)
    }

    fn sum(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::Sum, axis, keepdims)
    }

    fn prod(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::Prod, axis, keepdims)
    }

    fn mean(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::Mean, axis, keepdims)
    }

    fn std(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::Std, axis, keepdims)
    }

    fn max(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::Max, axis, keepdims)
    }

    fn min(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::Min, axis, keepdims)
    }

    fn any_(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::Any, axis, keepdims)
    }

    fn all_(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor> {
        reduce::reduce(x, Reduction::All, axis, keepdims)
    }

    fn matmul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        linalg::matmul(a, b)
    }

    fn tensordot(&self, a: &Tensor, a_axes: &[usize], b: &Tensor, b_axes: &[usize]) -> Result<Tensor> {
        linalg::tensordot(a, a_axes, b, b_axes)
    }

    fn einsum(&self, equation: &str, operands: &[Tensor]) -> Result<Tensor> {
        linalg::einsum(equation, operands)
    }

    fn fft(&self, x: &Tensor) -> Result<Tensor> {
        fft::fft(x)
    }

    fn ifft(&self, k: &Tensor) -> Result<Tensor> {
        fft::ifft(k)
    }

    fn real(&self, x: &Tensor) -> Result<Tensor> {
        fft::real(x)
    }

    fn imag(&self, x: &Tensor) -> Result<Tensor> {
        fft::imag(x)
    }

    fn gather(&self, values: &Tensor, indices: &Tensor) -> Result<Tensor> {
        index::gather(values, indices)
    }

    fn nonzero(&self, values: &Tensor) -> Result<Tensor> {
        index::nonzero(values)
    }

    fn scatter_add(&self, base: &Tensor, indices: &Tensor, updates: &Tensor) -> Result<Tensor> {
        index::scatter_add(base, indices, updates)
    }

    fn scatter_write(&self, base: &Tensor, indices: &Tensor, updates: &Tensor) -> Result<Tensor> {
        index::scatter_write(base, indices, updates)
    }
}
