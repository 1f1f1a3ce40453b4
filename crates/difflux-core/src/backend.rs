//! The uniform backend operation surface.
//!
//! A [`Backend`] translates a fixed vocabulary of tensor operations into
//! the native calls of one concrete engine. Simulation code programs
//! against this trait (usually through the free functions in
//! [`crate::registry`]) and never against an engine directly, so engines
//! with different execution models remain interchangeable.

use crate::device::{ComputeDevice, DeviceType};
use crate::dtype::DType;
use crate::error::Result;
use crate::host::HostValue;
use crate::registry;
use crate::shape::Shape;
use crate::tensor::Tensor;
use std::fmt::Debug;
use std::sync::Arc;

/// A function over tensors, shared between callers and compiled wrappers.
pub type TensorFn = Arc<dyn Fn(&[Tensor]) -> Result<Vec<Tensor>> + Send + Sync>;

/// How padded regions are filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadMode {
    /// Fill with a constant, converted to the tensor's dtype.
    Constant(f64),
    /// Wrap around to the opposite edge.
    Periodic,
    /// Repeat the edge value.
    Boundary,
    /// Mirror without repeating the edge value.
    Reflect,
    /// Mirror including the edge value.
    Symmetric,
}

/// A function of `f` wrapped for engine compilation.
///
/// The wrapped function must be pure: observable side effects or reads of
/// mutable external state make the compiled behavior undefined. Swapping
/// the active backend while a compiled region is in flight is likewise
/// undefined behavior.
#[derive(Clone)]
pub struct CompiledFunction {
    f: TensorFn,
    engine: String,
}

impl CompiledFunction {
    /// Wraps a function for an eager engine that runs it as-is.
    pub fn eager(engine: impl Into<String>, f: TensorFn) -> Self {
        Self { f, engine: engine.into() }
    }

    /// Invokes the compiled function.
    pub fn call(&self, args: &[Tensor]) -> Result<Vec<Tensor>> {
        (self.f)(args)
    }

    /// Name of the engine that produced this compilation.
    pub fn engine(&self) -> &str {
        &self.engine
    }
}

impl Debug for CompiledFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFunction").field("engine", &self.engine).finish()
    }
}

/// Trait for numerical compute engines.
///
/// All operations are synchronous at the call level; concurrency, if any,
/// is internal to the engine. Tensors returned by one engine stay valid
/// when another engine becomes active; engines never share mutable
/// buffers.
pub trait Backend: Debug + Send + Sync {
    /// Engine name for identification.
    fn name(&self) -> &str;

    /// Enumerates execution devices, optionally filtered by type.
    fn list_devices(&self, device_type: Option<DeviceType>) -> Vec<ComputeDevice>;

    /// Whether the tensor's values can be read back right now.
    ///
    /// Traced engines return `false` for placeholders inside a trace.
    fn is_available(&self, _tensor: &Tensor) -> bool {
        true
    }

    /// Whether this engine can run at the given working precision.
    fn supports_precision(&self, _precision: crate::dtype::Precision) -> bool {
        true
    }

    // --- Construction ---

    /// Converts host data to an engine tensor, enforcing working precision
    /// on float values. Native tensors pass through without copying.
    fn as_tensor(&self, x: HostValue) -> Result<Tensor>;

    /// Tensor of zeros. The dtype defaults to the working float precision.
    fn zeros(&self, shape: &Shape, dtype: Option<DType>) -> Result<Tensor>;

    /// Tensor of zeros with the shape and dtype of `x`.
    fn zeros_like(&self, x: &Tensor) -> Result<Tensor> {
        self.zeros(x.shape(), Some(x.dtype()))
    }

    /// Tensor of ones. The dtype defaults to the working float precision.
    fn ones(&self, shape: &Shape, dtype: Option<DType>) -> Result<Tensor>;

    /// Tensor of ones with the shape and dtype of `x`.
    fn ones_like(&self, x: &Tensor) -> Result<Tensor> {
        self.ones(x.shape(), Some(x.dtype()))
    }

    /// `number` evenly spaced values from `start` to `stop` inclusive.
    fn linspace(&self, start: f64, stop: f64, number: usize) -> Result<Tensor>;

    /// Integer range `[start, limit)` with the given step.
    fn arange(&self, start: i64, limit: Option<i64>, delta: i64, dtype: Option<DType>) -> Result<Tensor>;

    /// Uniform samples from `[0, 1)` at working precision.
    fn random_uniform(&self, shape: &Shape) -> Result<Tensor>;

    /// Standard normal samples at working precision.
    fn random_normal(&self, shape: &Shape) -> Result<Tensor>;

    // --- Conversion and queries ---

    /// Casts to a dtype. Casting to the tensor's own dtype returns an
    /// equal tensor.
    fn cast(&self, x: &Tensor, dtype: DType) -> Result<Tensor>;

    /// Independent copy of a tensor.
    fn copy(&self, x: &Tensor) -> Result<Tensor>;

    /// Coerces float/int/bool values to the working float precision.
    fn to_float(&self, x: &Tensor) -> Result<Tensor> {
        self.cast(x, registry::precision().float_dtype())
    }

    /// Element dtype of a tensor.
    fn dtype_of(&self, x: &Tensor) -> DType {
        x.dtype()
    }

    /// Runtime shape of a tensor.
    fn shape_of(&self, x: &Tensor) -> Shape {
        x.shape().clone()
    }

    /// Trace-time shape of a tensor; equals [`Backend::shape_of`] on eager
    /// engines.
    fn staticshape(&self, x: &Tensor) -> Shape {
        self.shape_of(x)
    }

    // --- Shape manipulation ---

    /// Reinterprets the elements under a new shape of equal volume.
    fn reshape(&self, x: &Tensor, shape: &Shape) -> Result<Tensor>;

    /// Permutes axes.
    fn transpose(&self, x: &Tensor, axes: &[usize]) -> Result<Tensor>;

    /// Inserts `number` axes of extent 1 at `axis`.
    fn expand_dims(&self, x: &Tensor, axis: usize, number: usize) -> Result<Tensor>;

    /// Stacks equally shaped tensors along a new axis.
    fn stack(&self, values: &[Tensor], axis: usize) -> Result<Tensor>;

    /// Concatenates tensors along an existing axis.
    fn concat(&self, values: &[Tensor], axis: usize) -> Result<Tensor>;

    /// Repeats the tensor along each axis.
    fn tile(&self, x: &Tensor, multiples: &[usize]) -> Result<Tensor>;

    /// Extends each axis by `(before, after)` elements filled per `mode`.
    fn pad(&self, x: &Tensor, widths: &[(usize, usize)], mode: PadMode) -> Result<Tensor>;

    /// Coordinate grids over the cross product of 1-D coordinate vectors.
    ///
    /// Returns one tensor per input, each of shape `[n1, .., nk]`; grid
    /// `j` varies coordinate `j` along axis `j` and is constant along all
    /// others.
    fn meshgrid(&self, coordinates: &[Tensor]) -> Result<Vec<Tensor>>;

    /// Selects the slices along `axis` where the boolean `mask` is true.
    fn boolean_mask(&self, x: &Tensor, mask: &Tensor, axis: usize) -> Result<Tensor>;

    // --- Elementwise arithmetic ---

    /// Elementwise sum.
    fn add(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Elementwise difference.
    fn sub(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Elementwise product.
    fn mul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Elementwise quotient at float precision.
    fn div(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Elementwise quotient with `x/0` mapped to zero.
    fn divide_no_nan(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Elementwise maximum.
    fn maximum(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Elementwise minimum.
    fn minimum(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Elementwise equality as a boolean tensor.
    fn equal(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;
    /// Clamps values into `[minimum, maximum]`.
    fn clip(&self, x: &Tensor, minimum: f64, maximum: f64) -> Result<Tensor>;

    /// Elementwise absolute value.
    fn abs(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise sign.
    fn sign(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise rounding to nearest.
    fn round(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise ceiling.
    fn ceil(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise floor.
    fn floor(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise square root at float precision.
    fn sqrt(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise exponential at float precision.
    fn exp(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise sine at float precision.
    fn sin(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise cosine at float precision.
    fn cos(&self, x: &Tensor) -> Result<Tensor>;
    /// Elementwise finiteness test as a boolean tensor.
    fn isfinite(&self, x: &Tensor) -> Result<Tensor>;

    /// Elementwise select: `condition ? x : y`.
    fn where_(&self, condition: &Tensor, x: &Tensor, y: &Tensor) -> Result<Tensor>;

    // --- Reductions ---

    /// Sum over one axis or all elements.
    fn sum(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;
    /// Product over one axis or all elements; boolean input reduces with
    /// logical-and.
    fn prod(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;
    /// Arithmetic mean at float precision.
    fn mean(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;
    /// Population standard deviation at float precision.
    fn std(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;
    /// Maximum over one axis or all elements.
    fn max(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;
    /// Minimum over one axis or all elements.
    fn min(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;
    /// Logical-or reduction of a boolean tensor.
    fn any_(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;
    /// Logical-and reduction of a boolean tensor.
    fn all_(&self, x: &Tensor, axis: Option<usize>, keepdims: bool) -> Result<Tensor>;

    // --- Linear algebra ---

    /// Applies a dense operator to a batch of vectors.
    ///
    /// `a` is `[n, m]` or `[batch, n, m]`; `b` is `[batch, m]`. A batched
    /// operator is combined with `b`'s batch under the
    /// combined-batch-size rule. Returns `[batch, n]`.
    fn matmul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;

    /// General contraction of `a` and `b` over the named axis pairs.
    fn tensordot(&self, a: &Tensor, a_axes: &[usize], b: &Tensor, b_axes: &[usize]) -> Result<Tensor>;

    /// Einstein summation over one or two operands, e.g. `"ij,jk->ik"`.
    fn einsum(&self, equation: &str, operands: &[Tensor]) -> Result<Tensor>;

    // --- Fourier transforms ---

    /// Discrete Fourier transform over the spatial axes of a
    /// `[batch, *spatial, channels]` tensor.
    fn fft(&self, x: &Tensor) -> Result<Tensor>;

    /// Inverse transform; requires a complex input.
    fn ifft(&self, k: &Tensor) -> Result<Tensor>;

    /// Real part of a complex tensor at working float precision.
    fn real(&self, x: &Tensor) -> Result<Tensor>;

    /// Imaginary part of a complex tensor at working float precision.
    fn imag(&self, x: &Tensor) -> Result<Tensor>;

    // --- Indexing primitives ---

    /// Indexed read along axis 0. Indices may repeat and be unordered;
    /// each must lie in `[0, extent)`. Out-of-range reads error on this
    /// engine and are undefined in general unless clamped upstream.
    fn gather(&self, values: &Tensor, indices: &Tensor) -> Result<Tensor>;

    /// Row-major indices of the nonzero (or true) elements, as an
    /// `[n, rank]` integer tensor.
    fn nonzero(&self, values: &Tensor) -> Result<Tensor>;

    /// Accumulating scatter primitive.
    ///
    /// `base` is `[*cells, channels]`, `indices` is `[m, d]` with `d`
    /// covering the cell axes, `updates` is `[m, channels]`; update rows
    /// are added into their target cells. Collisions accumulate; this is
    /// the primitive the scatter engine composes its policies from.
    fn scatter_add(&self, base: &Tensor, indices: &Tensor, updates: &Tensor) -> Result<Tensor>;

    /// Overwriting scatter primitive; on index collisions the surviving
    /// write is unspecified.
    fn scatter_write(&self, base: &Tensor, indices: &Tensor, updates: &Tensor) -> Result<Tensor>;

    // --- Control flow and higher-order operations ---

    /// Runs `body` on the loop variables while `cond` holds, up to
    /// `maximum_iterations`. Synchronous and non-preemptible: once
    /// entered, the loop runs to its stopping condition or the cap.
    fn while_loop(
        &self,
        cond: &dyn Fn(&[Tensor]) -> Result<bool>,
        body: &dyn Fn(&[Tensor]) -> Result<Vec<Tensor>>,
        loop_vars: Vec<Tensor>,
        maximum_iterations: Option<usize>,
    ) -> Result<Vec<Tensor>> {
        let mut vars = loop_vars;
        let mut i = 0;
        while cond(&vars)? {
            if let Some(cap) = maximum_iterations {
                if i == cap {
                    break;
                }
            }
            vars = body(&vars)?;
            i += 1;
        }
        Ok(vars)
    }

    /// Returns a callable equivalent to `f`, eligible for engine fusion.
    ///
    /// `f` must be pure; see [`CompiledFunction`]. Eager engines return a
    /// transparent wrapper.
    fn jit_compile(&self, f: TensorFn) -> CompiledFunction {
        CompiledFunction::eager(self.name(), f)
    }
}
