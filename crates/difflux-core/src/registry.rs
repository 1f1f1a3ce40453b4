//! Backend selection and process-wide numerical settings.
//!
//! One default backend serves the whole process; a thread may temporarily
//! override it with a scoped context that pops automatically when the
//! guard drops. All dispatch goes through [`active_backend`], which
//! resolves the innermost scoped backend of the current thread, then the
//! process default, and fails with a configuration error when neither is
//! set.

use crate::backend::Backend;
use crate::dtype::Precision;
use crate::error::{BackendError, Result};
use crate::host::HostValue;
use crate::shape::Shape;
use crate::tensor::Tensor;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::sync::Arc;

static DEFAULT_BACKEND: Lazy<RwLock<Option<Arc<dyn Backend>>>> = Lazy::new(|| RwLock::new(None));

static PRECISION: Lazy<RwLock<Precision>> = Lazy::new(|| RwLock::new(Precision::default()));

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<dyn Backend>>> = const { RefCell::new(Vec::new()) };
}

/// Registers the process-wide default backend.
///
/// Fails when the backend cannot run at the current working precision.
pub fn set_default_backend(backend: Arc<dyn Backend>) -> Result<()> {
    let precision = precision();
    if !backend.supports_precision(precision) {
        return Err(BackendError::configuration(format!(
            "backend '{}' does not support {precision:?} precision",
            backend.name()
        )));
    }
    tracing::debug!(backend = backend.name(), "default backend registered");
    *DEFAULT_BACKEND.write() = Some(backend);
    Ok(())
}

/// The process-wide default backend, if one is registered.
pub fn default_backend() -> Option<Arc<dyn Backend>> {
    DEFAULT_BACKEND.read().clone()
}

/// Resolves the backend operations dispatch to on this thread.
pub fn active_backend() -> Result<Arc<dyn Backend>> {
    if let Some(scoped) = CONTEXT_STACK.with(|stack| stack.borrow().last().cloned()) {
        return Ok(scoped);
    }
    default_backend()
        .ok_or_else(|| BackendError::configuration("no backend registered; call set_default_backend first"))
}

/// Scoped backend override for the current thread.
///
/// Pops its backend from the context stack on drop; guards therefore must
/// be dropped in reverse creation order, which Rust's drop order gives
/// for free when they live on the stack.
#[must_use = "the scoped backend is popped when the guard drops"]
pub struct BackendGuard {
    _private: (),
}

impl Drop for BackendGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Pushes a scoped backend for the current thread.
pub fn push_backend(backend: Arc<dyn Backend>) -> BackendGuard {
    tracing::trace!(backend = backend.name(), "scoped backend pushed");
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(backend));
    BackendGuard { _private: () }
}

/// The current working float precision.
pub fn precision() -> Precision {
    *PRECISION.read()
}

/// Sets the working float precision for the whole process.
///
/// Fails before taking effect when the registered default backend cannot
/// run at the requested precision.
pub fn set_precision(precision: Precision) -> Result<()> {
    if let Some(backend) = default_backend() {
        if !backend.supports_precision(precision) {
            return Err(BackendError::configuration(format!(
                "backend '{}' does not support {precision:?} precision",
                backend.name()
            )));
        }
    }
    tracing::debug!(?precision, "working precision changed");
    *PRECISION.write() = precision;
    Ok(())
}

// Free dispatch functions over the active backend. Simulation code calls
// these instead of holding a backend handle.

/// Converts host data to a tensor on the active backend.
pub fn as_tensor(x: impl Into<HostValue>) -> Result<Tensor> {
    active_backend()?.as_tensor(x.into())
}

/// Tensor of zeros on the active backend.
pub fn zeros(shape: &Shape, dtype: Option<crate::dtype::DType>) -> Result<Tensor> {
    active_backend()?.zeros(shape, dtype)
}

/// Tensor of ones on the active backend.
pub fn ones(shape: &Shape, dtype: Option<crate::dtype::DType>) -> Result<Tensor> {
    active_backend()?.ones(shape, dtype)
}

/// Evenly spaced values on the active backend.
pub fn linspace(start: f64, stop: f64, number: usize) -> Result<Tensor> {
    active_backend()?.linspace(start, stop, number)
}

/// Integer range on the active backend.
pub fn arange(start: i64, limit: Option<i64>, delta: i64) -> Result<Tensor> {
    active_backend()?.arange(start, limit, delta, None)
}

/// Uniform samples on the active backend.
pub fn random_uniform(shape: &Shape) -> Result<Tensor> {
    active_backend()?.random_uniform(shape)
}

/// Standard normal samples on the active backend.
pub fn random_normal(shape: &Shape) -> Result<Tensor> {
    active_backend()?.random_normal(shape)
}

/// Cast on the active backend.
pub fn cast(x: &Tensor, dtype: crate::dtype::DType) -> Result<Tensor> {
    active_backend()?.cast(x, dtype)
}

/// Stack on the active backend.
pub fn stack(values: &[Tensor], axis: usize) -> Result<Tensor> {
    active_backend()?.stack(values, axis)
}

/// Concatenation on the active backend.
pub fn concat(values: &[Tensor], axis: usize) -> Result<Tensor> {
    active_backend()?.concat(values, axis)
}

/// Reshape on the active backend.
pub fn reshape(x: &Tensor, shape: &Shape) -> Result<Tensor> {
    active_backend()?.reshape(x, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;

    #[test]
    fn test_scoped_backend_nesting() {
        let outer: Arc<dyn Backend> = Arc::new(CpuBackend::with_seed(1));
        let inner: Arc<dyn Backend> = Arc::new(CpuBackend::with_seed(2));

        let _outer_guard = push_backend(outer.clone());
        assert!(Arc::ptr_eq(&active_backend().unwrap(), &outer));
        {
            let _inner_guard = push_backend(inner.clone());
            assert!(Arc::ptr_eq(&active_backend().unwrap(), &inner));
        }
        assert!(Arc::ptr_eq(&active_backend().unwrap(), &outer));
    }

    #[test]
    fn test_scoped_backend_is_thread_local() {
        let scoped: Arc<dyn Backend> = Arc::new(CpuBackend::with_seed(3));
        let _guard = push_backend(scoped.clone());

        let other_thread = std::thread::spawn(|| {
            CONTEXT_STACK.with(|stack| stack.borrow().len())
        })
        .join()
        .unwrap();
        assert_eq!(other_thread, 0);
    }

    #[test]
    fn test_dispatch_through_scoped_backend() {
        let _guard = push_backend(Arc::new(CpuBackend::with_seed(4)));
        let t = as_tensor(vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.shape().dims(), &[3]);
        let z = zeros(&Shape::from([2, 2]), None).unwrap();
        assert_eq!(z.volume(), 4);
    }

    #[test]
    fn test_default_precision_is_double() {
        assert_eq!(Precision::default(), Precision::Double);
    }
}
