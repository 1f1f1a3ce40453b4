//! Differentiable tensor backends for PDE simulation.
//!
//! `difflux` bundles the backend abstraction ([`core`]), batched linear
//! solvers and scatter policies ([`solve`]) and reverse-mode automatic
//! differentiation ([`autodiff`], feature-gated) behind one dependency.
//!
//! # Example
//!
//! ```
//! use difflux::prelude::*;
//! use std::sync::Arc;
//!
//! let _guard = push_backend(Arc::new(CpuBackend::new()));
//! let backend = active_backend()?;
//! let x = backend.as_tensor(HostValue::from(vec![1.0, 2.0, 3.0]))?;
//! let total = backend.sum(&x, None, false)?;
//! assert_eq!(total.scalar_f64()?, 6.0);
//! # Ok::<(), BackendError>(())
//! ```

pub use difflux_core as core;
pub use difflux_solve as solve;

#[cfg(feature = "autodiff")]
pub use difflux_autodiff as autodiff;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use difflux_core::prelude::*;
    pub use difflux_solve::prelude::*;

    #[cfg(feature = "autodiff")]
    pub use difflux_autodiff::prelude::*;
}
