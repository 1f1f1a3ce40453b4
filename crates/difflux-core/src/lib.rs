//! Core traits and types for differentiable numerical backends.
//!
//! This crate defines the uniform operation surface that PDE simulation
//! code programs against, together with the eager CPU reference engine.
//! Engines with different execution models (eager, traced, compiled)
//! implement the same [`backend::Backend`] trait and stay interchangeable
//! at runtime.
//!
//! # Key Concepts
//!
//! - **Backends**: Interchangeable compute engines behind one trait
//! - **Tensors**: Opaque n-dimensional arrays with a fixed shape and dtype
//! - **Working Precision**: A process-wide float-width switch
//! - **Registry**: Default and scoped backend selection
//!
//! # Modules
//!
//! - [`backend`]: The backend operation trait and compiled-function wrapper
//! - [`cpu`]: Eager CPU reference engine
//! - [`device`]: Execution devices exposed by engines
//! - [`dtype`]: Element types, kind promotion and precision
//! - [`error`]: Error taxonomy for backend operations
//! - [`host`]: The host-data boundary union
//! - [`registry`]: Backend registration and dispatch
//! - [`shape`]: Shapes and the combined-batch-size rule
//! - [`tensor`]: The tensor value type

pub mod backend;
pub mod cpu;
pub mod device;
pub mod dtype;
pub mod error;
pub mod host;
pub mod registry;
pub mod shape;
pub mod tensor;

// Re-export commonly used items at the crate root
pub use error::{BackendError, Result};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use difflux_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::{Backend, CompiledFunction, PadMode, TensorFn};
    pub use crate::cpu::CpuBackend;
    pub use crate::device::{ComputeDevice, DeviceType};
    pub use crate::dtype::{DType, Kind, Precision};
    pub use crate::error::{BackendError, Result};
    pub use crate::host::HostValue;
    pub use crate::registry::{
        active_backend, push_backend, set_default_backend, set_precision,
    };
    pub use crate::shape::{combined_batch, combined_dim, Shape};
    pub use crate::tensor::{Tensor, TensorData};
}
