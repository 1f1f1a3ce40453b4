//! Batched linear solvers and indexed-update policies over difflux
//! backends.
//!
//! Everything in this crate is written against the
//! [`difflux_core::backend::Backend`] trait, so it runs unchanged on any
//! registered engine.
//!
//! # Modules
//!
//! - [`cg`]: Batched conjugate-gradient solver
//! - [`operator`]: Linear operators (dense, batched, matrix-free)
//! - [`scatter`]: Duplicate and out-of-range policies for scatter/gather

pub mod cg;
pub mod operator;
pub mod scatter;

pub use cg::{conjugate_gradient, Solve, SolveResult};
pub use operator::{BatchedOperator, DenseOperator, FnOperator, LinearOperator};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::cg::{conjugate_gradient, Solve, SolveResult};
    pub use crate::operator::{BatchedOperator, DenseOperator, FnOperator, LinearOperator};
    pub use crate::scatter::{
        batched_gather_nd, gather, scatter, scatter_into, DuplicatesHandling, OutsideHandling,
    };
}
