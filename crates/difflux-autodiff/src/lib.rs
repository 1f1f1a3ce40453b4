//! Reverse-mode automatic differentiation over difflux backends.
//!
//! This crate provides a minimal tape-style autodiff engine for
//! simulation code. Operations execute eagerly on the bound backend while
//! being recorded into a [`graph::Graph`]; [`backward::backward`] then
//! accumulates vector-Jacobian products in reverse execution order.
//!
//! # Architecture
//!
//! 1. **Graph**: Records operations and their values in execution order
//! 2. **Operations**: Forward evaluation paired with its VJP
//! 3. **Backward**: Reverse accumulation into a gradient map
//! 4. **Functional**: Gradient functions and user-defined gradients

pub mod backward;
pub mod functional;
pub mod graph;
pub mod ops;

// Re-export key types
pub use backward::{backward, GradientMap};
pub use functional::{custom_gradient, functional_gradient, CustomGradient, GradientFn};
pub use graph::{Graph, Node, NodeId, Variable};
pub use ops::{unbroadcast, Op};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backward::{backward, GradientMap};
    pub use crate::functional::{custom_gradient, functional_gradient, CustomGradient, GradientFn};
    pub use crate::graph::{Graph, Node, NodeId, Variable};
    pub use crate::ops::Op;
}
