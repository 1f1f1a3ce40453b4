//! Computation graph for automatic differentiation.
//!
//! The graph records every backend operation as it executes (eager
//! forward, taped backward). Nodes are appended in execution order, so
//! the reverse of the insertion order is a valid reverse topological
//! order for backpropagation.

use crate::ops::{
    Add, CosOp, Divide, Dot, ExpOp, MatMul, Mean, Multiply, Negate, Op, SinOp, SqrtOp, Subtract,
    Sum,
};
use difflux_core::backend::Backend;
use difflux_core::error::{BackendError, Result};
use difflux_core::tensor::Tensor;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for nodes in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node{}", self.0)
    }
}

/// A differentiable value in the graph.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    /// Identifier of the node holding this variable's value.
    pub id: NodeId,
}

/// One recorded operation (or leaf value).
pub struct Node {
    /// The value computed at this node.
    pub value: Tensor,
    /// The operation that produced this node; `None` for leaves.
    pub op: Option<Box<dyn Op>>,
    /// Input nodes of the operation.
    pub inputs: Vec<NodeId>,
    /// Whether gradients flow through this node.
    pub requires_grad: bool,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("op", &self.op.as_ref().map(|op| op.name()))
            .field("inputs", &self.inputs)
            .field("requires_grad", &self.requires_grad)
            .finish_non_exhaustive()
    }
}

/// A dynamic computation graph bound to one backend.
#[derive(Debug)]
pub struct Graph {
    backend: Arc<dyn Backend>,
    nodes: Vec<Node>,
}

impl Graph {
    /// Creates an empty graph recording operations on `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            nodes: Vec::new(),
        }
    }

    /// The backend this graph records against.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Registers a differentiable leaf.
    pub fn variable(&mut self, value: Tensor) -> Variable {
        self.push_leaf(value, true)
    }

    /// Registers a non-differentiable leaf.
    pub fn constant(&mut self, value: Tensor) -> Variable {
        self.push_leaf(value, false)
    }

    fn push_leaf(&mut self, value: Tensor, requires_grad: bool) -> Variable {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            value,
            op: None,
            inputs: Vec::new(),
            requires_grad,
        });
        Variable { id }
    }

    /// The value held at a node.
    pub fn value(&self, id: NodeId) -> Result<&Tensor> {
        self.nodes
            .get(id.0)
            .map(|n| &n.value)
            .ok_or_else(|| BackendError::invalid_argument("graph", format!("unknown node {id}")))
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Runs an operation eagerly and records it.
    pub fn apply(&mut self, op: Box<dyn Op>, inputs: &[Variable]) -> Result<Variable> {
        let values: Vec<Tensor> = inputs
            .iter()
            .map(|v| self.value(v.id).cloned())
            .collect::<Result<_>>()?;
        let value = op.forward(self.backend.as_ref(), &values)?;
        let requires_grad = inputs.iter().any(|v| self.node(v.id).requires_grad);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            value,
            op: Some(op),
            inputs: inputs.iter().map(|v| v.id).collect(),
            requires_grad,
        });
        Ok(Variable { id })
    }

    /// Elementwise sum.
    pub fn add(&mut self, a: Variable, b: Variable) -> Result<Variable> {
        self.apply(Box::new(Add), &[a, b])
    }

    /// Elementwise difference.
    pub fn sub(&mut self, a: Variable, b: Variable) -> Result<Variable> {
        self.apply(Box::new(Subtract), &[a, b])
    }

    /// Elementwise product.
    pub fn mul(&mut self, a: Variable, b: Variable) -> Result<Variable> {
        self.apply(Box::new(Multiply), &[a, b])
    }

    /// Elementwise quotient.
    pub fn div(&mut self, a: Variable, b: Variable) -> Result<Variable> {
        self.apply(Box::new(Divide), &[a, b])
    }

    /// Elementwise negation.
    pub fn neg(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(Negate), &[x])
    }

    /// Elementwise square.
    pub fn square(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(Multiply), &[x, x])
    }

    /// Elementwise square root.
    pub fn sqrt(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(SqrtOp), &[x])
    }

    /// Elementwise exponential.
    pub fn exp(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(ExpOp), &[x])
    }

    /// Elementwise sine.
    pub fn sin(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(SinOp), &[x])
    }

    /// Elementwise cosine.
    pub fn cos(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(CosOp), &[x])
    }

    /// Sum of all elements.
    pub fn sum(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(Sum), &[x])
    }

    /// Mean of all elements.
    pub fn mean(&mut self, x: Variable) -> Result<Variable> {
        self.apply(Box::new(Mean), &[x])
    }

    /// Dense operator application `a [n, m] · b [batch, m]`.
    pub fn matmul(&mut self, a: Variable, b: Variable) -> Result<Variable> {
        self.apply(Box::new(MatMul), &[a, b])
    }

    /// Inner product of two flat vectors.
    pub fn dot(&mut self, a: Variable, b: Variable) -> Result<Variable> {
        self.apply(Box::new(Dot), &[a, b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use difflux_core::cpu::CpuBackend;

    #[test]
    fn test_eager_forward_values() {
        let mut g = Graph::new(Arc::new(CpuBackend::with_seed(0)));
        let x = g.variable(Tensor::from_f64s(vec![1.0, 2.0]));
        let y = g.constant(Tensor::from_f64s(vec![3.0, 4.0]));
        let z = g.add(x, y).unwrap();
        assert_eq!(g.value(z.id).unwrap().to_f64_vec().unwrap(), vec![4.0, 6.0]);
        assert!(g.node(z.id).requires_grad);

        let w = g.mul(y, y).unwrap();
        assert!(!g.node(w.id).requires_grad);
    }
}
