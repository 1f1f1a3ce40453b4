//! Backward pass: reverse accumulation of gradients through the graph.

use crate::graph::{Graph, NodeId};
use difflux_core::error::Result;
use difflux_core::tensor::Tensor;
use std::collections::HashMap;

/// Gradients keyed by the node they belong to.
pub type GradientMap = HashMap<NodeId, Tensor>;

/// Backpropagates from `output`, returning the gradient of every node
/// that gradients flowed into.
///
/// `grad_output` seeds the pass; `None` seeds with ones, which for a
/// scalar output yields plain derivatives.
pub fn backward(graph: &Graph, output: NodeId, grad_output: Option<Tensor>) -> Result<GradientMap> {
    let backend = graph.backend();
    let seed = match grad_output {
        Some(g) => g,
        None => backend.ones_like(graph.value(output)?)?,
    };

    let mut gradients = GradientMap::new();
    gradients.insert(output, seed);

    // Nodes are appended in execution order, so walking ids backwards is
    // a reverse topological traversal.
    for id in (0..graph.node_count()).rev() {
        let id = NodeId(id);
        let node = graph.node(id);
        let Some(op) = node.op.as_ref() else {
            continue;
        };
        if !node.requires_grad {
            continue;
        }
        let Some(grad) = gradients.get(&id).cloned() else {
            continue;
        };

        let inputs: Vec<Tensor> = node
            .inputs
            .iter()
            .map(|&i| graph.value(i).cloned())
            .collect::<Result<_>>()?;
        let input_grads = op.backward(backend, &inputs, &node.value, &grad)?;

        for (&input_id, input_grad) in node.inputs.iter().zip(input_grads) {
            match gradients.get(&input_id) {
                Some(existing) => {
                    let summed = backend.add(existing, &input_grad)?;
                    gradients.insert(input_id, summed);
                }
                None => {
                    gradients.insert(input_id, input_grad);
                }
            }
        }
    }

    Ok(gradients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use difflux_core::cpu::CpuBackend;
    use std::sync::Arc;

    fn graph() -> Graph {
        Graph::new(Arc::new(CpuBackend::with_seed(0)))
    }

    #[test]
    fn test_gradient_of_square() {
        let mut g = graph();
        let x = g.variable(Tensor::scalar_from_f64(2.0));
        let y = g.square(x).unwrap();
        let grads = backward(&g, y.id, None).unwrap();
        // d/dx x^2 = 2x = 4 at x = 2.
        assert_relative_eq!(grads[&x.id].scalar_f64().unwrap(), 4.0);
    }

    #[test]
    fn test_gradient_accumulates_over_reuse() {
        let mut g = graph();
        let x = g.variable(Tensor::scalar_from_f64(3.0));
        let a = g.mul(x, x).unwrap();
        let b = g.add(a, x).unwrap();
        let grads = backward(&g, b.id, None).unwrap();
        // d/dx (x^2 + x) = 2x + 1 = 7.
        assert_relative_eq!(grads[&x.id].scalar_f64().unwrap(), 7.0);
    }

    #[test]
    fn test_chain_rule_through_transcendentals() {
        let mut g = graph();
        let x = g.variable(Tensor::scalar_from_f64(0.5));
        let s = g.sin(x).unwrap();
        let e = g.exp(s).unwrap();
        let grads = backward(&g, e.id, None).unwrap();
        // d/dx exp(sin x) = exp(sin x) cos x.
        let expected = (0.5f64.sin()).exp() * 0.5f64.cos();
        assert_relative_eq!(grads[&x.id].scalar_f64().unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_constants_block_gradient_flow() {
        let mut g = graph();
        let x = g.variable(Tensor::scalar_from_f64(2.0));
        let c = g.constant(Tensor::scalar_from_f64(10.0));
        let y = g.mul(x, c).unwrap();
        let grads = backward(&g, y.id, None).unwrap();
        assert_relative_eq!(grads[&x.id].scalar_f64().unwrap(), 10.0);
    }

    #[test]
    fn test_mean_gradient_spreads() {
        let mut g = graph();
        let x = g.variable(Tensor::from_f64s(vec![1.0, 2.0, 3.0, 4.0]));
        let m = g.mean(x).unwrap();
        let grads = backward(&g, m.id, None).unwrap();
        assert_eq!(grads[&x.id].to_f64_vec().unwrap(), vec![0.25; 4]);
    }

    #[test]
    fn test_matmul_gradients() {
        let mut g = graph();
        let a = g.variable(
            g.backend()
                .reshape(
                    &Tensor::from_f64s(vec![1.0, 2.0, 3.0, 4.0]),
                    &difflux_core::shape::Shape::from([2, 2]),
                )
                .unwrap(),
        );
        let b = g.variable(
            g.backend()
                .reshape(
                    &Tensor::from_f64s(vec![1.0, 1.0]),
                    &difflux_core::shape::Shape::from([1, 2]),
                )
                .unwrap(),
        );
        let y = g.matmul(a, b).unwrap();
        let s = g.sum(y).unwrap();
        let grads = backward(&g, s.id, None).unwrap();
        // d sum(A b) / dA = ones^T outer b rows; each entry of A sees b.
        assert_eq!(grads[&a.id].to_f64_vec().unwrap(), vec![1.0, 1.0, 1.0, 1.0]);
        // d sum(A b) / db = column sums of A.
        assert_eq!(grads[&b.id].to_f64_vec().unwrap(), vec![4.0, 6.0]);
    }
}
