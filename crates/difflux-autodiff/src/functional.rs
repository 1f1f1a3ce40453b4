//! Function-level differentiation and user-defined gradients.

use crate::backward::backward;
use crate::graph::{Graph, Variable};
use crate::ops::Op;
use difflux_core::backend::Backend;
use difflux_core::error::{BackendError, Result};
use difflux_core::tensor::Tensor;
use std::fmt;
use std::sync::Arc;

/// A gradient function built from a scalar-valued computation.
///
/// The wrapped builder receives a fresh graph and one variable per input
/// and returns its outputs; the first output must be scalar and is the
/// value differentiated, further outputs are auxiliary results passed
/// through unchanged.
pub struct GradientFn<F> {
    f: F,
    wrt: Vec<usize>,
    get_output: bool,
}

impl<F> GradientFn<F>
where
    F: Fn(&mut Graph, &[Variable]) -> Result<Vec<Variable>>,
{
    /// Evaluates the function and its gradients.
    ///
    /// Returns `[loss, aux.., gradients..]` when constructed with
    /// `get_output`, otherwise just the gradients of the `wrt` inputs.
    pub fn evaluate(&self, backend: Arc<dyn Backend>, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let mut graph = Graph::new(backend);
        let variables: Vec<Variable> =
            inputs.iter().map(|t| graph.variable(t.clone())).collect();
        let outputs = (self.f)(&mut graph, &variables)?;
        let Some(loss) = outputs.first() else {
            return Err(BackendError::invalid_argument("gradient", "function returned no outputs"));
        };
        let loss_value = graph.value(loss.id)?;
        if loss_value.volume() != 1 {
            return Err(BackendError::dimension_mismatch(
                "scalar loss",
                loss_value.shape(),
            ));
        }

        let gradients = backward(&graph, loss.id, None)?;
        let mut results = Vec::new();
        if self.get_output {
            for output in &outputs {
                results.push(graph.value(output.id)?.clone());
            }
        }
        for &index in &self.wrt {
            let variable = variables.get(index).ok_or_else(|| {
                BackendError::invalid_argument(
                    "gradient",
                    format!("wrt index {index} for {} inputs", variables.len()),
                )
            })?;
            match gradients.get(&variable.id) {
                Some(g) => results.push(g.clone()),
                // Inputs the loss never touched get zero gradients.
                None => results.push(graph.backend().zeros_like(&inputs[index])?),
            }
        }
        Ok(results)
    }
}

/// Builds a gradient function differentiating `f` with respect to the
/// inputs named by `wrt`.
pub fn functional_gradient<F>(f: F, wrt: Vec<usize>, get_output: bool) -> GradientFn<F>
where
    F: Fn(&mut Graph, &[Variable]) -> Result<Vec<Variable>>,
{
    GradientFn { f, wrt, get_output }
}

type ForwardFn = dyn Fn(&dyn Backend, &[Tensor]) -> Result<Tensor> + Send + Sync;
type BackwardFn = dyn Fn(&dyn Backend, &[Tensor], &Tensor, &Tensor) -> Result<Vec<Tensor>> + Send + Sync;

/// An operation with a caller-supplied gradient.
///
/// The backward pass invokes the supplied closure instead of
/// differentiating through the forward computation, which is how
/// non-differentiable forwards (rounding, lookups) get useful surrogate
/// gradients.
#[derive(Clone)]
pub struct CustomGradient {
    name: String,
    forward: Arc<ForwardFn>,
    backward: Arc<BackwardFn>,
}

impl CustomGradient {
    /// Pairs a forward function with its gradient.
    pub fn new(
        name: impl Into<String>,
        forward: impl Fn(&dyn Backend, &[Tensor]) -> Result<Tensor> + Send + Sync + 'static,
        backward: impl Fn(&dyn Backend, &[Tensor], &Tensor, &Tensor) -> Result<Vec<Tensor>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            forward: Arc::new(forward),
            backward: Arc::new(backward),
        }
    }
}

/// Pairs a forward function with its gradient under a generic name.
pub fn custom_gradient(
    forward: impl Fn(&dyn Backend, &[Tensor]) -> Result<Tensor> + Send + Sync + 'static,
    backward: impl Fn(&dyn Backend, &[Tensor], &Tensor, &Tensor) -> Result<Vec<Tensor>> + Send + Sync + 'static,
) -> CustomGradient {
    CustomGradient::new("custom_gradient", forward, backward)
}

impl fmt::Debug for CustomGradient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomGradient").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Op for CustomGradient {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, backend: &dyn Backend, inputs: &[Tensor]) -> Result<Tensor> {
        (self.forward)(backend, inputs)
    }

    fn backward(
        &self,
        backend: &dyn Backend,
        inputs: &[Tensor],
        output: &Tensor,
        grad: &Tensor,
    ) -> Result<Vec<Tensor>> {
        (self.backward)(backend, inputs, output, grad)
    }
}

impl Graph {
    /// Records an operation with a caller-supplied gradient.
    pub fn custom(&mut self, op: CustomGradient, inputs: &[Variable]) -> Result<Variable> {
        self.apply(Box::new(op), inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use difflux_core::cpu::CpuBackend;

    fn cpu() -> Arc<dyn Backend> {
        Arc::new(CpuBackend::with_seed(0))
    }

    #[test]
    fn test_functional_gradient_of_square() {
        let grad_fn = functional_gradient(
            |g: &mut Graph, vars: &[Variable]| {
                let y = g.mul(vars[0], vars[0])?;
                Ok(vec![y])
            },
            vec![0],
            true,
        );
        let out = grad_fn.evaluate(cpu(), &[Tensor::scalar_from_f64(2.0)]).unwrap();
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0].scalar_f64().unwrap(), 4.0);
        assert_relative_eq!(out[1].scalar_f64().unwrap(), 4.0);
    }

    #[test]
    fn test_aux_outputs_pass_through() {
        let grad_fn = functional_gradient(
            |g: &mut Graph, vars: &[Variable]| {
                let doubled = g.add(vars[0], vars[0])?;
                let loss = g.sum(doubled)?;
                Ok(vec![loss, doubled])
            },
            vec![0],
            true,
        );
        let out = grad_fn.evaluate(cpu(), &[Tensor::from_f64s(vec![1.0, 2.0])]).unwrap();
        // [loss, aux, grad].
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[0].scalar_f64().unwrap(), 6.0);
        assert_eq!(out[1].to_f64_vec().unwrap(), vec![2.0, 4.0]);
        assert_eq!(out[2].to_f64_vec().unwrap(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_untouched_input_gets_zero_gradient() {
        let grad_fn = functional_gradient(
            |g: &mut Graph, vars: &[Variable]| Ok(vec![g.sum(vars[0])?]),
            vec![0, 1],
            false,
        );
        let out = grad_fn
            .evaluate(cpu(), &[Tensor::from_f64s(vec![1.0]), Tensor::from_f64s(vec![5.0, 6.0])])
            .unwrap();
        assert_eq!(out[0].to_f64_vec().unwrap(), vec![1.0]);
        assert_eq!(out[1].to_f64_vec().unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_nonscalar_loss_rejected() {
        let grad_fn = functional_gradient(
            |_: &mut Graph, vars: &[Variable]| Ok(vec![vars[0]]),
            vec![0],
            false,
        );
        let err = grad_fn.evaluate(cpu(), &[Tensor::from_f64s(vec![1.0, 2.0])]).unwrap_err();
        assert!(matches!(err, BackendError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_custom_gradient_overrides_backward() {
        // Straight-through rounding: forward rounds, backward passes the
        // gradient unchanged.
        let round = CustomGradient::new(
            "straight_through_round",
            |backend: &dyn Backend, inputs: &[Tensor]| backend.round(&inputs[0]),
            |_: &dyn Backend, _: &[Tensor], _: &Tensor, grad: &Tensor| Ok(vec![grad.clone()]),
        );
        let mut g = Graph::new(cpu());
        let x = g.variable(Tensor::from_f64s(vec![0.4, 1.6]));
        let r = g.custom(round, &[x]).unwrap();
        assert_eq!(g.value(r.id).unwrap().to_f64_vec().unwrap(), vec![0.0, 2.0]);
        let s = g.sum(r).unwrap();
        let grads = backward(&g, s.id, None).unwrap();
        assert_eq!(grads[&x.id].to_f64_vec().unwrap(), vec![1.0, 1.0]);
    }
}
