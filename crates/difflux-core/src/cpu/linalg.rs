//! Dense linear-algebra kernels of the CPU engine.

use crate::dtype::Kind;
use crate::error::{BackendError, Result};
use crate::shape::{combined_dim, Shape};
use crate::tensor::Tensor;
use nalgebra::{DMatrix, DVector};

use super::elementwise::float_tensor;

/// Applies a dense operator to a batch of vectors.
///
/// `a` is `[n, m]` (one operator for every batch element) or `[ab, n, m]`
/// (one operator per element, size-1 broadcast allowed); `b` is
/// `[batch, m]`. Returns `[combined_batch, n]`.
pub(crate) fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.dtype().kind == Kind::Complex || b.dtype().kind == Kind::Complex {
        return Err(BackendError::unsupported_type("matmul", "complex128"));
    }
    if b.rank() != 2 {
        return Err(BackendError::dimension_mismatch("[batch, m]", b.shape()));
    }
    let (a_batch, n, m) = match a.shape().dims() {
        [n, m] => (None, *n, *m),
        [ab, n, m] => (Some(*ab), *n, *m),
        _ => return Err(BackendError::dimension_mismatch("[n, m] or [batch, n, m]", a.shape())),
    };
    let b_dims = b.shape().dims();
    if b_dims[1] != m {
        return Err(BackendError::dimension_mismatch(format!("[batch, {m}]"), b.shape()));
    }
    let batch = combined_dim(a_batch.unwrap_or(1), b_dims[0])?;

    let va = a.to_f64_vec()?;
    let vb = b.to_f64_vec()?;
    let mats: Vec<DMatrix<f64>> = match a_batch {
        None => vec![DMatrix::from_row_slice(n, m, &va)],
        Some(ab) => (0..ab)
            .map(|k| DMatrix::from_row_slice(n, m, &va[k * n * m..(k + 1) * n * m]))
            .collect(),
    };

    let mut out = Vec::with_capacity(batch * n);
    for i in 0..batch {
        let mat = &mats[i.min(mats.len() - 1)];
        let row = i.min(b_dims[0] - 1);
        let x = DVector::from_column_slice(&vb[row * m..(row + 1) * m]);
        let y = mat * x;
        out.extend(y.iter().copied());
    }
    float_tensor(Shape::from([batch, n]), out)
}

/// General contraction of `a` and `b` over the named axis pairs.
pub(crate) fn tensordot(a: &Tensor, a_axes: &[usize], b: &Tensor, b_axes: &[usize]) -> Result<Tensor> {
    if a_axes.len() != b_axes.len() {
        return Err(BackendError::invalid_argument(
            "tensordot",
            format!("{} contraction axes against {}", a_axes.len(), b_axes.len()),
        ));
    }
    for (&ax, &bx) in a_axes.iter().zip(b_axes) {
        if a.shape().dim(ax)? != b.shape().dim(bx)? {
            return Err(BackendError::dimension_mismatch(
                format!("axis {ax} of {}", a.shape()),
                format!("axis {bx} of {}", b.shape()),
            ));
        }
    }
    let a_free: Vec<usize> = (0..a.rank()).filter(|ax| !a_axes.contains(ax)).collect();
    let b_free: Vec<usize> = (0..b.rank()).filter(|bx| !b_axes.contains(bx)).collect();
    let mut out_dims: Vec<usize> = a_free.iter().map(|&ax| a.shape().dims()[ax]).collect();
    out_dims.extend(b_free.iter().map(|&bx| b.shape().dims()[bx]));
    let out_shape = Shape::new(out_dims);

    let contracted: Vec<usize> = a_axes.iter().map(|&ax| a.shape().dims()[ax]).collect();
    let contracted_volume: usize = contracted.iter().product();

    let va = a.to_f64_vec()?;
    let vb = b.to_f64_vec()?;
    let a_strides = a.shape().strides();
    let b_strides = b.shape().strides();

    let mut out = vec![0.0; out_shape.volume()];
    let mut out_index = vec![0usize; out_shape.rank()];
    for slot in out.iter_mut() {
        let mut sum = 0.0;
        let mut k_index = vec![0usize; a_axes.len()];
        for _ in 0..contracted_volume.max(1) {
            let mut ia = 0;
            let mut ib = 0;
            for (pos, &ax) in a_free.iter().enumerate() {
                ia += out_index[pos] * a_strides[ax];
            }
            for (pos, &bx) in b_free.iter().enumerate() {
                ib += out_index[a_free.len() + pos] * b_strides[bx];
            }
            for (pos, &k) in k_index.iter().enumerate() {
                ia += k * a_strides[a_axes[pos]];
                ib += k * b_strides[b_axes[pos]];
            }
            sum += va[ia] * vb[ib];
            advance(&mut k_index, &contracted);
        }
        *slot = sum;
        let out_dims = out_shape.dims().to_vec();
        advance(&mut out_index, &out_dims);
    }
    float_tensor(out_shape, out)
}

fn advance(index: &mut [usize], dims: &[usize]) {
    for axis in (0..index.len()).rev() {
        index[axis] += 1;
        if index[axis] < dims[axis] {
            return;
        }
        index[axis] = 0;
    }
}

/// Einstein summation over one or two operands.
///
/// Supports explicit equations like `"ij,jk->ik"` and implicit output
/// (letters appearing exactly once, in alphabetical order). More than two
/// operands are not implemented.
pub(crate) fn einsum(equation: &str, operands: &[Tensor]) -> Result<Tensor> {
    let equation: String = equation.chars().filter(|c| !c.is_whitespace()).collect();
    let (lhs, explicit_out) = match equation.split_once("->") {
        Some((l, r)) => (l, Some(r)),
        None => (equation.as_str(), None),
    };
    let specs: Vec<&str> = lhs.split(',').collect();
    if specs.len() != operands.len() {
        return Err(BackendError::invalid_argument(
            "einsum",
            format!("{} operand specs for {} operands", specs.len(), operands.len()),
        ));
    }
    if operands.len() > 2 {
        return Err(BackendError::not_implemented("einsum with more than two operands"));
    }
    for t in operands {
        if t.dtype().kind == Kind::Complex {
            return Err(BackendError::unsupported_type("einsum", "complex128"));
        }
    }

    // Letter extents, validated for consistency.
    let mut extents: Vec<(char, usize)> = Vec::new();
    for (spec, t) in specs.iter().zip(operands) {
        if spec.len() != t.rank() {
            return Err(BackendError::dimension_mismatch(
                format!("rank {} for spec '{spec}'", spec.len()),
                t.shape().to_string(),
            ));
        }
        for (c, &d) in spec.chars().zip(t.shape().dims()) {
            if !c.is_ascii_alphabetic() {
                return Err(BackendError::invalid_argument("einsum", format!("bad index '{c}'")));
            }
            match extents.iter().find(|(e, _)| *e == c) {
                Some(&(_, prev)) if prev != d => {
                    return Err(BackendError::dimension_mismatch(
                        format!("extent {prev} for index '{c}'"),
                        d.to_string(),
                    ))
                }
                Some(_) => {}
                None => extents.push((c, d)),
            }
        }
    }

    let out_spec: Vec<char> = match explicit_out {
        Some(r) => r.chars().collect(),
        None => {
            let mut once: Vec<char> = extents
                .iter()
                .map(|&(c, _)| c)
                .filter(|&c| specs.iter().map(|s| s.matches(c).count()).sum::<usize>() == 1)
                .collect();
            once.sort_unstable();
            once
        }
    };
    for c in &out_spec {
        if !extents.iter().any(|(e, _)| e == c) {
            return Err(BackendError::invalid_argument("einsum", format!("unknown output index '{c}'")));
        }
    }
    let summed: Vec<char> =
        extents.iter().map(|&(c, _)| c).filter(|c| !out_spec.contains(c)).collect();

    let extent_of = |c: char| extents.iter().find(|(e, _)| *e == c).map(|&(_, d)| d).unwrap_or(1);
    let out_dims: Vec<usize> = out_spec.iter().map(|&c| extent_of(c)).collect();
    let out_shape = Shape::new(out_dims.clone());
    let summed_dims: Vec<usize> = summed.iter().map(|&c| extent_of(c)).collect();
    let summed_volume: usize = summed_dims.iter().product();

    let values: Vec<Vec<f64>> = operands.iter().map(Tensor::to_f64_vec).collect::<Result<_>>()?;
    let strides: Vec<Vec<usize>> = operands.iter().map(|t| t.shape().strides()).collect();

    let flat_index = |spec: &str, which: usize, out_index: &[usize], k_index: &[usize]| -> usize {
        spec.chars()
            .enumerate()
            .map(|(pos, c)| {
                let value = out_spec
                    .iter()
                    .position(|&o| o == c)
                    .map(|p| out_index[p])
                    .or_else(|| summed.iter().position(|&s| s == c).map(|p| k_index[p]))
                    .unwrap_or(0);
                value * strides[which][pos]
            })
            .sum()
    };

    let mut out = vec![0.0; out_shape.volume()];
    let mut out_index = vec![0usize; out_spec.len()];
    for slot in out.iter_mut() {
        let mut sum = 0.0;
        let mut k_index = vec![0usize; summed.len()];
        for _ in 0..summed_volume.max(1) {
            let mut term = 1.0;
            for (which, spec) in specs.iter().enumerate() {
                term *= values[which][flat_index(spec, which, &out_index, &k_index)];
            }
            sum += term;
            advance(&mut k_index, &summed_dims);
        }
        *slot = sum;
        advance(&mut out_index, &out_dims);
    }
    float_tensor(out_shape, out)
}
