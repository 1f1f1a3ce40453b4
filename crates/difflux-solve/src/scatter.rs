//! Scatter and gather policies over the backend primitives.
//!
//! Backends expose only the raw accumulating and overwriting scatter
//! primitives; the duplicate- and out-of-range handling policies are
//! composed here so that every engine shares one semantics.

use difflux_core::backend::Backend;
use difflux_core::error::{BackendError, Result};
use difflux_core::shape::{combined_dim, Shape};
use difflux_core::tensor::Tensor;

/// How colliding update rows combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatesHandling {
    /// Colliding rows sum into their cell.
    #[default]
    Add,
    /// Colliding rows average into their cell.
    Mean,
    /// One unspecified colliding row survives.
    Any,
    /// The caller guarantees no collisions; behavior on collision is
    /// unspecified.
    Undefined,
}

/// How out-of-range indices are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutsideHandling {
    /// Out-of-range indices clamp to the nearest valid cell.
    #[default]
    Clamp,
    /// Rows with out-of-range indices are dropped.
    Discard,
    /// The caller guarantees in-range indices; out-of-range behavior is
    /// unspecified (the CPU engine rejects them).
    Undefined,
}

/// Clamps each index column into the valid range of its cell axis.
fn clamp_indices(backend: &dyn Backend, cell_dims: &[usize], indices: &Tensor) -> Result<Tensor> {
    let [m, d] = indices.shape().dims() else {
        return Err(BackendError::dimension_mismatch("[m, d] indices", indices.shape()));
    };
    if *d != cell_dims.len() {
        return Err(BackendError::invalid_argument(
            "scatter",
            format!("{d} index components for {} cell axes", cell_dims.len()),
        ));
    }
    let mut columns = Vec::with_capacity(*d);
    for (axis, &extent) in cell_dims.iter().enumerate() {
        if extent == 0 {
            return Err(BackendError::invalid_argument(
                "clamp",
                format!("axis {axis} has extent 0, no cell to clamp to"),
            ));
        }
        let pick: Vec<bool> = (0..*d).map(|j| j == axis).collect();
        let column = backend.boolean_mask(indices, &Tensor::from_bools(pick), 1)?;
        columns.push(backend.clip(&column, 0.0, (extent - 1) as f64)?);
    }
    let clamped = backend.concat(&columns, 1)?;
    debug_assert_eq!(clamped.shape().dims(), [*m, *d]);
    Ok(clamped)
}

/// Boolean row mask of update rows whose indices are fully in range.
fn in_range_rows(backend: &dyn Backend, base: &Tensor, indices: &Tensor) -> Result<Tensor> {
    let clamped = clamp_indices(backend, &base.shape().dims()[..base.rank() - 1], indices)?;
    let unchanged = backend.equal(indices, &clamped)?;
    let all_in_range = backend.all_(&unchanged, Some(1), false)?;
    let m = indices.shape().dims()[0];
    backend.reshape(&all_in_range, &Shape::from([m]))
}

/// Applies `outside` handling, returning the effective index and update
/// rows.
fn apply_outside(
    backend: &dyn Backend,
    base: &Tensor,
    indices: &Tensor,
    updates: &Tensor,
    outside: OutsideHandling,
) -> Result<(Tensor, Tensor)> {
    match outside {
        OutsideHandling::Clamp => Ok((
            clamp_indices(backend, &base.shape().dims()[..base.rank() - 1], indices)?,
            updates.clone(),
        )),
        OutsideHandling::Discard => {
            let keep = in_range_rows(backend, base, indices)?;
            Ok((
                backend.boolean_mask(indices, &keep, 0)?,
                backend.boolean_mask(updates, &keep, 0)?,
            ))
        }
        OutsideHandling::Undefined => Ok((indices.clone(), updates.clone())),
    }
}

/// Scatters batched updates into a fresh zero grid under the given
/// policies.
///
/// `indices` is `[batch, m, d]` with one column per cell axis, `values`
/// is `[batch, m, c]`; both batch sizes combine under the
/// combined-batch-size rule. Returns `[combined_batch, *cells, c]`.
pub fn scatter(
    backend: &dyn Backend,
    indices: &Tensor,
    values: &Tensor,
    cells: &[usize],
    duplicates: DuplicatesHandling,
    outside: OutsideHandling,
) -> Result<Tensor> {
    let [ib, m, d] = indices.shape().dims() else {
        return Err(BackendError::dimension_mismatch("[batch, m, d] indices", indices.shape()));
    };
    let [vb, vm, c] = values.shape().dims() else {
        return Err(BackendError::dimension_mismatch("[batch, m, c] values", values.shape()));
    };
    if vm != m {
        return Err(BackendError::dimension_mismatch(
            format!("[batch, {m}, c] values"),
            values.shape(),
        ));
    }
    let batch = combined_dim(*ib, *vb)?;

    let mut grid_dims = cells.to_vec();
    grid_dims.push(*c);
    let base_dtype = values.dtype();
    let per_batch: Vec<Tensor> = (0..batch)
        .map(|i| {
            let base = backend.zeros(&Shape::new(grid_dims.clone()), Some(base_dtype))?;
            let ii = backend.gather(indices, &Tensor::from_i64s(vec![i.min(ib - 1) as i64]))?;
            let ii = backend.reshape(&ii, &Shape::from([*m, *d]))?;
            let vi = backend.gather(values, &Tensor::from_i64s(vec![i.min(vb - 1) as i64]))?;
            let vi = backend.reshape(&vi, &Shape::from([*m, *c]))?;
            scatter_into(backend, &base, &ii, &vi, duplicates, outside)
        })
        .collect::<Result<_>>()?;
    backend.stack(&per_batch, 0)
}

/// Scatters `updates` into an existing `base` under the given policies.
///
/// `base` is `[*cells, channels]`, `indices` is `[m, d]` with one column
/// per cell axis, `updates` is `[m, channels]`.
pub fn scatter_into(
    backend: &dyn Backend,
    base: &Tensor,
    indices: &Tensor,
    updates: &Tensor,
    duplicates: DuplicatesHandling,
    outside: OutsideHandling,
) -> Result<Tensor> {
    let (indices, updates) = apply_outside(backend, base, indices, updates, outside)?;
    match duplicates {
        DuplicatesHandling::Add => backend.scatter_add(base, &indices, &updates),
        DuplicatesHandling::Any | DuplicatesHandling::Undefined => {
            backend.scatter_write(base, &indices, &updates)
        }
        DuplicatesHandling::Mean => {
            let zeros = backend.zeros_like(base)?;
            let sums = backend.scatter_add(&zeros, &indices, &updates)?;
            let ones = backend.ones(updates.shape(), Some(updates.dtype()))?;
            let counts = backend.scatter_add(&zeros, &indices, &ones)?;
            let divisor = backend.maximum(&counts, &Tensor::scalar_from_f64(1.0))?;
            let means = backend.div(&sums, &divisor)?;
            // Untouched cells keep their base value.
            let untouched = backend.equal(&counts, &Tensor::scalar_from_f64(0.0))?;
            backend.where_(&untouched, base, &means)
        }
    }
}

/// Gathers rows of `values` along axis 0 under the given out-of-range
/// policy.
pub fn gather(
    backend: &dyn Backend,
    values: &Tensor,
    indices: &Tensor,
    outside: OutsideHandling,
) -> Result<Tensor> {
    match outside {
        OutsideHandling::Clamp => {
            let extent = values.shape().dim(0)?;
            if extent == 0 {
                return Err(BackendError::invalid_argument(
                    "gather",
                    "cannot clamp into an empty axis",
                ));
            }
            let clamped = backend.clip(indices, 0.0, (extent - 1) as f64)?;
            backend.gather(values, &clamped)
        }
        OutsideHandling::Discard => {
            if indices.rank() != 1 {
                return Err(BackendError::dimension_mismatch("1-D indices", indices.shape()));
            }
            let extent = values.shape().dim(0)?;
            if extent == 0 {
                // Every index is out of range, all rows drop.
                return backend.gather(values, &Tensor::from_i64s(Vec::new()));
            }
            let clamped = backend.clip(indices, 0.0, (extent - 1) as f64)?;
            let keep = backend.equal(indices, &clamped)?;
            let kept = backend.boolean_mask(indices, &keep, 0)?;
            backend.gather(values, &kept)
        }
        OutsideHandling::Undefined => backend.gather(values, indices),
    }
}

/// Batched multi-dimensional gather.
///
/// `values` is `[batch, *cells, channels]`, `indices` is
/// `[batch, m, d]` with one column per cell axis; both batch sizes
/// combine under the combined-batch-size rule. Out-of-range index
/// components clamp to their axis. Returns `[batch, m, channels]`.
pub fn batched_gather_nd(backend: &dyn Backend, values: &Tensor, indices: &Tensor) -> Result<Tensor> {
    if values.rank() < 3 {
        return Err(BackendError::dimension_mismatch("[batch, *cells, channels]", values.shape()));
    }
    let [ib, m, d] = indices.shape().dims() else {
        return Err(BackendError::dimension_mismatch("[batch, m, d] indices", indices.shape()));
    };
    let cell_dims = values.shape().dims()[1..values.rank() - 1].to_vec();
    if *d != cell_dims.len() {
        return Err(BackendError::invalid_argument(
            "batched_gather_nd",
            format!("{d} index components for {} cell axes", cell_dims.len()),
        ));
    }
    let vb = values.shape().dims()[0];
    let channels = values.shape().dims()[values.rank() - 1];
    let batch = combined_dim(vb, *ib)?;

    let cells: usize = cell_dims.iter().product();
    let strides = Shape::new(cell_dims.clone()).strides();
    let stride_row = backend.reshape(
        &Tensor::from_i64s(strides.iter().map(|&s| s as i64).collect()),
        &Shape::from([1, *d]),
    )?;

    let mut per_batch = Vec::with_capacity(batch);
    for i in 0..batch {
        // Select and flatten this batch element's cells.
        let vi = backend.gather(values, &Tensor::from_i64s(vec![i.min(vb - 1) as i64]))?;
        let vi = backend.reshape(&vi, &Shape::from([cells, channels]))?;

        // Clamp each index column into its axis, then flatten to cell ids.
        let ii = backend.gather(indices, &Tensor::from_i64s(vec![i.min(ib - 1) as i64]))?;
        let ii = backend.reshape(&ii, &Shape::from([*m, *d]))?;
        let ii = clamp_indices(backend, &cell_dims, &ii)?;
        let scaled = backend.mul(&ii, &backend.tile(&stride_row, &[*m, 1])?)?;
        let flat = backend.sum(&scaled, Some(1), false)?;

        per_batch.push(backend.gather(&vi, &flat)?);
    }
    backend.stack(&per_batch, 0)
}
