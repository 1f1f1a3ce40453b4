//! Indexed read and write kernels of the CPU engine.

use crate::dtype::Kind;
use crate::error::{BackendError, Result};
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorData};

fn index_values(indices: &Tensor) -> Result<Vec<i64>> {
    if indices.dtype().kind != Kind::Int {
        return Err(BackendError::unsupported_type("gather", indices.dtype().to_string()));
    }
    indices.to_i64_vec()
}

/// Indexed read along axis 0. Out-of-range indices are an error.
pub(crate) fn gather(values: &Tensor, indices: &Tensor) -> Result<Tensor> {
    if values.rank() == 0 {
        return Err(BackendError::dimension_mismatch("rank >= 1", values.shape()));
    }
    let idx = index_values(indices)?;
    let extent = values.shape().dims()[0];
    let block: usize = values.shape().dims()[1..].iter().product();
    let mut flat = Vec::with_capacity(idx.len() * block);
    for &i in &idx {
        if i < 0 || i as usize >= extent {
            return Err(BackendError::index_out_of_bounds(i, extent));
        }
        let base = i as usize * block;
        flat.extend(base..base + block);
    }
    let mut dims = indices.shape().dims().to_vec();
    dims.extend_from_slice(&values.shape().dims()[1..]);
    Tensor::new(Shape::new(dims), values.data().take(&flat)?)
}

/// Row-major indices of the nonzero (or true) elements as an `[n, rank]`
/// integer tensor.
pub(crate) fn nonzero(values: &Tensor) -> Result<Tensor> {
    let hits: Vec<usize> = match values.data() {
        TensorData::Bool(v) => v.iter().enumerate().filter_map(|(i, &e)| e.then_some(i)).collect(),
        TensorData::I32(v) => {
            v.iter().enumerate().filter_map(|(i, &e)| (e != 0).then_some(i)).collect()
        }
        TensorData::I64(v) => {
            v.iter().enumerate().filter_map(|(i, &e)| (e != 0).then_some(i)).collect()
        }
        TensorData::F32(v) => {
            v.iter().enumerate().filter_map(|(i, &e)| (e != 0.0).then_some(i)).collect()
        }
        TensorData::F64(v) => {
            v.iter().enumerate().filter_map(|(i, &e)| (e != 0.0).then_some(i)).collect()
        }
        TensorData::C128(v) => {
            v.iter().enumerate().filter_map(|(i, e)| (e.norm_sqr() != 0.0).then_some(i)).collect()
        }
    };
    let rank = values.rank();
    let strides = values.shape().strides();
    let count = hits.len();
    let mut out = Vec::with_capacity(count * rank);
    for flat in hits {
        let mut rest = flat;
        for &stride in &strides {
            out.push((rest / stride) as i64);
            rest %= stride;
        }
    }
    Tensor::new(Shape::from([count, rank]), TensorData::I64(out))
}

/// Flat cell offsets of scatter targets.
///
/// `base` is `[*cells, channels]`; `indices` is `[m, d]` with one column
/// per cell axis. Returns the flat element offset of channel 0 of each
/// target cell.
fn scatter_offsets(op: &str, base: &Tensor, indices: &Tensor, updates: &Tensor) -> Result<Vec<usize>> {
    let cell_rank = base.rank().checked_sub(1).filter(|&r| r > 0).ok_or_else(|| {
        BackendError::dimension_mismatch("[*cells, channels] with rank >= 2", base.shape())
    })?;
    let channels = base.shape().dims()[cell_rank];
    let [m, d] = indices.shape().dims() else {
        return Err(BackendError::dimension_mismatch("[m, d] indices", indices.shape()));
    };
    if *d != cell_rank {
        return Err(BackendError::invalid_argument(
            op,
            format!("{d} index components for {cell_rank} cell axes"),
        ));
    }
    if updates.shape().dims() != [*m, channels] {
        return Err(BackendError::dimension_mismatch(
            format!("[{m}, {channels}] updates"),
            updates.shape(),
        ));
    }
    let strides = base.shape().strides();
    let idx = index_values(indices)?;
    let mut offsets = Vec::with_capacity(*m);
    for row in idx.chunks(*d) {
        let mut offset = 0;
        for (axis, &i) in row.iter().enumerate() {
            let extent = base.shape().dims()[axis];
            if i < 0 || i as usize >= extent {
                return Err(BackendError::index_out_of_bounds(i, extent));
            }
            offset += i as usize * strides[axis];
        }
        offsets.push(offset);
    }
    Ok(offsets)
}

/// Scatters update rows into `base`, either accumulating or overwriting.
fn scatter_impl(
    op: &str,
    base: &Tensor,
    indices: &Tensor,
    updates: &Tensor,
    accumulate: bool,
) -> Result<Tensor> {
    let offsets = scatter_offsets(op, base, indices, updates)?;
    let channels = base.shape().dims()[base.rank() - 1];
    let shape = base.shape().clone();
    match base.dtype().kind {
        Kind::Float => {
            let mut out = base.to_f64_vec()?;
            let upd = updates.to_f64_vec()?;
            for (row, &offset) in offsets.iter().enumerate() {
                for c in 0..channels {
                    let slot = &mut out[offset + c];
                    let value = upd[row * channels + c];
                    *slot = if accumulate { *slot + value } else { value };
                }
            }
            match base.data() {
                TensorData::F32(_) => Tensor::new(
                    shape,
                    TensorData::F32(out.into_iter().map(|e| e as f32).collect()),
                ),
                _ => Tensor::new(shape, TensorData::F64(out)),
            }
        }
        Kind::Int => {
            let mut out = base.to_i64_vec()?;
            let upd = updates.to_i64_vec()?;
            for (row, &offset) in offsets.iter().enumerate() {
                for c in 0..channels {
                    let slot = &mut out[offset + c];
                    let value = upd[row * channels + c];
                    *slot = if accumulate { slot.wrapping_add(value) } else { value };
                }
            }
            match base.data() {
                TensorData::I32(_) => Tensor::new(
                    shape,
                    TensorData::I32(out.into_iter().map(|e| e as i32).collect()),
                ),
                _ => Tensor::new(shape, TensorData::I64(out)),
            }
        }
        Kind::Complex => {
            let mut out = base.to_c128_vec()?;
            let upd = updates.to_c128_vec()?;
            for (row, &offset) in offsets.iter().enumerate() {
                for c in 0..channels {
                    let slot = &mut out[offset + c];
                    let value = upd[row * channels + c];
                    *slot = if accumulate { *slot + value } else { value };
                }
            }
            Tensor::new(shape, TensorData::C128(out))
        }
        Kind::Bool => Err(BackendError::unsupported_type(op, "bool")),
    }
}

pub(crate) fn scatter_add(base: &Tensor, indices: &Tensor, updates: &Tensor) -> Result<Tensor> {
    scatter_impl("scatter_add", base, indices, updates, true)
}

pub(crate) fn scatter_write(base: &Tensor, indices: &Tensor, updates: &Tensor) -> Result<Tensor> {
    scatter_impl("scatter_write", base, indices, updates, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    fn grid() -> Tensor {
        // 4 cells, 1 channel.
        Tensor::new(Shape::from([4, 1]), TensorData::F64(vec![0.0; 4])).unwrap()
    }

    fn rows(values: Vec<i64>, cols: usize) -> Tensor {
        let n = values.len() / cols;
        Tensor::new(Shape::from([n, cols]), TensorData::I64(values)).unwrap()
    }

    #[test]
    fn test_gather_repeats_and_reorders() {
        let v = Tensor::from_f64s(vec![10.0, 20.0, 30.0]);
        let idx = Tensor::from_i64s(vec![2, 0, 2]);
        let out = gather(&v, &idx).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![30.0, 10.0, 30.0]);
    }

    #[test]
    fn test_gather_keeps_trailing_axes() {
        let v = Tensor::new(
            Shape::from([2, 2]),
            TensorData::F64(vec![1.0, 2.0, 3.0, 4.0]),
        )
        .unwrap();
        let idx = Tensor::from_i64s(vec![1]);
        let out = gather(&v, &idx).unwrap();
        assert_eq!(out.shape().dims(), &[1, 2]);
        assert_eq!(out.to_f64_vec().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_gather_rejects_out_of_range() {
        let v = Tensor::from_f64s(vec![1.0, 2.0]);
        let err = gather(&v, &Tensor::from_i64s(vec![2])).unwrap_err();
        assert!(matches!(err, BackendError::IndexOutOfBounds { .. }));
        let err = gather(&v, &Tensor::from_i64s(vec![-1])).unwrap_err();
        assert!(matches!(err, BackendError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_nonzero_returns_row_major_indices() {
        let v = Tensor::new(
            Shape::from([2, 3]),
            TensorData::F64(vec![0.0, 1.5, 0.0, -2.0, 0.0, 3.0]),
        )
        .unwrap();
        let out = nonzero(&v).unwrap();
        assert_eq!(out.shape().dims(), &[3, 2]);
        assert_eq!(out.to_i64_vec().unwrap(), vec![0, 1, 1, 0, 1, 2]);
    }

    #[test]
    fn test_nonzero_on_bools_finds_true() {
        let v = Tensor::from_bools(vec![false, true, true]);
        let out = nonzero(&v).unwrap();
        assert_eq!(out.shape().dims(), &[2, 1]);
        assert_eq!(out.to_i64_vec().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_nonzero_of_zeros_is_empty() {
        let v = Tensor::from_i64s(vec![0, 0]);
        let out = nonzero(&v).unwrap();
        assert_eq!(out.shape().dims(), &[0, 1]);
    }

    #[test]
    fn test_scatter_add_accumulates_collisions() {
        let idx = rows(vec![1, 1, 3], 1);
        let upd = Tensor::new(Shape::from([3, 1]), TensorData::F64(vec![2.0, 5.0, 1.0])).unwrap();
        let out = scatter_add(&grid(), &idx, &upd).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![0.0, 7.0, 0.0, 1.0]);
    }

    #[test]
    fn test_scatter_write_overwrites() {
        let idx = rows(vec![0, 2], 1);
        let upd = Tensor::new(Shape::from([2, 1]), TensorData::F64(vec![9.0, 8.0])).unwrap();
        let base = Tensor::new(Shape::from([4, 1]), TensorData::F64(vec![1.0; 4])).unwrap();
        let out = scatter_write(&base, &idx, &upd).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![9.0, 1.0, 8.0, 1.0]);
    }

    #[test]
    fn test_scatter_add_two_cell_axes() {
        let base = Tensor::new(Shape::from([2, 2, 1]), TensorData::F64(vec![0.0; 4])).unwrap();
        let idx = rows(vec![0, 1, 1, 0], 2);
        let upd = Tensor::new(Shape::from([2, 1]), TensorData::F64(vec![3.0, 4.0])).unwrap();
        let out = scatter_add(&base, &idx, &upd).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![0.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn test_scatter_preserves_base_dtype() {
        let base = Tensor::new(Shape::from([2, 1]), TensorData::I64(vec![0, 0])).unwrap();
        let idx = rows(vec![0], 1);
        let upd = Tensor::new(Shape::from([1, 1]), TensorData::I64(vec![7])).unwrap();
        let out = scatter_add(&base, &idx, &upd).unwrap();
        assert_eq!(out.dtype(), DType::INT64);
        assert_eq!(out.to_i64_vec().unwrap(), vec![7, 0]);
    }

    #[test]
    fn test_scatter_rejects_out_of_range_cell() {
        let idx = rows(vec![4], 1);
        let upd = Tensor::new(Shape::from([1, 1]), TensorData::F64(vec![1.0])).unwrap();
        assert!(scatter_add(&grid(), &idx, &upd).is_err());
    }
}
