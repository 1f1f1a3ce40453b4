//! Shape-manipulation kernels of the CPU engine.
//!
//! Everything here reduces to one shared primitive: computing, for each
//! element of the output, the flat source index it is read from
//! ([`TensorData::take`]).

use crate::backend::PadMode;
use crate::dtype::DType;
use crate::error::{BackendError, Result};
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorData};
use num_complex::Complex64;

/// Iterates all multi-indices of `shape` in row-major order, mapping each
/// to a flat source index.
fn map_indices(shape: &Shape, f: impl Fn(&[usize]) -> usize) -> Vec<usize> {
    let volume = shape.volume();
    let mut out = Vec::with_capacity(volume);
    let mut index = vec![0usize; shape.rank()];
    for _ in 0..volume {
        out.push(f(&index));
        for axis in (0..shape.rank()).rev() {
            index[axis] += 1;
            if index[axis] < shape.dims()[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}

pub(crate) fn reshape(x: &Tensor, shape: &Shape) -> Result<Tensor> {
    if shape.volume() != x.volume() {
        return Err(BackendError::dimension_mismatch(
            format!("volume {}", x.volume()),
            format!("shape {shape} with volume {}", shape.volume()),
        ));
    }
    Tensor::new(shape.clone(), x.data().clone())
}

pub(crate) fn transpose(x: &Tensor, axes: &[usize]) -> Result<Tensor> {
    let rank = x.rank();
    let mut seen = vec![false; rank];
    if axes.len() != rank || axes.iter().any(|&a| a >= rank || std::mem::replace(&mut seen[a], true)) {
        return Err(BackendError::invalid_argument(
            "transpose",
            format!("axes {axes:?} are not a permutation of 0..{rank}"),
        ));
    }
    let dims: Vec<usize> = axes.iter().map(|&a| x.shape().dims()[a]).collect();
    let out_shape = Shape::new(dims);
    let src_strides = x.shape().strides();
    let indices = map_indices(&out_shape, |idx| {
        idx.iter().enumerate().map(|(out_axis, &i)| i * src_strides[axes[out_axis]]).sum()
    });
    Ok(Tensor::new(out_shape, x.data().take(&indices)?).expect("volume preserved"))
}

pub(crate) fn expand_dims(x: &Tensor, axis: usize, number: usize) -> Result<Tensor> {
    if axis > x.rank() {
        return Err(BackendError::invalid_argument(
            "expand_dims",
            format!("axis {axis} out of range for rank {}", x.rank()),
        ));
    }
    let mut shape = x.shape().clone();
    for _ in 0..number {
        shape = shape.inserted(axis, 1);
    }
    Tensor::new(shape, x.data().clone())
}

pub(crate) fn concat(values: &[Tensor], axis: usize) -> Result<Tensor> {
    let first = values
        .first()
        .ok_or_else(|| BackendError::invalid_argument("concat", "no tensors given"))?;
    let rank = first.rank();
    if axis >= rank {
        return Err(BackendError::invalid_argument(
            "concat",
            format!("axis {axis} out of range for rank {rank}"),
        ));
    }
    let mut axis_total = 0;
    for v in values {
        if v.rank() != rank
            || v.shape().without(axis) != first.shape().without(axis)
        {
            return Err(BackendError::dimension_mismatch(first.shape(), v.shape()));
        }
        axis_total += v.shape().dims()[axis];
    }
    let out_shape = first.shape().replaced(axis, axis_total);

    // Combine all storages, then read blocks in output order.
    let datas: Vec<&TensorData> = values.iter().map(Tensor::data).collect();
    let combined = TensorData::concat(&datas)?;
    let mut offsets = Vec::with_capacity(values.len());
    let mut running = 0;
    for v in values {
        offsets.push(running);
        running += v.volume();
    }

    let outer: usize = first.shape().dims()[..axis].iter().product();
    let inner: usize = first.shape().dims()[axis + 1..].iter().product();
    let mut indices = Vec::with_capacity(out_shape.volume());
    for o in 0..outer {
        for (t, v) in values.iter().enumerate() {
            let len = v.shape().dims()[axis];
            let base = offsets[t] + o * len * inner;
            indices.extend(base..base + len * inner);
        }
    }
    Ok(Tensor::new(out_shape, combined.take(&indices)?).expect("volume preserved"))
}

pub(crate) fn stack(values: &[Tensor], axis: usize) -> Result<Tensor> {
    let first = values
        .first()
        .ok_or_else(|| BackendError::invalid_argument("stack", "no tensors given"))?;
    if axis > first.rank() {
        return Err(BackendError::invalid_argument(
            "stack",
            format!("axis {axis} out of range for rank {}", first.rank()),
        ));
    }
    let expanded: Vec<Tensor> = values
        .iter()
        .map(|v| {
            if v.shape() != first.shape() {
                Err(BackendError::dimension_mismatch(first.shape(), v.shape()))
            } else {
                expand_dims(v, axis, 1)
            }
        })
        .collect::<Result<_>>()?;
    concat(&expanded, axis)
}

pub(crate) fn tile(x: &Tensor, multiples: &[usize]) -> Result<Tensor> {
    if multiples.len() != x.rank() {
        return Err(BackendError::invalid_argument(
            "tile",
            format!("{} multiples for rank {}", multiples.len(), x.rank()),
        ));
    }
    let dims: Vec<usize> =
        x.shape().dims().iter().zip(multiples).map(|(&d, &m)| d * m).collect();
    let out_shape = Shape::new(dims);
    let src_strides = x.shape().strides();
    let src_dims = x.shape().dims().to_vec();
    let indices = map_indices(&out_shape, |idx| {
        idx.iter().enumerate().map(|(axis, &i)| (i % src_dims[axis]) * src_strides[axis]).sum()
    });
    Ok(Tensor::new(out_shape, x.data().take(&indices)?).expect("volume preserved"))
}

/// One-element storage holding `value` at the given dtype.
fn fill_element(dtype: DType, value: f64) -> Result<TensorData> {
    Ok(match dtype {
        DType::BOOL => TensorData::Bool(vec![value != 0.0]),
        DType::INT32 => TensorData::I32(vec![value as i32]),
        DType::INT64 => TensorData::I64(vec![value as i64]),
        DType::FLOAT32 => TensorData::F32(vec![value as f32]),
        DType::FLOAT64 => TensorData::F64(vec![value]),
        DType::COMPLEX128 => TensorData::C128(vec![Complex64::new(value, 0.0)]),
        other => return Err(BackendError::unsupported_type("pad", other.to_string())),
    })
}

/// Source position on one axis for an out-of-range offset `rel`, or
/// `None` for the constant fill.
fn pad_source(mode: PadMode, rel: i64, len: i64) -> Option<i64> {
    match mode {
        PadMode::Constant(_) => None,
        PadMode::Periodic => Some(rel.rem_euclid(len)),
        PadMode::Boundary => Some(rel.clamp(0, len - 1)),
        PadMode::Reflect if len == 1 => Some(0),
        PadMode::Reflect => {
            let j = rel.rem_euclid(2 * len - 2);
            Some(if j < len { j } else { 2 * len - 2 - j })
        }
        PadMode::Symmetric => {
            let j = rel.rem_euclid(2 * len);
            Some(if j < len { j } else { 2 * len - 1 - j })
        }
    }
}

pub(crate) fn pad(x: &Tensor, widths: &[(usize, usize)], mode: PadMode) -> Result<Tensor> {
    if widths.len() != x.rank() {
        return Err(BackendError::invalid_argument(
            "pad",
            format!("{} width pairs for rank {}", widths.len(), x.rank()),
        ));
    }
    let dims = x.shape().dims();
    if !matches!(mode, PadMode::Constant(_)) {
        for (axis, (&d, &(lo, hi))) in dims.iter().zip(widths).enumerate() {
            if d == 0 && lo + hi > 0 {
                return Err(BackendError::invalid_argument(
                    "pad",
                    format!("axis {axis} is empty, no edge values to extend"),
                ));
            }
        }
    }
    let out_shape = Shape::new(
        dims.iter().zip(widths).map(|(&d, &(lo, hi))| lo + d + hi).collect::<Vec<_>>(),
    );
    let strides = x.shape().strides();
    let sentinel = x.volume();

    // Flat source index per output element; the sentinel reads the
    // appended constant.
    let indices = map_indices(&out_shape, |idx| {
        let mut flat = 0;
        for (axis, &i) in idx.iter().enumerate() {
            let len = dims[axis] as i64;
            let rel = i as i64 - widths[axis].0 as i64;
            let src = if rel >= 0 && rel < len { Some(rel) } else { pad_source(mode, rel, len) };
            match src {
                Some(s) => flat += s as usize * strides[axis],
                None => return sentinel,
            }
        }
        flat
    });
    let data = if indices.contains(&sentinel) {
        let PadMode::Constant(value) = mode else { unreachable!() };
        let fill = fill_element(x.dtype(), value)?;
        TensorData::concat(&[x.data(), &fill])?.take(&indices)?
    } else {
        x.data().take(&indices)?
    };
    Tensor::new(out_shape, data)
}

pub(crate) fn meshgrid(coordinates: &[Tensor]) -> Result<Vec<Tensor>> {
    if coordinates.is_empty() {
        return Err(BackendError::invalid_argument("meshgrid", "no coordinate vectors given"));
    }
    if let Some(bad) = coordinates.iter().find(|c| c.rank() != 1) {
        return Err(BackendError::dimension_mismatch("1-D coordinate vectors", bad.shape()));
    }
    let out_shape = Shape::new(coordinates.iter().map(|c| c.shape().dims()[0]).collect::<Vec<_>>());
    coordinates
        .iter()
        .enumerate()
        .map(|(axis, c)| {
            let indices = map_indices(&out_shape, |idx| idx[axis]);
            Tensor::new(out_shape.clone(), c.data().take(&indices)?)
        })
        .collect()
}

pub(crate) fn boolean_mask(x: &Tensor, mask: &Tensor, axis: usize) -> Result<Tensor> {
    let TensorData::Bool(flags) = mask.data() else {
        return Err(BackendError::unsupported_type("boolean_mask", mask.dtype().to_string()));
    };
    if axis >= x.rank() || mask.rank() != 1 || flags.len() != x.shape().dims()[axis] {
        return Err(BackendError::dimension_mismatch(
            format!("1-D mask of length {}", x.shape().dim(axis).map_or(0, |d| d)),
            mask.shape().to_string(),
        ));
    }
    let selected: Vec<usize> =
        flags.iter().enumerate().filter_map(|(i, &f)| f.then_some(i)).collect();
    let out_shape = x.shape().replaced(axis, selected.len());
    let src_strides = x.shape().strides();
    let indices = map_indices(&out_shape, |idx| {
        idx.iter()
            .enumerate()
            .map(|(a, &i)| if a == axis { selected[i] * src_strides[a] } else { i * src_strides[a] })
            .sum()
    });
    Ok(Tensor::new(out_shape, x.data().take(&indices)?).expect("volume preserved"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> Tensor {
        Tensor::new(
            Shape::from([2, 3]),
            TensorData::F64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_transpose() {
        let out = transpose(&matrix(), &[1, 0]).unwrap();
        assert_eq!(out.shape().dims(), &[3, 2]);
        assert_eq!(out.to_f64_vec().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_rejects_bad_axes() {
        assert!(transpose(&matrix(), &[0, 0]).is_err());
        assert!(transpose(&matrix(), &[0]).is_err());
    }

    #[test]
    fn test_stack_axis0() {
        let a = Tensor::from_f64s(vec![1.0, 2.0]);
        let b = Tensor::from_f64s(vec![3.0, 4.0]);
        let out = stack(&[a, b], 0).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2]);
        assert_eq!(out.to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_concat_axis1() {
        let out = concat(&[matrix(), matrix()], 1).unwrap();
        assert_eq!(out.shape().dims(), &[2, 6]);
        assert_eq!(
            out.to_f64_vec().unwrap(),
            vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_tile() {
        let t = Tensor::from_f64s(vec![1.0, 2.0]);
        let out = tile(&t, &[3]).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_boolean_mask_axis0() {
        let mask = Tensor::from_bools(vec![true, false]);
        let out = boolean_mask(&matrix(), &mask, 0).unwrap();
        assert_eq!(out.shape().dims(), &[1, 3]);
        assert_eq!(out.to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pad_constant() {
        let t = Tensor::from_f64s(vec![1.0, 2.0]);
        let out = pad(&t, &[(1, 2)], PadMode::Constant(9.0)).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![9.0, 1.0, 2.0, 9.0, 9.0]);
    }

    #[test]
    fn test_pad_constant_keeps_int_dtype() {
        let t = Tensor::from_i64s(vec![5]);
        let out = pad(&t, &[(1, 0)], PadMode::Constant(0.0)).unwrap();
        assert_eq!(out.to_i64_vec().unwrap(), vec![0, 5]);
    }

    #[test]
    fn test_pad_periodic_wraps() {
        let t = Tensor::from_f64s(vec![1.0, 2.0, 3.0]);
        let out = pad(&t, &[(2, 2)], PadMode::Periodic).unwrap();
        assert_eq!(out.to_f64_vec().unwrap(), vec![2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_pad_boundary_repeats_edges() {
        let t = Tensor::new(Shape::from([1, 2]), TensorData::F64(vec![1.0, 2.0])).unwrap();
        let out = pad(&t, &[(0, 0), (1, 1)], PadMode::Boundary).unwrap();
        assert_eq!(out.shape().dims(), &[1, 4]);
        assert_eq!(out.to_f64_vec().unwrap(), vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_pad_reflect_and_symmetric() {
        let t = Tensor::from_f64s(vec![1.0, 2.0, 3.0]);
        let reflected = pad(&t, &[(2, 0)], PadMode::Reflect).unwrap();
        assert_eq!(reflected.to_f64_vec().unwrap(), vec![3.0, 2.0, 1.0, 2.0, 3.0]);
        let mirrored = pad(&t, &[(2, 0)], PadMode::Symmetric).unwrap();
        assert_eq!(mirrored.to_f64_vec().unwrap(), vec![2.0, 1.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pad_rejects_extending_empty_axis() {
        let t = Tensor::new(Shape::from([0]), TensorData::F64(vec![])).unwrap();
        assert!(pad(&t, &[(1, 0)], PadMode::Periodic).is_err());
        let padded = pad(&t, &[(1, 0)], PadMode::Constant(7.0)).unwrap();
        assert_eq!(padded.to_f64_vec().unwrap(), vec![7.0]);
    }

    #[test]
    fn test_meshgrid_ij_indexing() {
        let x = Tensor::from_f64s(vec![1.0, 2.0]);
        let y = Tensor::from_f64s(vec![10.0, 20.0, 30.0]);
        let grids = meshgrid(&[x, y]).unwrap();
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[0].shape().dims(), &[2, 3]);
        assert_eq!(grids[0].to_f64_vec().unwrap(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        assert_eq!(grids[1].to_f64_vec().unwrap(), vec![10.0, 20.0, 30.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_meshgrid_rejects_matrix_input() {
        let m = matrix();
        assert!(meshgrid(&[m]).is_err());
    }

    #[test]
    fn test_reshape_preserves_volume() {
        let out = reshape(&matrix(), &Shape::from([3, 2])).unwrap();
        assert_eq!(out.shape().dims(), &[3, 2]);
        assert!(reshape(&matrix(), &Shape::from([4])).is_err());
    }
}
