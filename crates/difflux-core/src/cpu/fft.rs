//! Fourier-transform kernels of the CPU engine, built on `rustfft`.
//!
//! Transforms act on the spatial axes of a `[batch, *spatial, channels]`
//! tensor; the leading batch axis and the trailing channel axis are left
//! untouched.

use crate::dtype::Kind;
use crate::error::{BackendError, Result};
use crate::tensor::{Tensor, TensorData};
use num_complex::Complex64;
use rustfft::FftPlanner;

use super::elementwise::float_tensor;

/// The spatial axes of a `[batch, *spatial, channels]` tensor.
fn spatial_axes(x: &Tensor) -> Result<std::ops::RangeInclusive<usize>> {
    if x.rank() < 3 {
        return Err(BackendError::dimension_mismatch(
            "[batch, *spatial, channels] with at least one spatial axis",
            x.shape(),
        ));
    }
    Ok(1..=x.rank() - 2)
}

/// Runs the planned transform along one axis of a dense complex buffer.
fn transform_axis(
    planner: &mut FftPlanner<f64>,
    data: &mut [Complex64],
    dims: &[usize],
    axis: usize,
    inverse: bool,
) {
    let len = dims[axis];
    if len <= 1 {
        return;
    }
    let outer: usize = dims[..axis].iter().product();
    let inner: usize = dims[axis + 1..].iter().product();
    let fft = if inverse { planner.plan_fft_inverse(len) } else { planner.plan_fft_forward(len) };
    let mut line = vec![Complex64::new(0.0, 0.0); len];
    for o in 0..outer {
        for i in 0..inner {
            for (k, slot) in line.iter_mut().enumerate() {
                *slot = data[(o * len + k) * inner + i];
            }
            fft.process(&mut line);
            for (k, &value) in line.iter().enumerate() {
                data[(o * len + k) * inner + i] = value;
            }
        }
    }
}

pub(crate) fn fft(x: &Tensor) -> Result<Tensor> {
    let axes = spatial_axes(x)?;
    let mut data = x.to_c128_vec()?;
    let dims = x.shape().dims().to_vec();
    let mut planner = FftPlanner::new();
    for axis in axes {
        transform_axis(&mut planner, &mut data, &dims, axis, false);
    }
    Tensor::new(x.shape().clone(), TensorData::C128(data))
}

pub(crate) fn ifft(k: &Tensor) -> Result<Tensor> {
    if k.dtype().kind != Kind::Complex {
        return Err(BackendError::unsupported_type("ifft", k.dtype().to_string()));
    }
    let axes = spatial_axes(k)?;
    let mut data = k.to_c128_vec()?;
    let dims = k.shape().dims().to_vec();
    let mut planner = FftPlanner::new();
    let mut scale = 1.0;
    for axis in axes {
        transform_axis(&mut planner, &mut data, &dims, axis, true);
        scale /= dims[axis] as f64;
    }
    // rustfft leaves the inverse unnormalized.
    for value in &mut data {
        *value *= scale;
    }
    Tensor::new(k.shape().clone(), TensorData::C128(data))
}

pub(crate) fn real(x: &Tensor) -> Result<Tensor> {
    match x.data() {
        TensorData::C128(v) => float_tensor(x.shape().clone(), v.iter().map(|e| e.re).collect()),
        _ => float_tensor(x.shape().clone(), x.to_f64_vec()?),
    }
}

pub(crate) fn imag(x: &Tensor) -> Result<Tensor> {
    match x.data() {
        TensorData::C128(v) => float_tensor(x.shape().clone(), v.iter().map(|e| e.im).collect()),
        _ => float_tensor(x.shape().clone(), vec![0.0; x.volume()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use approx::assert_relative_eq;

    fn field(values: Vec<f64>) -> Tensor {
        let n = values.len();
        Tensor::new(Shape::from([1, n, 1]), TensorData::F64(values)).unwrap()
    }

    #[test]
    fn test_fft_of_constant_is_impulse() {
        let out = fft(&field(vec![1.0, 1.0, 1.0, 1.0])).unwrap();
        let v = out.to_c128_vec().unwrap();
        assert_relative_eq!(v[0].re, 4.0, epsilon = 1e-12);
        for value in &v[1..] {
            assert_relative_eq!(value.norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ifft_inverts_fft() {
        let original = vec![1.0, -2.0, 3.5, 0.25];
        let k = fft(&field(original.clone())).unwrap();
        let back = ifft(&k).unwrap();
        let re = real(&back).unwrap().to_f64_vec().unwrap();
        for (a, b) in re.iter().zip(&original) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        let im = imag(&back).unwrap().to_f64_vec().unwrap();
        for value in im {
            assert_relative_eq!(value, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fft_preserves_batch_and_channel_axes() {
        let t = Tensor::new(
            Shape::from([2, 2, 2, 1]),
            TensorData::F64((0..8).map(f64::from).collect()),
        )
        .unwrap();
        let out = fft(&t).unwrap();
        assert_eq!(out.shape(), t.shape());
    }

    #[test]
    fn test_ifft_requires_complex() {
        assert!(ifft(&field(vec![1.0, 2.0])).is_err());
    }

    #[test]
    fn test_fft_rejects_missing_spatial_axis() {
        let flat = Tensor::from_f64s(vec![1.0, 2.0]);
        assert!(fft(&flat).is_err());
    }
}
