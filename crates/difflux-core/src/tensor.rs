//! The opaque tensor value type.
//!
//! A [`Tensor`] is an n-dimensional numeric array native to one concrete
//! engine. Its dtype and shape are stable for its lifetime; reshaping and
//! casting always produce a new tensor. Callers never observe in-place
//! mutation of a tensor that was returned to them.

use crate::dtype::DType;
use crate::error::{BackendError, Result};
use crate::shape::Shape;
use num_complex::Complex64;

/// Row-major element storage for one tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// Boolean elements.
    Bool(Vec<bool>),
    /// 32-bit signed integers.
    I32(Vec<i32>),
    /// 64-bit signed integers.
    I64(Vec<i64>),
    /// 32-bit floats.
    F32(Vec<f32>),
    /// 64-bit floats.
    F64(Vec<f64>),
    /// 128-bit complex numbers.
    C128(Vec<Complex64>),
}

impl TensorData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::C128(v) => v.len(),
        }
    }

    /// Whether the storage holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Bool(_) => DType::BOOL,
            TensorData::I32(_) => DType::INT32,
            TensorData::I64(_) => DType::INT64,
            TensorData::F32(_) => DType::FLOAT32,
            TensorData::F64(_) => DType::FLOAT64,
            TensorData::C128(_) => DType::COMPLEX128,
        }
    }

    /// All-zero storage of the given dtype and length.
    pub fn zeros(dtype: DType, len: usize) -> Result<Self> {
        Ok(match dtype {
            DType::BOOL => TensorData::Bool(vec![false; len]),
            DType::INT32 => TensorData::I32(vec![0; len]),
            DType::INT64 => TensorData::I64(vec![0; len]),
            DType::FLOAT32 => TensorData::F32(vec![0.0; len]),
            DType::FLOAT64 => TensorData::F64(vec![0.0; len]),
            DType::COMPLEX128 => TensorData::C128(vec![Complex64::new(0.0, 0.0); len]),
            other => return Err(BackendError::unsupported_type("zeros", other.to_string())),
        })
    }

    /// All-one storage of the given dtype and length.
    pub fn ones(dtype: DType, len: usize) -> Result<Self> {
        Ok(match dtype {
            DType::BOOL => TensorData::Bool(vec![true; len]),
            DType::INT32 => TensorData::I32(vec![1; len]),
            DType::INT64 => TensorData::I64(vec![1; len]),
            DType::FLOAT32 => TensorData::F32(vec![1.0; len]),
            DType::FLOAT64 => TensorData::F64(vec![1.0; len]),
            DType::COMPLEX128 => TensorData::C128(vec![Complex64::new(1.0, 0.0); len]),
            other => return Err(BackendError::unsupported_type("ones", other.to_string())),
        })
    }

    /// New storage built by taking flat element indices, in order.
    ///
    /// Index remapping is the shared engine primitive behind transpose,
    /// tile, stack, gather and masking; every index is bounds-checked.
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        let len = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(BackendError::index_out_of_bounds(bad as i64, len));
        }
        Ok(match self {
            TensorData::Bool(v) => TensorData::Bool(indices.iter().map(|&i| v[i]).collect()),
            TensorData::I32(v) => TensorData::I32(indices.iter().map(|&i| v[i]).collect()),
            TensorData::I64(v) => TensorData::I64(indices.iter().map(|&i| v[i]).collect()),
            TensorData::F32(v) => TensorData::F32(indices.iter().map(|&i| v[i]).collect()),
            TensorData::F64(v) => TensorData::F64(indices.iter().map(|&i| v[i]).collect()),
            TensorData::C128(v) => TensorData::C128(indices.iter().map(|&i| v[i]).collect()),
        })
    }

    /// Concatenates storages of identical dtype.
    pub fn concat(pieces: &[&TensorData]) -> Result<Self> {
        let first = pieces
            .first()
            .ok_or_else(|| BackendError::invalid_argument("concat", "no tensors given"))?;
        let dtype = first.dtype();
        if let Some(other) = pieces.iter().find(|p| p.dtype() != dtype) {
            return Err(BackendError::dimension_mismatch(dtype, other.dtype()));
        }
        macro_rules! join {
            ($variant:ident) => {{
                let mut out = Vec::new();
                for p in pieces {
                    if let TensorData::$variant(v) = p {
                        out.extend_from_slice(v);
                    }
                }
                TensorData::$variant(out)
            }};
        }
        Ok(match first {
            TensorData::Bool(_) => join!(Bool),
            TensorData::I32(_) => join!(I32),
            TensorData::I64(_) => join!(I64),
            TensorData::F32(_) => join!(F32),
            TensorData::F64(_) => join!(F64),
            TensorData::C128(_) => join!(C128),
        })
    }
}

/// An n-dimensional numeric array with a fixed shape and dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: TensorData,
}

impl Tensor {
    /// Creates a tensor from storage and a shape.
    ///
    /// Fails when the storage length does not match the shape volume.
    pub fn new(shape: Shape, data: TensorData) -> Result<Self> {
        if shape.volume() != data.len() {
            return Err(BackendError::dimension_mismatch(
                format!("{} elements for shape {shape}", shape.volume()),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Self { shape, data })
    }

    /// Creates a rank-0 float tensor.
    pub fn scalar_from_f64(value: f64) -> Self {
        Self {
            shape: Shape::scalar(),
            data: TensorData::F64(vec![value]),
        }
    }

    /// Creates a rank-0 integer tensor.
    pub fn scalar_from_i64(value: i64) -> Self {
        Self {
            shape: Shape::scalar(),
            data: TensorData::I64(vec![value]),
        }
    }

    /// Creates a 1-D float tensor.
    pub fn from_f64s(values: Vec<f64>) -> Self {
        let shape = Shape::from(vec![values.len()]);
        Self {
            shape,
            data: TensorData::F64(values),
        }
    }

    /// Creates a 1-D integer tensor.
    pub fn from_i64s(values: Vec<i64>) -> Self {
        let shape = Shape::from(vec![values.len()]);
        Self {
            shape,
            data: TensorData::I64(values),
        }
    }

    /// Creates a 1-D boolean tensor.
    pub fn from_bools(values: Vec<bool>) -> Self {
        let shape = Shape::from(vec![values.len()]);
        Self {
            shape,
            data: TensorData::Bool(values),
        }
    }

    /// Shape of this tensor.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Total number of elements.
    pub fn volume(&self) -> usize {
        self.shape.volume()
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Underlying storage.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Consumes the tensor, returning its storage.
    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Reads all elements back as f64 values.
    ///
    /// Booleans become 0/1; complex tensors are rejected.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        Ok(match &self.data {
            TensorData::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            TensorData::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorData::F64(v) => v.clone(),
            TensorData::C128(_) => {
                return Err(BackendError::unsupported_type("to_f64_vec", "complex128"))
            }
        })
    }

    /// Reads all elements back as i64 values; floats are rejected.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        Ok(match &self.data {
            TensorData::Bool(v) => v.iter().map(|&b| i64::from(b)).collect(),
            TensorData::I32(v) => v.iter().map(|&x| i64::from(x)).collect(),
            TensorData::I64(v) => v.clone(),
            other => {
                return Err(BackendError::unsupported_type("to_i64_vec", other.dtype().to_string()))
            }
        })
    }

    /// Reads all elements back as complex values.
    pub fn to_c128_vec(&self) -> Result<Vec<Complex64>> {
        match &self.data {
            TensorData::C128(v) => Ok(v.clone()),
            _ => Ok(self
                .to_f64_vec()?
                .into_iter()
                .map(|x| Complex64::new(x, 0.0))
                .collect()),
        }
    }

    /// Reads a single-element tensor back as f64.
    pub fn scalar_f64(&self) -> Result<f64> {
        if self.volume() != 1 {
            return Err(BackendError::dimension_mismatch("1 element", self.shape().to_string()));
        }
        Ok(self.to_f64_vec()?[0])
    }

    /// Reads a single-element tensor back as i64.
    pub fn scalar_i64(&self) -> Result<i64> {
        if self.volume() != 1 {
            return Err(BackendError::dimension_mismatch("1 element", self.shape().to_string()));
        }
        Ok(self.to_i64_vec()?[0])
    }

    /// Reads a single-element boolean tensor.
    pub fn scalar_bool(&self) -> Result<bool> {
        match &self.data {
            TensorData::Bool(v) if v.len() == 1 => Ok(v[0]),
            _ => Err(BackendError::unsupported_type("scalar_bool", self.dtype().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_volume_validation() {
        let data = TensorData::F64(vec![1.0, 2.0, 3.0]);
        assert!(Tensor::new(Shape::from([2, 2]), data.clone()).is_err());
        let t = Tensor::new(Shape::from([3]), data).unwrap();
        assert_eq!(t.dtype(), DType::FLOAT64);
        assert_eq!(t.volume(), 3);
    }

    #[test]
    fn test_take_bounds_check() {
        let data = TensorData::I64(vec![10, 20, 30]);
        assert!(data.take(&[0, 2, 1]).is_ok());
        let err = data.take(&[3]).unwrap_err();
        assert!(matches!(err, BackendError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_concat_dtype_mismatch() {
        let a = TensorData::F64(vec![1.0]);
        let b = TensorData::I64(vec![1]);
        assert!(TensorData::concat(&[&a, &b]).is_err());
        let joined = TensorData::concat(&[&a, &a]).unwrap();
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn test_readback() {
        let t = Tensor::from_bools(vec![true, false]);
        assert_eq!(t.to_f64_vec().unwrap(), vec![1.0, 0.0]);

        let s = Tensor::scalar_from_f64(2.5);
        assert_eq!(s.scalar_f64().unwrap(), 2.5);
        assert_eq!(s.rank(), 0);
    }
}
