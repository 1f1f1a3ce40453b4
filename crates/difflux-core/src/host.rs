//! Host-data boundary.
//!
//! Values entering the backend from caller code are normalized once into
//! the [`HostValue`] union instead of being re-inspected ad hoc by every
//! operation. Only [`HostValue::Native`] is engine-native; everything else
//! is convertible host data, which `is_tensor` queries can distinguish
//! without forcing a conversion.

use crate::shape::Shape;
use crate::tensor::Tensor;
use num_complex::Complex64;

/// A value crossing the host/engine boundary.
#[derive(Debug, Clone)]
pub enum HostValue {
    /// A host boolean.
    Bool(bool),
    /// A host integer.
    Int(i64),
    /// A host float.
    Float(f64),
    /// A host complex number.
    Complex(Complex64),
    /// A flat sequence of booleans.
    BoolVec(Vec<bool>),
    /// A flat sequence of integers.
    IntVec(Vec<i64>),
    /// A flat sequence of floats.
    FloatVec(Vec<f64>),
    /// Nested host sequences, flattened row-major with an explicit shape.
    Shaped {
        /// Flattened elements.
        data: Vec<f64>,
        /// Logical shape of the nested sequence.
        shape: Shape,
    },
    /// An engine-native tensor; `as_tensor` passes it through zero-copy.
    Native(Tensor),
}

impl HostValue {
    /// Whether this value is already engine-native.
    pub fn is_native(&self) -> bool {
        matches!(self, HostValue::Native(_))
    }

    /// Whether this value can be interpreted as a tensor at all.
    ///
    /// With `only_native`, convertible host data (plain numbers, sequences)
    /// does not count.
    pub fn is_tensor(&self, only_native: bool) -> bool {
        if only_native {
            self.is_native()
        } else {
            true
        }
    }
}

impl From<bool> for HostValue {
    fn from(x: bool) -> Self {
        HostValue::Bool(x)
    }
}

impl From<i32> for HostValue {
    fn from(x: i32) -> Self {
        HostValue::Int(i64::from(x))
    }
}

impl From<i64> for HostValue {
    fn from(x: i64) -> Self {
        HostValue::Int(x)
    }
}

impl From<f32> for HostValue {
    fn from(x: f32) -> Self {
        HostValue::Float(f64::from(x))
    }
}

impl From<f64> for HostValue {
    fn from(x: f64) -> Self {
        HostValue::Float(x)
    }
}

impl From<Complex64> for HostValue {
    fn from(x: Complex64) -> Self {
        HostValue::Complex(x)
    }
}

impl From<Vec<bool>> for HostValue {
    fn from(x: Vec<bool>) -> Self {
        HostValue::BoolVec(x)
    }
}

impl From<Vec<i64>> for HostValue {
    fn from(x: Vec<i64>) -> Self {
        HostValue::IntVec(x)
    }
}

impl From<Vec<f64>> for HostValue {
    fn from(x: Vec<f64>) -> Self {
        HostValue::FloatVec(x)
    }
}

impl From<&[f64]> for HostValue {
    fn from(x: &[f64]) -> Self {
        HostValue::FloatVec(x.to_vec())
    }
}

impl From<Vec<Vec<f64>>> for HostValue {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let shape = Shape::from(vec![rows.len(), cols]);
        let data = rows.into_iter().flatten().collect();
        HostValue::Shaped { data, shape }
    }
}

impl From<Tensor> for HostValue {
    fn from(x: Tensor) -> Self {
        HostValue::Native(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_detection() {
        let native = HostValue::from(Tensor::from_f64s(vec![1.0, 2.0]));
        assert!(native.is_tensor(true));
        assert!(native.is_tensor(false));

        let host = HostValue::from(vec![1.0, 2.0]);
        assert!(!host.is_tensor(true));
        assert!(host.is_tensor(false));

        assert!(!HostValue::from(3.5).is_tensor(true));
    }

    #[test]
    fn test_nested_sequence_shape() {
        let v = HostValue::from(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        if let HostValue::Shaped { data, shape } = v {
            assert_eq!(shape, Shape::from([2, 3]));
            assert_eq!(data.len(), 6);
        } else {
            panic!("Expected Shaped variant");
        }
    }
}
