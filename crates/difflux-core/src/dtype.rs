//! Data types and numeric precision.
//!
//! Every tensor carries a [`DType`] describing its element kind and bit
//! width. The working float precision is a process-wide switch (see
//! [`crate::registry`]); float results of backend operations are coerced to
//! the working precision unless the inputs are integer or boolean.

use std::fmt;

/// The fundamental kind of a tensor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kind {
    /// Boolean values.
    Bool,
    /// Signed integers.
    Int,
    /// IEEE floating point.
    Float,
    /// Complex floating point.
    Complex,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Bool => write!(f, "bool"),
            Kind::Int => write!(f, "int"),
            Kind::Float => write!(f, "float"),
            Kind::Complex => write!(f, "complex"),
        }
    }
}

/// Element type of a tensor: kind plus bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DType {
    /// Fundamental kind of the elements.
    pub kind: Kind,
    /// Total bits per element.
    pub bits: u16,
}

impl DType {
    /// Boolean elements.
    pub const BOOL: Self = Self { kind: Kind::Bool, bits: 8 };
    /// 32-bit signed integers.
    pub const INT32: Self = Self { kind: Kind::Int, bits: 32 };
    /// 64-bit signed integers.
    pub const INT64: Self = Self { kind: Kind::Int, bits: 64 };
    /// 32-bit floats.
    pub const FLOAT32: Self = Self { kind: Kind::Float, bits: 32 };
    /// 64-bit floats.
    pub const FLOAT64: Self = Self { kind: Kind::Float, bits: 64 };
    /// 128-bit complex numbers (two 64-bit floats).
    pub const COMPLEX128: Self = Self { kind: Kind::Complex, bits: 128 };

    /// Whether this dtype is a float of any width.
    pub fn is_float(&self) -> bool {
        self.kind == Kind::Float
    }

    /// Whether this dtype is an integer of any width.
    pub fn is_int(&self) -> bool {
        self.kind == Kind::Int
    }

    /// Promotion of two dtypes for binary arithmetic.
    ///
    /// Kinds promote in the order bool < int < float < complex; within a
    /// kind the wider bit width wins.
    pub fn promote(self, other: Self) -> Self {
        if self.kind == other.kind {
            Self {
                kind: self.kind,
                bits: self.bits.max(other.bits),
            }
        } else if self.kind > other.kind {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.bits)
    }
}

/// Process-wide working float precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Precision {
    /// 32-bit floats.
    Single,
    /// 64-bit floats.
    #[default]
    Double,
}

impl Precision {
    /// The float dtype corresponding to this precision.
    pub fn float_dtype(&self) -> DType {
        match self {
            Precision::Single => DType::FLOAT32,
            Precision::Double => DType::FLOAT64,
        }
    }

    /// Bit width of the working float type.
    pub fn bits(&self) -> u16 {
        match self {
            Precision::Single => 32,
            Precision::Double => 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_order() {
        assert_eq!(DType::BOOL.promote(DType::INT32), DType::INT32);
        assert_eq!(DType::INT32.promote(DType::INT64), DType::INT64);
        assert_eq!(DType::INT64.promote(DType::FLOAT32), DType::FLOAT32);
        assert_eq!(DType::FLOAT32.promote(DType::FLOAT64), DType::FLOAT64);
        assert_eq!(DType::FLOAT64.promote(DType::COMPLEX128), DType::COMPLEX128);
    }

    #[test]
    fn test_promotion_is_commutative() {
        let dtypes = [
            DType::BOOL,
            DType::INT32,
            DType::INT64,
            DType::FLOAT32,
            DType::FLOAT64,
            DType::COMPLEX128,
        ];
        for a in dtypes {
            for b in dtypes {
                assert_eq!(a.promote(b), b.promote(a));
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(DType::FLOAT32.to_string(), "float32");
        assert_eq!(DType::INT64.to_string(), "int64");
        assert_eq!(DType::COMPLEX128.to_string(), "complex128");
    }

    #[test]
    fn test_precision_dtype() {
        assert_eq!(Precision::Single.float_dtype(), DType::FLOAT32);
        assert_eq!(Precision::Double.float_dtype(), DType::FLOAT64);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_dtype_serde_roundtrip() {
        let json = serde_json::to_string(&DType::FLOAT32).unwrap();
        let back: DType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DType::FLOAT32);
    }
}
