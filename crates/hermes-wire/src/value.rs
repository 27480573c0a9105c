use std::fmt;

use crate::error::{Result, WireError};

/// Type tag of a property value, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Boolean = 0,
    Integer = 1,
    UnsignedInteger = 2,
    String = 3,
    Float = 4,
}

impl ValueType {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Boolean),
            1 => Ok(Self::Integer),
            2 => Ok(Self::UnsignedInteger),
            3 => Ok(Self::String),
            4 => Ok(Self::Float),
            other => Err(WireError::UnknownValueType(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Short name used in logs and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "bool",
            Self::Integer => "int",
            Self::UnsignedInteger => "uint",
            Self::String => "string",
            Self::Float => "float",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decimal number carried as `scaled / precision`.
///
/// A precision of zero is read as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPoint {
    pub scaled: i32,
    pub precision: u16,
}

impl FixedPoint {
    pub fn new(scaled: i32, precision: u16) -> Self {
        Self { scaled, precision }
    }

    /// Scale `value` by `precision`, rounding to nearest and saturating at the
    /// `i32` range.
    pub fn from_f64(value: f64, precision: u16) -> Self {
        let scaled = (value * f64::from(precision.max(1))).round();
        let scaled = if scaled.is_nan() {
            0
        } else {
            scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
        };
        Self { scaled, precision }
    }

    pub fn to_f64(self) -> f64 {
        f64::from(self.scaled) / f64::from(self.precision.max(1))
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

/// A typed property value. The wire type tag follows the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    UnsignedInteger(u32),
    String(String),
    Float(FixedPoint),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::UnsignedInteger(_) => ValueType::UnsignedInteger,
            Self::String(_) => ValueType::String,
            Self::Float(_) => ValueType::Float,
        }
    }

    /// The zero value of `value_type`.
    pub fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Boolean => Self::Boolean(false),
            ValueType::Integer => Self::Integer(0),
            ValueType::UnsignedInteger => Self::UnsignedInteger(0),
            ValueType::String => Self::String(String::new()),
            ValueType::Float => Self::Float(FixedPoint::new(0, 1)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::Boolean)),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Self::Integer(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::Integer)),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Self::UnsignedInteger(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::UnsignedInteger)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(v) => Ok(v),
            other => Err(other.mismatch(ValueType::String)),
        }
    }

    pub fn as_fixed(&self) -> Result<FixedPoint> {
        match self {
            Self::Float(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::Float)),
        }
    }

    fn mismatch(&self, expected: ValueType) -> WireError {
        WireError::TypeMismatch {
            expected,
            found: self.value_type(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::UnsignedInteger(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One named, typed property value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEnvelope {
    pub name: String,
    pub value: Value,
}

impl ValueEnvelope {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_from_f64() {
        let fp = FixedPoint::from_f64(3.14, 1000);
        assert_eq!(fp, FixedPoint::new(3140, 1000));
        assert!((fp.to_f64() - 3.14).abs() <= 1.0 / 1000.0);
    }

    #[test]
    fn test_fixed_point_rounds_to_nearest() {
        assert_eq!(FixedPoint::from_f64(0.0019, 1000).scaled, 2);
        assert_eq!(FixedPoint::from_f64(-2.5, 10).scaled, -25);
    }

    #[test]
    fn test_fixed_point_saturates_and_handles_zero_precision() {
        assert_eq!(FixedPoint::from_f64(1e12, 1000).scaled, i32::MAX);
        assert_eq!(FixedPoint::from_f64(f64::NAN, 10).scaled, 0);
        assert_eq!(FixedPoint::new(7, 0).to_f64(), 7.0);
    }

    #[test]
    fn test_value_type_tags() {
        for tag in 0..=4u8 {
            assert_eq!(ValueType::from_u8(tag).unwrap().as_u8(), tag);
        }
        assert!(matches!(
            ValueType::from_u8(5),
            Err(WireError::UnknownValueType(5))
        ));
    }

    #[test]
    fn test_mismatched_read_is_an_error() {
        let value = Value::Integer(42);
        assert_eq!(value.as_i32().unwrap(), 42);
        assert!(matches!(
            value.as_str(),
            Err(WireError::TypeMismatch {
                expected: ValueType::String,
                found: ValueType::Integer
            })
        ));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::UnsignedInteger(7).to_string(), "7");
        assert_eq!(Value::String("Widget".into()).to_string(), "Widget");
        assert_eq!(Value::Float(FixedPoint::new(25, 10)).to_string(), "2.5");
    }

    #[test]
    fn test_zero_matches_type() {
        for tag in 0..=4u8 {
            let ty = ValueType::from_u8(tag).unwrap();
            assert_eq!(Value::zero(ty).value_type(), ty);
        }
    }
}
