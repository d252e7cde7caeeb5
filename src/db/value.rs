//! Primitive types and the values stored in tuples.

use std::cmp::Ordering;
use std::fmt::Display;

/// The primitive type of an [`Attribute`](crate::db::Attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 4-byte signed integer.
    Int,
    /// Character string, its byte size is declared by the attribute.
    String,
    /// 4-byte floating point number.
    Real,
}

/// A single field of a [`Tuple`](crate::Tuple).
///
/// Values have a total order so they can be sorted. Integers and reals are
/// compared numerically with each other, strings only with strings.
///
/// ```rust
/// use mergedb::db::Value;
///
/// assert!(Value::Int(2) > Value::Int(1));
/// assert!(Value::Int(5).eq(&Value::Real(5.0)));
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Real(f32),
    String(String),
}

/// Size of an [`Int`](Type::Int) or [`Real`](Type::Real) attribute.
pub(crate) const NUMBER_BYTE_LEN: usize = 4;

/// Size used for [`String`](Type::String) attributes declared without an explicit size.
pub(crate) const DEFAULT_STRING_BYTE_LEN: usize = 32;

impl Type {
    pub const fn default_byte_len(&self) -> usize {
        match self {
            Self::Int | Self::Real => NUMBER_BYTE_LEN,
            Self::String => DEFAULT_STRING_BYTE_LEN,
        }
    }

    /// Whether values of both types can be compared against each other.
    pub const fn is_comparable_with(&self, other: &Type) -> bool {
        matches!(
            (self, other),
            (Self::Int | Self::Real, Self::Int | Self::Real) | (Self::String, Self::String)
        )
    }
}

impl Value {
    pub const fn data_type(&self) -> Type {
        match self {
            Self::Int(_) => Type::Int,
            Self::Real(_) => Type::Real,
            Self::String(_) => Type::String,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).eq(&Ordering::Equal)
    }
}

impl Eq for Value {}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            // widening both sides keeps every i32 exact
            (Value::Int(a), Value::Real(b)) => f64::from(*a).total_cmp(&f64::from(*b)),
            (Value::Real(a), Value::Int(b)) => f64::from(*a).total_cmp(&f64::from(*b)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) => panic!(
                "values of type {} and {} are not comparable",
                a.data_type(),
                b.data_type()
            ),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Real(value)
    }
}

/// REAL values are stored in single precision.
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value as f32)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Int => "INTEGER",
            Self::String => "STRING",
            Self::Real => "REAL",
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(int) => write!(f, "{int}"),
            Self::Real(real) => write!(f, "{real}"),
            Self::String(string) => write!(f, "\"{string}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_numeric_ordering() {
        assert_eq!(Value::Int(3).cmp(&Value::Real(3.5)), Ordering::Less);
        assert_eq!(Value::Real(-1.0).cmp(&Value::Int(-1)), Ordering::Equal);
        assert!(Value::Real(f32::NAN) > Value::Real(f32::INFINITY));
    }

    #[test]
    fn test_string_ordering() {
        let mut values: Vec<Value> = ["pear", "apple", "fig"].map(Value::from).to_vec();
        values.sort();

        assert_eq!(values, ["apple", "fig", "pear"].map(Value::from).to_vec());
    }

    #[test]
    #[should_panic(expected = "not comparable")]
    fn test_string_and_int_are_not_comparable() {
        let _ = Value::Int(1).cmp(&Value::from("1"));
    }
}
