use std::{
    cmp::Ordering,
    fmt::Display,
    io::{self, Read},
    ops::Index,
};

use crate::db::{DatabaseError, Schema, Type, Value};

/// Ordered values of one row, positioned like the attributes of its [`Schema`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tuple(Vec<Value>);

/// Builds a [`Tuple`] out of anything convertible into [`Value`].
///
/// ```rust
/// use mergedb::tuple;
///
/// let tuple = tuple![1, "alice", 3.5];
/// assert_eq!(tuple.len(), 3);
/// ```
#[macro_export]
macro_rules! tuple {
    ($($value:expr),* $(,)?) => {
        $crate::Tuple::new(vec![$($crate::db::Value::from($value)),*])
    };
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    /// Concatenation of `self` followed by `other`.
    pub fn join(&self, other: &Tuple) -> Tuple {
        Tuple(self.0.iter().chain(other.0.iter()).cloned().collect())
    }

    /// Compares field `indexes[i]` of `self` with field `other_indexes[i]` of
    /// `other`, left to right, stopping at the first pair that isn't equal.
    pub fn compare(&self, other: &Tuple, indexes: &[usize], other_indexes: &[usize]) -> Ordering {
        debug_assert_eq!(indexes.len(), other_indexes.len());

        indexes
            .iter()
            .zip(other_indexes)
            .map(|(&idx, &other_idx)| self.0[idx].cmp(&other.0[other_idx]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    pub fn project(&self, indexes: &[usize]) -> Tuple {
        Tuple(indexes.iter().map(|&idx| self.0[idx].clone()).collect())
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl Index<usize> for Tuple {
    type Output = Value;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.0[idx]
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

/// Returns the size in bytes of the varlena header, given its first byte.
/// If the first byte is less than 127: 1-byte header (short string, length is the first byte)
/// Otherwise: 4-byte header (long string, length is in the next 3 bytes)
const fn varlena_header_len(byte: u8) -> usize {
    match byte < 0x7f {
        true => 1,
        false => 4,
    }
}

/// Longest string the 3-byte varlena length can describe.
const MAX_STRING_LEN: usize = (1 << 24) - 1;

/// Appends the binary form of `tuple` to `buff`.
///
/// Numbers are written big endian in 4 bytes, strings are prefixed with a
/// varlena header.
pub(crate) fn serialize_tuple(
    schema: &Schema,
    tuple: &Tuple,
    buff: &mut Vec<u8>,
) -> Result<(), DatabaseError> {
    if schema.len() != tuple.len() {
        return Err(DatabaseError::Contract(format!(
            "tuple {tuple} has {} values but its schema has {} attributes",
            tuple.len(),
            schema.len()
        )));
    }

    for (attr, value) in schema.attributes().iter().zip(tuple.values()) {
        match (attr.data_type(), value) {
            (Type::Int, Value::Int(num)) => buff.extend_from_slice(&num.to_be_bytes()),
            (Type::Real, Value::Real(num)) => buff.extend_from_slice(&num.to_be_bytes()),
            (Type::String, Value::String(string)) => {
                let bytes = string.as_bytes();
                let len = bytes.len();

                if len > MAX_STRING_LEN {
                    return Err(DatabaseError::Contract(format!(
                        "string of {len} bytes in {attr} is too long to be stored"
                    )));
                }

                match len < 127 {
                    true => buff.push(len as u8),
                    _ => {
                        // 4 byte header: 0x80 + 3 bytes BE length
                        buff.push(0x80);
                        buff.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
                    }
                }

                buff.extend_from_slice(bytes);
            }
            (data_type, value) => {
                return Err(DatabaseError::Contract(format!(
                    "value {value} doesn't match type {data_type} of {attr}"
                )))
            }
        }
    }

    Ok(())
}

pub(crate) fn read_from(reader: &mut impl Read, schema: &Schema) -> io::Result<Tuple> {
    schema
        .attributes()
        .iter()
        .map(|attr| match attr.data_type() {
            Type::Int => {
                let mut buf = [0; 4];
                reader.read_exact(&mut buf)?;
                Ok(Value::Int(i32::from_be_bytes(buf)))
            }

            Type::Real => {
                let mut buf = [0; 4];
                reader.read_exact(&mut buf)?;
                Ok(Value::Real(f32::from_be_bytes(buf)))
            }

            Type::String => {
                let mut header = [0; 4];
                reader.read_exact(&mut header[..1])?;

                let length = match varlena_header_len(header[0]) == 1 {
                    false => {
                        reader.read_exact(&mut header[1..4])?;
                        u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize
                    }
                    _ => header[0] as usize,
                };

                let mut buf = vec![0; length];
                reader.read_exact(&mut buf)?;

                String::from_utf8(buf)
                    .map(Value::String)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
        })
        .collect::<io::Result<Vec<_>>>()
        .map(Tuple)
}
