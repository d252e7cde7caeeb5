use std::{
    collections::{vec_deque, VecDeque},
    io::{self, Cursor, Read, Write},
    ops::Index,
};

use super::tuple::{self, Tuple};
use crate::db::{DatabaseError, Schema};

/// Bounded batch of tuples, the unit operators exchange and runs are made of.
///
/// A page holds at most `page_size / tuple_size` tuples, see
/// [`Schema::page_capacity`].
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    capacity: usize,
    tuples: VecDeque<Tuple>,
}

/// Frame header: payload length and number of tuples, both u32 LE.
const FRAME_HEADER_SIZE: usize = 2 * size_of::<u32>();

impl Page {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tuples: VecDeque::with_capacity(capacity),
        }
    }

    /// Empty page sized for tuples of `schema`.
    pub fn for_schema(schema: &Schema, page_size: usize) -> Result<Self, DatabaseError> {
        Ok(Self::new(schema.page_capacity(page_size)?))
    }

    pub fn push(&mut self, tuple: Tuple) {
        debug_assert!(!self.is_full(), "pushed into a full page of {}", self.capacity);
        self.tuples.push_back(tuple);
    }

    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn front(&self) -> Option<&Tuple> {
        self.tuples.front()
    }

    pub fn pop_front(&mut self) -> Option<Tuple> {
        self.tuples.pop_front()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    pub fn clear(&mut self) {
        self.tuples.clear();
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples.into()
    }

    /// Writes every tuple of the page as one frame.
    pub(crate) fn write_to(
        &self,
        schema: &Schema,
        writer: &mut impl Write,
    ) -> Result<(), DatabaseError> {
        let mut buff = vec![0; FRAME_HEADER_SIZE];
        for tuple in &self.tuples {
            tuple::serialize_tuple(schema, tuple, &mut buff)?;
        }

        let payload = u32::try_from(buff.len() - FRAME_HEADER_SIZE).map_err(|_| {
            DatabaseError::Contract(format!("page of {} bytes is too large", buff.len()))
        })?;

        buff[..4].copy_from_slice(&payload.to_le_bytes());
        buff[4..FRAME_HEADER_SIZE].copy_from_slice(&(self.tuples.len() as u32).to_le_bytes());

        writer.write_all(&buff)?;

        Ok(())
    }

    /// Replaces the content of the page with the next frame of `reader`.
    ///
    /// Returns `false` when the reader is exhausted right at a frame boundary.
    pub(crate) fn read_from(
        &mut self,
        schema: &Schema,
        reader: &mut impl Read,
    ) -> Result<bool, DatabaseError> {
        self.tuples.clear();

        let mut header = [0; FRAME_HEADER_SIZE];
        if !read_header(reader, &mut header)? {
            return Ok(false);
        }

        let [l0, l1, l2, l3, c0, c1, c2, c3] = header;
        let payload = u32::from_le_bytes([l0, l1, l2, l3]) as usize;
        let count = u32::from_le_bytes([c0, c1, c2, c3]) as usize;

        if count > self.capacity {
            return Err(DatabaseError::Corrupted(format!(
                "frame holds {count} tuples but pages hold at most {}",
                self.capacity
            )));
        }

        let mut buff = vec![0; payload];
        reader.read_exact(&mut buff).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                DatabaseError::Corrupted(format!("truncated frame of {payload} bytes"))
            }
            _ => DatabaseError::Io(e),
        })?;

        let mut cursor = Cursor::new(buff);
        for _ in 0..count {
            let tuple = tuple::read_from(&mut cursor, schema)
                .map_err(|e| DatabaseError::Corrupted(format!("malformed tuple in frame: {e}")))?;
            self.tuples.push_back(tuple);
        }

        if cursor.position() as usize != payload {
            return Err(DatabaseError::Corrupted(format!(
                "frame of {payload} bytes has {} trailing bytes",
                payload - cursor.position() as usize
            )));
        }

        Ok(true)
    }
}

/// Fills `header`, or returns `false` if the reader has nothing left at all.
fn read_header(reader: &mut impl Read, header: &mut [u8]) -> Result<bool, DatabaseError> {
    let mut read = 0;

    while read < header.len() {
        match reader.read(&mut header[read..]) {
            Ok(0) if read == 0 => return Ok(false),
            Ok(0) => {
                return Err(DatabaseError::Corrupted(format!(
                    "truncated frame header of {read} bytes"
                )))
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(true)
}

impl Index<usize> for Page {
    type Output = Tuple;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.tuples[idx]
    }
}

impl IntoIterator for Page {
    type Item = Tuple;
    type IntoIter = vec_deque::IntoIter<Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.into_iter()
    }
}

impl<'p> IntoIterator for &'p Page {
    type Item = &'p Tuple;
    type IntoIter = vec_deque::Iter<'p, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Attribute, Type};
    use crate::tuple;

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::new("r", "a", Type::Int),
            Attribute::new("r", "b", Type::String),
        ])
    }

    #[test]
    fn test_frames_are_read_back_in_order() -> Result<(), DatabaseError> {
        let schema = schema();
        let mut first = Page::new(2);
        first.push(tuple![1, "one"]);
        first.push(tuple![2, "two"]);
        let mut second = Page::new(2);
        second.push(tuple![3, "three"]);

        let mut file = Cursor::new(Vec::new());
        first.write_to(&schema, &mut file)?;
        second.write_to(&schema, &mut file)?;
        file.set_position(0);

        let mut page = Page::new(2);
        assert!(page.read_from(&schema, &mut file)?);
        assert_eq!(page, first);
        assert!(page.is_full());
        assert!(page.read_from(&schema, &mut file)?);
        assert_eq!(page, second);
        assert!(!page.read_from(&schema, &mut file)?);
        assert!(page.is_empty());

        Ok(())
    }

    #[test]
    fn test_truncated_frame_is_corrupted() -> Result<(), DatabaseError> {
        let schema = schema();
        let mut page = Page::new(4);
        page.push(tuple![10, "ten"]);

        let mut bytes = Vec::new();
        page.write_to(&schema, &mut bytes)?;

        for len in [3, FRAME_HEADER_SIZE + 2] {
            let mut reader = Cursor::new(bytes[..len].to_vec());
            assert!(matches!(
                page.read_from(&schema, &mut reader),
                Err(DatabaseError::Corrupted(_))
            ));
        }

        Ok(())
    }
}
