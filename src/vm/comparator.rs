use std::{cmp::Ordering, fmt::Display};

use crate::core::storage::tuple::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Orders tuples of one schema on a list of field positions, all of them in
/// the same direction.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleComparator {
    indexes: Vec<usize>,
    direction: Direction,
}

impl TupleComparator {
    pub fn new(indexes: Vec<usize>, direction: Direction) -> Self {
        Self { indexes, direction }
    }

    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn cmp(&self, tuple: &Tuple, other: &Tuple) -> Ordering {
        let ordering = tuple.compare(other, &self.indexes, &self.indexes);

        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}
