//! Statistics of base relations consumed by the [cost model](crate::vm::CostModel).
//!
//! A statistics file has two lines:
//!
//! ```text
//! 1000
//! 1000 50 12
//! ```
//!
//! The first one is the number of rows of the table and the second one holds
//! the number of distinct values of each attribute, in schema order.

use crate::db::{Attribute, DatabaseError, Schema};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableStatistics {
    pub rows: u64,
    /// Distinct values of each attribute, indexed like the schema.
    pub distinct: Vec<u64>,
}

impl TableStatistics {
    pub fn new(rows: u64, distinct: Vec<u64>) -> Self {
        Self { rows, distinct }
    }

    pub fn parse(content: &str, schema: &Schema) -> Result<Self, DatabaseError> {
        let mut lines = content.lines().filter(|line| !line.trim().is_empty());

        let rows = match lines.next().map(|line| line.split_whitespace().collect::<Vec<_>>()) {
            Some(tokens) if tokens.len() == 1 => parse_count(tokens[0])?,
            Some(tokens) => return Err(malformed(format!(
                "expected a single row count but found {} values",
                tokens.len()
            ))),
            None => return Err(malformed("missing row count")),
        };

        let distinct = lines
            .next()
            .ok_or_else(|| malformed("missing distinct counts"))?
            .split_whitespace()
            .map(parse_count)
            .collect::<Result<Vec<_>, _>>()?;

        if distinct.len() != schema.len() {
            return Err(malformed(format!(
                "expected {} distinct counts but found {}",
                schema.len(),
                distinct.len()
            )));
        }

        Ok(Self { rows, distinct })
    }

    pub fn read_from(path: impl AsRef<Path>, schema: &Schema) -> Result<Self, DatabaseError> {
        Self::parse(&std::fs::read_to_string(path)?, schema)
    }

    pub fn distinct_of(&self, schema: &Schema, attribute: &Attribute) -> Option<u64> {
        schema
            .index_of(attribute)
            .and_then(|idx| self.distinct.get(idx))
            .copied()
    }
}

fn parse_count(token: &str) -> Result<u64, DatabaseError> {
    token
        .parse()
        .map_err(|err| malformed(format!("invalid count {token}: {err}")))
}

fn malformed(reason: impl AsRef<str>) -> DatabaseError {
    DatabaseError::Corrupted(format!("malformed statistics file: {}", reason.as_ref()))
}
