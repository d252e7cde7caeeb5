//! Relational model shared by every operator: attributes, schemas, values,
//! conditions, table statistics and the execution configuration.

mod condition;
mod config;
mod schema;
mod statistics;
mod value;

pub use condition::{CompareOp, Condition, Operand};
pub use config::{Config, Context, DEFAULT_BUFFERS, DEFAULT_PAGE_SIZE};
pub use schema::{Attribute, KeyRole, Schema};
pub use statistics::TableStatistics;
pub use value::{Type, Value};

use std::fmt::Display;

/// Every failure the executor can report.
///
/// All of them are fatal to the query: they travel up the operator tree and
/// abort execution, no operator keeps going with partial results.
#[derive(Debug)]
pub enum DatabaseError {
    /// Reading or writing a run file failed.
    Io(std::io::Error),
    /// The plan cannot execute with the given configuration.
    Config(ConfigError),
    /// An operator was driven outside of its protocol or fed inconsistent tuples.
    Contract(String),
    /// Something on disk doesn't have the shape we wrote or expect.
    Corrupted(String),
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// An operator that sorts received zero buffer pages.
    NoBuffers,
    /// More than one run was generated but there aren't enough pages to merge them.
    InsufficientBuffers { buffers: usize, runs: usize },
    /// Not even one tuple fits in a page.
    TupleTooLarge { tuple_size: usize, page_size: usize },
    /// Attribute isn't part of the schema it's resolved against.
    UnknownAttribute(String),
    /// Both sides of a join condition have types that can't be compared.
    KeyTypeMismatch { left: String, right: String },
    /// A join condition is not an equality between two attributes.
    NonEquiJoin(String),
    /// A join without any condition.
    EmptyJoinKey,
    /// No statistics were registered for a scanned table.
    MissingStatistics(String),
}

impl Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Contract(message) => write!(f, "contract violation: {message}"),
            Self::Corrupted(message) => f.write_str(message),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoBuffers => f.write_str("sorting requires at least one buffer page"),
            Self::InsufficientBuffers { buffers, runs } => write!(
                f,
                "{runs} sorted runs can't be merged with {buffers} buffer page(s), at least 2 are required"
            ),
            Self::TupleTooLarge {
                tuple_size,
                page_size,
            } => write!(
                f,
                "tuples of {tuple_size} bytes don't fit in pages of {page_size} bytes"
            ),
            Self::UnknownAttribute(attr) => write!(f, "unknown attribute {attr}"),
            Self::KeyTypeMismatch { left, right } => {
                write!(f, "join keys {left} and {right} are not comparable")
            }
            Self::NonEquiJoin(condition) => {
                write!(f, "condition {condition} is not an equi-join condition")
            }
            Self::EmptyJoinKey => f.write_str("sort-merge join requires at least one condition"),
            Self::MissingStatistics(table) => write!(f, "no statistics for table {table}"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DatabaseError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ConfigError> for DatabaseError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
