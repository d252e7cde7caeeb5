//! Predicates used by selections and joins.

use crate::db::{Attribute, Value};
use std::cmp::Ordering;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Right hand side of a [`Condition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Attribute(Attribute),
    Literal(Value),
}

/// `left <op> right`, where `right` is either another attribute or a literal.
///
/// A list of equality conditions between two attributes forms the composite
/// key of an equi-join.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub left: Attribute,
    pub op: CompareOp,
    pub right: Operand,
}

impl CompareOp {
    /// Whether `left.cmp(right) == ordering` satisfies this operator.
    pub const fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Ne => !matches!(ordering, Ordering::Equal),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Le => !matches!(ordering, Ordering::Greater),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Ge => !matches!(ordering, Ordering::Less),
        }
    }
}

impl Condition {
    /// Equality between two attributes, the building block of join keys.
    pub fn equals(left: Attribute, right: Attribute) -> Self {
        Self {
            left,
            op: CompareOp::Eq,
            right: Operand::Attribute(right),
        }
    }

    pub fn literal(left: Attribute, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            left,
            op,
            right: Operand::Literal(value.into()),
        }
    }

    /// The right attribute when this condition is usable as an equi-join key.
    pub(crate) fn join_attribute(&self) -> Option<&Attribute> {
        match (&self.op, &self.right) {
            (CompareOp::Eq, Operand::Attribute(attr)) => Some(attr),
            _ => None,
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attribute(attr) => write!(f, "{attr}"),
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}
