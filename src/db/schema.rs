use crate::db::{ConfigError, Type};
use std::collections::HashMap;
use std::fmt::Display;

/// Role of an attribute in the keys of its relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyRole {
    #[default]
    None,
    Primary,
    Foreign,
}

/// A column of a relation.
///
/// Attributes are identified by their relation and column names, the type,
/// key role and byte size only describe them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    relation: String,
    name: String,
    data_type: Type,
    key: KeyRole,
    byte_size: usize,
}

/// Ordered list of attributes, the position of each attribute is the position
/// of its value inside a tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
    tuple_size: usize,
}

impl Attribute {
    pub fn new(relation: impl Into<String>, name: impl Into<String>, data_type: Type) -> Self {
        Self {
            relation: relation.into(),
            name: name.into(),
            byte_size: data_type.default_byte_len(),
            key: KeyRole::None,
            data_type,
        }
    }

    pub fn with_key(mut self, key: KeyRole) -> Self {
        self.key = key;
        self
    }

    pub fn with_byte_size(mut self, byte_size: usize) -> Self {
        self.byte_size = byte_size;
        self
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> Type {
        self.data_type
    }

    pub fn key(&self) -> KeyRole {
        self.key
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// `relation.column`, the name used to look up attributes in a [`Schema`].
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.relation, self.name)
    }
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        let mut index = HashMap::with_capacity(attributes.len());
        for (idx, attr) in attributes.iter().enumerate() {
            index.entry(attr.qualified_name()).or_insert(idx);
        }

        let tuple_size = attributes.iter().map(Attribute::byte_size).sum();

        Self {
            attributes,
            index,
            tuple_size,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Position of the given attribute, matched by relation and column name.
    pub fn index_of(&self, attribute: &Attribute) -> Option<usize> {
        self.index.get(&attribute.qualified_name()).copied()
    }

    pub(crate) fn try_index_of(&self, attribute: &Attribute) -> Result<usize, ConfigError> {
        self.index_of(attribute)
            .ok_or_else(|| ConfigError::UnknownAttribute(attribute.qualified_name()))
    }

    pub fn attribute(&self, idx: usize) -> Option<&Attribute> {
        self.attributes.get(idx)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Sum of the byte sizes of every attribute.
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Number of tuples of this schema that fit in a page of `page_size` bytes.
    pub fn page_capacity(&self, page_size: usize) -> Result<usize, ConfigError> {
        match page_size.checked_div(self.tuple_size) {
            Some(capacity) if capacity > 0 => Ok(capacity),
            _ => Err(ConfigError::TupleTooLarge {
                tuple_size: self.tuple_size,
                page_size,
            }),
        }
    }

    /// Schema of the concatenation of a tuple of `self` with a tuple of `other`.
    pub fn join(&self, other: &Schema) -> Schema {
        Schema::new(
            self.attributes
                .iter()
                .chain(other.attributes.iter())
                .cloned()
                .collect(),
        )
    }

    pub(crate) fn project(&self, indexes: &[usize]) -> Schema {
        Schema::new(
            indexes
                .iter()
                .map(|&idx| self.attributes[idx].clone())
                .collect(),
        )
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.relation, self.name)
    }
}
