//! Operator tree and the pull protocol every node implements.
//!
//! Plans are built bottom-up and executed by the caller:
//!
//! ```text
//! plan.open()?;
//! while let Some(page) = plan.next()? { ... }
//! plan.close()?;
//! ```

use std::{
    fmt::Display,
    io::{Read, Seek, Write},
};

use crate::{
    core::storage::{io::FileOperations, page::Page, tuple::Tuple},
    db::{
        Attribute, Condition, ConfigError, Context, DatabaseError, Operand, Schema, Value,
    },
    vm::{
        join::SortMergeJoin,
        sort::ExternalSort,
        sorted::{Distinct, GroupBy, OrderBy},
    },
};

/// Pull-based iterator over pages.
pub trait Operator {
    /// Prepares the operator and its children. Sorts do all their work here.
    fn open(&mut self) -> Result<(), DatabaseError>;

    /// Next page of results, `None` once the operator is exhausted.
    fn next(&mut self) -> Result<Option<Page>, DatabaseError>;

    /// Releases everything the operator holds and closes its children.
    /// Calling it more than once is fine.
    fn close(&mut self) -> Result<(), DatabaseError>;

    fn schema(&self) -> &Schema;
}

/// Files runs can be written to.
pub trait PlanExecutor: Seek + Read + Write + FileOperations {}
impl<File: Seek + Read + Write + FileOperations> PlanExecutor for File {}

/// Where an operator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Created,
    Open,
    /// `next()` already returned `None`.
    Exhausted,
    Closed,
}

impl Status {
    /// Fails unless `open()` may be called now.
    pub(crate) fn ensure_created(&self, operator: &str) -> Result<(), DatabaseError> {
        match self {
            Self::Created => Ok(()),
            Self::Closed => Err(DatabaseError::Contract(format!(
                "open() called on {operator} after close()"
            ))),
            _ => Err(DatabaseError::Contract(format!(
                "open() called twice on {operator}"
            ))),
        }
    }

    /// Fails unless `next()` may be called now.
    pub(crate) fn ensure_open(&self, operator: &str) -> Result<(), DatabaseError> {
        let when = match self {
            Self::Open => return Ok(()),
            Self::Created => "before open()",
            Self::Exhausted => "after exhaustion",
            Self::Closed => "after close()",
        };

        Err(DatabaseError::Contract(format!(
            "next() called on {operator} {when}"
        )))
    }
}

#[derive(Debug)]
pub enum Plan<File: FileOperations> {
    Scan(Scan),
    Select(Select<File>),
    Project(Project<File>),
    Join(SortMergeJoin<File>),
    Sort(ExternalSort<File>),
    GroupBy(GroupBy<File>),
    Distinct(Distinct<File>),
    OrderBy(OrderBy<File>),
}

/// Leaf producing the tuples of an in-memory relation, a page at a time.
#[derive(Debug)]
pub struct Scan {
    table: String,
    schema: Schema,
    tuples: Vec<Tuple>,
    page_size: usize,
    capacity: usize,
    position: usize,
    status: Status,
}

/// Keeps the tuples satisfying a [`Condition`].
#[derive(Debug)]
pub struct Select<File: FileOperations> {
    pub(in crate::vm) source: Box<Plan<File>>,
    condition: Condition,
    left: usize,
    right: Operand,
    right_index: Option<usize>,
    status: Status,
}

/// Keeps only some attributes of every tuple, without removing duplicates.
#[derive(Debug)]
pub struct Project<File: FileOperations> {
    pub(in crate::vm) source: Box<Plan<File>>,
    indexes: Vec<usize>,
    output: Schema,
    status: Status,
}

impl Scan {
    pub fn new(
        table: impl Into<String>,
        schema: Schema,
        tuples: Vec<Tuple>,
        ctx: &Context,
    ) -> Self {
        Self {
            table: table.into(),
            schema,
            tuples,
            page_size: ctx.page_size(),
            capacity: 0,
            position: 0,
            status: Status::Created,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(in crate::vm) fn page_size(&self) -> usize {
        self.page_size
    }
}

impl Operator for Scan {
    fn open(&mut self) -> Result<(), DatabaseError> {
        self.status.ensure_created("Scan")?;
        self.capacity = self.schema.page_capacity(self.page_size)?;
        self.position = 0;
        self.status = Status::Open;

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
        self.status.ensure_open("Scan")?;

        if self.position >= self.tuples.len() {
            self.status = Status::Exhausted;
            return Ok(None);
        }

        let end = usize::min(self.position + self.capacity, self.tuples.len());
        let mut page = Page::new(self.capacity);
        for tuple in &self.tuples[self.position..end] {
            if tuple.len() != self.schema.len() {
                return Err(DatabaseError::Contract(format!(
                    "tuple {tuple} of {} doesn't match its schema of {} attributes",
                    self.table,
                    self.schema.len()
                )));
            }
            let mistyped = self
                .schema
                .attributes()
                .iter()
                .zip(tuple.values())
                .find(|(attr, value)| attr.data_type() != value.data_type());
            if let Some((attr, value)) = mistyped {
                return Err(DatabaseError::Contract(format!(
                    "value {value} of tuple {tuple} doesn't match type {} of {attr}",
                    attr.data_type()
                )));
            }
            page.push(tuple.clone());
        }
        self.position = end;

        Ok(Some(page))
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        self.status = Status::Closed;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl<File: FileOperations> Select<File> {
    pub fn new(source: Plan<File>, condition: Condition) -> Result<Self, DatabaseError> {
        let schema = source.schema();
        let left = schema.try_index_of(&condition.left)?;

        let (right_type, right_index) = match &condition.right {
            Operand::Attribute(attr) => (attr.data_type(), Some(schema.try_index_of(attr)?)),
            Operand::Literal(value) => (value.data_type(), None),
        };

        if !condition.left.data_type().is_comparable_with(&right_type) {
            return Err(ConfigError::KeyTypeMismatch {
                left: condition.left.to_string(),
                right: condition.right.to_string(),
            }
            .into());
        }

        Ok(Self {
            source: Box::new(source),
            left,
            right: condition.right.clone(),
            right_index,
            condition,
            status: Status::Created,
        })
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    fn matches(&self, tuple: &Tuple) -> bool {
        let right: &Value = match (&self.right, self.right_index) {
            (_, Some(idx)) => &tuple[idx],
            (Operand::Literal(value), None) => value,
            (Operand::Attribute(_), None) => return false,
        };

        self.condition.op.holds(tuple[self.left].cmp(right))
    }
}

impl<File: PlanExecutor> Operator for Select<File> {
    fn open(&mut self) -> Result<(), DatabaseError> {
        self.status.ensure_created("Select")?;
        self.source.open()?;
        self.status = Status::Open;

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
        self.status.ensure_open("Select")?;

        while let Some(page) = self.source.next()? {
            let mut output = Page::new(page.capacity());
            for tuple in page {
                if self.matches(&tuple) {
                    output.push(tuple);
                }
            }

            if !output.is_empty() {
                return Ok(Some(output));
            }
        }

        self.status = Status::Exhausted;
        Ok(None)
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        self.status = Status::Closed;
        self.source.close()
    }

    fn schema(&self) -> &Schema {
        self.source.schema()
    }
}

impl<File: FileOperations> Project<File> {
    pub fn new(source: Plan<File>, attributes: &[Attribute]) -> Result<Self, DatabaseError> {
        let schema = source.schema();
        let indexes = attributes
            .iter()
            .map(|attr| schema.try_index_of(attr))
            .collect::<Result<Vec<_>, _>>()?;
        let output = schema.project(&indexes);

        Ok(Self {
            source: Box::new(source),
            indexes,
            output,
            status: Status::Created,
        })
    }

    pub(in crate::vm) fn output_schema(&self) -> &Schema {
        &self.output
    }
}

impl<File: PlanExecutor> Operator for Project<File> {
    fn open(&mut self) -> Result<(), DatabaseError> {
        self.status.ensure_created("Project")?;
        self.source.open()?;
        self.status = Status::Open;

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
        self.status.ensure_open("Project")?;

        let Some(page) = self.source.next()? else {
            self.status = Status::Exhausted;
            return Ok(None);
        };

        let mut output = Page::new(page.capacity());
        for tuple in &page {
            output.push(tuple.project(&self.indexes));
        }

        Ok(Some(output))
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        self.status = Status::Closed;
        self.source.close()
    }

    fn schema(&self) -> &Schema {
        &self.output
    }
}

impl<File: PlanExecutor> Operator for Plan<File> {
    fn open(&mut self) -> Result<(), DatabaseError> {
        match self {
            Self::Scan(scan) => scan.open(),
            Self::Select(select) => select.open(),
            Self::Project(project) => project.open(),
            Self::Join(join) => join.open(),
            Self::Sort(sort) => sort.open(),
            Self::GroupBy(group) => group.open(),
            Self::Distinct(distinct) => distinct.open(),
            Self::OrderBy(order) => order.open(),
        }
    }

    fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
        match self {
            Self::Scan(scan) => scan.next(),
            Self::Select(select) => select.next(),
            Self::Project(project) => project.next(),
            Self::Join(join) => join.next(),
            Self::Sort(sort) => sort.next(),
            Self::GroupBy(group) => group.next(),
            Self::Distinct(distinct) => distinct.next(),
            Self::OrderBy(order) => order.next(),
        }
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        match self {
            Self::Scan(scan) => scan.close(),
            Self::Select(select) => select.close(),
            Self::Project(project) => project.close(),
            Self::Join(join) => join.close(),
            Self::Sort(sort) => sort.close(),
            Self::GroupBy(group) => group.close(),
            Self::Distinct(distinct) => distinct.close(),
            Self::OrderBy(order) => order.close(),
        }
    }

    fn schema(&self) -> &Schema {
        Plan::schema(self)
    }
}

impl<File: FileOperations> Plan<File> {
    /// Schema of the tuples this node produces.
    pub fn schema(&self) -> &Schema {
        match self {
            Self::Scan(scan) => &scan.schema,
            Self::Select(select) => select.source.schema(),
            Self::Project(project) => &project.output,
            Self::Join(join) => join.output_schema(),
            Self::Sort(sort) => sort.output_schema(),
            Self::GroupBy(group) => group.sort.output_schema(),
            Self::Distinct(distinct) => distinct.sort.output_schema(),
            Self::OrderBy(order) => order.sort.output_schema(),
        }
    }

    /// Plans shown below this node when displayed.
    pub fn children(&self) -> Vec<&Plan<File>> {
        match self {
            Self::Scan(_) => vec![],
            Self::Select(select) => vec![&select.source],
            Self::Project(project) => vec![&project.source],
            Self::Join(join) => vec![join.left.base(), join.right.base()],
            Self::Sort(sort) => vec![sort.base()],
            Self::GroupBy(group) => vec![group.sort.base()],
            Self::Distinct(distinct) => vec![distinct.sort.base()],
            Self::OrderBy(order) => vec![order.sort.base()],
        }
    }

    /// Number of sort-merge joins in the whole tree.
    pub fn joins(&self) -> usize {
        let own = usize::from(matches!(self, Self::Join(_)));
        own + self.children().iter().map(|child| child.joins()).sum::<usize>()
    }

    /// Grants `buffers` pages to every sort in the tree.
    pub(crate) fn assign_buffers(&mut self, buffers: usize) {
        match self {
            Self::Scan(_) => {}
            Self::Select(select) => select.source.assign_buffers(buffers),
            Self::Project(project) => project.source.assign_buffers(buffers),
            Self::Join(join) => {
                join.left.assign_buffers(buffers);
                join.right.assign_buffers(buffers);
            }
            Self::Sort(sort) => sort.assign_buffers(buffers),
            Self::GroupBy(group) => group.sort.assign_buffers(buffers),
            Self::Distinct(distinct) => distinct.sort.assign_buffers(buffers),
            Self::OrderBy(order) => order.sort.assign_buffers(buffers),
        }
    }

    fn to_display(&self) -> String {
        match self {
            Self::Scan(scan) => format!("{scan}"),
            Self::Select(select) => format!("{select}"),
            Self::Project(project) => format!("{project}"),
            Self::Join(join) => format!("{join}"),
            Self::Sort(sort) => format!("{sort}"),
            Self::GroupBy(group) => format!("{group}"),
            Self::Distinct(distinct) => format!("{distinct}"),
            Self::OrderBy(order) => format!("{order}"),
        }
    }

    fn fmt_tree(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        is_root: bool,
        is_last: bool,
        prefix: &str,
    ) -> std::fmt::Result {
        let connector = match (is_root, is_last) {
            (true, _) => "",
            (_, true) => "└── ",
            _ => "├── ",
        };

        writeln!(f, "{prefix}{connector}{}", self.to_display())?;
        let child_prefix = match is_root {
            true => "".into(),
            _ => format!("{prefix}{}", if is_last { "    " } else { "│   " }),
        };

        let children = self.children();
        let last = children.len().saturating_sub(1);
        for (idx, child) in children.into_iter().enumerate() {
            child.fmt_tree(f, false, idx == last, &child_prefix)?;
        }

        Ok(())
    }
}

impl<File: FileOperations> Display for Plan<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_tree(f, true, false, "")
    }
}

impl Display for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scan on {}", self.table)
    }
}

impl<File: FileOperations> Display for Select<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Select where {}", self.condition)
    }
}

impl<File: FileOperations> Display for Project<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Project {}", join_attributes(self.output.attributes()))
    }
}

/// `a.x, b.y` for display purposes.
pub(in crate::vm) fn join_attributes<'a>(attrs: impl IntoIterator<Item = &'a Attribute>) -> String {
    attrs
        .into_iter()
        .map(Attribute::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl<File: FileOperations> From<Scan> for Plan<File> {
    fn from(value: Scan) -> Self {
        Plan::Scan(value)
    }
}

macro_rules! impl_from_operator {
    ($($variant:ident: $operator:ident),+) => {
        $(
            impl<File: FileOperations> From<$operator<File>> for Plan<File> {
                fn from(value: $operator<File>) -> Self {
                    Plan::$variant(value)
                }
            }
        )+
    };
}

impl_from_operator! {
    Select: Select,
    Project: Project,
    Join: SortMergeJoin,
    Sort: ExternalSort,
    GroupBy: GroupBy,
    Distinct: Distinct,
    OrderBy: OrderBy
}
