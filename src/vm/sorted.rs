//! Operators answered by sorting their input first.

use std::fmt::Display;

use crate::{
    core::storage::{io::FileOperations, page::Page, tuple::Tuple},
    db::{Attribute, Context, DatabaseError, Schema},
    vm::{
        comparator::Direction,
        planner::{join_attributes, Operator, Plan, PlanExecutor, Status},
        sort::ExternalSort,
    },
};

/// Removes duplicate tuples.
///
/// The input is sorted on every attribute, which places equal tuples next to
/// each other, so a tuple is a duplicate exactly when it equals the last one
/// emitted.
#[derive(Debug)]
pub struct Distinct<File: FileOperations> {
    pub(in crate::vm) sort: ExternalSort<File>,
    last: Option<Tuple>,
    status: Status,
}

/// Sorts the input on the grouping attributes so that every group is contiguous.
#[derive(Debug)]
pub struct GroupBy<File: FileOperations> {
    pub(in crate::vm) sort: ExternalSort<File>,
}

/// Sorts the input on the given attributes, all of them when none are given.
#[derive(Debug)]
pub struct OrderBy<File: FileOperations> {
    pub(in crate::vm) sort: ExternalSort<File>,
}

impl<File: FileOperations> Distinct<File> {
    pub fn new(base: Plan<File>, ctx: &Context) -> Result<Self, DatabaseError> {
        let keys = base.schema().attributes().to_vec();

        Ok(Self {
            sort: ExternalSort::new(base, keys, Direction::Asc, ctx)?,
            last: None,
            status: Status::Created,
        })
    }

    fn is_duplicate(&self, tuple: &Tuple) -> Result<bool, DatabaseError> {
        let Some(last) = &self.last else {
            return Ok(false);
        };

        if last.len() != tuple.len() {
            return Err(DatabaseError::Contract(format!(
                "Distinct compared {last} with {tuple} of different arity"
            )));
        }

        Ok(last.values() == tuple.values())
    }
}

impl<File: PlanExecutor> Operator for Distinct<File> {
    fn open(&mut self) -> Result<(), DatabaseError> {
        self.status.ensure_created("Distinct")?;
        self.sort.open()?;
        self.last = None;
        self.status = Status::Open;

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
        self.status.ensure_open("Distinct")?;

        while let Some(page) = self.sort.next()? {
            let mut output = Page::new(page.capacity());

            for tuple in page {
                if self.is_duplicate(&tuple)? {
                    continue;
                }
                self.last = Some(tuple.clone());
                output.push(tuple);
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
        self.last = None;
        self.sort.close()
    }

    fn schema(&self) -> &Schema {
        self.sort.output_schema()
    }
}

impl<File: FileOperations> GroupBy<File> {
    pub fn new(
        base: Plan<File>,
        groups: Vec<Attribute>,
        ctx: &Context,
    ) -> Result<Self, DatabaseError> {
        Ok(Self {
            sort: ExternalSort::new(base, groups, Direction::Asc, ctx)?,
        })
    }

    pub fn groups(&self) -> &[Attribute] {
        self.sort.keys()
    }
}

impl<File: FileOperations> OrderBy<File> {
    pub fn new(
        base: Plan<File>,
        keys: Vec<Attribute>,
        direction: Direction,
        ctx: &Context,
    ) -> Result<Self, DatabaseError> {
        let keys = match keys.is_empty() {
            true => base.schema().attributes().to_vec(),
            false => keys,
        };

        Ok(Self {
            sort: ExternalSort::new(base, keys, direction, ctx)?,
        })
    }

    pub fn keys(&self) -> &[Attribute] {
        self.sort.keys()
    }
}

/// Operators that are nothing but their sort as far as the protocol goes.
macro_rules! delegate_to_sort {
    ($($operator:ident),+) => {
        $(
            impl<File: PlanExecutor> Operator for $operator<File> {
                fn open(&mut self) -> Result<(), DatabaseError> {
                    self.sort.open()
                }

                fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
                    self.sort.next()
                }

                fn close(&mut self) -> Result<(), DatabaseError> {
                    self.sort.close()
                }

                fn schema(&self) -> &Schema {
                    self.sort.output_schema()
                }
            }
        )+
    };
}

delegate_to_sort!(GroupBy, OrderBy);

impl<File: FileOperations> Display for Distinct<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Distinct")
    }
}

impl<File: FileOperations> Display for GroupBy<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupBy {}", join_attributes(self.sort.keys()))
    }
}

impl<File: FileOperations> Display for OrderBy<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OrderBy {} {}",
            join_attributes(self.sort.keys()),
            self.sort.direction()
        )
    }
}
