//! Equi-join of two inputs sorted on their join keys.
//!
//! Both children are wrapped in ascending [`ExternalSort`]s keyed by the
//! attributes of the join conditions. The merge then walks both sorted streams
//! once: the right side is grouped into partitions of tuples sharing one key
//! and every left tuple with that key is paired with the whole partition.

use std::{cmp::Ordering, fmt::Display};

use crate::{
    core::storage::{io::FileOperations, page::Page, run::RunNamespace, tuple::Tuple},
    db::{Condition, ConfigError, Context, DatabaseError, Schema},
    vm::{
        comparator::Direction,
        planner::{Operator, Plan, PlanExecutor, Status},
        sort::{ExternalSort, SortBuilder},
    },
    warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinState {
    /// The current left tuple was consumed, fetch the next one.
    NeedLeft,
    /// Find the right partition whose key matches the current left tuple.
    NeedRightPartition,
    /// Pairing the current left tuple with the partition.
    Emitting,
    Exhausted,
}

#[derive(Debug)]
pub struct SortMergeJoin<File: FileOperations> {
    pub(in crate::vm) left: ExternalSort<File>,
    pub(in crate::vm) right: ExternalSort<File>,
    conditions: Vec<Condition>,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    schema: Schema,
    page_size: usize,
    capacity: usize,
    state: JoinState,
    status: Status,
    left_page: Page,
    left_done: bool,
    current: Option<Tuple>,
    right_page: Page,
    right_done: bool,
    lookahead: Option<Tuple>,
    partition: Vec<Tuple>,
    emitted: usize,
}

#[derive(Debug)]
pub struct JoinBuilder<File: FileOperations> {
    pub left: Plan<File>,
    pub right: Plan<File>,
    pub conditions: Vec<Condition>,
    pub buffers: usize,
    pub page_size: usize,
    pub left_namespace: RunNamespace,
    pub right_namespace: RunNamespace,
}

impl<File: FileOperations> TryFrom<JoinBuilder<File>> for SortMergeJoin<File> {
    type Error = DatabaseError;

    fn try_from(value: JoinBuilder<File>) -> Result<Self, Self::Error> {
        let JoinBuilder {
            left,
            right,
            conditions,
            buffers,
            page_size,
            left_namespace,
            right_namespace,
        } = value;

        if conditions.is_empty() {
            return Err(ConfigError::EmptyJoinKey.into());
        }

        let mut left_attrs = Vec::with_capacity(conditions.len());
        let mut right_attrs = Vec::with_capacity(conditions.len());
        let mut left_keys = Vec::with_capacity(conditions.len());
        let mut right_keys = Vec::with_capacity(conditions.len());

        for condition in &conditions {
            let Some(other) = condition.join_attribute() else {
                return Err(ConfigError::NonEquiJoin(condition.to_string()).into());
            };

            // conditions may name the right side first
            let (l, r) = match left.schema().index_of(&condition.left) {
                Some(_) => (&condition.left, other),
                None => (other, &condition.left),
            };

            left_keys.push(left.schema().try_index_of(l)?);
            right_keys.push(right.schema().try_index_of(r)?);

            if !l.data_type().is_comparable_with(&r.data_type()) {
                return Err(ConfigError::KeyTypeMismatch {
                    left: l.to_string(),
                    right: r.to_string(),
                }
                .into());
            }

            left_attrs.push(l.clone());
            right_attrs.push(r.clone());
        }

        let schema = left.schema().join(right.schema());

        let left = ExternalSort::try_from(SortBuilder {
            base: left,
            keys: left_attrs,
            direction: Direction::Asc,
            buffers,
            page_size,
            namespace: left_namespace,
        })?;

        let right = ExternalSort::try_from(SortBuilder {
            base: right,
            keys: right_attrs,
            direction: Direction::Asc,
            buffers,
            page_size,
            namespace: right_namespace,
        })?;

        Ok(Self {
            left,
            right,
            conditions,
            left_keys,
            right_keys,
            schema,
            page_size,
            capacity: 0,
            state: JoinState::NeedLeft,
            status: Status::Created,
            left_page: Page::new(0),
            left_done: false,
            current: None,
            right_page: Page::new(0),
            right_done: false,
            lookahead: None,
            partition: Vec::new(),
            emitted: 0,
        })
    }
}

impl<File: FileOperations> SortMergeJoin<File> {
    /// Joins `left` and `right` on the conjunction of `conditions`, every one
    /// of them an equality between an attribute of each side.
    pub fn new(
        left: Plan<File>,
        right: Plan<File>,
        conditions: Vec<Condition>,
        ctx: &Context,
    ) -> Result<Self, DatabaseError> {
        Self::try_from(JoinBuilder {
            left,
            right,
            conditions,
            buffers: ctx.buffers(),
            page_size: ctx.page_size(),
            left_namespace: ctx.namespace(),
            right_namespace: ctx.namespace(),
        })
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn left(&self) -> &ExternalSort<File> {
        &self.left
    }

    pub fn right(&self) -> &ExternalSort<File> {
        &self.right
    }

    pub(in crate::vm) fn output_schema(&self) -> &Schema {
        &self.schema
    }

    /// Key of the current left tuple against the key of a right tuple.
    fn cmp_left_right(&self, left: &Tuple, right: &Tuple) -> Ordering {
        left.compare(right, &self.left_keys, &self.right_keys)
    }

    fn same_right_key(&self, right: &Tuple, other: &Tuple) -> bool {
        right
            .compare(other, &self.right_keys, &self.right_keys)
            .is_eq()
    }
}

impl<File: PlanExecutor> SortMergeJoin<File> {
    fn next_left(&mut self) -> Result<Option<Tuple>, DatabaseError> {
        while self.left_page.is_empty() {
            if self.left_done {
                return Ok(None);
            }

            match self.left.next()? {
                Some(page) => self.left_page = page,
                None => self.left_done = true,
            }
        }

        Ok(self.left_page.pop_front())
    }

    fn next_right(&mut self) -> Result<Option<Tuple>, DatabaseError> {
        while self.right_page.is_empty() {
            if self.right_done {
                return Ok(None);
            }

            match self.right.next()? {
                Some(page) => self.right_page = page,
                None => self.right_done = true,
            }
        }

        Ok(self.right_page.pop_front())
    }

    /// Replaces the partition with the next group of right tuples sharing a
    /// key. Returns `false` when the right side has nothing left.
    fn build_partition(&mut self) -> Result<bool, DatabaseError> {
        self.partition.clear();

        let first = match self.lookahead.take() {
            Some(tuple) => tuple,
            None => match self.next_right()? {
                Some(tuple) => tuple,
                None => return Ok(false),
            },
        };
        self.partition.push(first);

        while let Some(tuple) = self.next_right()? {
            if !self.same_right_key(&tuple, &self.partition[0]) {
                self.lookahead = Some(tuple);
                break;
            }
            self.partition.push(tuple);
        }

        let limit = self.right.buffers() * self.right_page.capacity();
        if self.partition.len() > limit {
            warn!(
                "right partition of {} tuples exceeds the {} buffer pages of the join",
                self.partition.len(),
                self.right.buffers()
            );
        }

        Ok(true)
    }

    /// Advances the merge until `output` is full or both sides are done.
    fn probe(&mut self, output: &mut Page) -> Result<(), DatabaseError> {
        while !output.is_full() {
            match self.state {
                JoinState::NeedLeft => {
                    self.current = self.next_left()?;
                    self.emitted = 0;
                    self.state = match self.current {
                        Some(_) => JoinState::NeedRightPartition,
                        None => JoinState::Exhausted,
                    };
                }

                JoinState::NeedRightPartition => {
                    let Some(left) = self.current.as_ref() else {
                        self.state = JoinState::NeedLeft;
                        continue;
                    };

                    let ordering = match self.partition.first() {
                        Some(right) => self.cmp_left_right(left, right),
                        None => Ordering::Greater,
                    };

                    match ordering {
                        Ordering::Less => self.state = JoinState::NeedLeft,
                        Ordering::Equal => self.state = JoinState::Emitting,
                        Ordering::Greater => {
                            if !self.build_partition()? {
                                self.state = JoinState::Exhausted;
                            }
                        }
                    }
                }

                JoinState::Emitting => {
                    let Some(left) = self.current.as_ref() else {
                        self.state = JoinState::NeedLeft;
                        continue;
                    };

                    while self.emitted < self.partition.len() && !output.is_full() {
                        output.push(left.join(&self.partition[self.emitted]));
                        self.emitted += 1;
                    }

                    if self.emitted == self.partition.len() {
                        self.state = JoinState::NeedLeft;
                    }
                }

                JoinState::Exhausted => break,
            }
        }

        Ok(())
    }
}

impl<File: PlanExecutor> Operator for SortMergeJoin<File> {
    fn open(&mut self) -> Result<(), DatabaseError> {
        self.status.ensure_created("Sort-Merge Join")?;
        self.capacity = self.schema.page_capacity(self.page_size)?;

        self.left.open()?;
        self.right.open()?;

        self.state = JoinState::NeedLeft;
        self.status = Status::Open;

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
        self.status.ensure_open("Sort-Merge Join")?;

        let mut output = Page::new(self.capacity);
        self.probe(&mut output)?;

        if output.is_empty() {
            self.status = Status::Exhausted;
            return Ok(None);
        }

        Ok(Some(output))
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        if self.status == Status::Closed {
            return Ok(());
        }
        self.status = Status::Closed;

        self.partition.clear();
        self.left_page.clear();
        self.right_page.clear();
        self.current = None;
        self.lookahead = None;

        let left = self.left.close();
        let right = self.right.close();
        left?;
        right
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl<File: FileOperations> Display for SortMergeJoin<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conditions = self
            .conditions
            .iter()
            .map(Condition::to_string)
            .collect::<Vec<_>>()
            .join(" AND ");

        write!(f, "Sort-Merge Join on {conditions}")
    }
}
