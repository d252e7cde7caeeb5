//! External merge sort bounded by a number of memory pages.
//!
//! Sorting happens entirely inside [`Operator::open`] in two phases:
//!
//! 1. Run generation: the input is consumed `B` pages at a time, every batch
//!    is sorted in memory and written to its own run (pass 0).
//! 2. Merging: consecutive groups of at most `B - 1` runs are merged into one
//!    run of the next pass, using one input page per run and one output page,
//!    until a single run remains.
//!
//! [`Operator::next`] then streams the final run page by page.

use std::{cmp::Ordering, fmt::Display, io};

use crate::{
    core::storage::{
        io::FileOperations,
        page::Page,
        run::{Run, RunNamespace, RunReader},
        tuple::Tuple,
    },
    db::{Attribute, ConfigError, Context, DatabaseError, Schema},
    debug, error,
    vm::{
        comparator::{Direction, TupleComparator},
        planner::{join_attributes, Operator, Plan, PlanExecutor, Status},
    },
};

#[derive(Debug)]
pub struct ExternalSort<File: FileOperations> {
    base: Box<Plan<File>>,
    schema: Schema,
    keys: Vec<Attribute>,
    comparator: TupleComparator,
    buffers: usize,
    page_size: usize,
    capacity: usize,
    namespace: RunNamespace,
    output: Option<RunReader<File>>,
    status: Status,
    runs: usize,
    merge_passes: usize,
}

#[derive(Debug)]
pub struct SortBuilder<File: FileOperations> {
    pub base: Plan<File>,
    pub keys: Vec<Attribute>,
    pub direction: Direction,
    pub buffers: usize,
    pub page_size: usize,
    pub namespace: RunNamespace,
}

/// Number of runs merged together by every merge step.
///
/// One page is kept for output, the rest read one run each. A budget of two
/// pages still merges pairs of runs so that every pass shrinks the run count,
/// which holds three pages at once and goes one page over that budget.
pub(crate) fn fan_in(buffers: usize) -> usize {
    usize::max(buffers.saturating_sub(1), 2)
}

impl<File: FileOperations> TryFrom<SortBuilder<File>> for ExternalSort<File> {
    type Error = DatabaseError;

    fn try_from(value: SortBuilder<File>) -> Result<Self, Self::Error> {
        let SortBuilder {
            base,
            keys,
            direction,
            buffers,
            page_size,
            namespace,
        } = value;

        let schema = base.schema().clone();
        let indexes = keys
            .iter()
            .map(|key| schema.try_index_of(key))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            base: Box::new(base),
            schema,
            keys,
            comparator: TupleComparator::new(indexes, direction),
            buffers,
            page_size,
            capacity: 0,
            namespace,
            output: None,
            status: Status::Created,
            runs: 0,
            merge_passes: 0,
        })
    }
}

impl<File: FileOperations> ExternalSort<File> {
    /// Sorts the output of `base` on `keys`, with the buffers and page size of
    /// `ctx` and a run namespace of its own.
    pub fn new(
        base: Plan<File>,
        keys: Vec<Attribute>,
        direction: Direction,
        ctx: &Context,
    ) -> Result<Self, DatabaseError> {
        Self::try_from(SortBuilder {
            base,
            keys,
            direction,
            buffers: ctx.buffers(),
            page_size: ctx.page_size(),
            namespace: ctx.namespace(),
        })
    }

    pub fn keys(&self) -> &[Attribute] {
        &self.keys
    }

    pub fn direction(&self) -> Direction {
        self.comparator.direction()
    }

    pub fn buffers(&self) -> usize {
        self.buffers
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn namespace(&self) -> &RunNamespace {
        &self.namespace
    }

    /// Runs written by the last run generation phase.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Passes over the data of the last sort, run generation included.
    pub fn passes(&self) -> usize {
        match self.runs {
            0 => 0,
            _ => 1 + self.merge_passes,
        }
    }

    pub(in crate::vm) fn base(&self) -> &Plan<File> {
        &self.base
    }

    pub(in crate::vm) fn output_schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn assign_buffers(&mut self, buffers: usize) {
        self.buffers = buffers;
        self.base.assign_buffers(buffers);
    }

    /// Index of the page whose first tuple comes first, earlier pages win ties.
    fn find_min_index(&self, heads: &[Page]) -> Option<usize> {
        let mut min = heads.iter().position(|page| !page.is_empty())?;

        (min + 1..)
            .zip(&heads[min + 1..])
            .for_each(|(idx, page)| {
                if let (Some(tuple), Some(current)) = (page.front(), heads[min].front()) {
                    if self.comparator.cmp(tuple, current) == Ordering::Less {
                        min = idx;
                    }
                }
            });

        Some(min)
    }
}

impl<File: PlanExecutor> ExternalSort<File> {
    fn generate_runs(&mut self) -> Result<Vec<Run<File>>, DatabaseError> {
        let limit = self.buffers * self.capacity;
        let mut batch = Vec::with_capacity(limit);
        let mut runs = Vec::new();

        while let Some(page) = self.base.next()? {
            for tuple in page {
                batch.push(tuple);

                if batch.len() == limit {
                    runs.push(self.sorted_run(&mut batch, runs.len())?);
                }
            }
        }

        if !batch.is_empty() {
            runs.push(self.sorted_run(&mut batch, runs.len())?);
        }

        Ok(runs)
    }

    /// Sorts `batch` in memory and writes it to run `index` of pass 0.
    fn sorted_run(
        &self,
        batch: &mut Vec<Tuple>,
        index: usize,
    ) -> Result<Run<File>, DatabaseError> {
        batch.sort_by(|tuple, other| self.comparator.cmp(tuple, other));

        let mut run = Run::create(&self.namespace, 0, index)?;
        let mut page = Page::new(self.capacity);

        for tuple in batch.drain(..) {
            page.push(tuple);

            if page.is_full() {
                run.append(&page, &self.schema)?;
                page.clear();
            }
        }
        run.append(&page, &self.schema)?;

        Ok(run)
    }

    /// Merges `runs` pass after pass until at most one is left.
    fn merge_runs(
        &mut self,
        mut runs: Vec<Run<File>>,
    ) -> Result<Option<Run<File>>, DatabaseError> {
        let fan_in = fan_in(self.buffers);
        let mut pass = 0;

        while runs.len() > 1 {
            pass += 1;
            let mut merged = Vec::with_capacity(runs.len().div_ceil(fan_in));
            let mut remaining = runs.into_iter().peekable();

            while remaining.peek().is_some() {
                let group: Vec<_> = remaining.by_ref().take(fan_in).collect();

                match group.len() {
                    // nothing to merge it with, carried over as is
                    1 => merged.extend(group),
                    _ => merged.push(self.merge_group(group, pass, merged.len())?),
                }
            }

            debug!(
                "sort {} pass {pass} merged runs into {}",
                self.namespace.token(),
                merged.len()
            );
            runs = merged;
        }

        self.merge_passes = pass;

        Ok(runs.pop())
    }

    fn merge_group(
        &self,
        group: Vec<Run<File>>,
        pass: usize,
        index: usize,
    ) -> Result<Run<File>, DatabaseError> {
        let mut readers = group
            .into_iter()
            .map(Run::reader)
            .collect::<io::Result<Vec<_>>>()?;

        let mut heads = Vec::with_capacity(readers.len());
        for reader in &mut readers {
            let mut page = Page::new(self.capacity);
            reader.fill(&mut page, &self.schema)?;
            heads.push(page);
        }

        let mut output = Run::create(&self.namespace, pass, index)?;
        let mut page = Page::new(self.capacity);

        while let Some(min) = self.find_min_index(&heads) {
            if let Some(tuple) = heads[min].pop_front() {
                page.push(tuple);
            }

            if heads[min].is_empty() {
                readers[min].fill(&mut heads[min], &self.schema)?;
            }

            if page.is_full() {
                output.append(&page, &self.schema)?;
                page.clear();
            }
        }
        output.append(&page, &self.schema)?;

        for reader in readers {
            reader.discard()?;
        }

        Ok(output)
    }
}

impl<File: PlanExecutor> Operator for ExternalSort<File> {
    fn open(&mut self) -> Result<(), DatabaseError> {
        self.status.ensure_created("External Sort")?;

        if self.buffers == 0 {
            return Err(ConfigError::NoBuffers.into());
        }
        self.capacity = self.schema.page_capacity(self.page_size)?;

        self.base.open()?;
        let runs = self.generate_runs()?;
        self.base.close()?;

        self.runs = runs.len();
        debug!(
            "sort {} generated {} runs with {} buffers",
            self.namespace.token(),
            runs.len(),
            self.buffers
        );

        if runs.len() > 1 && self.buffers < 2 {
            return Err(ConfigError::InsufficientBuffers {
                buffers: self.buffers,
                runs: runs.len(),
            }
            .into());
        }

        let output = self.merge_runs(runs)?;
        if let Some(run) = &output {
            debug!(
                "sort {} wrote {} tuples in {} pages after {} passes",
                self.namespace.token(),
                run.tuples(),
                run.pages(),
                self.passes()
            );
        }

        self.output = output.map(Run::reader).transpose()?;
        self.status = Status::Open;

        Ok(())
    }

    fn next(&mut self) -> Result<Option<Page>, DatabaseError> {
        self.status.ensure_open("External Sort")?;

        let mut page = Page::new(self.capacity);
        let filled = match self.output.as_mut() {
            Some(reader) => reader.fill(&mut page, &self.schema)?,
            None => false,
        };

        if !filled {
            self.status = Status::Exhausted;
            return Ok(None);
        }

        Ok(Some(page))
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        if self.status == Status::Closed {
            return Ok(());
        }
        self.status = Status::Closed;

        let base = self.base.close();
        let output = self.output.take().map(RunReader::discard).transpose();

        if let Err(e) = &output {
            error!("failed to delete sorted run of {}: {e}", self.namespace.token());
        }

        base?;
        output?;

        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl<File: FileOperations> Display for ExternalSort<File> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "External Sort by {} {}",
            join_attributes(&self.keys),
            self.direction()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::random::Rng,
        db::{Config, Type},
        tuple,
        vm::planner::Scan,
    };
    use std::io::Cursor;

    type MemSort = ExternalSort<Cursor<Vec<u8>>>;

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::new("nums", "key", Type::Int),
            Attribute::new("nums", "seq", Type::Int),
        ])
    }

    fn key() -> Attribute {
        Attribute::new("nums", "key", Type::Int)
    }

    /// 8 bytes per tuple, 4 tuples per 32 byte page.
    fn context(buffers: usize) -> Context {
        Context::new(Config::default().with_page_size(32).with_buffers(buffers))
    }

    /// Random keys in a small domain so there are plenty of duplicates,
    /// `seq` records the input position.
    fn input(len: usize, seed: u64) -> Vec<Tuple> {
        let mut rng = Rng::with_seed(seed);
        (0..len as i32).map(|seq| tuple![rng.i32(0..20), seq]).collect()
    }

    fn sort(
        tuples: Vec<Tuple>,
        direction: Direction,
        ctx: &Context,
    ) -> Result<MemSort, DatabaseError> {
        let scan = Plan::Scan(Scan::new("nums", schema(), tuples, ctx));
        ExternalSort::new(scan, vec![key()], direction, ctx)
    }

    fn drain(sort: &mut MemSort) -> Result<Vec<Tuple>, DatabaseError> {
        sort.open()?;
        let mut output = Vec::new();
        while let Some(page) = sort.next()? {
            assert!(page.len() <= 4);
            output.extend(page);
        }
        sort.close()?;

        Ok(output)
    }

    fn expected(mut tuples: Vec<Tuple>, direction: Direction) -> Vec<Tuple> {
        let comparator = TupleComparator::new(vec![0], direction);
        tuples.sort_by(|a, b| comparator.cmp(a, b));
        tuples
    }

    #[test]
    fn test_sort_with_every_budget() -> Result<(), DatabaseError> {
        // 25 input pages
        let tuples = input(100, 42);

        for buffers in 2..=25 {
            let mut sort = sort(tuples.clone(), Direction::Asc, &context(buffers))?;
            let output = drain(&mut sort)?;

            assert_eq!(output, expected(tuples.clone(), Direction::Asc), "B = {buffers}");
            assert_eq!(sort.runs(), 25_usize.div_ceil(buffers));
        }

        Ok(())
    }

    #[test]
    fn test_shuffled_permutation() -> Result<(), DatabaseError> {
        let mut tuples: Vec<Tuple> = (0..60).map(|n| tuple![n, n]).collect();
        Rng::with_seed(11).shuffle(&mut tuples);

        let output = drain(&mut sort(tuples, Direction::Asc, &context(3))?)?;

        assert_eq!(output, (0..60).map(|n| tuple![n, n]).collect::<Vec<_>>());

        Ok(())
    }

    #[test]
    fn test_number_of_passes() -> Result<(), DatabaseError> {
        let tuples = input(100, 7);

        for (buffers, passes) in [(25, 1), (6, 2), (5, 3), (3, 5), (2, 5)] {
            let mut sort = sort(tuples.clone(), Direction::Asc, &context(buffers))?;
            drain(&mut sort)?;

            assert_eq!(sort.passes(), passes, "B = {buffers}");
        }

        Ok(())
    }

    #[test]
    fn test_descending_is_stable() -> Result<(), DatabaseError> {
        let tuples = input(64, 3);
        let mut sort = sort(tuples.clone(), Direction::Desc, &context(3))?;

        let output = drain(&mut sort)?;

        // stable: equal keys keep their input order
        assert_eq!(output, expected(tuples, Direction::Desc));
        assert!(output
            .windows(2)
            .filter(|pair| pair[0][0] == pair[1][0])
            .all(|pair| pair[0][1] < pair[1][1]));

        Ok(())
    }

    #[test]
    fn test_sorting_sorted_input_is_idempotent() -> Result<(), DatabaseError> {
        let ctx = context(3);
        let once = drain(&mut sort(input(50, 11), Direction::Asc, &ctx)?)?;
        let twice = drain(&mut sort(once.clone(), Direction::Asc, &ctx)?)?;

        assert_eq!(once, twice);

        Ok(())
    }

    #[test]
    fn test_empty_input() -> Result<(), DatabaseError> {
        let mut sort = sort(vec![], Direction::Asc, &context(3))?;

        assert_eq!(drain(&mut sort)?, vec![]);
        assert_eq!(sort.runs(), 0);

        Ok(())
    }

    #[test]
    fn test_budget_validation() -> Result<(), DatabaseError> {
        let mut none = sort(input(4, 1), Direction::Asc, &context(0))?;
        assert!(matches!(
            none.open(),
            Err(DatabaseError::Config(ConfigError::NoBuffers))
        ));

        // a single run needs no merge
        let mut single = sort(input(4, 1), Direction::Asc, &context(1))?;
        assert_eq!(drain(&mut single)?.len(), 4);

        let mut many = sort(input(12, 1), Direction::Asc, &context(1))?;
        assert!(matches!(
            many.open(),
            Err(DatabaseError::Config(ConfigError::InsufficientBuffers { buffers: 1, runs: 3 }))
        ));

        Ok(())
    }

    #[test]
    fn test_unknown_key() {
        let ctx = context(3);
        let scan = Plan::Scan(Scan::new("nums", schema(), vec![], &ctx));

        assert!(matches!(
            MemSort::new(scan, vec![Attribute::new("t", "key", Type::Int)], Direction::Asc, &ctx),
            Err(DatabaseError::Config(ConfigError::UnknownAttribute(_)))
        ));
    }
}
