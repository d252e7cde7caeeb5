//! Estimates of the cardinality and I/O cost of a plan.
//!
//! Costs are counted in page reads and writes. Selections and projections are
//! evaluated on the fly and cost nothing, while every sort reads and writes its
//! input once per pass.

use std::{collections::HashMap, path::Path};

use crate::{
    core::storage::io::FileOperations,
    db::{
        Attribute, CompareOp, ConfigError, DatabaseError, Operand, Schema, TableStatistics,
    },
    vm::{
        join::SortMergeJoin,
        planner::{Operator, Plan, Project, Scan, Select},
        sort::{fan_in, ExternalSort},
        sorted::{Distinct, GroupBy, OrderBy},
    },
};

/// Estimated output of a plan node and the cost of producing it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Estimate {
    pub rows: u64,
    /// Page I/Os of the whole subtree, infinite when it can't run at all.
    pub cost: f64,
    /// Distinct values of every output attribute, by qualified name.
    pub distinct: HashMap<String, u64>,
}

/// Statistics of the base tables a plan scans.
#[derive(Debug, Clone, Default)]
pub struct CostModel {
    tables: HashMap<String, TableStatistics>,
}

pub trait CostEstimator {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError>;
}

impl Estimate {
    pub fn distinct_of(&self, attribute: &Attribute) -> Option<u64> {
        self.distinct.get(&attribute.qualified_name()).copied()
    }

    pub fn is_feasible(&self) -> bool {
        self.cost.is_finite()
    }

    /// Distinct values of `attribute`, assuming all of them are when unknown.
    fn distinct_or_rows(&self, attribute: &Attribute) -> u64 {
        self.distinct_of(attribute).unwrap_or(self.rows).max(1)
    }

    /// No attribute can have more distinct values than there are rows.
    fn cap_distinct(&mut self) {
        let rows = self.rows;
        self.distinct.values_mut().for_each(|d| *d = (*d).min(rows));
    }
}

impl CostModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statistics(mut self, table: impl Into<String>, stats: TableStatistics) -> Self {
        self.tables.insert(table.into(), stats);
        self
    }

    /// Reads `dir/{table}.stat` for `table`.
    pub fn load_statistics(
        &mut self,
        dir: impl AsRef<Path>,
        table: &str,
        schema: &Schema,
    ) -> Result<(), DatabaseError> {
        let path = dir.as_ref().join(format!("{table}.stat"));
        let stats = TableStatistics::read_from(path, schema)?;
        self.tables.insert(table.to_string(), stats);

        Ok(())
    }

    pub fn statistics(&self, table: &str) -> Option<&TableStatistics> {
        self.tables.get(table)
    }
}

/// Pages needed to hold `rows` tuples of `schema`.
fn pages(rows: u64, schema: &Schema, page_size: usize) -> Result<u64, DatabaseError> {
    let capacity = schema.page_capacity(page_size)? as u64;
    Ok(rows.div_ceil(capacity))
}

/// Passes of an external sort over `pages` pages with `buffers` pages of
/// memory, `None` when the budget can't sort them at all.
fn sort_passes(pages: u64, buffers: usize) -> Option<u64> {
    if pages == 0 {
        return Some(0);
    }
    if buffers == 0 {
        return None;
    }

    let mut runs = pages.div_ceil(buffers as u64);
    if runs > 1 && buffers < 2 {
        return None;
    }

    let fan_in = fan_in(buffers) as u64;
    let mut passes = 1;
    while runs > 1 {
        runs = runs.div_ceil(fan_in);
        passes += 1;
    }

    Some(passes)
}

/// I/O of sorting `rows` tuples: every pass reads and writes every page.
fn sort_cost<File: FileOperations>(
    sort: &ExternalSort<File>,
    rows: u64,
) -> Result<f64, DatabaseError> {
    let pages = pages(rows, sort.output_schema(), sort.page_size())?;

    Ok(match sort_passes(pages, sort.buffers()) {
        Some(passes) => (2 * pages * passes) as f64,
        None => f64::INFINITY,
    })
}

impl CostEstimator for Scan {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        let stats = model
            .statistics(self.table())
            .ok_or_else(|| ConfigError::MissingStatistics(self.table().to_string()))?;

        let schema = Operator::schema(self);
        let distinct = schema
            .attributes()
            .iter()
            .zip(&stats.distinct)
            .map(|(attr, &d)| (attr.qualified_name(), d))
            .collect();

        let mut estimate = Estimate {
            rows: stats.rows,
            cost: pages(stats.rows, schema, self.page_size())? as f64,
            distinct,
        };
        estimate.cap_distinct();

        Ok(estimate)
    }
}

impl<File: FileOperations> CostEstimator for Select<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        let mut estimate = self.source.estimate(model)?;
        let condition = self.condition();
        let input = estimate.rows as f64;

        let distinct = match &condition.right {
            Operand::Attribute(attr) => estimate
                .distinct_or_rows(&condition.left)
                .max(estimate.distinct_or_rows(attr)),
            Operand::Literal(_) => estimate.distinct_or_rows(&condition.left),
        } as f64;

        estimate.rows = match condition.op {
            CompareOp::Eq => (input / distinct).ceil(),
            CompareOp::Ne => (input - input / distinct).ceil(),
            _ => (0.5 * input).ceil(),
        } as u64;
        estimate.cap_distinct();

        Ok(estimate)
    }
}

impl<File: FileOperations> CostEstimator for Project<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        let mut estimate = self.source.estimate(model)?;
        let schema = self.output_schema();

        estimate
            .distinct
            .retain(|name, _| schema.attributes().iter().any(|a| a.qualified_name() == *name));

        Ok(estimate)
    }
}

impl<File: FileOperations> CostEstimator for ExternalSort<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        let mut estimate = self.base().estimate(model)?;
        estimate.cost += sort_cost(self, estimate.rows)?;

        Ok(estimate)
    }
}

impl<File: FileOperations> CostEstimator for GroupBy<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        self.sort.estimate(model)
    }
}

impl<File: FileOperations> CostEstimator for OrderBy<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        self.sort.estimate(model)
    }
}

impl<File: FileOperations> CostEstimator for Distinct<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        let mut estimate = self.sort.estimate(model)?;

        let mut combinations: u64 = 1;
        for attr in self.sort.output_schema().attributes() {
            combinations = combinations.saturating_mul(estimate.distinct_or_rows(attr));
            if combinations >= estimate.rows {
                break;
            }
        }

        estimate.rows = estimate.rows.min(combinations);
        estimate.cap_distinct();

        Ok(estimate)
    }
}

impl<File: FileOperations> CostEstimator for SortMergeJoin<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        let (l, r) = (self.left(), self.right());
        let left = l.base().estimate(model)?;
        let right = r.base().estimate(model)?;

        let left_pages = pages(left.rows, l.output_schema(), l.page_size())?;
        let right_pages = pages(right.rows, r.output_schema(), r.page_size())?;

        let cost = left.cost
            + right.cost
            + sort_cost(l, left.rows)?
            + sort_cost(r, right.rows)?
            + (left_pages + right_pages) as f64;

        let mut distinct = left.distinct.clone();
        distinct.extend(right.distinct.iter().map(|(k, v)| (k.clone(), *v)));

        let mut rows = left.rows as f64 * right.rows as f64;
        for (lkey, rkey) in l.keys().iter().zip(r.keys()) {
            let (dl, dr) = (left.distinct_or_rows(lkey), right.distinct_or_rows(rkey));
            rows /= dl.max(dr) as f64;

            distinct.insert(lkey.qualified_name(), dl.min(dr));
            distinct.insert(rkey.qualified_name(), dl.min(dr));
        }

        let mut estimate = Estimate {
            rows: rows.ceil() as u64,
            cost,
            distinct,
        };
        estimate.cap_distinct();

        Ok(estimate)
    }
}

impl<File: FileOperations> CostEstimator for Plan<File> {
    fn estimate(&self, model: &CostModel) -> Result<Estimate, DatabaseError> {
        match self {
            Self::Scan(scan) => scan.estimate(model),
            Self::Select(select) => select.estimate(model),
            Self::Project(project) => project.estimate(model),
            Self::Join(join) => join.estimate(model),
            Self::Sort(sort) => sort.estimate(model),
            Self::GroupBy(group) => group.estimate(model),
            Self::Distinct(distinct) => distinct.estimate(model),
            Self::OrderBy(order) => order.estimate(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{Condition, Config, Context, Type},
        vm::{BufferManager, Direction},
    };
    use std::io::Cursor;

    type MemPlan = Plan<Cursor<Vec<u8>>>;

    fn flights() -> Schema {
        Schema::new(vec![
            Attribute::new("flights", "id", Type::Int),
            Attribute::new("flights", "plane", Type::Int),
        ])
    }

    fn planes() -> Schema {
        Schema::new(vec![
            Attribute::new("planes", "id", Type::Int),
            Attribute::new("planes", "model", Type::String).with_byte_size(8),
        ])
    }

    fn model() -> CostModel {
        CostModel::new()
            .with_statistics("flights", TableStatistics::new(1000, vec![1000, 50]))
            .with_statistics("planes", TableStatistics::new(100, vec![100, 10]))
    }

    /// 80 byte pages: 10 flights or 6 planes per page.
    fn context(buffers: usize) -> Context {
        Context::new(Config::default().with_page_size(80).with_buffers(buffers))
    }

    fn scan(table: &str, schema: Schema, ctx: &Context) -> MemPlan {
        Plan::Scan(Scan::new(table, schema, vec![], ctx))
    }

    #[test]
    fn test_sort_passes() {
        assert_eq!(sort_passes(0, 0), Some(0));
        assert_eq!(sort_passes(10, 0), None);
        assert_eq!(sort_passes(1, 1), Some(1));
        assert_eq!(sort_passes(2, 1), None);
        assert_eq!(sort_passes(100, 10), Some(3));
        assert_eq!(sort_passes(100, 101), Some(1));
        assert_eq!(sort_passes(100, 2), Some(7));
    }

    #[test]
    fn test_scan_and_select() -> Result<(), DatabaseError> {
        let ctx = context(4);
        let plane = Attribute::new("flights", "plane", Type::Int);

        let scan_estimate = scan("flights", flights(), &ctx).estimate(&model())?;
        assert_eq!((scan_estimate.rows, scan_estimate.cost), (1000, 100.0));

        let eq = Select::new(
            scan("flights", flights(), &ctx),
            Condition::literal(plane.clone(), CompareOp::Eq, 7),
        )?;
        let estimate = eq.estimate(&model())?;
        assert_eq!(estimate.rows, 20);
        assert_eq!(estimate.distinct_of(&Attribute::new("flights", "id", Type::Int)), Some(20));

        let ne = Select::new(
            scan("flights", flights(), &ctx),
            Condition::literal(plane.clone(), CompareOp::Ne, 7),
        )?;
        assert_eq!(ne.estimate(&model())?.rows, 980);

        let lt = Select::new(
            scan("flights", flights(), &ctx),
            Condition::literal(plane, CompareOp::Lt, 7),
        )?;
        assert_eq!(lt.estimate(&model())?.rows, 500);

        Ok(())
    }

    #[test]
    fn test_join_estimate() -> Result<(), DatabaseError> {
        let ctx = context(4);
        let condition = Condition::equals(
            Attribute::new("flights", "plane", Type::Int),
            Attribute::new("planes", "id", Type::Int),
        );
        let join = SortMergeJoin::new(
            scan("flights", flights(), &ctx),
            scan("planes", planes(), &ctx),
            vec![condition],
            &ctx,
        )?;

        let estimate = join.estimate(&model())?;

        // 1000 * 100 / max(50, 100)
        assert_eq!(estimate.rows, 1000);
        assert_eq!(
            estimate.distinct_of(&Attribute::new("planes", "id", Type::Int)),
            Some(50)
        );

        // scans: 100 + 17 pages
        // flights sort: 25 runs of 4 pages merged 3 at a time, 4 passes
        // planes sort: 5 runs, 3 passes
        // merge: 100 + 17 pages read once more
        assert_eq!(estimate.cost, 100.0 + 17.0 + 800.0 + 102.0 + 100.0 + 17.0);

        Ok(())
    }

    #[test]
    fn test_distinct_and_infeasible_budget() -> Result<(), DatabaseError> {
        let ctx = context(4);
        let project = Project::new(
            scan("flights", flights(), &ctx),
            &[Attribute::new("flights", "plane", Type::Int)],
        )?;
        let distinct = Distinct::new(Plan::from(project), &ctx)?;

        assert_eq!(distinct.estimate(&model())?.rows, 50);

        let mut order = Plan::from(OrderBy::new(
            scan("flights", flights(), &ctx),
            vec![],
            Direction::Asc,
            &ctx,
        )?);
        assert!(order.estimate(&model())?.is_feasible());

        BufferManager::allocate(&Config::default().with_buffers(1), &mut order);
        assert!(!order.estimate(&model())?.is_feasible());

        Ok(())
    }

    #[test]
    fn test_missing_statistics() {
        let ctx = context(4);
        let plan = scan("unknown", flights(), &ctx);

        assert!(matches!(
            plan.estimate(&model()),
            Err(DatabaseError::Config(ConfigError::MissingStatistics(_)))
        ));
    }
}
