//! Query operators and the machinery around them.

mod buffer;
mod comparator;
mod cost;
mod join;
mod planner;
mod sort;
mod sorted;

pub use buffer::BufferManager;
pub use comparator::{Direction, TupleComparator};
pub use cost::{CostEstimator, CostModel, Estimate};
pub use join::{JoinBuilder, SortMergeJoin};
pub use planner::{Operator, Plan, PlanExecutor, Project, Scan, Select, Status};
pub use sort::{ExternalSort, SortBuilder};
pub use sorted::{Distinct, GroupBy, OrderBy};
