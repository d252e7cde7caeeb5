use crate::{
    core::storage::io::FileOperations,
    db::Config,
    info,
    vm::planner::Plan,
};

/// Splits the memory pages of a query between its sort-merge joins.
///
/// Every join gets `total / joins` pages (the whole budget when the plan has
/// no join) and every sort of the plan works with that share. The split only
/// depends on the shape of the plan and is done once, before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferManager {
    total: usize,
    joins: usize,
    per_join: usize,
}

impl BufferManager {
    pub fn new(total: usize, joins: usize) -> Self {
        let per_join = match joins {
            0 => total,
            joins => total / joins,
        };

        Self {
            total,
            joins,
            per_join,
        }
    }

    pub fn for_plan<File: FileOperations>(total: usize, plan: &Plan<File>) -> Self {
        Self::new(total, plan.joins())
    }

    /// Computes the share for `plan` out of the configured buffers and hands
    /// it to every sort in the tree.
    pub fn allocate<File: FileOperations>(config: &Config, plan: &mut Plan<File>) -> Self {
        let manager = Self::for_plan(config.buffers, plan);
        plan.assign_buffers(manager.per_join);

        info!(
            "{} buffer pages shared by {} joins, {} each",
            manager.total, manager.joins, manager.per_join
        );

        manager
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn joins(&self) -> usize {
        self.joins
    }

    pub fn per_join(&self) -> usize {
        self.per_join
    }
}
