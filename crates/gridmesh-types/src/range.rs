use crate::TaskId;
use serde::{Deserialize, Serialize};

/// One issued slice of a task's unit space.
///
/// Immutable once issued. Ranges from a single partitioner are disjoint and
/// contiguous in issue order; together they cover the whole unit space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnitRange {
    pub task_id: TaskId,
    /// Issue-order sequence number, unique within one partitioner.
    pub range_id: u64,
    pub start: u64,
    pub count: u64,
    pub samples_per_unit: u32,
}

impl WorkUnitRange {
    /// One past the last unit index covered by this range.
    pub fn end(&self) -> u64 {
        self.start + self.count
    }
}
