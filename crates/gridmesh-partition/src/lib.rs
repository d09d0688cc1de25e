//! Deadline- and throughput-aware slicing of a fixed-size unit space.
//!
//! One [`WorkPartitioner`] serves one task. Many workers pull ranges from it
//! concurrently; each range is sized so the reporting peer can finish it
//! within the preferred time slice, and the union of all issued ranges is a
//! disjoint, contiguous partition of `[0, total_units)`. Completed results
//! are merged into a shared output buffer at the offset the range implies.

pub mod error;
pub mod partitioner;

pub use error::{PartitionError, Result};
pub use partitioner::{PartitionStats, PartitionerConfig, WorkPartitioner};
