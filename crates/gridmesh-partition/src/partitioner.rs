use crate::{PartitionError, Result};
use gridmesh_types::{TaskId, WorkUnitRange};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Below this many seconds of remaining budget the deadline is treated as
/// already blown and the preferred slice is used instead.
const MIN_TIME_SLICE_SECS: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct PartitionerConfig {
    /// Size of the unit space being partitioned.
    pub total_units: u64,
    /// Raw work per unit (e.g. samples per pixel). Must be at least 1.
    pub samples_per_unit: u32,
    /// Target wall-clock duration of one issued range.
    pub preferred_slice: Duration,
    /// Overall time budget for the task, measured from `start()`.
    pub deadline: Duration,
    /// Width of one unit's slot in the merged output buffer.
    pub unit_size_bytes: usize,
}

/// Counter snapshot for progress reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartitionStats {
    pub total_units: u64,
    pub units_left: u64,
    pub total_issued: u64,
    pub active_issued: u64,
    pub units_completed: u64,
}

#[derive(Debug)]
struct PartitionerState {
    units_left: u64,
    next_index: u64,
    next_range_id: u64,
    started_at: Option<Instant>,
    total_issued: u64,
    active_issued: u64,
    units_completed: u64,
    /// Ranges issued but not yet completed, by range id.
    outstanding: HashMap<u64, WorkUnitRange>,
    output: Vec<u8>,
}

/// Splits one task's unit space into ranges sized to each caller's reported
/// throughput and merges completed results into a shared output buffer.
///
/// All mutation happens under a single mutex, so ranges stay disjoint and
/// contiguous under any concurrent call pattern. Nothing here blocks on I/O;
/// the actual computation of a range happens entirely outside the lock.
#[derive(Debug)]
pub struct WorkPartitioner {
    task_id: TaskId,
    config: PartitionerConfig,
    state: Mutex<PartitionerState>,
}

impl WorkPartitioner {
    pub fn new(task_id: TaskId, config: PartitionerConfig) -> Self {
        debug_assert!(config.samples_per_unit >= 1);
        let output = vec![0u8; config.total_units as usize * config.unit_size_bytes];
        Self {
            task_id,
            state: Mutex::new(PartitionerState {
                units_left: config.total_units,
                next_index: 0,
                next_range_id: 0,
                started_at: None,
                total_issued: 0,
                active_issued: 0,
                units_completed: 0,
                outstanding: HashMap::new(),
                output,
            }),
            config,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Starts the deadline clock. Calling again resets it; callers are
    /// expected to start each task instance exactly once.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.started_at.is_some() {
            warn!(task_id = %self.task_id, "deadline clock reset by repeated start");
        }
        state.started_at = Some(Instant::now());
        info!(
            task_id = %self.task_id,
            total_units = self.config.total_units,
            samples_per_unit = self.config.samples_per_unit,
            deadline_secs = self.config.deadline.as_secs(),
            "🎬 Partitioner started"
        );
    }

    /// Issues the next unit range, sized to `estimated_throughput` (raw work
    /// per second, e.g. samples/second) and the remaining time budget.
    ///
    /// Returns `Ok(None)` once every unit has been dispatched; that is the
    /// normal end-of-task signal, not an error. While units remain the
    /// returned range always covers at least one unit, however small the
    /// reported throughput.
    pub async fn next_range(&self, estimated_throughput: f64) -> Result<Option<WorkUnitRange>> {
        if estimated_throughput <= 0.0 {
            return Err(PartitionError::InvalidThroughput(estimated_throughput));
        }

        let mut state = self.state.lock().await;
        let started_at = state.started_at.ok_or(PartitionError::NotStarted)?;

        if state.units_left == 0 {
            return Ok(None);
        }

        let time_left = self.config.deadline.as_secs_f64() - started_at.elapsed().as_secs_f64();
        let mut time_slice = self.config.preferred_slice.as_secs_f64().min(time_left);
        if time_slice <= MIN_TIME_SLICE_SECS {
            // Past the nominal deadline work keeps flowing; what to do with
            // an overrun task is the caller's call, not the partitioner's.
            time_slice = self.config.preferred_slice.as_secs_f64();
        }

        let raw =
            (estimated_throughput / self.config.samples_per_unit as f64 * time_slice).floor() as u64;
        let count = raw.clamp(1, state.units_left);

        let range = WorkUnitRange {
            task_id: self.task_id.clone(),
            range_id: state.next_range_id,
            start: state.next_index,
            count,
            samples_per_unit: self.config.samples_per_unit,
        };

        state.next_index += count;
        state.units_left -= count;
        state.next_range_id += 1;
        state.total_issued += 1;
        state.active_issued += 1;
        state.outstanding.insert(range.range_id, range.clone());

        debug!(
            task_id = %self.task_id,
            range_id = range.range_id,
            start = range.start,
            count = range.count,
            units_left = state.units_left,
            "Issued unit range"
        );

        Ok(Some(range))
    }

    /// Merges a completed range's result into the output buffer.
    ///
    /// Distinct ranges write disjoint slices of the buffer, so concurrent
    /// completions never touch the same byte; the counters are what the
    /// mutex is really protecting here.
    pub async fn range_completed(&self, range: &WorkUnitRange, result: &[u8]) -> Result<()> {
        let expected = range.count as usize * self.config.unit_size_bytes;
        if result.len() != expected {
            return Err(PartitionError::ResultSizeMismatch {
                range_id: range.range_id,
                expected,
                actual: result.len(),
            });
        }

        let mut state = self.state.lock().await;
        match state.outstanding.get(&range.range_id) {
            Some(issued) if issued.start == range.start && issued.count == range.count => {}
            _ => return Err(PartitionError::UnknownRange(range.range_id)),
        }
        state.outstanding.remove(&range.range_id);

        let offset = range.start as usize * self.config.unit_size_bytes;
        state.output[offset..offset + expected].copy_from_slice(result);
        state.active_issued -= 1;
        state.units_completed += range.count;

        debug!(
            task_id = %self.task_id,
            range_id = range.range_id,
            units_completed = state.units_completed,
            "Range completed"
        );

        if state.units_completed == self.config.total_units {
            info!(
                task_id = %self.task_id,
                total_issued = state.total_issued,
                "✅ All unit ranges completed"
            );
        }

        Ok(())
    }

    pub async fn is_finished(&self) -> bool {
        let state = self.state.lock().await;
        state.units_completed == self.config.total_units
    }

    pub async fn progress(&self) -> f64 {
        if self.config.total_units == 0 {
            return 1.0;
        }
        let state = self.state.lock().await;
        state.units_completed as f64 / self.config.total_units as f64
    }

    pub async fn stats(&self) -> PartitionStats {
        let state = self.state.lock().await;
        PartitionStats {
            total_units: self.config.total_units,
            units_left: state.units_left,
            total_issued: state.total_issued,
            active_issued: state.active_issued,
            units_completed: state.units_completed,
        }
    }

    /// Snapshot of the merged output buffer. Meaningful once
    /// `is_finished()`; callers polling earlier see zeroes in slots whose
    /// ranges are still outstanding.
    pub async fn output(&self) -> Vec<u8> {
        let state = self.state.lock().await;
        state.output.clone()
    }

    /// Takes the merged output buffer without copying, leaving an empty one
    /// behind. For handing the finished result off to the delivery path.
    pub async fn take_output(&self) -> Vec<u8> {
        let mut state = self.state.lock().await;
        std::mem::take(&mut state.output)
    }
}
