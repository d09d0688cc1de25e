use gridmesh_types::TaskId;
use rand::Rng;

/// Strategy for picking which supported task to request work for next.
pub trait SelectionPolicy: Send + Sync {
    /// Returns an index into `supported`, or `None` to decline.
    fn choose(&self, supported: &[TaskId]) -> Option<usize>;
}

/// Default policy: uniform-random pick among the supported tasks.
pub struct UniformRandom;

impl SelectionPolicy for UniformRandom {
    fn choose(&self, supported: &[TaskId]) -> Option<usize> {
        if supported.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..supported.len()))
    }
}
