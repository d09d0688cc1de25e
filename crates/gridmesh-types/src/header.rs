use crate::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Announcement record for a task living somewhere in the network.
///
/// `ttl` counts down against wall-clock time on every registry sweep; a
/// header whose ttl reaches zero is removed. `last_checked` is the sweep
/// bookkeeping mark, not part of the announcement itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHeader {
    pub id: TaskId,
    pub owner_address: IpAddr,
    pub owner_port: u16,
    pub ttl: Duration,
    pub last_checked: DateTime<Utc>,
    pub subtask_timeout: Duration,
    /// Total size of the task's input resources in bytes.
    pub resource_size: u64,
    /// Memory the owner estimates one unit range needs, in bytes.
    pub estimated_memory: u64,
}

impl TaskHeader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TaskId,
        owner_address: IpAddr,
        owner_port: u16,
        ttl: Duration,
        subtask_timeout: Duration,
        resource_size: u64,
        estimated_memory: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_address,
            owner_port,
            ttl,
            last_checked: now,
            subtask_timeout,
            resource_size,
            estimated_memory,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.ttl.is_zero()
    }
}
