use crate::policy::{SelectionPolicy, UniformRandom};
use crate::{RegistryError, Result};
use chrono::{DateTime, Utc};
use gridmesh_types::{SubtaskId, TaskHeader, TaskId};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a removed task id keeps blocking re-announcement.
    pub removed_task_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            removed_task_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub known_tasks: usize,
    pub supported_tasks: usize,
    pub active_tasks: usize,
    pub removed_markers: usize,
    pub pending_verifications: usize,
}

/// A task some peer has requested work for. Kept alive until its request
/// count drains *and* the header is gone, so a removal racing an
/// outstanding request cannot destroy the record twice.
struct ActiveTaskRecord {
    header: TaskHeader,
    active_requests: u32,
}

struct VerificationEntry {
    task_id: TaskId,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

/// All registry maps live behind one lock: every lifecycle transition
/// touches more than one of them and must be a single critical section.
struct RegistryState {
    headers: HashMap<TaskId, TaskHeader>,
    supported: Vec<TaskId>,
    removed: HashMap<TaskId, DateTime<Utc>>,
    active: HashMap<TaskId, ActiveTaskRecord>,
    verification: HashMap<SubtaskId, VerificationEntry>,
}

/// Tracks which tasks exist on the network, how many outstanding work
/// requests reference each, and which delivered subtasks still await
/// verification.
///
/// Mutators are short and CPU-bound; reporting reads hand out snapshot
/// copies so callers never hold the lock across I/O.
pub struct TaskRegistry {
    state: RwLock<RegistryState>,
    policy: Box<dyn SelectionPolicy>,
    config: RegistryConfig,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_policy(config, Box::new(UniformRandom))
    }

    pub fn with_policy(config: RegistryConfig, policy: Box<dyn SelectionPolicy>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                headers: HashMap::new(),
                supported: Vec::new(),
                removed: HashMap::new(),
                active: HashMap::new(),
                verification: HashMap::new(),
            }),
            policy,
            config,
        }
    }

    /// Adds an announced header. Returns `false` without error when the id
    /// is already known or was removed recently enough that re-announcing
    /// would flap; the first announcement for an id wins.
    pub async fn add_header(&self, header: TaskHeader, is_supported: bool) -> bool {
        let mut state = self.state.write().await;
        let id = header.id.clone();

        if state.headers.contains_key(&id) {
            debug!(task_id = %id, "Duplicate announcement ignored");
            return false;
        }
        if state.removed.contains_key(&id) {
            debug!(task_id = %id, "Announcement for recently removed task ignored");
            return false;
        }

        state.headers.insert(id.clone(), header);
        if is_supported {
            state.supported.push(id.clone());
        }

        info!(task_id = %id, is_supported, "📋 Task header added");
        true
    }

    /// Picks a supported task to compute for and counts the outstanding
    /// request against it, creating the active record on first reference.
    pub async fn get_task_for_computation(&self) -> Option<TaskHeader> {
        let mut state = self.state.write().await;

        let idx = self.policy.choose(&state.supported)?;
        let id = state.supported.get(idx)?.clone();
        let header = state.headers.get(&id)?.clone();

        let record = state
            .active
            .entry(id.clone())
            .or_insert_with(|| ActiveTaskRecord {
                header: header.clone(),
                active_requests: 0,
            });
        record.active_requests += 1;

        debug!(
            task_id = %id,
            active_requests = record.active_requests,
            "Task chosen for computation"
        );
        Some(header)
    }

    /// Removes a header and marks its id so re-announcements are rejected
    /// for the configured window. The active record survives while requests
    /// are outstanding; `receive_verification` purges it at drain time.
    pub async fn remove_header(&self, id: &TaskId, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        Self::remove_header_locked(&mut state, id, now);
    }

    fn remove_header_locked(state: &mut RegistryState, id: &TaskId, now: DateTime<Utc>) {
        state.headers.remove(id);
        state.supported.retain(|t| t != id);
        state.removed.insert(id.clone(), now);

        let drained = matches!(state.active.get(id), Some(record) if record.active_requests == 0);
        if drained {
            state.active.remove(id);
        }

        info!(task_id = %id, "🗑️ Task header removed");
    }

    /// Records a verification arriving for one of the task's outstanding
    /// requests. Purges the active record once the count drains and the
    /// header is already gone.
    pub async fn receive_verification(&self, id: &TaskId) -> Result<()> {
        let mut state = self.state.write().await;

        let remaining = {
            let record = state
                .active
                .get_mut(id)
                .ok_or_else(|| RegistryError::UnknownTask(id.clone()))?;
            record.active_requests = record.active_requests.saturating_sub(1);
            record.active_requests
        };

        if remaining == 0 && !state.headers.contains_key(id) {
            state.active.remove(id);
            debug!(task_id = %id, "Active task record purged");
        }
        Ok(())
    }

    /// Ages every header by the wall-clock elapsed since it was last
    /// checked and removes the ones whose ttl ran out; also forgets removed
    /// markers older than the anti-flapping window. Returns the expired
    /// ids so the caller can tear down any per-task machinery.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut state = self.state.write().await;

        let mut expired = Vec::new();
        for (id, header) in state.headers.iter_mut() {
            let elapsed = (now - header.last_checked).to_std().unwrap_or_default();
            header.ttl = header.ttl.saturating_sub(elapsed);
            header.last_checked = now;
            if header.ttl.is_zero() {
                expired.push(id.clone());
            }
        }

        for id in &expired {
            info!(task_id = %id, "⏰ Task ttl expired");
            Self::remove_header_locked(&mut state, id, now);
        }

        let removed_task_timeout = self.config.removed_task_timeout;
        state.removed.retain(|_, removed_at| {
            (now - *removed_at).to_std().unwrap_or_default() <= removed_task_timeout
        });

        expired
    }

    /// Opens a verification window for a delivered subtask result.
    pub async fn add_to_verification(
        &self,
        subtask_id: SubtaskId,
        task_id: TaskId,
        verification_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if state.verification.contains_key(&subtask_id) {
            return Err(RegistryError::DuplicateVerification(subtask_id));
        }

        let deadline = now + chrono::Duration::milliseconds(verification_timeout.as_millis() as i64);
        state.verification.insert(
            subtask_id.clone(),
            VerificationEntry {
                task_id: task_id.clone(),
                created_at: now,
                deadline,
            },
        );

        info!(
            subtask_id = %subtask_id,
            task_id = %task_id,
            deadline = %deadline,
            "🔍 Subtask queued for verification"
        );
        Ok(())
    }

    /// The external verifier reported a result for the subtask; closes the
    /// window and returns the owning task id, or `None` if no window was
    /// open (already expired or never submitted).
    pub async fn resolve_verification(&self, subtask_id: &SubtaskId) -> Option<TaskId> {
        let mut state = self.state.write().await;
        let entry = state.verification.remove(subtask_id)?;
        info!(
            subtask_id = %subtask_id,
            task_id = %entry.task_id,
            "✅ Verification resolved"
        );
        Some(entry.task_id)
    }

    /// Expires verification windows whose deadline has passed and returns
    /// the task ids involved, for the trust/payment consumers downstream.
    pub async fn sweep_verification(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut state = self.state.write().await;

        let expired: Vec<SubtaskId> = state
            .verification
            .iter()
            .filter(|(_, entry)| entry.deadline < now)
            .map(|(subtask_id, _)| subtask_id.clone())
            .collect();

        let mut task_ids = Vec::new();
        for subtask_id in expired {
            if let Some(entry) = state.verification.remove(&subtask_id) {
                warn!(
                    subtask_id = %subtask_id,
                    task_id = %entry.task_id,
                    waited_secs = (now - entry.created_at).num_seconds(),
                    "⏰ Verification deadline passed without confirmation"
                );
                task_ids.push(entry.task_id);
            }
        }
        task_ids
    }

    pub async fn header(&self, id: &TaskId) -> Option<TaskHeader> {
        let state = self.state.read().await;
        state.headers.get(id).cloned()
    }

    /// Snapshot of every known header, for the announcement-relay path.
    /// Copies so the caller can serialize without holding the lock.
    pub async fn known_headers(&self) -> Vec<TaskHeader> {
        let state = self.state.read().await;
        state.headers.values().cloned().collect()
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        RegistryStats {
            known_tasks: state.headers.len(),
            supported_tasks: state.supported.len(),
            active_tasks: state.active.len(),
            removed_markers: state.removed.len(),
            pending_verifications: state.verification.len(),
        }
    }
}
