use crate::{DispatchError, Result};
use chrono::{DateTime, Utc};
use gridmesh_partition::{PartitionerConfig, WorkPartitioner};
use gridmesh_registry::TaskRegistry;
use gridmesh_types::{SubtaskId, TaskHeader, TaskId, WorkUnitRange};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Window a delivered subtask result has to be confirmed by the
    /// external verifier before it counts as unconfirmed.
    pub verification_timeout: Duration,
    /// Cadence of the background sweep loop.
    pub sweep_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            verification_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Tasks whose header ttl ran out this pass.
    pub expired_tasks: Vec<TaskId>,
    /// Tasks with a subtask whose verification deadline passed
    /// unconfirmed; handed to trust/payment consumers.
    pub unconfirmed_tasks: Vec<TaskId>,
}

/// Drives the task registry and the per-task partitioners.
///
/// One dispatcher per node; collaborators are injected at construction and
/// shared via `Arc`. Locks here guard only bookkeeping maps; computation
/// and resource transfer always happen outside them.
pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
    partitioners: RwLock<HashMap<TaskId, Arc<WorkPartitioner>>>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<TaskRegistry>, config: DispatchConfig) -> Self {
        Self {
            registry,
            partitioners: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Inbound announcement from a peer. `true` if the header was accepted.
    pub async fn announce(&self, header: TaskHeader, is_supported: bool) -> bool {
        self.registry.add_header(header, is_supported).await
    }

    /// Registers a locally-owned task: announces its header and opens a
    /// started partitioner that workers will pull ranges from.
    pub async fn open_task(
        &self,
        header: TaskHeader,
        partition: PartitionerConfig,
    ) -> Result<Arc<WorkPartitioner>> {
        let id = header.id.clone();

        {
            let partitioners = self.partitioners.read().await;
            if partitioners.contains_key(&id) {
                return Err(DispatchError::TaskAlreadyOpen(id));
            }
        }
        if !self.registry.add_header(header, true).await {
            // The id is known or sitting in the removed window.
            return Err(DispatchError::TaskAlreadyOpen(id));
        }

        let partitioner = Arc::new(WorkPartitioner::new(id.clone(), partition));
        partitioner.start().await;
        self.partitioners
            .write()
            .await
            .insert(id.clone(), Arc::clone(&partitioner));

        info!(task_id = %id, "🚀 Task opened for distribution");
        Ok(partitioner)
    }

    pub async fn partitioner(&self, task_id: &TaskId) -> Option<Arc<WorkPartitioner>> {
        let partitioners = self.partitioners.read().await;
        partitioners.get(task_id).cloned()
    }

    /// Inbound work request: sizes and issues the next unit range for the
    /// task, or reports that no work is left.
    pub async fn request_work(
        &self,
        task_id: &TaskId,
        estimated_throughput: f64,
    ) -> Result<Option<WorkUnitRange>> {
        let partitioner = self
            .partitioner(task_id)
            .await
            .ok_or_else(|| DispatchError::UnknownTask(task_id.clone()))?;
        Ok(partitioner.next_range(estimated_throughput).await?)
    }

    /// Inbound work result: merges it and opens the verification window
    /// for the delivered subtask.
    pub async fn deliver_result(
        &self,
        subtask_id: SubtaskId,
        range: &WorkUnitRange,
        result: &[u8],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let partitioner = self
            .partitioner(&range.task_id)
            .await
            .ok_or_else(|| DispatchError::UnknownTask(range.task_id.clone()))?;

        partitioner.range_completed(range, result).await?;
        self.registry
            .add_to_verification(
                subtask_id,
                range.task_id.clone(),
                self.config.verification_timeout,
                now,
            )
            .await?;
        Ok(())
    }

    /// One sweep pass: ages headers, expires verification windows, and
    /// drops partitioners for tasks that died. Resource transfers already
    /// in flight for a dead task are left to finish or fail on their own;
    /// only new dispatch stops.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let expired_tasks = self.registry.sweep(now).await;
        let unconfirmed_tasks = self.registry.sweep_verification(now).await;

        if !expired_tasks.is_empty() {
            let mut partitioners = self.partitioners.write().await;
            for id in &expired_tasks {
                if partitioners.remove(id).is_some() {
                    debug!(task_id = %id, "Partitioner dropped for expired task");
                }
            }
        }

        SweepReport {
            expired_tasks,
            unconfirmed_tasks,
        }
    }

    /// Spawns the periodic sweep loop. Unconfirmed task ids are forwarded
    /// on `unconfirmed_tx` for the external trust consumer; the loop exits
    /// when the receiving side goes away.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        unconfirmed_tx: mpsc::UnboundedSender<TaskId>,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(dispatcher.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let report = dispatcher.sweep(Utc::now()).await;
                for task_id in report.unconfirmed_tasks {
                    if unconfirmed_tx.send(task_id).is_err() {
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmesh_registry::RegistryConfig;
    use std::net::IpAddr;

    fn header(id: &str, ttl_secs: u64, now: DateTime<Utc>) -> TaskHeader {
        TaskHeader::new(
            TaskId::from(id),
            "10.0.0.7".parse::<IpAddr>().unwrap(),
            40102,
            Duration::from_secs(ttl_secs),
            Duration::from_secs(600),
            1 << 20,
            256 << 20,
            now,
        )
    }

    fn partition_config(total_units: u64) -> PartitionerConfig {
        PartitionerConfig {
            total_units,
            samples_per_unit: 30,
            preferred_slice: Duration::from_secs(1),
            deadline: Duration::from_secs(3600),
            unit_size_bytes: 1,
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(TaskRegistry::new(RegistryConfig::default())),
            DispatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_open_task_rejects_duplicates() {
        let dispatcher = dispatcher();
        let now = Utc::now();

        dispatcher
            .open_task(header("t1", 3600, now), partition_config(100))
            .await
            .unwrap();

        let err = dispatcher
            .open_task(header("t1", 3600, now), partition_config(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TaskAlreadyOpen(_)));
    }

    #[tokio::test]
    async fn test_request_work_for_unknown_task_fails() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .request_work(&TaskId::from("ghost"), 100.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn test_expired_task_stops_being_dispatched() {
        let dispatcher = dispatcher();
        let t0 = Utc::now();
        let id = TaskId::from("t1");

        dispatcher
            .open_task(header("t1", 100, t0), partition_config(1000))
            .await
            .unwrap();
        assert!(dispatcher
            .request_work(&id, 300.0)
            .await
            .unwrap()
            .is_some());

        let report = dispatcher.sweep(t0 + chrono::Duration::seconds(101)).await;
        assert_eq!(report.expired_tasks, vec![id.clone()]);

        // The partitioner is gone; new work requests are refused.
        assert!(matches!(
            dispatcher.request_work(&id, 300.0).await,
            Err(DispatchError::UnknownTask(_))
        ));
    }
}
