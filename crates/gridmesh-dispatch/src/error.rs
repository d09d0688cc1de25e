use gridmesh_partition::PartitionError;
use gridmesh_registry::RegistryError;
use gridmesh_types::TaskId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no partitioner open for task {0}")]
    UnknownTask(TaskId),

    #[error("task {0} is already open or its id is blocked")]
    TaskAlreadyOpen(TaskId),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
