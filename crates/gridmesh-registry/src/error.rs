use gridmesh_types::{SubtaskId, TaskId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("task was never active: {0}")]
    UnknownTask(TaskId),

    #[error("verification already pending for subtask {0}")]
    DuplicateVerification(SubtaskId),
}
