use gridmesh_types::ChunkHash;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResourceError>;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("chunk {0} is missing from the store")]
    Incomplete(ChunkHash),

    #[error("chunk {expected} failed integrity check: stored bytes hash to {actual}")]
    Corrupted {
        expected: ChunkHash,
        actual: ChunkHash,
    },

    #[error("refusing to store bytes under {expected}: content hashes to {actual}")]
    HashMismatch {
        expected: ChunkHash,
        actual: ChunkHash,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
