use thiserror::Error;

pub type Result<T> = std::result::Result<T, PartitionError>;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("invalid estimated throughput {0}: must be > 0")]
    InvalidThroughput(f64),

    #[error("partitioner has not been started")]
    NotStarted,

    #[error("range {0} was never issued or is already completed")]
    UnknownRange(u64),

    #[error("result for range {range_id} has {actual} bytes, expected {expected}")]
    ResultSizeMismatch {
        range_id: u64,
        expected: usize,
        actual: usize,
    },
}
