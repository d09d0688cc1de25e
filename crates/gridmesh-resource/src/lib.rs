//! Content-addressed resource distribution between untrusted peers.
//!
//! A directory of task resources becomes a hash tree ([`ResourceNode`]);
//! diffing two trees yields the minimal transfer delta; file contents move
//! as fixed-size content-addressed chunks that are re-verified against
//! their address before reconstruction, so corrupted or missing data fails
//! loudly instead of producing silently-wrong output.

pub mod distributor;
pub mod error;
pub mod store;
pub mod tree;

pub use distributor::{DistributorConfig, ResourceDistributor};
pub use error::{ResourceError, Result};
pub use gridmesh_types::ResourceNode;
pub use store::{ChunkStore, DirChunkStore, MemoryChunkStore};
pub use tree::diff;
