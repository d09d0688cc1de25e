use crate::ChunkHash;
use serde::{Deserialize, Serialize};

/// Content-addressed snapshot of a directory subtree.
///
/// Built bottom-up from the filesystem and never mutated in place; a changed
/// file yields a new `File` node on the next build. Children are kept sorted
/// by name so that identical directory contents always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceNode {
    Dir {
        name: String,
        children: Vec<ResourceNode>,
    },
    File {
        name: String,
        content_hash: ChunkHash,
    },
}

impl ResourceNode {
    pub fn name(&self) -> &str {
        match self {
            ResourceNode::Dir { name, .. } => name,
            ResourceNode::File { name, .. } => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, ResourceNode::Dir { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ResourceNode::File { .. })
    }

    /// Number of `File` nodes in this subtree.
    pub fn file_count(&self) -> usize {
        match self {
            ResourceNode::File { .. } => 1,
            ResourceNode::Dir { children, .. } => {
                children.iter().map(ResourceNode::file_count).sum()
            }
        }
    }

    /// Recursively sorts children by name. Builders call this so two
    /// snapshots of identical content are structurally equal.
    pub fn sort_children(&mut self) {
        if let ResourceNode::Dir { children, .. } = self {
            for child in children.iter_mut() {
                child.sort_children();
            }
            children.sort_by(|a, b| a.name().cmp(b.name()));
        }
    }
}
