use crate::Result;
use gridmesh_types::{ChunkHash, ResourceNode};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Whole-file content hash, streamed so large resources never sit in
/// memory. Used for tree building and change detection between sync
/// rounds; block-level chunk hashes are a separate, transfer-side concern.
pub async fn file_hash(path: &Path) -> Result<ChunkHash> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ChunkHash::from_bytes(hasher.finalize().into()))
}

/// Nodes present in `remote` that are absent locally or differ by hash.
///
/// Matching is by name at each directory level; nodes whose hashes match
/// are excluded entirely, since their content is already present and must
/// never be re-transferred. A directory appears in the delta only as deep
/// as it actually differs.
pub fn diff(local: &ResourceNode, remote: &ResourceNode) -> Vec<ResourceNode> {
    match (local, remote) {
        (
            ResourceNode::Dir {
                name: local_name,
                children: local_children,
            },
            ResourceNode::Dir {
                name: remote_name,
                children: remote_children,
            },
        ) if local_name == remote_name => {
            let mut delta = Vec::new();
            for remote_child in remote_children {
                match local_children
                    .iter()
                    .find(|c| c.name() == remote_child.name())
                {
                    None => delta.push(remote_child.clone()),
                    Some(local_child) => {
                        delta.extend(diff_child(local_child, remote_child));
                    }
                }
            }
            delta
        }
        // Roots that do not line up at all: everything remote is needed.
        _ => vec![remote.clone()],
    }
}

fn diff_child(local: &ResourceNode, remote: &ResourceNode) -> Vec<ResourceNode> {
    match (local, remote) {
        (
            ResourceNode::File {
                content_hash: local_hash,
                ..
            },
            ResourceNode::File {
                content_hash: remote_hash,
                ..
            },
        ) => {
            if local_hash == remote_hash {
                Vec::new()
            } else {
                vec![remote.clone()]
            }
        }
        (ResourceNode::Dir { .. }, ResourceNode::Dir { .. }) => {
            let sub_delta = diff(local, remote);
            if sub_delta.is_empty() {
                Vec::new()
            } else {
                vec![ResourceNode::Dir {
                    name: remote.name().to_string(),
                    children: sub_delta,
                }]
            }
        }
        // A file shadowed by a directory (or vice versa) counts as changed.
        _ => vec![remote.clone()],
    }
}
