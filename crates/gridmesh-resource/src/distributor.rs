use crate::store::ChunkStore;
use crate::tree::{diff, file_hash};
use crate::{ResourceError, Result};
use gridmesh_types::{ChunkHash, ResourceNode};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Block size for file chunking.
    pub block_size: usize,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            block_size: 1 << 20,
        }
    }
}

/// Builds content-addressed trees of task resources, computes transfer
/// deltas, and moves file contents through the chunk store with integrity
/// verification on both ends.
pub struct ResourceDistributor {
    store: Arc<dyn ChunkStore>,
    config: DistributorConfig,
}

impl ResourceDistributor {
    pub fn new(store: Arc<dyn ChunkStore>, config: DistributorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Snapshots `root` as a hash tree. Deterministic: identical directory
    /// contents always yield an identical tree, whatever order the
    /// filesystem lists entries in.
    pub async fn build_tree(&self, root: &Path) -> Result<ResourceNode> {
        let tree = Self::build_dir_node(root.to_path_buf()).await?;
        debug!(root = %root.display(), files = tree.file_count(), "Resource tree built");
        Ok(tree)
    }

    fn build_dir_node(
        dir: PathBuf,
    ) -> Pin<Box<dyn Future<Output = Result<ResourceNode>> + Send>> {
        Box::pin(async move {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut children = Vec::new();
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    children.push(Self::build_dir_node(entry.path()).await?);
                } else if file_type.is_file() {
                    children.push(ResourceNode::File {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        content_hash: file_hash(&entry.path()).await?,
                    });
                }
            }
            children.sort_by(|a, b| a.name().cmp(b.name()));

            Ok(ResourceNode::Dir { name, children })
        })
    }

    /// Nodes of `remote` this side still needs; see [`diff`].
    pub fn delta(&self, local: &ResourceNode, remote: &ResourceNode) -> Vec<ResourceNode> {
        diff(local, remote)
    }

    /// Splits `path` into content-addressed blocks and stores each one.
    ///
    /// The returned hash sequence is the file's reconstruction recipe and
    /// must be kept by the caller: the store itself is position-free, and
    /// two files sharing a block share the single stored chunk.
    pub async fn split_file(&self, path: &Path) -> Result<Vec<ChunkHash>> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut order = Vec::new();
        let mut buf = vec![0u8; self.config.block_size];

        loop {
            let mut filled = 0;
            while filled < buf.len() {
                let n = file.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }

            let hash = ChunkHash::of(&buf[..filled]);
            self.store.put(&hash, &buf[..filled]).await?;
            order.push(hash);
        }

        info!(
            path = %path.display(),
            chunks = order.len(),
            block_size = self.config.block_size,
            "📦 File split into chunks"
        );
        Ok(order)
    }

    /// Reassembles a file from its ordered chunk list.
    ///
    /// Every chunk is re-hashed before it is trusted; a missing chunk
    /// fails with [`ResourceError::Incomplete`] and a mismatched one with
    /// [`ResourceError::Corrupted`]. On any failure nothing is left at
    /// `output`: the partial file is staged and only renamed into place
    /// after the last chunk verifies.
    pub async fn join_chunks(&self, order: &[ChunkHash], output: &Path) -> Result<()> {
        let staged = output.with_extension("partial");
        let mut out = tokio::fs::File::create(&staged).await?;

        match self.write_verified_chunks(order, &mut out).await {
            Ok(()) => {
                out.flush().await?;
                drop(out);
                tokio::fs::rename(&staged, output).await?;
                debug!(
                    output = %output.display(),
                    chunks = order.len(),
                    "✅ File reconstructed from chunks"
                );
                Ok(())
            }
            Err(err) => {
                drop(out);
                let _ = tokio::fs::remove_file(&staged).await;
                Err(err)
            }
        }
    }

    async fn write_verified_chunks(
        &self,
        order: &[ChunkHash],
        out: &mut tokio::fs::File,
    ) -> Result<()> {
        for hash in order {
            let bytes = self
                .store
                .get(hash)
                .await?
                .ok_or(ResourceError::Incomplete(*hash))?;

            let actual = ChunkHash::of(&bytes);
            if actual != *hash {
                warn!(
                    expected = %hash,
                    actual = %actual,
                    "⚠️ Stored chunk failed integrity check"
                );
                return Err(ResourceError::Corrupted {
                    expected: *hash,
                    actual,
                });
            }

            out.write_all(&bytes).await?;
        }
        Ok(())
    }

    /// Whole-file content hash, for skipping re-transfer of unchanged
    /// files between sync rounds.
    pub async fn file_hash(&self, path: &Path) -> Result<ChunkHash> {
        file_hash(path).await
    }
}
