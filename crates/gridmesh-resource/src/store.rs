use crate::{ResourceError, Result};
use async_trait::async_trait;
use gridmesh_types::ChunkHash;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Content-addressed chunk storage: an append-mostly hash → bytes map.
///
/// Writes are idempotent per address (equal hash implies equal bytes), so
/// concurrent writers for the same chunk never need to coordinate. A `put`
/// whose bytes do not hash to the given address is rejected before anything
/// is stored.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn put(&self, hash: &ChunkHash, bytes: &[u8]) -> Result<()>;

    async fn get(&self, hash: &ChunkHash) -> Result<Option<Vec<u8>>>;

    async fn contains(&self, hash: &ChunkHash) -> Result<bool>;

    /// Number of distinct chunks currently stored.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

fn verify_address(hash: &ChunkHash, bytes: &[u8]) -> Result<()> {
    let actual = ChunkHash::of(bytes);
    if actual != *hash {
        return Err(ResourceError::HashMismatch {
            expected: *hash,
            actual,
        });
    }
    Ok(())
}

/// In-memory chunk store for tests and small transfers.
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<ChunkHash, Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put(&self, hash: &ChunkHash, bytes: &[u8]) -> Result<()> {
        verify_address(hash, bytes)?;
        let mut chunks = self.chunks.write().await;
        chunks.entry(*hash).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    async fn get(&self, hash: &ChunkHash) -> Result<Option<Vec<u8>>> {
        let chunks = self.chunks.read().await;
        Ok(chunks.get(hash).cloned())
    }

    async fn contains(&self, hash: &ChunkHash) -> Result<bool> {
        let chunks = self.chunks.read().await;
        Ok(chunks.contains_key(hash))
    }

    async fn len(&self) -> Result<usize> {
        let chunks = self.chunks.read().await;
        Ok(chunks.len())
    }
}

/// Filesystem-backed chunk store: one file per chunk, named by its hex
/// address, all in a flat root directory.
pub struct DirChunkStore {
    root: PathBuf,
}

impl DirChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn chunk_path(&self, hash: &ChunkHash) -> PathBuf {
        self.root.join(hash.to_hex())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ChunkStore for DirChunkStore {
    async fn put(&self, hash: &ChunkHash, bytes: &[u8]) -> Result<()> {
        verify_address(hash, bytes)?;

        let path = self.chunk_path(hash);
        if tokio::fs::try_exists(&path).await? {
            // Same address, same bytes; nothing to do.
            return Ok(());
        }

        // Stage then rename so a concurrent reader never sees a torn chunk.
        // Racing writers stage identical bytes, so the last rename wins
        // harmlessly.
        let staged = path.with_extension("staged");
        tokio::fs::write(&staged, bytes).await?;
        tokio::fs::rename(&staged, &path).await?;

        debug!(chunk = %hash, size = bytes.len(), "📦 Chunk stored");
        Ok(())
    }

    async fn get(&self, hash: &ChunkHash) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.chunk_path(hash)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn contains(&self, hash: &ChunkHash) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.chunk_path(hash)).await?)
    }

    async fn len(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_none() && entry.file_type().await?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}
