//! Content-addressed byte store keyed by digest.
//!
//! Grounded on the teacher's chunk/blob layer (`backup/data_blob.rs`,
//! `backup/read_chunk.rs`, and the `ChunkStore` locking discussion at the
//! top of `backup.rs`): a streaming writer hashes bytes into a temp file,
//! then atomically renames into a sharded directory tree so that two
//! writers racing on identical content both succeed and only one file
//! lands on disk.

mod disk;
mod memory;

pub use disk::DiskBlobStore;
pub use memory::MemoryBlobStore;

use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::digest::Digest;
use crate::error::Result;

/// A streaming sink that hashes all bytes written to it. Dropping the
/// writer without calling [`BlobWriter::finish`] discards the temp file.
#[async_trait::async_trait]
pub trait BlobWriter: AsyncWrite + Send + Unpin {
    /// Finalize the write: compute the digest, atomically move the bytes
    /// into place, and return the digest plus the byte count written.
    async fn finish(self: Box<Self>) -> Result<(Digest, u64)>;
}

/// A streaming source. `digest()` is only meaningful after the reader has
/// been fully consumed; it reflects the bytes actually observed, which may
/// differ from the digest that was requested if the stored blob is
/// corrupt (see [`BlobStore::open_read`]).
pub trait BlobReader: AsyncRead + Send + Unpin {
    fn digest(&self) -> Option<Digest>;
}

/// Store and retrieve bytes keyed by digest; dedupe by digest.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn open_write(&self) -> Result<Box<dyn BlobWriter>>;

    async fn open_read(&self, digest: &Digest) -> Result<Pin<Box<dyn BlobReader>>>;

    async fn exists(&self, digest: &Digest) -> Result<bool>;

    /// Byte length of a stored blob, without opening a reader.
    async fn stat(&self, digest: &Digest) -> Result<Option<u64>>;

    /// Convenience: write a full byte slice in one call.
    async fn write_bytes(&self, data: &[u8]) -> Result<(Digest, u64)> {
        let mut writer = self.open_write().await?;
        tokio::io::AsyncWriteExt::write_all(writer.as_mut(), data).await?;
        writer.finish().await
    }

    /// Convenience: read a full blob into memory, verifying its digest.
    async fn read_bytes(&self, digest: &Digest) -> Result<Vec<u8>> {
        let mut reader = self.open_read(digest).await?;
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(reader.as_mut(), &mut buf).await?;
        if let Some(observed) = reader.digest() {
            if &observed != digest {
                tracing::warn!(
                    requested = %digest,
                    observed = %observed,
                    "blob corruption detected on read"
                );
            }
        }
        Ok(buf)
    }
}
