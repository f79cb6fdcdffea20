use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::digest::{Digest, Hasher};
use crate::error::{Error, Result};

use super::{BlobReader, BlobStore, BlobWriter};

type Blobs = Arc<Mutex<HashMap<Digest, Vec<u8>>>>;

/// Swappable in-process blob store for unit tests across the scheduler,
/// index, and library layers -- mirrors how the teacher keeps a local and
/// a remote `ReadChunk` implementation interchangeable behind one trait.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Blobs,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryWriter {
    buf: Vec<u8>,
    hasher: Hasher,
    blobs: Blobs,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.buf.extend_from_slice(buf);
        self.hasher.update(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl BlobWriter for MemoryWriter {
    async fn finish(self: Box<Self>) -> Result<(Digest, u64)> {
        let digest = self.hasher.finalize();
        let len = self.buf.len() as u64;
        self.blobs.lock().unwrap().entry(digest.clone()).or_insert(self.buf);
        Ok((digest, len))
    }
}

struct MemoryReader {
    data: Vec<u8>,
    pos: usize,
    digest: Digest,
}

impl AsyncRead for MemoryReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl BlobReader for MemoryReader {
    fn digest(&self) -> Option<Digest> {
        Some(self.digest.clone())
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn open_write(&self) -> Result<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryWriter {
            buf: Vec::new(),
            hasher: Hasher::new(),
            blobs: self.blobs.clone(),
        }))
    }

    async fn open_read(&self, digest: &Digest) -> Result<Pin<Box<dyn BlobReader>>> {
        let data = self
            .blobs
            .lock()
            .unwrap()
            .get(digest)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("blob {} not found", digest)))?;
        Ok(Box::pin(MemoryReader { data, pos: 0, digest: digest.clone() }))
    }

    async fn exists(&self, digest: &Digest) -> Result<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(digest))
    }

    async fn stat(&self, digest: &Digest) -> Result<Option<u64>> {
        Ok(self.blobs.lock().unwrap().get(digest).map(|b| b.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip() {
        let store = MemoryBlobStore::new();
        let (digest, size) = store.write_bytes(b"hello world").await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(store.read_bytes(&digest).await.unwrap(), b"hello world");
        assert!(store.exists(&digest).await.unwrap());
    }
}
