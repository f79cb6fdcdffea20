use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::digest::{Digest, Hasher};
use crate::error::{Error, ErrorKind, Result};

use super::{BlobReader, BlobStore, BlobWriter};

/// On-disk blob store rooted at `<root>/blobs/<algo>/<xx>/<yy>/<digest>`,
/// matching the on-disk library layout.
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, digest: &Digest) -> PathBuf {
        let (a, b) = digest.shard();
        self.root
            .join("blobs")
            .join(digest.algorithm().to_string())
            .join(a)
            .join(b)
            .join(digest.hex())
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("blobs").join("tmp")
    }
}

pub struct DiskBlobWriter {
    tmp_path: PathBuf,
    file: File,
    hasher: Hasher,
    len: u64,
    root: PathBuf,
}

impl AsyncWrite for DiskBlobWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let file = Pin::new(&mut self.file);
        match file.poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                self.hasher.update(&buf[..n]);
                self.len += n as u64;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

#[async_trait::async_trait]
impl BlobWriter for DiskBlobWriter {
    async fn finish(mut self: Box<Self>) -> Result<(Digest, u64)> {
        use tokio::io::AsyncWriteExt;
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        let digest = self.hasher.finalize();
        let (a, b) = digest.shard();
        let final_dir = self
            .root
            .join("blobs")
            .join(digest.algorithm().to_string())
            .join(a)
            .join(b);
        tokio::fs::create_dir_all(&final_dir).await?;
        let final_path = final_dir.join(digest.hex());

        if tokio::fs::metadata(&final_path).await.is_ok() {
            // Already present with this digest: the write is a no-op move.
            tokio::fs::remove_file(&self.tmp_path).await.ok();
        } else {
            match tokio::fs::rename(&self.tmp_path, &final_path).await {
                Ok(()) => {}
                Err(err) => {
                    tokio::fs::remove_file(&self.tmp_path).await.ok();
                    return Err(err.into());
                }
            }
        }

        Ok((digest, self.len))
    }
}

impl Drop for DiskBlobWriter {
    fn drop(&mut self) {
        // Best-effort cleanup if `finish` was never called.
        let path = self.tmp_path.clone();
        let _ = std::fs::remove_file(path);
    }
}

pub struct DiskBlobReader {
    file: File,
    hasher: Hasher,
    requested: Digest,
    done: bool,
    observed: Option<Digest>,
}

impl AsyncRead for DiskBlobReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let file = Pin::new(&mut self.file);
        match file.poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let after = buf.filled().len();
                if after > before {
                    self.hasher.update(&buf.filled()[before..after]);
                } else if !self.done {
                    self.done = true;
                    // Finalize by swapping out a dummy hasher; digest() reads this.
                    let taken = std::mem::replace(&mut self.hasher, crate::digest::Hasher::new());
                    self.observed = Some(taken.finalize());
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl BlobReader for DiskBlobReader {
    fn digest(&self) -> Option<Digest> {
        self.observed.clone().or_else(|| {
            if self.done {
                None
            } else {
                Some(self.requested.clone())
            }
        })
    }
}

#[async_trait::async_trait]
impl BlobStore for DiskBlobStore {
    async fn open_write(&self) -> Result<Box<dyn BlobWriter>> {
        tokio::fs::create_dir_all(self.tmp_dir()).await?;
        let name = uuid::Uuid::new_v4().to_string();
        let tmp_path = self.tmp_dir().join(name);
        let file = File::create(&tmp_path).await?;
        Ok(Box::new(DiskBlobWriter {
            tmp_path,
            file,
            hasher: Hasher::new(),
            len: 0,
            root: self.root.clone(),
        }))
    }

    async fn open_read(&self, digest: &Digest) -> Result<Pin<Box<dyn BlobReader>>> {
        let path = self.path_for(digest);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("blob {} not found", digest))
            } else {
                Error::from(err)
            }
        })?;
        Ok(Box::pin(DiskBlobReader {
            file,
            hasher: Hasher::new(),
            requested: digest.clone(),
            done: false,
            observed: None,
        }))
    }

    async fn exists(&self, digest: &Digest) -> Result<bool> {
        Ok(tokio::fs::metadata(self.path_for(digest)).await.is_ok())
    }

    async fn stat(&self, digest: &Digest) -> Result<Option<u64>> {
        match tokio::fs::metadata(self.path_for(digest)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Recursively enumerate every digest currently stored, used by the
/// in-memory index's library scan and by recovery tooling.
pub async fn walk_blobs(root: &Path) -> Result<Vec<Digest>> {
    let blobs_dir = root.join("blobs");
    let mut out = Vec::new();
    if tokio::fs::metadata(&blobs_dir).await.is_err() {
        return Ok(out);
    }
    for entry in walkdir::WalkDir::new(&blobs_dir)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let algo = entry.path().components().rev().nth(3).map(|c| c.as_os_str().to_string_lossy().to_string());
        if algo.as_deref() != Some("sha256") {
            continue;
        }
        let hex = entry.file_name().to_string_lossy().to_string();
        if let Ok(digest) = format!("sha256:{}", hex).parse::<Digest>() {
            out.push(digest);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobStore as _;

    #[tokio::test]
    async fn write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::new(dir.path());

        let (digest, size) = store.write_bytes(b"hello").await.unwrap();
        assert_eq!(size, 5);
        assert_eq!(
            digest.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let data = store.read_bytes(&digest).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn dedup_writes_exactly_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::new(dir.path());

        let (d1, _) = store.write_bytes(b"hello").await.unwrap();
        let (d2, _) = store.write_bytes(b"hello").await.unwrap();
        assert_eq!(d1, d2);

        let path = store.path_for(&d1);
        assert!(path.exists());
        assert_eq!(
            path,
            dir.path()
                .join("blobs/sha256/2c/f2/2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::new(dir.path());
        let digest = crate::digest::digest_bytes(b"nope");
        let err = store.open_read(&digest).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
