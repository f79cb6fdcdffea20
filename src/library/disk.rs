use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::blob::{BlobReader, BlobStore, DiskBlobStore};
use crate::digest::Digest;
use crate::error::Result;
use crate::snapshot::{ArtifactManifest, DiskSnapshotReader, DiskSnapshotWriter, SnapshotIndex};
use crate::snapshot::store::OpenWriters;

use super::{LibraryReader, LibraryWriter, SnapshotWriterHandle};

/// Default on-disk library backend: `<root>/blobs/...` + `<root>/snapshots/...`
/// (spec.md §4.3, §6).
pub struct DiskLibrary {
    root: PathBuf,
    blobs: Arc<dyn BlobStore>,
    open_writers: Arc<OpenWriters>,
}

impl DiskLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            blobs: Arc::new(DiskBlobStore::new(root.clone())),
            open_writers: Arc::new(OpenWriters::new()),
            root,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl LibraryReader for DiskLibrary {
    async fn get_origins(&self) -> Result<Vec<String>> {
        let snapshots_dir = self.root.join("snapshots");
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&snapshots_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    async fn get_snapshots(&self, origin: &str) -> Result<Vec<String>> {
        let dir = self.root.join("snapshots").join(origin);
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    async fn read_snapshot(&self, origin: &str, id: &str) -> Result<SnapshotIndex> {
        let reader = DiskSnapshotReader::open(&self.root, origin, id).await?;
        Ok(reader.index().clone())
    }

    async fn read_artifact(&self, digest: &Digest) -> Result<Pin<Box<dyn BlobReader>>> {
        self.blobs.open_read(digest).await
    }
}

#[async_trait::async_trait]
impl LibraryWriter for DiskLibrary {
    async fn write_snapshot(&self, origin: &str, id: &str) -> Result<Box<dyn SnapshotWriterHandle>> {
        let writer = DiskSnapshotWriter::open(
            self.root.clone(),
            origin,
            id,
            self.blobs.clone(),
            self.open_writers.clone(),
        )
        .await?;
        Ok(Box::new(DiskSnapshotWriterHandle { inner: writer }))
    }
}

struct DiskSnapshotWriterHandle {
    inner: DiskSnapshotWriter,
}

#[async_trait::async_trait]
impl SnapshotWriterHandle for DiskSnapshotWriterHandle {
    async fn write_artifact(&mut self, name: &str, bytes: &[u8]) -> Result<(u64, Digest)> {
        self.inner.write_artifact(name, bytes).await
    }

    async fn write_artifact_manifest(&mut self, manifest: ArtifactManifest) -> Result<()> {
        self.inner.write_artifact_manifest(manifest).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.inner.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let lib = DiskLibrary::new(dir.path());

        let mut writer = lib.write_snapshot("example.org", "1").await.unwrap();
        let (size, digest) = writer.write_artifact("header", b"").await.unwrap();
        writer
            .write_artifact_manifest(ArtifactManifest::new("application/vnd.larch.snapshot.manifest.v1+json", digest, size))
            .await
            .unwrap();
        writer.close().await.unwrap();

        let index = lib.read_snapshot("example.org", "1").await.unwrap();
        assert_eq!(index.artifacts.len(), 1);
        assert_eq!(lib.get_origins().await.unwrap(), vec!["example.org".to_string()]);
        assert_eq!(lib.get_snapshots("example.org").await.unwrap(), vec!["1".to_string()]);
    }
}
