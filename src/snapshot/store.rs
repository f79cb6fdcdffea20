use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;

use crate::blob::{BlobStore, BlobWriter};
use crate::digest::Digest;
use crate::error::{Error, ErrorKind, Result};

use super::{ArtifactManifest, SnapshotIndex};

/// Process-wide registry of currently-open `(origin, id)` snapshot
/// writers, enforcing the "one writer per snapshot" invariant (spec.md
/// §4.2, §5). Grounded in the teacher's `ProcessLocker` discussion in
/// `backup.rs` -- this is the in-process analogue, since larch does not
/// need the teacher's inter-process exclusive-lock machinery.
#[derive(Default)]
pub struct OpenWriters {
    keys: Mutex<HashSet<(String, String)>>,
}

impl OpenWriters {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self, origin: &str, id: &str) -> Result<()> {
        let mut keys = self.keys.lock().unwrap();
        let key = (origin.to_string(), id.to_string());
        if keys.contains(&key) {
            return Err(Error::conflict(format!(
                "snapshot {}/{} already has an open writer",
                origin, id
            )));
        }
        keys.insert(key);
        Ok(())
    }

    fn release(&self, origin: &str, id: &str) {
        self.keys.lock().unwrap().remove(&(origin.to_string(), id.to_string()));
    }
}

fn snapshot_dir(root: &std::path::Path, origin: &str, id: &str) -> PathBuf {
    root.join("snapshots").join(origin).join(id)
}

async fn read_index(path: &std::path::Path) -> Result<SnapshotIndex> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(SnapshotIndex::new()),
        Err(err) => Err(err.into()),
    }
}

/// Atomically rewrite `index.json`: write to a sibling temp file, then
/// rename over the target, so readers never observe a truncated file.
async fn write_index_atomic(dir: &std::path::Path, index: &SnapshotIndex) -> Result<()> {
    let tmp = dir.join("index.json.tmp");
    let body = serde_json::to_vec_pretty(index)?;
    {
        let mut f = tokio::fs::File::create(&tmp).await?;
        f.write_all(&body).await?;
        f.sync_all().await?;
    }
    tokio::fs::rename(&tmp, dir.join("index.json")).await?;
    Ok(())
}

/// Writer handle for one open `(origin, id)` snapshot.
pub struct DiskSnapshotWriter {
    root: PathBuf,
    origin: String,
    id: String,
    dir: PathBuf,
    index: SnapshotIndex,
    blobs: Arc<dyn BlobStore>,
    registry: Arc<OpenWriters>,
    closed: bool,
}

impl DiskSnapshotWriter {
    pub async fn open(
        root: impl Into<PathBuf>,
        origin: &str,
        id: &str,
        blobs: Arc<dyn BlobStore>,
        registry: Arc<OpenWriters>,
    ) -> Result<Self> {
        registry.try_acquire(origin, id)?;
        let root = root.into();
        let dir = snapshot_dir(&root, origin, id);
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            registry.release(origin, id);
            return Err(err.into());
        }
        let index = match read_index(&dir.join("index.json")).await {
            Ok(index) => index,
            Err(err) => {
                registry.release(origin, id);
                return Err(err);
            }
        };
        Ok(Self { root, origin: origin.to_string(), id: id.to_string(), dir, index, blobs, registry, closed: false })
    }

    pub fn index(&self) -> &SnapshotIndex {
        &self.index
    }

    /// Streams bytes into the blob store; on success, best-effort links
    /// `<dir>/<name>` to the resulting blob path. The symlink is advisory
    /// only -- the core never reads through it (spec.md §4.2).
    pub async fn next_artifact_writer(&self, name: &str) -> Result<ArtifactStreamWriter> {
        let writer = self.blobs.open_write().await?;
        Ok(ArtifactStreamWriter { inner: writer, dir: self.dir.clone(), name: name.to_string() })
    }

    pub async fn write_artifact(&self, name: &str, bytes: &[u8]) -> Result<(u64, Digest)> {
        let (digest, size) = self.blobs.write_bytes(bytes).await?;
        let _ = link_artifact_name(&self.dir, name, &digest).await;
        Ok((size, digest))
    }

    /// Appends to the in-memory index and rewrites `index.json`.
    pub async fn write_artifact_manifest(&mut self, manifest: ArtifactManifest) -> Result<()> {
        self.index.artifacts.push(manifest);
        write_index_atomic(&self.dir, &self.index).await?;
        Ok(())
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn close(mut self) {
        self.closed = true;
        self.registry.release(&self.origin, &self.id);
    }
}

impl Drop for DiskSnapshotWriter {
    fn drop(&mut self) {
        if !self.closed {
            self.registry.release(&self.origin, &self.id);
        }
    }
}

async fn link_artifact_name(dir: &std::path::Path, name: &str, digest: &Digest) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let target = relative_blob_path(digest);
        let link = dir.join(name);
        tokio::fs::remove_file(&link).await.ok();
        tokio::fs::symlink(target, link).await
    }
    #[cfg(not(unix))]
    {
        let _ = (dir, name, digest);
        Ok(())
    }
}

pub(super) fn relative_blob_path(digest: &Digest) -> PathBuf {
    let (a, b) = digest.shard();
    PathBuf::from("../../../blobs")
        .join(digest.algorithm().to_string())
        .join(a)
        .join(b)
        .join(digest.hex())
}

/// Streaming writer returned by [`DiskSnapshotWriter::next_artifact_writer`].
pub struct ArtifactStreamWriter {
    inner: Box<dyn BlobWriter>,
    dir: PathBuf,
    name: String,
}

impl ArtifactStreamWriter {
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf).await.map_err(Error::from)
    }

    pub async fn finish(self) -> Result<(Digest, u64)> {
        let (digest, size) = self.inner.finish().await?;
        link_artifact_name(&self.dir, &self.name, &digest).await.ok();
        Ok((digest, size))
    }
}

/// Read-only handle over a snapshot's index.
pub struct DiskSnapshotReader {
    index: SnapshotIndex,
}

impl DiskSnapshotReader {
    pub async fn open(root: &std::path::Path, origin: &str, id: &str) -> Result<Self> {
        let dir = snapshot_dir(root, origin, id);
        let path = dir.join("index.json");
        match tokio::fs::metadata(&path).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!("snapshot {}/{} not found", origin, id)))
            }
            Err(err) => return Err(err.into()),
        }
        let index = read_index(&path).await?;
        Ok(Self { index })
    }

    pub fn index(&self) -> &SnapshotIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    #[tokio::test]
    async fn append_only_index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let registry = Arc::new(OpenWriters::new());

        let mut writer = DiskSnapshotWriter::open(dir.path(), "example.org", "1", blobs.clone(), registry.clone())
            .await
            .unwrap();

        for i in 0..3 {
            let (size, digest) = writer.write_artifact(&format!("a{}", i), b"x").await.unwrap();
            writer
                .write_artifact_manifest(ArtifactManifest::new("text/plain", digest, size))
                .await
                .unwrap();
        }
        assert_eq!(writer.index().artifacts.len(), 3);
        writer.close();

        let reader = DiskSnapshotReader::open(dir.path(), "example.org", "1").await.unwrap();
        assert_eq!(reader.index().artifacts.len(), 3);
    }

    #[tokio::test]
    async fn second_writer_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let registry = Arc::new(OpenWriters::new());

        let _first = DiskSnapshotWriter::open(dir.path(), "example.org", "1", blobs.clone(), registry.clone())
            .await
            .unwrap();
        let second = DiskSnapshotWriter::open(dir.path(), "example.org", "1", blobs.clone(), registry.clone()).await;
        assert_eq!(second.unwrap_err().kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn missing_snapshot_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = DiskSnapshotReader::open(dir.path(), "example.org", "404").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
