//! Library: the owning container that wires a blob store to a snapshot
//! store (spec.md §4.3). One process may mount several libraries, each
//! identified by a stable string id -- the analogue of the teacher's
//! per-datastore `DataStore::lookup_datastore(name)`.

mod archivebox;
mod disk;
pub mod remote;

pub use archivebox::ArchiveBoxLibrary;
pub use disk::DiskLibrary;

use std::pin::Pin;

use crate::blob::BlobReader;
use crate::digest::Digest;
use crate::error::Result;
use crate::snapshot::{ArtifactManifest, SnapshotIndex};

/// Read side of a library, used by the index scanner and the public read API.
#[async_trait::async_trait]
pub trait LibraryReader: Send + Sync {
    async fn get_origins(&self) -> Result<Vec<String>>;
    async fn get_snapshots(&self, origin: &str) -> Result<Vec<String>>;
    async fn read_snapshot(&self, origin: &str, id: &str) -> Result<SnapshotIndex>;
    async fn read_artifact(&self, digest: &Digest) -> Result<Pin<Box<dyn BlobReader>>>;
}

/// Write side used by the scheduler/worker to create and populate a snapshot.
#[async_trait::async_trait]
pub trait LibraryWriter: Send + Sync {
    /// Opens a new snapshot writer; fails with `Conflict` if one is already open.
    async fn write_snapshot(&self, origin: &str, id: &str) -> Result<Box<dyn SnapshotWriterHandle>>;
}

/// Object-safe façade over [`crate::snapshot::DiskSnapshotWriter`] so the
/// worker protocol and in-process archivers can share one abstraction
/// regardless of whether the snapshot lives on local disk or behind a
/// remote worker-protocol client (see [`remote::RemoteLibrary`]).
#[async_trait::async_trait]
pub trait SnapshotWriterHandle: Send {
    async fn write_artifact(&mut self, name: &str, bytes: &[u8]) -> Result<(u64, Digest)>;
    async fn write_artifact_manifest(&mut self, manifest: ArtifactManifest) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A mounted library: a pair of trait objects over the same concrete
/// backend, one per capability. Kept as two objects rather than a single
/// `dyn LibraryReader + LibraryWriter` combo so callers that only need one
/// side (the index only ever reads; `ArchiveBoxLibrary` only ever offers
/// reads) aren't forced to depend on the other.
#[derive(Clone)]
pub struct MountedLibrary {
    pub reader: std::sync::Arc<dyn LibraryReader>,
    pub writer: Option<std::sync::Arc<dyn LibraryWriter>>,
}

impl MountedLibrary {
    /// Mounts a backend that supports both reads and writes (e.g. [`DiskLibrary`]).
    pub fn read_write<T>(backend: std::sync::Arc<T>) -> Self
    where
        T: LibraryReader + LibraryWriter + 'static,
    {
        Self { reader: backend.clone(), writer: Some(backend) }
    }

    /// Mounts a read-only backend (e.g. [`ArchiveBoxLibrary`]).
    pub fn read_only<T>(backend: std::sync::Arc<T>) -> Self
    where
        T: LibraryReader + 'static,
    {
        Self { reader: backend, writer: None }
    }
}
