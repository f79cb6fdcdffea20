//! Read-only library variant over an existing ArchiveBox `archive/<id>/`
//! tree (spec.md §4.3). Grounded directly on
//! `examples/original_source/internal/libraries/archivebox/{index,library,artifactreader}.go`:
//! media types are inferred from a closed allowlist of filenames, blob
//! digests are computed by hashing on demand, and a snapshot index is
//! synthesized whose first artifact is the zero-length empty-blob,
//! carrying the `url`/`updated` fields read from ArchiveBox's own
//! `index.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::Deserialize;
use tokio::io::{AsyncRead, ReadBuf};
use url::Url;

use crate::blob::BlobReader;
use crate::digest::{digest_bytes, Digest};
use crate::error::{Error, Result};
use crate::snapshot::{ArtifactManifest, SnapshotIndex, ANNOTATION_ARTIFACT_PATH, ANNOTATION_ARTIFACT_TYPE};

use super::LibraryReader;

/// Minimal in-memory reader returned by `read_artifact`: ArchiveBox
/// artifacts are read whole off disk (they're small, teacher-adjacent
/// files like screenshots and PDFs), so there's no need for the streaming
/// temp-file dance the primary `DiskBlobStore` does for writes.
struct WholeFileReader {
    data: Vec<u8>,
    pos: usize,
    digest: Digest,
}

impl AsyncRead for WholeFileReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl BlobReader for WholeFileReader {
    fn digest(&self) -> Option<Digest> {
        Some(self.digest.clone())
    }
}

#[derive(Deserialize)]
struct ArchiveBoxIndexJson {
    url: String,
    updated: String,
}

/// Filename -> (content-type, archiver-specific subtype). The teacher's
/// allowlist from `index.go`'s `switch entry.Name()`.
const KNOWN_ARTIFACTS: &[(&str, &str, &str)] = &[
    ("archive.org.txt", "text/plain", "vnd.archivebox.archive.org.url.v1"),
    ("favicon.ico", "image/x-icon", "vnd.archivebox.favicon.v1"),
    ("output.pdf", "application/pdf", "vnd.archivebox.pdf.v1"),
    ("screenshot.png", "image/png", "vnd.archivebox.screenshot.v1"),
    ("singlefile.html", "text/html", "vnd.archivebox.singlefile.v1"),
];

struct Entry {
    origin: String,
    index: SnapshotIndex,
}

/// Indexed, read-only view over an ArchiveBox archive directory.
pub struct ArchiveBoxLibrary {
    root: PathBuf,
    origins: Vec<String>,
    snapshots_by_origin: HashMap<String, Vec<String>>,
    snapshots: HashMap<String, Entry>,
    blobs: HashMap<Digest, PathBuf>,
}

impl ArchiveBoxLibrary {
    /// Scans `<root>/archive/<id>/` once at construction time, mirroring
    /// the teacher's `Indexer::Index` (a one-shot scan, not incremental).
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let archive_dir = root.join("archive");

        let mut origins = Vec::new();
        let mut snapshots_by_origin: HashMap<String, Vec<String>> = HashMap::new();
        let mut snapshots = HashMap::new();
        let mut blobs = HashMap::new();

        let mut entries = match tokio::fs::read_dir(&archive_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self { root, origins, snapshots_by_origin, snapshots, blobs })
            }
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();

        for id in ids {
            let snapshot_dir = archive_dir.join(&id);
            let meta: ArchiveBoxIndexJson = match tokio::fs::read(snapshot_dir.join("index.json")).await {
                Ok(bytes) => serde_json::from_slice(&bytes)?,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            let url = Url::parse(&meta.url)
                .map_err(|err| Error::invalid_argument(format!("bad url '{}' in {}: {}", meta.url, id, err)))?;
            let origin = url.host_str().unwrap_or_default().to_string();

            let mut index = SnapshotIndex::new();
            index.artifacts.push(ArtifactManifest::snapshot_header(&meta.url, &meta.updated));

            let mut dir_entries = tokio::fs::read_dir(&snapshot_dir).await?;
            let mut names = Vec::new();
            while let Some(entry) = dir_entries.next_entry().await? {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
            names.sort();

            for name in names {
                let Some((_, content_type, subtype)) = KNOWN_ARTIFACTS.iter().find(|(n, _, _)| *n == name) else {
                    continue;
                };
                let path = snapshot_dir.join(&name);
                let bytes = tokio::fs::read(&path).await?;
                let digest = digest_bytes(&bytes);
                let size = bytes.len() as u64;

                index.artifacts.push(
                    ArtifactManifest::new(*content_type, digest.clone(), size)
                        .with_annotation(ANNOTATION_ARTIFACT_PATH, name.as_str())
                        .with_annotation(ANNOTATION_ARTIFACT_TYPE, *subtype),
                );

                let relative = PathBuf::from("archive").join(&id).join(&name);
                blobs.insert(digest, relative);
            }

            origins.push(origin.clone());
            snapshots_by_origin.entry(origin.clone()).or_default().push(id.clone());
            snapshots.insert(id, Entry { origin, index });
        }

        origins.sort();
        origins.dedup();

        Ok(Self { root, origins, snapshots_by_origin, snapshots, blobs })
    }
}

#[async_trait::async_trait]
impl LibraryReader for ArchiveBoxLibrary {
    async fn get_origins(&self) -> Result<Vec<String>> {
        Ok(self.origins.clone())
    }

    async fn get_snapshots(&self, origin: &str) -> Result<Vec<String>> {
        Ok(self.snapshots_by_origin.get(origin).cloned().unwrap_or_default())
    }

    async fn read_snapshot(&self, origin: &str, id: &str) -> Result<SnapshotIndex> {
        let entry = self
            .snapshots
            .get(id)
            .filter(|e| e.origin == origin)
            .ok_or_else(|| Error::not_found(format!("snapshot {}/{} not found", origin, id)))?;
        Ok(entry.index.clone())
    }

    async fn read_artifact(&self, digest: &Digest) -> Result<Pin<Box<dyn BlobReader>>> {
        let relative = self
            .blobs
            .get(digest)
            .ok_or_else(|| Error::not_found(format!("artifact {} not found", digest)))?;
        read_and_verify(&self.root.join(relative), digest).await
    }
}

async fn read_and_verify(path: &Path, requested: &Digest) -> Result<Pin<Box<dyn BlobReader>>> {
    let data = tokio::fs::read(path).await?;
    let observed = digest_bytes(&data);
    if &observed != requested {
        tracing::warn!(requested = %requested, observed = %observed, path = %path.display(), "archivebox blob corruption detected on read");
    }
    Ok(Box::pin(WholeFileReader { data, pos: 0, digest: observed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn indexes_known_artifacts_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let snap_dir = dir.path().join("archive/1700000000");
        tokio::fs::create_dir_all(&snap_dir).await.unwrap();
        tokio::fs::write(
            snap_dir.join("index.json"),
            r#"{"url":"https://example.org/page","updated":"2026-07-28T00:00:00Z"}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(snap_dir.join("screenshot.png"), b"pngdata").await.unwrap();
        tokio::fs::write(snap_dir.join("unknown.bin"), b"ignored").await.unwrap();

        let lib = ArchiveBoxLibrary::open(dir.path()).await.unwrap();
        assert_eq!(lib.get_origins().await.unwrap(), vec!["example.org".to_string()]);
        let ids = lib.get_snapshots("example.org").await.unwrap();
        assert_eq!(ids, vec!["1700000000".to_string()]);

        let index = lib.read_snapshot("example.org", "1700000000").await.unwrap();
        assert_eq!(index.artifacts.len(), 2);
        assert_eq!(index.artifacts[0].digest, Digest::empty());
        assert_eq!(index.url(), Some("https://example.org/page"));
        assert_eq!(index.artifacts[1].content_type, "image/png");
    }
}
