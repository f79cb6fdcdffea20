//! In-memory catalog over one or more mounted libraries.
//!
//! Rebuilt by scanning libraries at startup and kept current by
//! re-indexing a single snapshot after each job reaches a terminal state
//! (see [`crate::scheduler`]). Grounded in the teacher's in-memory
//! `DataStore` cache pattern (`backup.rs` keeps a process-wide map of
//! known datastores rather than hitting disk on every request) --
//! generalized here from "one map of named stores" to "two denormalized
//! maps kept in sync by an explicit scan".

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::Serialize;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::library::LibraryReader;
use crate::snapshot::{ArtifactManifest, OPENGRAPH_META_ARTIFACT_TYPE};

/// Key identifying a snapshot across all mounted libraries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub origin: String,
    pub id: String,
}

/// Denormalized view of one snapshot, built from its index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedSnapshot {
    pub library_id: String,
    pub origin: String,
    pub id: String,
    pub url: Option<String>,
    pub date: Option<String>,
    /// Populated when an `og:title` artifact was indexed alongside this snapshot.
    pub title: Option<String>,
    pub artifacts: Vec<ArtifactManifest>,
}

/// Which libraries hold a given blob.
#[derive(Debug, Clone, Default)]
pub struct IndexedBlob {
    pub libraries: HashSet<String>,
}

#[derive(Default)]
struct State {
    snapshots: HashMap<SnapshotKey, IndexedSnapshot>,
    blobs: HashMap<Digest, IndexedBlob>,
}

/// Thread-safe, in-memory catalog. One instance is shared across the
/// scheduler, worker protocol, and public read API.
#[derive(Default)]
pub struct Index {
    state: RwLock<State>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerates `origins x snapshots` of one library and indexes each.
    pub async fn index_library(&self, library_id: &str, reader: &dyn LibraryReader) -> Result<()> {
        for origin in reader.get_origins().await? {
            for id in reader.get_snapshots(&origin).await? {
                self.index_snapshot(library_id, &origin, &id, reader).await?;
            }
        }
        Ok(())
    }

    /// Reads one snapshot's index and merges it into the catalog.
    pub async fn index_snapshot(&self, library_id: &str, origin: &str, id: &str, reader: &dyn LibraryReader) -> Result<()> {
        let snapshot_index = reader.read_snapshot(origin, id).await?;

        let mut title = None;
        for manifest in &snapshot_index.artifacts {
            if manifest.annotations.get(crate::snapshot::ANNOTATION_ARTIFACT_TYPE).map(String::as_str)
                == Some(OPENGRAPH_META_ARTIFACT_TYPE)
            {
                if let Ok(bytes) = reader.read_artifact(&manifest.digest).await {
                    if let Some(t) = extract_og_title(bytes).await {
                        title = Some(t);
                    }
                }
            }
        }

        let indexed = IndexedSnapshot {
            library_id: library_id.to_string(),
            origin: origin.to_string(),
            id: id.to_string(),
            url: snapshot_index.url().map(String::from),
            date: snapshot_index.date().map(String::from),
            title,
            artifacts: snapshot_index.artifacts.clone(),
        };

        let mut state = self.state.write().unwrap();
        for manifest in &snapshot_index.artifacts {
            state.blobs.entry(manifest.digest.clone()).or_default().libraries.insert(library_id.to_string());
        }
        state.snapshots.insert(SnapshotKey { origin: origin.to_string(), id: id.to_string() }, indexed);
        Ok(())
    }

    pub fn list_snapshots(&self, origin: Option<&str>) -> Vec<IndexedSnapshot> {
        let state = self.state.read().unwrap();
        let mut out: Vec<IndexedSnapshot> = state
            .snapshots
            .values()
            .filter(|s| origin.map_or(true, |o| o == s.origin))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.origin.as_str(), a.id.as_str()).cmp(&(b.origin.as_str(), b.id.as_str())));
        out
    }

    pub fn get_snapshot(&self, origin: &str, id: &str) -> Result<IndexedSnapshot> {
        self.state
            .read()
            .unwrap()
            .snapshots
            .get(&SnapshotKey { origin: origin.to_string(), id: id.to_string() })
            .cloned()
            .ok_or_else(|| Error::not_found(format!("snapshot {}/{} not found", origin, id)))
    }

    pub fn get_artifact(&self, origin: &str, id: &str, digest: &Digest) -> Result<ArtifactManifest> {
        let snapshot = self.get_snapshot(origin, id)?;
        snapshot
            .artifacts
            .into_iter()
            .find(|a| &a.digest == digest)
            .ok_or_else(|| Error::not_found(format!("artifact {} not found in {}/{}", digest, origin, id)))
    }

    pub fn get_blob(&self, digest: &Digest) -> Result<IndexedBlob> {
        self.state.read().unwrap().blobs.get(digest).cloned().ok_or_else(|| Error::not_found(format!("blob {} not found", digest)))
    }
}

/// Parses `<meta property="og:title" content="...">` out of an HTML blob.
/// Deliberately tolerant: a missing or malformed tag just yields `None`
/// rather than failing indexing: enrichment happens only at index time
/// and must never block it.
async fn extract_og_title(mut reader: std::pin::Pin<Box<dyn crate::blob::BlobReader>>) -> Option<String> {
    use tokio::io::AsyncReadExt;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await.ok()?;
    let html = String::from_utf8_lossy(&bytes);
    find_og_title(&html)
}

fn find_og_title(html: &str) -> Option<String> {
    for tag_start in html.match_indices("<meta").map(|(i, _)| i) {
        let tag_end = html[tag_start..].find('>').map(|i| tag_start + i)?;
        let tag = &html[tag_start..tag_end];
        if !tag.contains("og:title") {
            continue;
        }
        if let Some(content_start) = tag.find("content=") {
            let rest = &tag[content_start + "content=".len()..];
            let quote = rest.chars().next()?;
            if quote == '"' || quote == '\'' {
                let value_start = 1;
                let value_end = rest[value_start..].find(quote)?;
                return Some(rest[value_start..value_start + value_end].to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{DiskLibrary, LibraryWriter};
    use crate::snapshot::{ANNOTATION_ARTIFACT_TYPE, SNAPSHOT_MANIFEST_CONTENT_TYPE};

    #[test]
    fn og_title_extraction() {
        let html = r#"<html><head><meta property="og:title" content="Example Title"/></head></html>"#;
        assert_eq!(find_og_title(html), Some("Example Title".to_string()));
        assert_eq!(find_og_title("<html></html>"), None);
    }

    #[tokio::test]
    async fn indexes_snapshot_and_resolves_title() {
        let dir = tempfile::tempdir().unwrap();
        let library = DiskLibrary::new(dir.path());

        let mut writer = library.write_snapshot("example.org", "1").await.unwrap();
        let header_digest = Digest::empty();
        writer
            .write_artifact_manifest(ArtifactManifest::new(SNAPSHOT_MANIFEST_CONTENT_TYPE, header_digest, 0)
                .with_annotation(crate::snapshot::ANNOTATION_SNAPSHOT_URL, "https://example.org/")
                .with_annotation(crate::snapshot::ANNOTATION_SNAPSHOT_DATE, "2026-07-28T00:00:00Z"))
            .await
            .unwrap();

        let html = br#"<meta property="og:title" content="Hello">"#;
        let (size, digest) = writer.write_artifact("opengraph", html).await.unwrap();
        writer
            .write_artifact_manifest(
                ArtifactManifest::new("text/html", digest, size).with_annotation(ANNOTATION_ARTIFACT_TYPE, OPENGRAPH_META_ARTIFACT_TYPE),
            )
            .await
            .unwrap();
        writer.close().await.unwrap();

        let index = Index::new();
        index.index_library("disk", &library).await.unwrap();

        let snapshot = index.get_snapshot("example.org", "1").unwrap();
        assert_eq!(snapshot.title.as_deref(), Some("Hello"));
        assert_eq!(snapshot.url.as_deref(), Some("https://example.org/"));
    }
}
