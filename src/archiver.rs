//! Archiver contract (spec.md §4.6 data model, §9 "dynamic archiver
//! dispatch").
//!
//! An archiver is a black box: given a URL and a snapshot-writer handle, it
//! writes zero or more artifacts plus their manifests and returns. The core
//! specifies only this contract -- Chrome/CDP driving, archive.org capture,
//! and HTML/OpenGraph scraping are external collaborators out of scope per
//! spec.md §1. This module defines the `Archiver` trait and the closed set
//! of `ArchiverSpec` variants named in
//! `examples/original_source/internal/worker/models.go`'s `Archiver` struct
//! (there, a struct of three optional pointers standing in for a sum type;
//! Rust expresses the same "select one variant" idea as an enum).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::library::SnapshotWriterHandle;

/// A `WxH` screen resolution for a Chrome archiver's screenshot captures.
/// Grounded in `models.go`'s `Resolution` string-with-a-`Rect()`-method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::str::FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| Error::invalid_argument(format!("invalid resolution '{}'", s)))?;
        let width = w.parse().map_err(|_| Error::invalid_argument(format!("invalid resolution width '{}'", w)))?;
        let height = h.parse().map_err(|_| Error::invalid_argument(format!("invalid resolution height '{}'", h)))?;
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Selects an archiver implementation at strategy-resolution time; no
/// runtime reflection is required (spec.md §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArchiverSpec {
    /// Headless-browser capture: screenshots, PDF print, single-file HTML
    /// save. Driving Chrome/CDP is an external collaborator (spec.md §1);
    /// this variant only carries the options a concrete implementation needs.
    Chrome {
        #[serde(default)]
        save_pdf: bool,
        #[serde(default)]
        save_singlefile: bool,
        #[serde(default)]
        screenshot_resolutions: Vec<Resolution>,
    },
    /// Submits the URL to an external web archive (e.g. archive.org) and
    /// records the resulting capture URL. Outbound HTTP fetching against
    /// remote origins is an external collaborator.
    ArchiveOrg,
    /// Extracts OpenGraph metadata from the fetched page and writes it as
    /// an artifact tagged `vnd.larch.opengraph.meta.v1`. HTML scraping
    /// itself is an external collaborator; per spec.md §9's design note,
    /// `og:title` enrichment for the index is done at index time
    /// (`crate::index`), not duplicated here.
    OpenGraph,
}

impl ArchiverSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiverSpec::Chrome { .. } => "chrome",
            ArchiverSpec::ArchiveOrg => "archive_org",
            ArchiverSpec::OpenGraph => "opengraph",
        }
    }
}

/// One archiver invocation against one URL, writing into `writer`
/// (spec.md §9: `archive(ctx, snapshot_writer, url) -> Result<(), ErrorKind>`).
/// Rust's `Result<(), Error>` plays the role of the abstract `ErrorKind`
/// result the spec describes; cancellation is carried by the caller
/// dropping the future rather than a separate `ctx` parameter (see
/// `crate::scheduler`'s use of `tokio_util::sync::CancellationToken`).
#[async_trait::async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, writer: &mut dyn SnapshotWriterHandle, url: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Minimal in-process archivers used by scheduler/worker lifecycle
    //! tests (spec.md §8 scenarios S4/S7): each writes one artifact and its
    //! manifest, standing in for a real Chrome/ArchiveOrg/OpenGraph capture.

    use super::*;

    pub struct MockArchiver {
        pub content_type: &'static str,
        pub body: &'static [u8],
    }

    #[async_trait::async_trait]
    impl Archiver for MockArchiver {
        async fn archive(&self, writer: &mut dyn SnapshotWriterHandle, _url: &str) -> Result<()> {
            let (size, digest) = writer.write_artifact("artifact", self.body).await?;
            writer
                .write_artifact_manifest(crate::snapshot::ArtifactManifest::new(self.content_type, digest, size))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses_and_displays() {
        let r: Resolution = "1920x1080".parse().unwrap();
        assert_eq!(r, Resolution { width: 1920, height: 1080 });
        assert_eq!(r.to_string(), "1920x1080");
        assert!("bogus".parse::<Resolution>().is_err());
    }

    #[test]
    fn archiver_spec_round_trips_through_json() {
        let spec = ArchiverSpec::Chrome { save_pdf: true, save_singlefile: false, screenshot_resolutions: vec![] };
        let json = serde_json::to_string(&spec).unwrap();
        let back: ArchiverSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "chrome");
    }
}
