//! Configuration file schema (spec.md §6 "CLI surface").
//!
//! The CLI layer itself is an external collaborator (spec.md §1) and the
//! exact on-disk schema is explicitly out of scope for the core; this
//! module only defines the `sources`/`strategies`/`libraries` shapes the
//! scheduler and library-mounting code need so a CLI can be layered on top
//! of `larch::scheduler::Scheduler` without the core guessing at flags it
//! doesn't consume. Parsed with `serde` + `toml`, the same
//! deserialize-into-a-typed-struct shape the teacher uses for its own
//! section-based config files, adapted from the teacher's ini-style
//! `SectionConfig` (internal to Proxmox) to a plain TOML document since
//! that's the format this crate's dependency stack already carries.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archiver::ArchiverSpec;
use crate::error::{Error, ErrorKind, Result};
use crate::scheduler::Strategy;

/// One mounted library entry. `kind` selects the backend; `path` is the
/// on-disk root for `disk`/`archivebox` backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LibraryConfig {
    Disk { path: String },
    ArchiveBox { path: String },
}

/// A URL to periodically (re-)archive under a named strategy. Scheduling
/// `sources` on an interval is CLI/cron behavior and out of scope for the
/// core; this struct only carries the data a CLI driver needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub strategy: String,
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

/// Top-level config file shape: `[libraries.*]`, `[strategies.*]`, `[[sources]]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub libraries: HashMap<String, LibraryConfig>,
    #[serde(default)]
    pub strategies: HashMap<String, StrategyConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// On-disk shape of a [`Strategy`]; kept distinct from `Strategy` itself
/// so the scheduler's runtime type doesn't carry a `Deserialize` bound it
/// doesn't otherwise need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub library: String,
    pub archivers: Vec<ArchiverSpec>,
}

impl From<StrategyConfig> for Strategy {
    fn from(cfg: StrategyConfig) -> Self {
        Strategy { library: cfg.library, archivers: cfg.archivers }
    }
}

impl Config {
    /// Reads and parses a TOML config file. I/O failure and malformed TOML
    /// both surface as `InvalidArgument` (spec.md §6: "non-zero on failure
    /// to bind or to read configuration").
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| Error::with_source(ErrorKind::InvalidArgument, format!("reading config '{}'", path.display()), err.into()))?;
        toml::from_str(&raw)
            .map_err(|err| Error::with_source(ErrorKind::InvalidArgument, format!("parsing config '{}'", path.display()), err.into()))
    }

    pub fn strategy(&self, name: &str) -> Result<Strategy> {
        self.strategies
            .get(name)
            .cloned()
            .map(Strategy::from)
            .ok_or_else(|| Error::invalid_argument(format!("unknown strategy '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("larch.toml");
        tokio::fs::write(
            &path,
            r#"
            [libraries.disk]
            kind = "disk"
            path = "/var/lib/larch"

            [strategies.default]
            library = "disk"
            archivers = [{ type = "openGraph" }]

            [[sources]]
            url = "https://example.org/"
            strategy = "default"
            "#,
        )
        .await
        .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.libraries.len(), 1);
        let strategy = config.strategy("default").unwrap();
        assert_eq!(strategy.library, "disk");
        assert_eq!(config.sources[0].url, "https://example.org/");
    }

    #[tokio::test]
    async fn missing_file_is_invalid_argument() {
        let err = Config::load("/nonexistent/larch.toml").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn unknown_strategy_is_invalid_argument() {
        let config = Config::default();
        let err = config.strategy("missing").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
