//! Larch: an archival pipeline and content-addressed library for web
//! snapshots.
//!
//! This crate is the core spec.md describes: the snapshot scheduler and
//! worker protocol ([`scheduler`], [`api::worker`]), the content-addressed
//! library ([`blob`], [`snapshot`], [`library`]), and the WARC 1.0 codec
//! ([`warc`]). The CLI, config loading, and HTTP surfaces (`larch`,
//! `larch-worker`) are thin binaries built on top -- see `src/bin/`.

pub mod api;
pub mod archiver;
pub mod blob;
pub mod config;
pub mod digest;
pub mod error;
pub mod index;
pub mod library;
pub mod scheduler;
pub mod snapshot;
pub mod warc;
