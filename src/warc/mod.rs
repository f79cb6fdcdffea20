//! WARC 1.0 codec.
//!
//! Grounded in `examples/original_source/warc/warc.go`: the record/header
//! shape and the `warcinfo`/`metadata` payload field names come straight
//! from that file's struct tags, but `ReadHeader`, `parseInfoPayload` and
//! `parseMetadataPayload` were stubs there (`// TODO: Actually read
//! header`) -- this module is the filled-in version, plus a seekable
//! payload re-fetch and per-record gzip framing on top.

mod header;
mod payload;
mod reader;
mod record;
mod writer;

pub use header::{Header, RecordType, TruncatedReason};
pub use payload::{InfoPayload, MetadataPayload, ParsedPayload, PayloadParser, PayloadRegistry, WARC_FIELDS_CONTENT_TYPE};
pub use reader::Reader;
pub use record::{File, Record};
pub use writer::Writer;
