use super::header::Header;

/// One WARC record: header plus raw payload bytes. Typed decoding of the
/// payload (e.g. `warcinfo` key/value fields) happens separately via
/// [`super::PayloadRegistry`] -- the record itself always keeps the raw
/// bytes so a reader byte-for-byte reproduces what was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Record {
    /// Builds a record, setting `header.content_length` from the payload
    /// so callers never have to keep the two in sync by hand.
    pub fn new(mut header: Header, payload: Vec<u8>) -> Self {
        header.content_length = payload.len() as u64;
        Self { header, payload }
    }
}

/// An in-memory WARC file: an ordered sequence of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct File {
    pub records: Vec<Record>,
}
