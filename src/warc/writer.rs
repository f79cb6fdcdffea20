use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;

use super::header::Header;
use super::record::Record;

/// Streaming WARC writer. With `compressed`, each record is written as its
/// own gzip member, so records can be scrubbed or concatenated without
/// re-compressing the whole file.
pub struct Writer<W> {
    inner: W,
    compressed: bool,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W, compressed: bool) -> Self {
        Self { inner, compressed }
    }

    /// Writes one record, setting `header.content_length` from `payload`.
    pub fn write_record(&mut self, header: &Header, payload: &[u8]) -> Result<()> {
        let mut header = header.clone();
        header.content_length = payload.len() as u64;

        let mut body = header.to_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\r\n\r\n");

        if self.compressed {
            let mut encoder = GzEncoder::new(&mut self.inner, Compression::default());
            encoder.write_all(&body)?;
            encoder.finish()?;
        } else {
            self.inner.write_all(&body)?;
        }
        Ok(())
    }

    pub fn write_all<'a>(&mut self, records: impl IntoIterator<Item = &'a Record>) -> Result<()> {
        for record in records {
            self.write_record(&record.header, &record.payload)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::DateTime;

    use super::*;
    use crate::warc::{Reader, RecordType};

    #[test]
    fn compressed_members_are_concatenated() {
        let date = DateTime::parse_from_rfc3339("2006-09-19T19:20:14+02:00").unwrap();
        let header = Header::new(RecordType::Resource, "urn:uuid:a", date).with_content_type("text/plain");

        let mut buf = Vec::new();
        {
            let mut writer = Writer::new(&mut buf, true);
            writer.write_record(&header, b"abc").unwrap();
            writer.write_record(&header, b"defgh").unwrap();
        }

        let mut reader = Reader::new(Cursor::new(buf), true);
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, b"abc");
        assert_eq!(records[1].payload, b"defgh");
    }
}
