use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};

use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// `WARC-Type`. See http://bibnum.bnf.fr/WARC/WARC_ISO_28500_version1_latestdraft.pdf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    WarcInfo,
    Response,
    Resource,
    Request,
    Metadata,
    Revisit,
    Conversion,
    Continuation,
}

impl RecordType {
    fn as_str(&self) -> &'static str {
        match self {
            RecordType::WarcInfo => "warcinfo",
            RecordType::Response => "response",
            RecordType::Resource => "resource",
            RecordType::Request => "request",
            RecordType::Metadata => "metadata",
            RecordType::Revisit => "revisit",
            RecordType::Conversion => "conversion",
            RecordType::Continuation => "continuation",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "warcinfo" => RecordType::WarcInfo,
            "response" => RecordType::Response,
            "resource" => RecordType::Resource,
            "request" => RecordType::Request,
            "metadata" => RecordType::Metadata,
            "revisit" => RecordType::Revisit,
            "conversion" => RecordType::Conversion,
            "continuation" => RecordType::Continuation,
            other => return Err(Error::invalid_argument(format!("unknown WARC-Type '{}'", other))),
        })
    }
}

/// `WARC-Truncated` reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncatedReason {
    Length,
    Time,
    Disconnect,
    Unspecified,
}

impl fmt::Display for TruncatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TruncatedReason::Length => "length",
            TruncatedReason::Time => "time",
            TruncatedReason::Disconnect => "disconnect",
            TruncatedReason::Unspecified => "unspecified",
        };
        f.write_str(s)
    }
}

impl FromStr for TruncatedReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "length" => TruncatedReason::Length,
            "time" => TruncatedReason::Time,
            "disconnect" => TruncatedReason::Disconnect,
            "unspecified" => TruncatedReason::Unspecified,
            other => return Err(Error::invalid_argument(format!("unknown WARC-Truncated '{}'", other))),
        })
    }
}

/// A WARC record header. Field order here mirrors the canonical wire order
/// used by [`Header::to_bytes`] -- mandatory fields first, then optional
/// fields in a fixed, documented order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub record_type: RecordType,
    pub record_id: String,
    pub date: DateTime<FixedOffset>,
    pub content_length: u64,
    pub content_type: Option<String>,
    pub concurrent_to: Option<String>,
    pub block_digest: Option<String>,
    pub payload_digest: Option<String>,
    pub ip_address: Option<String>,
    pub refers_to: Option<String>,
    pub target_uri: Option<String>,
    pub truncated: Option<TruncatedReason>,
    pub warcinfo_id: Option<String>,
    pub filename: Option<String>,
    pub profile: Option<String>,
    pub identified_payload_type: Option<String>,
    pub segment_number: Option<u64>,
    pub segment_origin_id: Option<String>,
    pub segment_total_length: Option<u64>,
}

impl Header {
    pub fn new(record_type: RecordType, record_id: impl Into<String>, date: DateTime<FixedOffset>) -> Self {
        Self {
            record_type,
            record_id: record_id.into(),
            date,
            content_length: 0,
            content_type: None,
            concurrent_to: None,
            block_digest: None,
            payload_digest: None,
            ip_address: None,
            refers_to: None,
            target_uri: None,
            truncated: None,
            warcinfo_id: None,
            filename: None,
            profile: None,
            identified_payload_type: None,
            segment_number: None,
            segment_origin_id: None,
            segment_total_length: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_target_uri(mut self, target_uri: impl Into<String>) -> Self {
        self.target_uri = Some(target_uri.into());
        self
    }

    pub fn with_concurrent_to(mut self, record_id: impl Into<String>) -> Self {
        self.concurrent_to = Some(record_id.into());
        self
    }

    pub fn with_block_digest(mut self, digest: impl Into<String>) -> Self {
        self.block_digest = Some(digest.into());
        self
    }

    pub fn with_payload_digest(mut self, digest: impl Into<String>) -> Self {
        self.payload_digest = Some(digest.into());
        self
    }

    pub fn with_warcinfo_id(mut self, record_id: impl Into<String>) -> Self {
        self.warcinfo_id = Some(record_id.into());
        self
    }

    pub fn with_truncated(mut self, reason: TruncatedReason) -> Self {
        self.truncated = Some(reason);
        self
    }

    /// Serialize to `WARC/1.0\r\n<fields>\r\n`, i.e. up to and including the
    /// blank line that separates header from payload. Omits empty optional
    /// fields rather than writing them as blank.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"WARC/1.0\r\n");

        let mut push = |name: &str, value: &str| {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        };

        push("WARC-Type", self.record_type.as_str());
        push("WARC-Record-ID", &self.record_id);
        push("WARC-Date", &self.date.format(DATE_FORMAT).to_string());
        push("Content-Length", &self.content_length.to_string());
        if let Some(v) = &self.content_type {
            push("Content-Type", v);
        }
        if let Some(v) = &self.concurrent_to {
            push("WARC-Concurrent-To", v);
        }
        if let Some(v) = &self.block_digest {
            push("WARC-Block-Digest", v);
        }
        if let Some(v) = &self.payload_digest {
            push("WARC-Payload-Digest", v);
        }
        if let Some(v) = &self.ip_address {
            push("WARC-IP-Address", v);
        }
        if let Some(v) = &self.refers_to {
            push("WARC-Refers-To", v);
        }
        if let Some(v) = &self.target_uri {
            push("WARC-Target-URI", v);
        }
        if let Some(v) = &self.truncated {
            push("WARC-Truncated", &v.to_string());
        }
        if let Some(v) = &self.warcinfo_id {
            push("WARC-Warcinfo-ID", v);
        }
        if let Some(v) = &self.filename {
            push("WARC-Filename", v);
        }
        if let Some(v) = &self.profile {
            push("WARC-Profile", v);
        }
        if let Some(v) = &self.identified_payload_type {
            push("WARC-Identified-Payload-Type", v);
        }
        if let Some(v) = &self.segment_number {
            push("WARC-Segment-Number", &v.to_string());
        }
        if let Some(v) = &self.segment_origin_id {
            push("WARC-Segment-Origin-ID", v);
        }
        if let Some(v) = &self.segment_total_length {
            push("WARC-Segment-Total-Length", &v.to_string());
        }

        out.extend_from_slice(b"\r\n");
        out
    }

    /// Parses a header from its raw field lines (without the leading
    /// `WARC/1.0` version line or the trailing blank line -- the reader
    /// strips those before calling in).
    pub fn parse(lines: &[String]) -> Result<Self> {
        let mut record_type = None;
        let mut record_id = None;
        let mut date = None;
        let mut content_length = None;
        let mut header = RawFields::default();

        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::invalid_argument(format!("malformed WARC header line '{}'", line)))?;
            let name = name.trim();
            let value = value.trim();

            match name {
                "WARC-Type" => record_type = Some(RecordType::from_str(value)?),
                "WARC-Record-ID" => record_id = Some(value.to_string()),
                "WARC-Date" => {
                    date = Some(
                        DateTime::parse_from_str(value, DATE_FORMAT)
                            .map_err(|err| Error::invalid_argument(format!("bad WARC-Date '{}': {}", value, err)))?,
                    )
                }
                "Content-Length" => {
                    content_length = Some(
                        value
                            .parse::<u64>()
                            .map_err(|err| Error::invalid_argument(format!("bad Content-Length '{}': {}", value, err)))?,
                    )
                }
                "Content-Type" => header.content_type = Some(value.to_string()),
                "WARC-Concurrent-To" => header.concurrent_to = Some(value.to_string()),
                "WARC-Block-Digest" => header.block_digest = Some(value.to_string()),
                "WARC-Payload-Digest" => header.payload_digest = Some(value.to_string()),
                "WARC-IP-Address" => header.ip_address = Some(value.to_string()),
                "WARC-Refers-To" => header.refers_to = Some(value.to_string()),
                "WARC-Target-URI" => header.target_uri = Some(value.to_string()),
                "WARC-Truncated" => header.truncated = Some(TruncatedReason::from_str(value)?),
                "WARC-Warcinfo-ID" => header.warcinfo_id = Some(value.to_string()),
                "WARC-Filename" => header.filename = Some(value.to_string()),
                "WARC-Profile" => header.profile = Some(value.to_string()),
                "WARC-Identified-Payload-Type" => header.identified_payload_type = Some(value.to_string()),
                "WARC-Segment-Number" => {
                    header.segment_number = Some(
                        value
                            .parse::<u64>()
                            .map_err(|err| Error::invalid_argument(format!("bad WARC-Segment-Number: {}", err)))?,
                    )
                }
                "WARC-Segment-Origin-ID" => header.segment_origin_id = Some(value.to_string()),
                "WARC-Segment-Total-Length" => {
                    header.segment_total_length = Some(
                        value
                            .parse::<u64>()
                            .map_err(|err| Error::invalid_argument(format!("bad WARC-Segment-Total-Length: {}", err)))?,
                    )
                }
                // Unknown fields are tolerated -- a WARC file may carry
                // extension fields this codec doesn't model.
                _ => {}
            }
        }

        let record_type = record_type.ok_or_else(|| Error::invalid_argument("missing WARC-Type"))?;
        let record_id = record_id.ok_or_else(|| Error::invalid_argument("missing WARC-Record-ID"))?;
        let date = date.ok_or_else(|| Error::invalid_argument("missing WARC-Date"))?;
        let content_length = content_length.ok_or_else(|| Error::invalid_argument("missing Content-Length"))?;

        if content_length > 0 && !matches!(record_type, RecordType::Continuation) && header.content_type.is_none() {
            return Err(Error::invalid_argument("non-empty, non-continuation record missing Content-Type"));
        }

        Ok(Self {
            record_type,
            record_id,
            date,
            content_length,
            content_type: header.content_type,
            concurrent_to: header.concurrent_to,
            block_digest: header.block_digest,
            payload_digest: header.payload_digest,
            ip_address: header.ip_address,
            refers_to: header.refers_to,
            target_uri: header.target_uri,
            truncated: header.truncated,
            warcinfo_id: header.warcinfo_id,
            filename: header.filename,
            profile: header.profile,
            identified_payload_type: header.identified_payload_type,
            segment_number: header.segment_number,
            segment_origin_id: header.segment_origin_id,
            segment_total_length: header.segment_total_length,
        })
    }
}

#[derive(Default)]
struct RawFields {
    content_type: Option<String>,
    concurrent_to: Option<String>,
    block_digest: Option<String>,
    payload_digest: Option<String>,
    ip_address: Option<String>,
    refers_to: Option<String>,
    target_uri: Option<String>,
    truncated: Option<TruncatedReason>,
    warcinfo_id: Option<String>,
    filename: Option<String>,
    profile: Option<String>,
    identified_payload_type: Option<String>,
    segment_number: Option<u64>,
    segment_origin_id: Option<String>,
    segment_total_length: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mandatory_fields() {
        let date = DateTime::parse_from_str("2006-09-19T19:20:14+0200", DATE_FORMAT).unwrap();
        let header = Header::new(RecordType::WarcInfo, "urn:uuid:d7ae5c10-e6b3-4d27-967d-34780c58ba39", date)
            .with_content_type("application/warc-fields");
        let mut header = header;
        header.content_length = 11;

        let bytes = header.to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<String> = text.trim_end_matches("\r\n\r\n").split("\r\n").skip(1).map(String::from).collect();
        let parsed = Header::parse(&lines).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_missing_content_type_on_non_empty_record() {
        let date = DateTime::parse_from_str("2006-09-19T19:20:14+0200", DATE_FORMAT).unwrap();
        let lines = vec![
            "WARC-Type: response".to_string(),
            "WARC-Record-ID: urn:uuid:x".to_string(),
            format!("WARC-Date: {}", date.format(DATE_FORMAT)),
            "Content-Length: 5".to_string(),
        ];
        assert!(Header::parse(&lines).is_err());
    }
}
