//! Typed payload parsers for `warcinfo`/`metadata` records, dispatched
//! through a pluggable registry keyed by `WARC-Type`. Field names follow
//! `examples/original_source/warc/warc.go`'s `InfoPayload`/`MetadataPayload`
//! struct tags; parsing itself was a `// TODO` there and is implemented here.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

use super::header::RecordType;

pub const WARC_FIELDS_CONTENT_TYPE: &str = "application/warc-fields";

/// Payload of a `warcinfo` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoPayload {
    pub operator: Option<String>,
    pub software: Option<String>,
    pub robots: Option<String>,
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub from: Option<String>,
}

/// Payload of a `metadata` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPayload {
    pub via: Option<String>,
    pub hops_from_seed: Option<String>,
    pub fetch_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPayload {
    Raw(Vec<u8>),
    Info(InfoPayload),
    Metadata(MetadataPayload),
}

/// Parses `application/warc-fields` body: one `key: value` pair per line,
/// CRLF-delimited.
pub fn parse_warc_fields(raw: &[u8]) -> Result<BTreeMap<String, String>> {
    let text =
        std::str::from_utf8(raw).map_err(|err| Error::invalid_argument(format!("warc-fields payload is not utf8: {}", err)))?;
    let mut fields = BTreeMap::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| Error::invalid_argument(format!("malformed warc-fields line '{}'", line)))?;
        fields.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(fields)
}

pub fn parse_info_payload(raw: &[u8]) -> Result<InfoPayload> {
    let fields = parse_warc_fields(raw)?;
    Ok(InfoPayload {
        operator: fields.get("operator").cloned(),
        software: fields.get("software").cloned(),
        robots: fields.get("robots").cloned(),
        hostname: fields.get("hostname").cloned(),
        ip: fields.get("ip").cloned(),
        user_agent: fields.get("http-header-user-agent").cloned(),
        from: fields.get("http-header-from").cloned(),
    })
}

pub fn parse_metadata_payload(raw: &[u8]) -> Result<MetadataPayload> {
    let fields = parse_warc_fields(raw)?;
    Ok(MetadataPayload {
        via: fields.get("via").cloned(),
        hops_from_seed: fields.get("hopsFromSeed").cloned(),
        fetch_time_ms: fields.get("fetchTimeMs").and_then(|v| v.parse().ok()),
    })
}

/// A decoder for one `WARC-Type`'s payload. Lets callers register
/// structured decoders for their own record types without coupling the
/// codec to them.
pub trait PayloadParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<ParsedPayload>;
}

struct RawParser;

impl PayloadParser for RawParser {
    fn parse(&self, raw: &[u8]) -> Result<ParsedPayload> {
        Ok(ParsedPayload::Raw(raw.to_vec()))
    }
}

struct InfoParser;

impl PayloadParser for InfoParser {
    fn parse(&self, raw: &[u8]) -> Result<ParsedPayload> {
        Ok(ParsedPayload::Info(parse_info_payload(raw)?))
    }
}

struct MetadataParser;

impl PayloadParser for MetadataParser {
    fn parse(&self, raw: &[u8]) -> Result<ParsedPayload> {
        Ok(ParsedPayload::Metadata(parse_metadata_payload(raw)?))
    }
}

/// Maps `WARC-Type` to a [`PayloadParser`]; types without a registered
/// parser fall back to [`ParsedPayload::Raw`].
pub struct PayloadRegistry {
    parsers: HashMap<RecordType, Box<dyn PayloadParser>>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        let mut parsers: HashMap<RecordType, Box<dyn PayloadParser>> = HashMap::new();
        parsers.insert(RecordType::WarcInfo, Box::new(InfoParser));
        parsers.insert(RecordType::Metadata, Box::new(MetadataParser));
        Self { parsers }
    }

    pub fn register(&mut self, record_type: RecordType, parser: Box<dyn PayloadParser>) {
        self.parsers.insert(record_type, parser);
    }

    pub fn parse(&self, record_type: RecordType, raw: Vec<u8>) -> Result<ParsedPayload> {
        match self.parsers.get(&record_type) {
            Some(parser) => parser.parse(&raw),
            None => RawParser.parse(&raw),
        }
    }
}

impl Default for PayloadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_warcinfo_fields() {
        let raw = b"operator: larch\r\nsoftware: larch/0.1\r\nhttp-header-user-agent: larchbot\r\n";
        let payload = parse_info_payload(raw).unwrap();
        assert_eq!(payload.operator.as_deref(), Some("larch"));
        assert_eq!(payload.user_agent.as_deref(), Some("larchbot"));
    }

    #[test]
    fn parses_metadata_fetch_time() {
        let raw = b"via: https://example.org/\r\nfetchTimeMs: 120\r\n";
        let payload = parse_metadata_payload(raw).unwrap();
        assert_eq!(payload.fetch_time_ms, Some(120));
    }

    #[test]
    fn registry_falls_back_to_raw() {
        let registry = PayloadRegistry::new();
        let parsed = registry.parse(RecordType::Response, b"hello".to_vec()).unwrap();
        assert_eq!(parsed, ParsedPayload::Raw(b"hello".to_vec()));
    }
}
