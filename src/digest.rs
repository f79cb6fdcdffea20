//! Content digests, `<algorithm>:<hex>`.
//!
//! The teacher codebase addresses chunks by a bare `[u8; 32]` SHA-256 array
//! and prints it through `proxmox::tools::digest_to_hex` wherever a
//! human-readable form is needed. Larch's digests are library-external
//! identifiers (they show up in manifests, URLs, and the worker protocol),
//! so they get a real newtype with `Display`/`FromStr` instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::{Error, ErrorKind};

/// The empty-blob digest, `sha256:e3b0c4...`. Used as the placeholder blob
/// reference for zero-length manifests (snapshot headers, the ArchiveBox
/// library's synthesized first artifact).
pub const EMPTY_SHA256: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha256,
}

impl Algorithm {
    fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content digest: algorithm plus lowercase hex, e.g. `sha256:2cf2...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    pub fn new(algorithm: Algorithm, hex: impl Into<String>) -> Self {
        Self { algorithm, hex: hex.into().to_ascii_lowercase() }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex portion, without the `<algo>:` prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn empty() -> Self {
        Self::from_str(EMPTY_SHA256).expect("well-known constant parses")
    }

    /// Shard components used for `blobs/<algo>/<xx>/<yy>/<digest>` layout.
    pub fn shard(&self) -> (&str, &str) {
        (&self.hex[0..2], &self.hex[2..4])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algo, hex) = s.split_once(':').ok_or_else(|| {
            Error::invalid_argument(format!("digest '{}' missing ':' separator", s))
        })?;
        let algorithm = match algo {
            "sha256" => Algorithm::Sha256,
            other => {
                return Err(Error::invalid_argument(format!("unsupported digest algorithm '{}'", other)))
            }
        };
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::invalid_argument(format!("digest '{}' is not 64 hex chars", s)));
        }
        Ok(Digest::new(algorithm, hex))
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Streaming SHA-256 hasher that yields a [`Digest`] once finalized.
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha256::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Digest {
        let bytes = self.inner.finalize();
        Digest::new(Algorithm::Sha256, hex::encode(bytes))
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience: digest of a full byte slice.
pub fn digest_bytes(data: &[u8]) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest_matches_constant() {
        assert_eq!(digest_bytes(b"").to_string(), EMPTY_SHA256);
    }

    #[test]
    fn hello_digest() {
        // S1 scenario digest from spec.md
        let d = digest_bytes(b"hello");
        assert_eq!(
            d.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(d.shard(), ("2c", "f2"));
    }

    #[test]
    fn rejects_malformed() {
        assert!(Digest::from_str("sha256:nothex").is_err());
        assert!(Digest::from_str("nocolon").is_err());
        assert!(Digest::from_str("md5:aabbcc").is_err());
    }
}
