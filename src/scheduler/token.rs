//! Capability tokens scoping a worker's write access to one snapshot.
//!
//! The scheduler never persists jobs across restarts (see DESIGN.md), so a
//! token can't be a lookup key into a server-side table that survives a
//! restart anyway. Instead each token is
//! self-describing and HMAC-signed with the scheduler's process-lifetime
//! `secret` (`examples/original_source/internal/worker/models.go`'s
//! `JobRequest.Token string` was a bare `// TODO: JWT which points to
//! snapshot and everything?` -- this is that TODO, filled in as a small
//! JWT-shaped-but-not-JWT signed payload rather than pulling in a full JWT
//! stack for one claim set).

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, ErrorKind, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    origin: String,
    snapshot_id: String,
    job_id: String,
    library: String,
    /// Unix milliseconds.
    deadline: i64,
}

/// An opaque, signed capability token. Construct with [`mint`], check a
/// presented token against an expected scope with [`verify`].
pub struct CapabilityToken;

fn b64(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

fn unb64(s: &str) -> Result<Vec<u8>> {
    base64::decode_config(s, base64::URL_SAFE_NO_PAD)
        .map_err(|err| Error::unauthorized(format!("malformed token: {}", err)))
}

impl CapabilityToken {
    /// Mints a token scoping writes to `(origin, snapshot_id)` under
    /// `library`, valid until `deadline`.
    pub fn mint(
        secret: &[u8],
        origin: &str,
        snapshot_id: &str,
        job_id: &str,
        library: &str,
        deadline: chrono::DateTime<chrono::Utc>,
    ) -> String {
        let claims = Claims {
            origin: origin.to_string(),
            snapshot_id: snapshot_id.to_string(),
            job_id: job_id.to_string(),
            library: library.to_string(),
            deadline: deadline.timestamp_millis(),
        };
        let payload = serde_json::to_vec(&claims).expect("claims always serialize");
        let payload_b64 = b64(&payload);

        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        let signature = mac.finalize().into_bytes();

        format!("{}.{}", payload_b64, b64(&signature))
    }

    /// Verifies a presented token's signature and expiry, and that it
    /// scopes exactly `(origin, snapshot_id)`. Returns the token's
    /// associated library id on success.
    pub fn verify(secret: &[u8], token: &str, origin: &str, snapshot_id: &str) -> Result<String> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| Error::unauthorized("malformed token"))?;

        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        let signature = unb64(signature_b64)?;
        mac.verify_slice(&signature).map_err(|_| Error::unauthorized("token signature mismatch"))?;

        let payload = unb64(payload_b64)?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|err| Error::unauthorized(format!("malformed token claims: {}", err)))?;

        if claims.origin != origin || claims.snapshot_id != snapshot_id {
            return Err(Error::new(
                ErrorKind::Unauthorized,
                format!(
                    "token scoped to {}/{}, not {}/{}",
                    claims.origin, claims.snapshot_id, origin, snapshot_id
                ),
            ));
        }

        let now = chrono::Utc::now().timestamp_millis();
        if now > claims.deadline {
            return Err(Error::new(ErrorKind::Unauthorized, "token deadline has passed"));
        }

        Ok(claims.library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn mint_and_verify_round_trip() {
        let secret = b"supersecretkeysupersecretkey1234";
        let deadline = chrono::Utc::now() + Duration::minutes(30);
        let token = CapabilityToken::mint(secret, "example.org", "1700000000000", "job-1", "disk", deadline);
        let library = CapabilityToken::verify(secret, &token, "example.org", "1700000000000").unwrap();
        assert_eq!(library, "disk");
    }

    #[test]
    fn verify_rejects_wrong_scope() {
        let secret = b"supersecretkeysupersecretkey1234";
        let deadline = chrono::Utc::now() + Duration::minutes(30);
        let token = CapabilityToken::mint(secret, "example.org", "1", "job-1", "disk", deadline);
        let err = CapabilityToken::verify(secret, &token, "other.org", "1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[test]
    fn verify_rejects_expired_token() {
        let secret = b"supersecretkeysupersecretkey1234";
        let deadline = chrono::Utc::now() - Duration::minutes(1);
        let token = CapabilityToken::mint(secret, "example.org", "1", "job-1", "disk", deadline);
        let err = CapabilityToken::verify(secret, &token, "example.org", "1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let secret = b"supersecretkeysupersecretkey1234";
        let deadline = chrono::Utc::now() + Duration::minutes(30);
        let mut token = CapabilityToken::mint(secret, "example.org", "1", "job-1", "disk", deadline);
        token.push('x');
        assert!(CapabilityToken::verify(secret, &token, "example.org", "1").is_err());
    }
}
