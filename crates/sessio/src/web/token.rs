//! Signed session tokens
//!
//! A token is `s:<id>.<signature>` where the signature is the unpadded
//! base64url HMAC-SHA256 of the id under the server secret. Only the id's
//! integrity is protected; the session contents never leave the server.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "s:";

fn sign(id: &str, secret: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| Error::config("unusable signing secret"))?;
    mac.update(id.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Produce the cookie value for a session id
///
/// # Examples
///
/// ```
/// use sessio::web::token::{decode, encode};
///
/// let token = encode("abc123", b"secret").unwrap();
/// assert!(token.starts_with("s:abc123."));
/// assert_eq!(decode(&token, b"secret").unwrap(), "abc123");
/// ```
pub fn encode(id: &str, secret: &[u8]) -> Result<String> {
    Ok(format!("{TOKEN_PREFIX}{id}.{}", sign(id, secret)?))
}

/// Verify a cookie value and return the session id it carries
///
/// Every failure is reported as the same
/// [`ErrorKind::InvalidSignature`](crate::error::ErrorKind::InvalidSignature);
/// the caller cannot tell which check rejected the token.
pub fn decode(token: &str, secret: &[u8]) -> Result<String> {
    let body = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(Error::invalid_signature)?;

    let mut parts = body.split('.');
    let (Some(id), Some(received), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::invalid_signature());
    };

    let expected = sign(id, secret).map_err(|_| Error::invalid_signature())?;
    if bool::from(expected.as_bytes().ct_eq(received.as_bytes())) {
        Ok(id.to_string())
    } else {
        Err(Error::invalid_signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::web::id::generate_id;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn test_round_trip_generated_ids() {
        for _ in 0..20 {
            let id = generate_id().unwrap();
            let token = encode(&id, SECRET).unwrap();
            assert_eq!(decode(&token, SECRET).unwrap(), id);
        }
    }

    #[test]
    fn test_signature_is_unpadded_base64url() {
        let token = encode("id", SECRET).unwrap();
        let sig = token.rsplit('.').next().unwrap();
        // 32 byte MAC -> 43 chars without padding
        assert_eq!(sig.len(), 43);
        assert!(!sig.contains('='));
        assert!(!sig.contains('+') && !sig.contains('/'));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = encode("session-id", b"secret-a").unwrap();
        let err = decode(&token, b"secret-b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSignature);
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let token = encode("session-id", SECRET).unwrap();
        let stripped = token.trim_start_matches("s:");
        assert_eq!(
            decode(stripped, SECRET).unwrap_err().kind(),
            ErrorKind::InvalidSignature
        );
        assert!(decode("", SECRET).is_err());
        assert!(decode("s", SECRET).is_err());
    }

    #[test]
    fn test_wrong_part_count_rejected() {
        let sig = sign("a", SECRET).unwrap();
        assert!(decode("s:a", SECRET).is_err());
        assert!(decode(&format!("s:a.{sig}.extra"), SECRET).is_err());
        assert!(decode(&format!("s:a.b.{sig}"), SECRET).is_err());
    }

    #[test]
    fn test_tampered_id_rejected() {
        let token = encode("alice", SECRET).unwrap();
        let forged = token.replacen("alice", "mallory", 1);
        assert!(decode(&forged, SECRET).is_err());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let mut token = encode("alice", SECRET).unwrap();
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });
        assert!(decode(&token, SECRET).is_err());
    }
}
