use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use time::{Duration, OffsetDateTime};

use crate::error::Error;

/// Claims read from a token payload. The signature is never checked.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    exp: i64,
    claims: Map<String, JsonValue>,
}

impl DecodedToken {
    /// The `exp` claim, in seconds since the UNIX epoch.
    #[must_use]
    pub fn exp(&self) -> i64 {
        self.exp
    }

    /// The `exp` claim as an instant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTokenFormat`] if `exp` is outside the
    /// representable date range.
    pub fn expires_at(&self) -> Result<OffsetDateTime, Error> {
        OffsetDateTime::from_unix_timestamp(self.exp)
            .map_err(|e| Error::InvalidTokenFormat(format!("exp out of range: {e}")))
    }

    /// True iff the token expires strictly after `now + buffer`.
    ///
    /// A buffer reaching past the representable date range makes every
    /// token invalid.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
        now.checked_add(buffer)
            .is_some_and(|cutoff| self.exp > cutoff.unix_timestamp())
    }

    /// Gets a claim value by key.
    #[must_use]
    pub fn claim(&self, key: &str) -> Option<&JsonValue> {
        self.claims.get(key)
    }

    /// Every claim, `exp` included.
    #[must_use]
    pub fn claims(&self) -> &Map<String, JsonValue> {
        &self.claims
    }
}

/// Decodes the payload of a three-segment `header.payload.signature` token.
///
/// # Errors
///
/// Returns [`Error::InvalidTokenFormat`] if the token does not have three
/// segments, the payload is not base64url JSON, or `exp` is missing.
pub fn decode(token: &str) -> Result<DecodedToken, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidTokenFormat(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| Error::InvalidTokenFormat(format!("payload is not base64url: {e}")))?;

    let claims: Map<String, JsonValue> = serde_json::from_slice(&payload)
        .map_err(|e| Error::InvalidTokenFormat(format!("payload is not a JSON object: {e}")))?;

    let exp = claims
        .get("exp")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(f64::trunc).map(float_secs)))
        .ok_or_else(|| Error::InvalidTokenFormat("missing claim: exp".into()))?;

    Ok(DecodedToken { exp, claims })
}

#[allow(clippy::cast_possible_truncation)]
fn float_secs(secs: f64) -> i64 {
    secs as i64
}

/// Whether `token` decodes and has not expired (`buffer` early).
#[must_use]
pub fn is_token_valid(token: &str, buffer: Duration) -> bool {
    decode(token).is_ok_and(|t| t.is_valid_at(OffsetDateTime::now_utc(), buffer))
}

/// Encodes `value` as base64'd JSON for storage in a text-only cookie.
///
/// This is an encoding, not encryption: anyone holding the cookie can read
/// the value back.
///
/// # Errors
///
/// Returns [`Error::InvalidOpaqueValue`] if `value` cannot be serialized.
pub fn encode_opaque<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value).map_err(|e| Error::InvalidOpaqueValue(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

/// Reverses [`encode_opaque`].
///
/// # Errors
///
/// Returns [`Error::InvalidOpaqueValue`] if the string is not base64 or the
/// JSON does not match `T`.
pub fn decode_opaque<T: DeserializeOwned>(encoded: &str) -> Result<T, Error> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidOpaqueValue(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::InvalidOpaqueValue(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use base64::engine::general_purpose::URL_SAFE;
    use serde_json::json;

    use super::*;
    use crate::types::AuthUser;

    /// Unsigned test token with the given payload.
    pub(crate) fn mint(payload: &JsonValue) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.c2lnbmF0dXJl")
    }

    /// Unsigned test token expiring `offset` from now.
    pub(crate) fn mint_expiring_in(offset: Duration) -> String {
        let exp = (OffsetDateTime::now_utc() + offset).unix_timestamp();
        mint(&json!({ "sub": "u-1", "exp": exp }))
    }

    #[test]
    fn test_decode_reads_exp_and_claims() {
        let token = mint(&json!({ "sub": "u-1", "exp": 2_000_000_000, "role": "admin" }));
        let decoded = decode(&token).unwrap();

        assert_eq!(decoded.exp(), 2_000_000_000);
        assert_eq!(decoded.claim("role"), Some(&json!("admin")));
        assert_eq!(decoded.claims().len(), 3);
        assert_eq!(
            decoded.expires_at().unwrap(),
            OffsetDateTime::from_unix_timestamp(2_000_000_000).unwrap()
        );
    }

    #[test]
    fn test_decode_accepts_padded_and_fractional() {
        let body = URL_SAFE.encode(r#"{"exp": 1700000000.75}"#);
        assert!(body.ends_with('='));
        let token = format!("h.{body}.s");
        assert_eq!(decode(&token).unwrap().exp(), 1_700_000_000);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert!(matches!(decode("abc"), Err(Error::InvalidTokenFormat(_))));
        assert!(matches!(decode("a.b"), Err(Error::InvalidTokenFormat(_))));
        assert!(matches!(decode("a.b.c.d"), Err(Error::InvalidTokenFormat(_))));
    }

    #[test]
    fn test_decode_rejects_bad_payload() {
        assert!(matches!(decode("h.!!!.s"), Err(Error::InvalidTokenFormat(_))));

        let not_json = URL_SAFE_NO_PAD.encode("not json");
        assert!(matches!(
            decode(&format!("h.{not_json}.s")),
            Err(Error::InvalidTokenFormat(_))
        ));

        let array = URL_SAFE_NO_PAD.encode("[1,2]");
        assert!(matches!(
            decode(&format!("h.{array}.s")),
            Err(Error::InvalidTokenFormat(_))
        ));
    }

    #[test]
    fn test_decode_requires_exp() {
        let token = mint(&json!({ "sub": "u-1" }));
        let err = decode(&token).unwrap_err();
        assert!(err.to_string().contains("exp"));

        let token = mint(&json!({ "exp": "tomorrow" }));
        assert!(decode(&token).is_err());
    }

    #[test]
    fn test_validity_is_strictly_after_now() {
        let now = OffsetDateTime::now_utc();
        let token = mint(&json!({ "exp": now.unix_timestamp() }));
        let decoded = decode(&token).unwrap();

        assert!(!decoded.is_valid_at(now, Duration::ZERO));
        assert!(decoded.is_valid_at(now - Duration::seconds(1), Duration::ZERO));
    }

    #[test]
    fn test_buffer_shortens_validity() {
        let token = mint_expiring_in(Duration::seconds(30));
        assert!(is_token_valid(&token, Duration::ZERO));
        assert!(!is_token_valid(&token, Duration::minutes(1)));
    }

    #[test]
    fn test_oversized_buffer_invalidates() {
        let token = mint(&json!({ "exp": i64::from(i32::MAX) }));
        assert!(!is_token_valid(&token, Duration::seconds(i64::MAX / 4)));
        assert!(!is_token_valid(&token, Duration::MAX));
    }

    #[test]
    fn test_expired_and_garbage_tokens_are_invalid() {
        assert!(!is_token_valid(&mint_expiring_in(Duration::minutes(-5)), Duration::ZERO));
        assert!(!is_token_valid("garbage", Duration::ZERO));
    }

    #[test]
    fn test_opaque_user_blob() {
        let user = AuthUser::new("u-1").with_attribute("name", "Ann");
        let encoded = encode_opaque(&user).unwrap();

        assert!(!encoded.contains("Ann"));
        assert_eq!(decode_opaque::<AuthUser>(&encoded).unwrap(), user);
    }

    #[test]
    fn test_decode_opaque_rejects_garbage() {
        assert!(matches!(
            decode_opaque::<AuthUser>("%%%"),
            Err(Error::InvalidOpaqueValue(_))
        ));
        let wrong_shape = STANDARD.encode(r#"{"name":"no id"}"#);
        assert!(decode_opaque::<AuthUser>(&wrong_shape).is_err());
    }
}
