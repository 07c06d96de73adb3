//! The signed wire artifact and its compact string form.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::codec::CanonicalCodec;
use crate::constants::{COMPACT_SEPARATOR, MAX_COMPACT_TOKEN_LENGTH};
use crate::error::DecodeError;

/// A signed token: canonical payload bytes, signature bytes and key id.
///
/// Created once by the issuer and immutable afterwards. The compact form is
/// `base64url(payload) "." base64url(signature)` without padding; the key id
/// travels inside the signed payload as `flags.kid`. Tokens from issuers
/// that do not name their key have no key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    payload: Vec<u8>,
    signature: Vec<u8>,
    key_id: Option<String>,
}

impl SignedToken {
    /// Assembles a token from its parts.
    #[must_use]
    pub fn new(payload: Vec<u8>, signature: Vec<u8>, key_id: impl Into<String>) -> Self {
        Self {
            payload,
            signature,
            key_id: Some(key_id.into()),
        }
    }

    /// Assembles a token whose signing key is not named.
    #[must_use]
    pub const fn unkeyed(payload: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            payload,
            signature,
            key_id: None,
        }
    }

    /// Parses the compact form, recovering the key id from the payload.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the separator count, base64 or payload is
    /// invalid.
    pub fn from_compact(token: &str, codec: &CanonicalCodec) -> Result<Self, DecodeError> {
        let (payload, signature) = split_compact(token)?;
        let key_id = codec.decode(&payload)?.key_id().map(str::to_string);
        Ok(Self {
            payload,
            signature,
            key_id,
        })
    }

    /// Returns the canonical payload bytes exactly as signed.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns the signing key identifier, if the token names one.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Renders the compact wire form.
    #[must_use]
    pub fn to_compact(&self) -> String {
        let mut out = URL_SAFE_NO_PAD.encode(&self.payload);
        out.push(COMPACT_SEPARATOR);
        URL_SAFE_NO_PAD.encode_string(&self.signature, &mut out);
        out
    }
}

/// Splits a compact token into raw payload and signature bytes.
///
/// # Errors
///
/// Returns `DecodeError::Malformed` if the token is empty, too long, has
/// other than exactly one `.`, or either segment is not unpadded base64url.
///
/// # Example
///
/// ```
/// use agetoken::split_compact;
///
/// let (payload, signature) = split_compact("e30.AAEC").unwrap();
/// assert_eq!(payload, b"{}");
/// assert_eq!(signature, vec![0, 1, 2]);
///
/// assert!(split_compact("a.b.c").is_err());
/// assert!(split_compact("nodot").is_err());
/// ```
pub fn split_compact(token: &str) -> Result<(Vec<u8>, Vec<u8>), DecodeError> {
    if token.is_empty() {
        return Err(DecodeError::malformed("empty token"));
    }
    if token.len() > MAX_COMPACT_TOKEN_LENGTH {
        return Err(DecodeError::malformed(format!(
            "token exceeds {MAX_COMPACT_TOKEN_LENGTH} characters"
        )));
    }
    if token.matches(COMPACT_SEPARATOR).count() != 1 {
        return Err(DecodeError::malformed("token must contain exactly one '.'"));
    }
    let (payload_b64, signature_b64) = token
        .split_once(COMPACT_SEPARATOR)
        .ok_or_else(|| DecodeError::malformed("token must contain exactly one '.'"))?;
    if payload_b64.is_empty() || signature_b64.is_empty() {
        return Err(DecodeError::malformed("empty token segment"));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| DecodeError::malformed("payload segment is not base64url"))?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| DecodeError::malformed("signature segment is not base64url"))?;
    Ok((payload, signature))
}
