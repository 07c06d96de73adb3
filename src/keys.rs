//! Key types for token signing and verification.
//!
//! Two signature schemes are supported, modelled as a closed tagged variant
//! and dispatched by `match`:
//!
//! | Scheme | Public key encoding | Signature encoding |
//! |--------|---------------------|--------------------|
//! | `ed25519` | 32 raw bytes | 64 raw bytes |
//! | `ecdsa-p256` | 33-byte compressed SEC1 point | 64-byte `r \|\| s` |

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{
    Signature as Ed25519Signature, Signer as _, SigningKey as Ed25519SigningKey,
    VerifyingKey as Ed25519VerifyingKey,
};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{
    Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Signature algorithm used by a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// Ed25519 (RFC 8032).
    #[serde(rename = "ed25519")]
    Ed25519,
    /// ECDSA over NIST P-256 with SHA-256.
    #[serde(rename = "ecdsa-p256")]
    EcdsaP256,
}

impl SignatureScheme {
    /// Returns the scheme's bundle name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::EcdsaP256 => "ecdsa-p256",
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureScheme {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ed25519" => Ok(Self::Ed25519),
            "ecdsa-p256" => Ok(Self::EcdsaP256),
            other => Err(KeyError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }
}

/// A private key for signing tokens.
///
/// # Example
///
/// ```
/// use agetoken::{SignatureScheme, SigningKey};
///
/// let signing_key = SigningKey::generate(SignatureScheme::Ed25519);
/// let public_key = signing_key.public_key();
///
/// let signature = signing_key.sign(b"payload");
/// assert!(public_key.verify(b"payload", &signature));
/// assert!(!public_key.verify(b"other", &signature));
/// ```
#[derive(Clone)]
pub enum SigningKey {
    /// Ed25519 private key.
    Ed25519(Ed25519SigningKey),
    /// ECDSA P-256 private key.
    EcdsaP256(P256SigningKey),
}

impl SigningKey {
    /// Creates a new random signing key for `scheme`.
    #[must_use]
    pub fn generate(scheme: SignatureScheme) -> Self {
        let mut rng = rand::thread_rng();
        match scheme {
            SignatureScheme::Ed25519 => Self::Ed25519(Ed25519SigningKey::generate(&mut rng)),
            SignatureScheme::EcdsaP256 => Self::EcdsaP256(P256SigningKey::random(&mut rng)),
        }
    }

    /// Creates a signing key from a 32-byte secret.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidKeyFormat` if the bytes are not a valid
    /// secret scalar for the scheme (P-256 rejects zero and values at or
    /// above the group order).
    pub fn from_bytes(scheme: SignatureScheme, bytes: &[u8; 32]) -> Result<Self, KeyError> {
        match scheme {
            SignatureScheme::Ed25519 => Ok(Self::Ed25519(Ed25519SigningKey::from_bytes(bytes))),
            SignatureScheme::EcdsaP256 => P256SigningKey::from_slice(bytes)
                .map(Self::EcdsaP256)
                .map_err(|e| KeyError::InvalidKeyFormat {
                    reason: e.to_string(),
                }),
        }
    }

    /// Returns the key's scheme.
    #[must_use]
    pub const fn scheme(&self) -> SignatureScheme {
        match self {
            Self::Ed25519(_) => SignatureScheme::Ed25519,
            Self::EcdsaP256(_) => SignatureScheme::EcdsaP256,
        }
    }

    /// Returns the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            Self::EcdsaP256(key) => PublicKey::EcdsaP256(P256VerifyingKey::from(key)),
        }
    }

    /// Signs `message` and returns the raw signature bytes.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
            Self::EcdsaP256(key) => {
                let signature: P256Signature = key.sign(message);
                signature.to_bytes().to_vec()
            }
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// A public key for verifying tokens. Safe to distribute.
#[derive(Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 public key.
    Ed25519(Ed25519VerifyingKey),
    /// ECDSA P-256 public key.
    EcdsaP256(P256VerifyingKey),
}

impl PublicKey {
    /// Parses a public key from its encoded bytes.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidKeyFormat` if the bytes have the wrong
    /// length or are not a valid curve point.
    pub fn from_bytes(scheme: SignatureScheme, bytes: &[u8]) -> Result<Self, KeyError> {
        match scheme {
            SignatureScheme::Ed25519 => {
                let array: &[u8; 32] =
                    bytes
                        .try_into()
                        .map_err(|_| KeyError::InvalidKeyFormat {
                            reason: format!("ed25519 key must be 32 bytes, got {}", bytes.len()),
                        })?;
                Ed25519VerifyingKey::from_bytes(array)
                    .map(Self::Ed25519)
                    .map_err(|e| KeyError::InvalidKeyFormat {
                        reason: e.to_string(),
                    })
            }
            SignatureScheme::EcdsaP256 => P256VerifyingKey::from_sec1_bytes(bytes)
                .map(Self::EcdsaP256)
                .map_err(|e| KeyError::InvalidKeyFormat {
                    reason: e.to_string(),
                }),
        }
    }

    /// Returns the key's scheme.
    #[must_use]
    pub const fn scheme(&self) -> SignatureScheme {
        match self {
            Self::Ed25519(_) => SignatureScheme::Ed25519,
            Self::EcdsaP256(_) => SignatureScheme::EcdsaP256,
        }
    }

    /// Returns the encoded key bytes (compressed SEC1 for P-256).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.to_bytes().to_vec(),
            Self::EcdsaP256(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    /// Checks `signature` over `message`.
    ///
    /// Returns false for a signature of the wrong length or encoding as well
    /// as for a mismatch; callers never learn which.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::Ed25519(key) => Ed25519Signature::from_slice(signature)
                .is_ok_and(|sig| key.verify_strict(message, &sig).is_ok()),
            Self::EcdsaP256(key) => P256Signature::from_slice(signature)
                .is_ok_and(|sig| key.verify(message, &sig).is_ok()),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 4 bytes are enough to tell keys apart in logs
        let bytes = self.to_bytes();
        write!(f, "PublicKey({}:", self.scheme())?;
        for b in bytes.iter().take(4) {
            write!(f, "{b:02x}")?;
        }
        write!(f, "...)")
    }
}
