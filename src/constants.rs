//! Constants for the AgeToken wire format.

/// Separator between the payload and signature segments of a compact token.
pub const COMPACT_SEPARATOR: char = '.';

/// Wire name of the token identifier field.
pub const FIELD_TOKEN_ID: &str = "tid";

/// Wire name of the attestor identifier field.
pub const FIELD_ATTESTOR: &str = "att";

/// Wire name of the age bucket field.
pub const FIELD_AGE: &str = "age";

/// Wire name of the audience field.
pub const FIELD_AUDIENCE: &str = "aud";

/// Wire name of the issued-at field.
pub const FIELD_ISSUED_AT: &str = "iat";

/// Wire name of the expiry field.
pub const FIELD_EXPIRES_AT: &str = "exp";

/// Wire name of the nonce field.
pub const FIELD_NONCE: &str = "nonce";

/// Wire name of the extensions map.
pub const FIELD_FLAGS: &str = "flags";

/// Every top-level payload field, in canonical (byte-sorted) order.
pub const PAYLOAD_FIELDS: [&str; 8] = [
    FIELD_AGE,
    FIELD_ATTESTOR,
    FIELD_AUDIENCE,
    FIELD_EXPIRES_AT,
    FIELD_FLAGS,
    FIELD_ISSUED_AT,
    FIELD_NONCE,
    FIELD_TOKEN_ID,
];

/// Reserved `flags` entry holding the signing key identifier.
///
/// Only the issuer sets it; caller-supplied flags may not use this key.
pub const FLAG_KEY_ID: &str = "kid";

/// Maximum length of an extension key.
pub const MAX_EXTENSION_KEY_LENGTH: usize = 32;

/// Maximum length of a key identifier.
pub const MAX_KEY_ID_LENGTH: usize = 64;

/// Hard ceiling on a compact token's length, checked before any decoding.
pub const MAX_COMPACT_TOKEN_LENGTH: usize = 8192;

/// Shortest digit run inside an extension string that is treated as a
/// personal identifier (phone numbers, ID numbers, birth dates).
pub const PII_DIGIT_RUN: usize = 6;

/// Extension keys that name personal data and are never accepted.
pub const PII_KEY_DENYLIST: &[&str] = &[
    "address",
    "birth",
    "birthdate",
    "birthday",
    "dob",
    "email",
    "first_name",
    "full_name",
    "ip",
    "last_name",
    "name",
    "passport",
    "phone",
    "ssn",
    "surname",
    "user_id",
];
