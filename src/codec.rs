//! Canonical payload encoding.
//!
//! The signature covers the encoded bytes, so encoding must be a total,
//! deterministic function of the logical payload. The canonical form is
//! compact JSON where:
//!
//! 1. Object keys are sorted by byte order at every depth
//! 2. No whitespace appears between tokens
//! 3. Numbers are integers in decimal without leading zeros
//! 4. Strings use minimal escaping (`"`, `\` and control characters only)
//!
//! Decoding is strict: duplicate keys at any depth, unknown top-level
//! fields, floats, nested containers inside `flags`, and an oversized
//! `flags` map are all rejected, and no partially populated [`ClaimSet`] is
//! ever returned.
//!
//! # Example
//!
//! ```
//! use agetoken::{AgeBucket, CanonicalCodec, ClaimSet, Extensions};
//!
//! let claims = ClaimSet {
//!     token_id: "t-1".into(),
//!     attestor_id: "attestor.example".into(),
//!     age_bucket: AgeBucket::Adult,
//!     audience: "app.example".into(),
//!     issued_at: 1000,
//!     expires_at: 4600,
//!     nonce: "r4nd1".into(),
//!     extensions: Extensions::new(),
//! }
//! .with_key_id("k1");
//!
//! let codec = CanonicalCodec::default();
//! let bytes = codec.encode(&claims);
//! assert!(bytes.starts_with(br#"{"age":"18_PLUS","att":"attestor.example""#));
//! assert_eq!(codec.decode(&bytes).unwrap(), claims);
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};

use crate::claims::{ClaimSet, ExtensionValue};
use crate::config::AttestationConfig;
use crate::constants::{
    FIELD_AGE, FIELD_ATTESTOR, FIELD_AUDIENCE, FIELD_EXPIRES_AT, FIELD_FLAGS, FIELD_ISSUED_AT,
    FIELD_NONCE, FIELD_TOKEN_ID, FLAG_KEY_ID, PAYLOAD_FIELDS,
};
use crate::error::DecodeError;

/// Prefix of the serde error raised for a repeated key.
const DUPLICATE_KEY_PREFIX: &str = "duplicate key: ";

/// Deterministic encoder and strict decoder for [`ClaimSet`] payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalCodec {
    max_extension_entries: usize,
}

impl Default for CanonicalCodec {
    fn default() -> Self {
        Self::from_config(&AttestationConfig::default())
    }
}

impl CanonicalCodec {
    /// Creates a codec that rejects `flags` maps larger than `max_extension_entries`.
    #[must_use]
    pub const fn new(max_extension_entries: usize) -> Self {
        Self {
            max_extension_entries,
        }
    }

    /// Creates a codec using the extension cap from `config`.
    #[must_use]
    pub const fn from_config(config: &AttestationConfig) -> Self {
        Self::new(config.max_extension_entries)
    }

    /// Encodes claims to canonical bytes.
    #[must_use]
    pub fn encode(&self, claims: &ClaimSet) -> Vec<u8> {
        canonical_json(&claims_to_value(claims)).into_bytes()
    }

    /// Decodes canonical bytes back into claims.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if:
    /// - The input is empty, not UTF-8, not JSON, or not an object (`Malformed`)
    /// - Any object repeats a key (`DuplicateKey`)
    /// - A top-level field is outside the wire format (`UnknownField`)
    /// - `flags` has more entries than allowed (`TooManyExtensions`)
    /// - `flags.kid` is present but not a string (`Malformed`)
    /// - A field is missing or has the wrong type (`Malformed`)
    pub fn decode(&self, bytes: &[u8]) -> Result<ClaimSet, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::malformed("empty payload"));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|_| DecodeError::malformed("payload is not valid UTF-8"))?;

        let value = parse_with_duplicate_detection(text)?;
        let Value::Object(fields) = &value else {
            return Err(DecodeError::malformed("payload must be a JSON object"));
        };

        if let Some(unknown) = fields.keys().find(|k| !PAYLOAD_FIELDS.contains(&k.as_str())) {
            return Err(DecodeError::UnknownField {
                field: unknown.clone(),
            });
        }

        if let Some(Value::Object(flags)) = fields.get(FIELD_FLAGS) {
            if flags.len() > self.max_extension_entries {
                return Err(DecodeError::TooManyExtensions {
                    max: self.max_extension_entries,
                });
            }
            if flags.get(FLAG_KEY_ID).is_some_and(|kid| !kid.is_string()) {
                return Err(DecodeError::malformed("flags.kid must be a string"));
            }
        }

        serde_json::from_value(value).map_err(|e| DecodeError::malformed(e.to_string()))
    }

    /// Returns true if `bytes` decode and re-encode to exactly the same bytes.
    #[must_use]
    pub fn is_canonical(&self, bytes: &[u8]) -> bool {
        self.decode(bytes)
            .is_ok_and(|claims| self.encode(&claims) == bytes)
    }
}

/// Renders any JSON value in canonical form, sorting keys at every depth.
///
/// # Example
///
/// ```
/// use agetoken::canonical_json;
/// use serde_json::json;
///
/// let value = json!({"z": {"b": 1, "a": [true, "x"]}, "a": -2});
/// assert_eq!(canonical_json(&value), r#"{"a":-2,"z":{"a":[true,"x"],"b":1}}"#);
/// ```
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut output = String::new();
    emit_value(value, &mut output);
    output
}

fn claims_to_value(claims: &ClaimSet) -> Value {
    let flags: Map<String, Value> = claims
        .extensions
        .iter()
        .map(|(key, value)| {
            let value = match value {
                ExtensionValue::Bool(b) => Value::Bool(*b),
                ExtensionValue::Int(i) => Value::Number((*i).into()),
                ExtensionValue::Text(s) => Value::String(s.clone()),
            };
            (key.clone(), value)
        })
        .collect();

    let mut fields = Map::new();
    fields.insert(FIELD_TOKEN_ID.into(), Value::String(claims.token_id.clone()));
    fields.insert(FIELD_ATTESTOR.into(), Value::String(claims.attestor_id.clone()));
    fields.insert(
        FIELD_AGE.into(),
        Value::String(claims.age_bucket.as_str().to_string()),
    );
    fields.insert(FIELD_AUDIENCE.into(), Value::String(claims.audience.clone()));
    fields.insert(FIELD_ISSUED_AT.into(), Value::Number(claims.issued_at.into()));
    fields.insert(FIELD_EXPIRES_AT.into(), Value::Number(claims.expires_at.into()));
    fields.insert(FIELD_NONCE.into(), Value::String(claims.nonce.clone()));
    fields.insert(FIELD_FLAGS.into(), Value::Object(flags));
    Value::Object(fields)
}

/// Parses JSON, rejecting repeated keys after escape decoding so that
/// `"\u0061"` and `"a"` count as the same key.
fn parse_with_duplicate_detection(input: &str) -> Result<Value, DecodeError> {
    let mut deserializer = serde_json::Deserializer::from_str(input);
    let value = StrictValue::deserialize(&mut deserializer).map_err(|e| {
        let msg = e.to_string();
        match msg.strip_prefix(DUPLICATE_KEY_PREFIX) {
            Some(rest) => DecodeError::DuplicateKey {
                key: rest.split(" at line ").next().unwrap_or(rest).to_string(),
            },
            None => DecodeError::malformed(msg),
        }
    })?;
    deserializer
        .end()
        .map_err(|e| DecodeError::malformed(e.to_string()))?;
    Ok(value.0)
}

struct StrictValue(Value);

impl<'de> Deserialize<'de> for StrictValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StrictVisitor;

        impl<'de> Visitor<'de> for StrictVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a JSON value without floats or duplicate keys")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Value::Number(v.into()))
            }

            fn visit_f64<E>(self, _v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Err(de::Error::custom("floats are not allowed"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(Value::String(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(Value::String(v))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Value::Null)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element::<StrictValue>()? {
                    items.push(item.0);
                }
                Ok(Value::Array(items))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen = BTreeSet::new();
                let mut object = Map::new();
                while let Some(key) = map.next_key::<String>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!("{DUPLICATE_KEY_PREFIX}{key}")));
                    }
                    let value = map.next_value::<StrictValue>()?;
                    object.insert(key, value.0);
                }
                Ok(Value::Object(object))
            }
        }

        deserializer.deserialize_any(StrictVisitor).map(StrictValue)
    }
}

fn emit_value(value: &Value, output: &mut String) {
    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output),
        Value::String(s) => emit_string(s, output),
        Value::Array(items) => {
            output.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_value(item, output);
            }
            output.push(']');
        }
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();

            output.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_string(key, output);
                output.push(':');
                emit_value(&object[key.as_str()], output);
            }
            output.push('}');
        }
    }
}

fn emit_number(n: &Number, output: &mut String) {
    if let Some(i) = n.as_i64() {
        let _ = write!(output, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(output, "{u}");
    } else {
        output.push_str(&n.to_string());
    }
}

fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c < '\u{0020}' => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            }
            c => output.push(c),
        }
    }
    output.push('"');
}
