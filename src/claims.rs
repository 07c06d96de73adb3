//! Token payload types and the personal-data guard on extensions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::age_bucket::AgeBucket;
use crate::constants::{
    FLAG_KEY_ID, MAX_EXTENSION_KEY_LENGTH, MAX_KEY_ID_LENGTH, PII_DIGIT_RUN, PII_KEY_DENYLIST,
};
use crate::error::IssueError;

/// A forward-compatible flag value.
///
/// Only scalars are allowed so the extension map cannot nest structured data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer flag.
    Int(i64),
    /// Short string flag.
    Text(String),
}

impl From<bool> for ExtensionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ExtensionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ExtensionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Extension map keyed by flag name; `BTreeMap` keeps iteration sorted.
pub type Extensions = BTreeMap<String, ExtensionValue>;

/// Claims embedded in an AgeToken.
///
/// Field names on the wire are the short forms given in the serde
/// attributes. Unknown fields are rejected when deserializing. The signing
/// key id is not a top-level field; it rides in `flags` under
/// [`FLAG_KEY_ID`](crate::FLAG_KEY_ID).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimSet {
    /// Unique token identifier
    #[serde(rename = "tid")]
    pub token_id: String,
    /// Issuing attestor
    #[serde(rename = "att")]
    pub attestor_id: String,
    /// Asserted age range
    #[serde(rename = "age")]
    pub age_bucket: AgeBucket,
    /// Relying party the token is bound to
    #[serde(rename = "aud")]
    pub audience: String,
    /// Issuance time, Unix seconds
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiry time, Unix seconds
    #[serde(rename = "exp")]
    pub expires_at: i64,
    /// Caller-supplied nonce
    pub nonce: String,
    /// Forward-compatible flags
    #[serde(rename = "flags")]
    pub extensions: Extensions,
}

impl ClaimSet {
    /// Returns `expires_at - issued_at`.
    #[must_use]
    pub const fn lifetime_secs(&self) -> i64 {
        self.expires_at.saturating_sub(self.issued_at)
    }

    /// Returns true if the token has expired at `now`.
    ///
    /// Expiry is exclusive: a token is valid at `expires_at - 1` and expired
    /// at `expires_at`.
    #[must_use]
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the asserted bucket is below 18.
    #[must_use]
    pub const fn is_minor(&self) -> bool {
        self.age_bucket.is_minor()
    }

    /// Returns the signing key id carried in `flags.kid`, if any.
    ///
    /// Tokens from issuers that do not name their key return `None`; the
    /// verifier then tries every usable key of the attestor.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        match self.extensions.get(FLAG_KEY_ID) {
            Some(ExtensionValue::Text(key_id)) => Some(key_id),
            _ => None,
        }
    }

    /// Sets `flags.kid`.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.extensions
            .insert(FLAG_KEY_ID.to_string(), ExtensionValue::Text(key_id.into()));
        self
    }
}

/// Checks caller-supplied flags against the personal-data rules.
///
/// Rejects keys outside `[a-z0-9_]{1,32}`, the reserved key `kid`, keys
/// naming personal data, strings over `max_value_len`, strings that
/// [look like personal data](looks_like_personal_data), and maps with more
/// than `max_entries` entries.
///
/// # Errors
///
/// Returns `IssueError::InvalidInput` for the first offending entry.
///
/// # Example
///
/// ```
/// use agetoken::{check_extensions, Extensions, ExtensionValue};
///
/// let mut flags = Extensions::new();
/// flags.insert("parental_consent".into(), ExtensionValue::Bool(true));
/// assert!(check_extensions(&flags, 8, 64).is_ok());
///
/// flags.insert("email".into(), "kid@example.com".into());
/// assert!(check_extensions(&flags, 8, 64).is_err());
/// ```
pub fn check_extensions(
    extensions: &Extensions,
    max_entries: usize,
    max_value_len: usize,
) -> Result<(), IssueError> {
    if extensions.contains_key(FLAG_KEY_ID) {
        return Err(IssueError::invalid_input(
            "flags",
            format!("'{FLAG_KEY_ID}' is reserved for the signing key id"),
        ));
    }
    check_signed_extensions(extensions, max_entries, max_value_len)
}

/// Checks the flags of a signed payload, where `kid` is allowed.
///
/// `kid` must be a string of 1-64 visible ASCII characters and is exempt
/// from the personal-data screen; every other entry is checked as in
/// [`check_extensions`].
pub(crate) fn check_signed_extensions(
    extensions: &Extensions,
    max_entries: usize,
    max_value_len: usize,
) -> Result<(), IssueError> {
    if extensions.len() > max_entries {
        return Err(IssueError::invalid_input(
            "flags",
            format!("at most {max_entries} entries allowed"),
        ));
    }

    for (key, value) in extensions {
        if key == FLAG_KEY_ID {
            check_key_id_flag(value)?;
            continue;
        }
        check_extension_key(key)?;
        if let ExtensionValue::Text(text) = value {
            check_extension_text(key, text, max_value_len)?;
        }
    }
    Ok(())
}

fn check_key_id_flag(value: &ExtensionValue) -> Result<(), IssueError> {
    match value {
        ExtensionValue::Text(key_id)
            if !key_id.is_empty()
                && key_id.len() <= MAX_KEY_ID_LENGTH
                && key_id.bytes().all(|b| b.is_ascii_graphic()) =>
        {
            Ok(())
        }
        _ => Err(IssueError::invalid_input(
            "flags",
            "'kid' must be 1-64 visible ASCII characters",
        )),
    }
}

fn check_extension_key(key: &str) -> Result<(), IssueError> {
    let well_formed = !key.is_empty()
        && key.len() <= MAX_EXTENSION_KEY_LENGTH
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if !well_formed {
        return Err(IssueError::invalid_input(
            "flags",
            "keys must be 1-32 characters of a-z, 0-9 or '_'",
        ));
    }

    let names_personal_data = key
        .split('_')
        .any(|part| PII_KEY_DENYLIST.contains(&part))
        || PII_KEY_DENYLIST.contains(&key);
    if names_personal_data {
        return Err(IssueError::invalid_input(
            "flags",
            format!("key '{key}' names personal data"),
        ));
    }
    Ok(())
}

fn check_extension_text(key: &str, text: &str, max_value_len: usize) -> Result<(), IssueError> {
    if text.len() > max_value_len {
        return Err(IssueError::invalid_input(
            "flags",
            format!("value of '{key}' exceeds {max_value_len} bytes"),
        ));
    }
    if looks_like_personal_data(text) {
        return Err(IssueError::invalid_input(
            "flags",
            format!("value of '{key}' looks like personal data"),
        ));
    }
    Ok(())
}

/// Heuristic shape check for e-mail addresses, dates and identifier numbers.
///
/// Matches any `@`, a run of six or more digits, and date shapes such as
/// `2011-04-23` or `23/04/2011`.
///
/// # Example
///
/// ```
/// use agetoken::looks_like_personal_data;
///
/// assert!(looks_like_personal_data("alice@example.com"));
/// assert!(looks_like_personal_data("+15551234567"));
/// assert!(!looks_like_personal_data("r4nd1"));
/// ```
#[must_use]
pub fn looks_like_personal_data(text: &str) -> bool {
    if text.contains('@') {
        return true;
    }

    let mut run = 0usize;
    let mut longest = 0usize;
    for c in text.chars() {
        if c.is_ascii_digit() {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    if longest >= PII_DIGIT_RUN {
        return true;
    }

    looks_like_date(text)
}

/// Matches `dddd-dd-dd`, `dd/dd/dddd`, `dd.dd.dddd` and similar groupings.
fn looks_like_date(text: &str) -> bool {
    let groups: Vec<&str> = text
        .split(|c: char| c == '-' || c == '/' || c == '.')
        .collect();
    if groups.len() != 3 {
        return false;
    }
    let all_numeric = groups
        .iter()
        .all(|g| !g.is_empty() && g.len() <= 4 && g.bytes().all(|b| b.is_ascii_digit()));
    all_numeric && groups.iter().any(|g| g.len() == 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(entries: &[(&str, ExtensionValue)]) -> Extensions {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn sample_claims() -> ClaimSet {
        ClaimSet {
            token_id: "3f1c7d4e-0000-4000-8000-000000000001".into(),
            attestor_id: "attestor.example".into(),
            age_bucket: AgeBucket::Age13To15,
            audience: "app.example".into(),
            issued_at: 1000,
            expires_at: 4600,
            nonce: "r4nd1".into(),
            extensions: Extensions::new(),
        }
    }

    #[test]
    fn lifetime_and_expiry_boundary() {
        let claims = sample_claims();
        assert_eq!(claims.lifetime_secs(), 3600);
        assert!(!claims.is_expired_at(4599));
        assert!(claims.is_expired_at(4600));
        assert!(claims.is_minor());
    }

    #[test]
    fn accepts_scalar_flags() {
        let map = flags(&[
            ("parental_consent", true.into()),
            ("tier", 2i64.into()),
            ("region", "eu".into()),
        ]);
        assert!(check_extensions(&map, 8, 64).is_ok());
    }

    #[test]
    fn rejects_too_many_entries() {
        let map = flags(&[("a", true.into()), ("b", true.into()), ("c", true.into())]);
        assert!(check_extensions(&map, 2, 64).is_err());
    }

    #[test]
    fn rejects_malformed_keys() {
        let too_long = "k".repeat(33);
        for key in ["", "Upper", "has space", "dash-key", too_long.as_str()] {
            let map = flags(&[(key, true.into())]);
            assert!(check_extensions(&map, 8, 64).is_err(), "accepted key {key:?}");
        }
    }

    #[test]
    fn rejects_personal_data_keys() {
        for key in ["email", "dob", "user_email", "full_name", "phone_number"] {
            let map = flags(&[(key, true.into())]);
            assert!(check_extensions(&map, 8, 64).is_err(), "accepted key {key:?}");
        }
    }

    #[test]
    fn rejects_personal_data_values() {
        for value in [
            "someone@example.com",
            "2011-04-23",
            "23/04/2011",
            "23.04.2011",
            "+15551234567",
            "id 1234567",
        ] {
            let map = flags(&[("note", value.into())]);
            assert!(check_extensions(&map, 8, 64).is_err(), "accepted value {value:?}");
        }
    }

    #[test]
    fn rejects_long_values() {
        let map = flags(&[("note", "x".repeat(65).as_str().into())]);
        assert!(check_extensions(&map, 8, 64).is_err());
    }

    #[test]
    fn key_id_rides_in_flags() {
        let claims = sample_claims();
        assert_eq!(claims.key_id(), None);
        let claims = claims.with_key_id("k1");
        assert_eq!(claims.key_id(), Some("k1"));
        assert_eq!(
            claims.extensions.get(FLAG_KEY_ID),
            Some(&ExtensionValue::Text("k1".into()))
        );
    }

    #[test]
    fn non_text_kid_is_not_a_key_id() {
        let mut claims = sample_claims();
        claims.extensions.insert(FLAG_KEY_ID.into(), ExtensionValue::Int(7));
        assert_eq!(claims.key_id(), None);
    }

    #[test]
    fn callers_may_not_set_kid() {
        let map = flags(&[(FLAG_KEY_ID, "k1".into())]);
        assert!(check_extensions(&map, 8, 64).is_err());
    }

    #[test]
    fn signed_flags_allow_kid_without_screening_it() {
        let map = flags(&[(FLAG_KEY_ID, "2026-10-01".into()), ("tier", 1i64.into())]);
        assert!(check_signed_extensions(&map, 8, 64).is_ok());

        let map = flags(&[(FLAG_KEY_ID, true.into())]);
        assert!(check_signed_extensions(&map, 8, 64).is_err());
        let map = flags(&[(FLAG_KEY_ID, "".into())]);
        assert!(check_signed_extensions(&map, 8, 64).is_err());
    }

    #[test]
    fn personal_data_shapes() {
        for text in ["a@b", "2011-04-23", "23/04/2011", "+15551234567", "x123456"] {
            assert!(looks_like_personal_data(text), "missed {text:?}");
        }
        for text in ["r4nd1", "app.example", "v2.1", "12345", "3f1c7d4e-0000-4000"] {
            assert!(!looks_like_personal_data(text), "flagged {text:?}");
        }
    }

    #[test]
    fn short_numbers_and_versions_pass() {
        let map = flags(&[("schema", "v2.1".into()), ("build", "12345".into())]);
        assert!(check_extensions(&map, 8, 64).is_ok());
    }
}
