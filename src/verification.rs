//! Pure policy checks applied to a decoded, signature-checked payload.
//!
//! Every function here is deterministic and side-effect free, so each rule
//! can be tested on its own without keys or clocks.
//!
//! | Function | Rejects when |
//! |----------|--------------|
//! | [`check_expiration`] | `now >= expires_at` |
//! | [`check_not_before`] | `issued_at > now + clock_skew` |
//! | [`check_lifetime`] | lifetime outside `(0, max_ttl]` |
//! | [`check_audience`] | audience differs from the expected one |
//! | [`check_payload_size`] | payload larger than the cap |
//! | [`check_policy`] | any of the above, first failure in table order, then the extension caps |

use crate::claims::{ClaimSet, check_signed_extensions};
use crate::config::AttestationConfig;
use crate::error::{IssueError, VerifyError};

/// Checks that a token has not expired at `now`.
///
/// # Errors
///
/// Returns `VerifyError::Expired` if `now >= expires_at`.
///
/// # Examples
///
/// ```
/// use agetoken::check_expiration;
///
/// assert!(check_expiration(4600, 4599).is_ok());
/// assert!(check_expiration(4600, 4600).is_err()); // Boundary: now >= exp is expired
/// ```
pub fn check_expiration(expires_at: i64, now: i64) -> Result<(), VerifyError> {
    if now < expires_at {
        Ok(())
    } else {
        Err(VerifyError::Expired)
    }
}

/// Checks that a token is not issued in the future beyond the tolerated skew.
///
/// # Errors
///
/// Returns `VerifyError::PolicyViolation` if `issued_at > now + clock_skew`.
pub fn check_not_before(issued_at: i64, now: i64, clock_skew: i64) -> Result<(), VerifyError> {
    if issued_at <= now.saturating_add(clock_skew) {
        Ok(())
    } else {
        Err(VerifyError::policy("token issued in the future"))
    }
}

/// Checks that `expires_at - issued_at` lies in `(0, max_ttl]`.
///
/// # Errors
///
/// Returns `VerifyError::PolicyViolation` for a non-positive or overlong
/// lifetime.
///
/// # Examples
///
/// ```
/// use agetoken::check_lifetime;
///
/// assert!(check_lifetime(1000, 4600, 86_400).is_ok());
/// assert!(check_lifetime(1000, 1000, 86_400).is_err());
/// assert!(check_lifetime(0, 86_401, 86_400).is_err());
/// ```
pub fn check_lifetime(issued_at: i64, expires_at: i64, max_ttl: i64) -> Result<(), VerifyError> {
    let lifetime = expires_at.saturating_sub(issued_at);
    if lifetime <= 0 {
        return Err(VerifyError::policy("token lifetime is not positive"));
    }
    if lifetime > max_ttl {
        return Err(VerifyError::policy(format!(
            "token lifetime {lifetime}s exceeds maximum {max_ttl}s"
        )));
    }
    Ok(())
}

/// Checks that the token is bound to the expected relying party.
///
/// Comparison is exact; no normalization is applied.
///
/// # Errors
///
/// Returns `VerifyError::AudienceMismatch` if the strings differ.
pub fn check_audience(token_audience: &str, expected: &str) -> Result<(), VerifyError> {
    if token_audience == expected {
        Ok(())
    } else {
        Err(VerifyError::AudienceMismatch)
    }
}

/// Checks the canonical payload size.
///
/// # Errors
///
/// Returns `VerifyError::PolicyViolation` if `payload_len > max_payload_bytes`.
pub fn check_payload_size(payload_len: usize, max_payload_bytes: usize) -> Result<(), VerifyError> {
    if payload_len <= max_payload_bytes {
        Ok(())
    } else {
        Err(VerifyError::policy(format!(
            "payload of {payload_len} bytes exceeds {max_payload_bytes}"
        )))
    }
}

/// Runs every policy rule in order and reports the first failure.
///
/// Order: expiry, not-before, lifetime, audience, payload size, extensions.
///
/// # Errors
///
/// Returns the `VerifyError` of the first failing rule.
pub fn check_policy(
    claims: &ClaimSet,
    payload_len: usize,
    expected_audience: &str,
    now: i64,
    config: &AttestationConfig,
) -> Result<(), VerifyError> {
    check_expiration(claims.expires_at, now)?;
    check_not_before(claims.issued_at, now, config.clock_skew_secs)?;
    check_lifetime(claims.issued_at, claims.expires_at, config.max_ttl_secs)?;
    check_audience(&claims.audience, expected_audience)?;
    check_payload_size(payload_len, config.max_payload_bytes)?;
    check_signed_extensions(
        &claims.extensions,
        config.max_extension_entries,
        config.max_extension_value_len,
    )
    .map_err(|e| match e {
        IssueError::InvalidInput { reason, .. } => VerifyError::policy(reason),
        other => VerifyError::policy(other.to_string()),
    })
}
