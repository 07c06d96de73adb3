//! Property-based tests for the codec, issuance and tamper detection.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use agetoken::{
    AgeBucket, AttestationConfig, CanonicalCodec, ClaimSet, ExtensionValue, Extensions, Issuer,
    KeyRing, SignatureScheme, SignedToken, SigningKey, TrustStore, VerifyError, Verifier,
};

const ATTESTOR: &str = "attestor.example";
const AUDIENCE: &str = "app.example";

mod strategies {
    use super::*;

    pub fn age_bucket() -> impl Strategy<Value = AgeBucket> {
        prop::sample::select(AgeBucket::ALL.to_vec())
    }

    /// Visible ASCII without quotes or backslashes, as callers send it
    pub fn field() -> impl Strategy<Value = String> {
        "[A-Za-z0-9._:-]{1,40}"
    }

    pub fn extension_value() -> impl Strategy<Value = ExtensionValue> {
        prop_oneof![
            any::<bool>().prop_map(ExtensionValue::Bool),
            any::<i64>().prop_map(ExtensionValue::Int),
            "[a-z0-9 ]{0,16}".prop_map(ExtensionValue::Text),
        ]
    }

    pub fn extensions() -> impl Strategy<Value = Extensions> {
        let key = "[a-z_]{1,12}".prop_filter("kid is reserved", |k| k.as_str() != "kid");
        prop::collection::btree_map(key, extension_value(), 0..=4)
    }

    pub fn claims() -> impl Strategy<Value = ClaimSet> {
        (
            age_bucket(),
            field(),
            field(),
            0i64..4_000_000_000,
            1i64..=86_400,
            extensions(),
        )
            .prop_map(|(age_bucket, audience, nonce, issued_at, ttl, extensions)| {
                ClaimSet {
                    token_id: "00000000-0000-4000-8000-000000000000".to_string(),
                    attestor_id: ATTESTOR.to_string(),
                    age_bucket,
                    audience,
                    issued_at,
                    expires_at: issued_at + ttl,
                    nonce,
                    extensions,
                }
                .with_key_id("k1")
            })
    }
}

fn pair(config: &AttestationConfig) -> (Issuer, Verifier) {
    let keyring = Arc::new(KeyRing::new());
    keyring
        .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, i64::MAX)
        .unwrap();
    let trust = Arc::new(TrustStore::from_entries(keyring.published_entries(ATTESTOR)).unwrap());
    let issuer = Issuer::new(ATTESTOR, keyring, config.clone()).unwrap();
    let verifier = Verifier::new(trust, config.clone()).unwrap();
    (issuer, verifier)
}

proptest! {
    #[test]
    fn decode_inverts_encode(claims in strategies::claims()) {
        let codec = CanonicalCodec::default();
        let bytes = codec.encode(&claims);
        prop_assert!(codec.is_canonical(&bytes));
        prop_assert_eq!(codec.decode(&bytes).unwrap(), claims);
    }

    #[test]
    fn reformatted_payload_is_not_canonical(claims in strategies::claims()) {
        let codec = CanonicalCodec::default();
        let value: serde_json::Value = serde_json::from_slice(&codec.encode(&claims)).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        prop_assert!(!codec.is_canonical(&pretty));
        prop_assert_eq!(codec.decode(&pretty).unwrap(), claims);
    }

    #[test]
    fn issued_lifetime_equals_ttl(
        now in 0i64..4_000_000_000,
        ttl in 1u64..=86_400,
        age in strategies::age_bucket(),
    ) {
        let config = AttestationConfig::new().with_ttl(Duration::from_secs(ttl));
        let (issuer, verifier) = pair(&config);
        let token = issuer.issue(age, AUDIENCE, "n", now).unwrap();
        let claims = verifier.check(&token, AUDIENCE, now).unwrap();
        prop_assert_eq!(claims.expires_at - claims.issued_at, i64::try_from(ttl).unwrap());
        prop_assert_eq!(claims.age_bucket, age);
    }

    #[test]
    fn payload_tampering_is_never_accepted(index in any::<prop::sample::Index>(), mask in 1u8..=255) {
        let (issuer, verifier) = pair(&AttestationConfig::default());
        let token = issuer.issue(AgeBucket::Age16To17, AUDIENCE, "n", 1000).unwrap();
        let mut payload = token.payload().to_vec();
        let i = index.index(payload.len());
        payload[i] ^= mask;
        let forged = SignedToken::new(payload, token.signature().to_vec(), token.key_id().unwrap());
        prop_assert!(verifier.verify(&forged, AUDIENCE, 1000).is_err());
        prop_assert!(verifier.replay_guard().is_empty());
    }

    #[test]
    fn signature_tampering_is_bad_signature(index in any::<prop::sample::Index>(), mask in 1u8..=255) {
        let (issuer, verifier) = pair(&AttestationConfig::default());
        let token = issuer.issue(AgeBucket::Adult, AUDIENCE, "n", 1000).unwrap();
        let mut signature = token.signature().to_vec();
        let i = index.index(signature.len());
        signature[i] ^= mask;
        let forged = SignedToken::new(token.payload().to_vec(), signature, token.key_id().unwrap());
        prop_assert_eq!(verifier.verify(&forged, AUDIENCE, 1000), Err(VerifyError::BadSignature));
    }
}
