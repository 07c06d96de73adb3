//! End-to-end tests of the gateway entry points.

use std::sync::Arc;

use agetoken::{
    AttestationConfig, FixedClock, KeyRing, SignatureScheme, SigningKey, TrustBundle, TrustStore,
};
use agetoken_gateway::{AttestationContext, IssueRequest, VerifyRequest, VerifyResponse};
use proptest::prelude::*;

const ATTESTOR: &str = "attestor.example";

fn context(clock: Arc<FixedClock>) -> (AttestationContext, Arc<KeyRing>) {
    let keyring = Arc::new(KeyRing::new());
    keyring
        .add_key("k1", SigningKey::generate(SignatureScheme::Ed25519), 0, 100_000)
        .unwrap();
    let ctx = AttestationContext::new(
        AttestationConfig::default(),
        ATTESTOR,
        Arc::clone(&keyring),
        Arc::new(TrustStore::new()),
        clock,
    )
    .unwrap();
    let bundle = TrustBundle::from_entries(1, &keyring.published_entries(ATTESTOR));
    ctx.load_trust_bundle(&bundle.to_json().unwrap()).unwrap();
    (ctx, keyring)
}

#[test]
fn revocation_bundle_invalidates_outstanding_tokens() {
    let clock = Arc::new(FixedClock::new(1000));
    let (ctx, keyring) = context(Arc::clone(&clock));
    let token = ctx
        .handle_issue(&IssueRequest::new("16_17", "app.example", "n1"))
        .unwrap()
        .token;

    let mut entries = keyring.published_entries(ATTESTOR);
    entries[0].revoked = true;
    ctx.load_trust_bundle(&TrustBundle::from_entries(2, &entries).to_json().unwrap())
        .unwrap();

    clock.set(1500);
    let response = ctx.handle_verify(&VerifyRequest::new(token, "app.example"));
    assert!(!response.valid);
    assert_eq!(response.error.as_deref(), Some("invalid_token"));
}

#[test]
fn rollback_to_older_bundle_is_refused() {
    let (ctx, keyring) = context(Arc::new(FixedClock::new(1000)));
    let mut entries = keyring.published_entries(ATTESTOR);
    entries[0].revoked = true;
    ctx.load_trust_bundle(&TrustBundle::from_entries(5, &entries).to_json().unwrap())
        .unwrap();

    let clean = TrustBundle::from_entries(3, &keyring.published_entries(ATTESTOR));
    assert!(ctx.load_trust_bundle(&clean.to_json().unwrap()).is_err());
}

#[test]
fn expired_token_reports_expired() {
    let clock = Arc::new(FixedClock::new(1000));
    let (ctx, _) = context(Arc::clone(&clock));
    let token = ctx
        .handle_issue(&IssueRequest::new("UNDER_13", "app.example", "n1"))
        .unwrap()
        .token;
    clock.set(4600);
    let response = ctx.handle_verify(&VerifyRequest::new(token, "app.example"));
    assert_eq!(response.error.as_deref(), Some("expired"));
}

#[test]
fn verify_json_carries_wire_payload() {
    let (ctx, _) = context(Arc::new(FixedClock::new(1000)));
    let token = ctx
        .handle_issue(&IssueRequest::new("18_PLUS", "app.example", "n1"))
        .unwrap()
        .token;
    let body = serde_json::to_string(&VerifyRequest::new(token, "app.example")).unwrap();
    let out = ctx.handle_verify_json(&body);
    let response: VerifyResponse = serde_json::from_str(&out).unwrap();
    assert!(response.valid);
    assert_eq!(response.is_minor, Some(false));
    assert!(out.contains("\"age\":\"18_PLUS\""));
    assert!(out.contains("\"att\":\"attestor.example\""));
}

proptest! {
    #[test]
    fn arbitrary_tokens_are_never_accepted(token in "[A-Za-z0-9_.-]{0,200}") {
        let (ctx, _) = context(Arc::new(FixedClock::new(1000)));
        let response = ctx.handle_verify(&VerifyRequest::new(token, "app.example"));
        prop_assert!(!response.valid);
        prop_assert!(response.payload.is_none());
    }
}
