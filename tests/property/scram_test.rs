// tests/property/scram_test.rs

//! The client proof and server-signature check agree with an independent
//! derivation for arbitrary credentials and server parameters.

use crate::test_helpers::*;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use docproxy::core::ProxyError;
use docproxy::core::auth::{ScramConversation, ScramMechanism};
use proptest::prelude::*;

/// Runs the conversation up to the proof and returns
/// `(client_first_bare, server_first, client_final)`.
fn run_to_proof(
    conversation: &mut ScramConversation,
    salt: &[u8],
    iterations: u32,
) -> (String, String, String) {
    let start = conversation.first_message().unwrap();
    let payload = start.get_binary("payload").unwrap();
    let client_first = String::from_utf8(payload.to_vec()).unwrap();
    let client_first_bare = client_first.strip_prefix("n,,").unwrap().to_string();
    let nonce = conversation.client_nonce().to_string();

    let server_first = format!(
        "r={nonce}srv,s={},i={iterations}",
        BASE64.encode(salt)
    );
    let client_final = conversation.next(server_first.as_bytes()).unwrap();
    (
        client_first_bare,
        server_first,
        String::from_utf8(client_final).unwrap(),
    )
}

fn mechanism() -> impl Strategy<Value = ScramMechanism> {
    prop_oneof![Just(ScramMechanism::Sha1), Just(ScramMechanism::Sha256)]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_proof_matches_reference_derivation(
        mech in mechanism(),
        username in "[a-zA-Z0-9_.@,=-]{1,24}",
        password in ".{0,32}",
        salt in proptest::collection::vec(any::<u8>(), 1..32),
        iterations in 1u32..64,
    ) {
        let mut conversation = ScramConversation::new(mech, &username, &password);
        let (client_first_bare, server_first, client_final) =
            run_to_proof(&mut conversation, &salt, iterations);

        let (without_proof, proof) = client_final.rsplit_once(",p=").unwrap();
        let auth_message = format!("{client_first_bare},{server_first},{without_proof}");
        prop_assert_eq!(conversation.auth_message(), auth_message.as_str());

        let salted = salted_password(mech, &username, &password, &salt, iterations);
        let expected = expected_proof(mech, &salted, &auth_message);
        prop_assert_eq!(BASE64.decode(proof).unwrap(), expected);
        prop_assert_eq!(conversation.step(), 2);
    }

    #[test]
    fn test_sha1_signature_check_accepts_only_the_real_signature(
        username in "[a-z]{1,12}",
        password in "[ -~]{0,16}",
        salt in proptest::collection::vec(any::<u8>(), 1..16),
        iterations in 1u32..32,
        flip in any::<prop::sample::Index>(),
    ) {
        let mech = ScramMechanism::Sha1;
        let salted = salted_password(mech, &username, &password, &salt, iterations);

        let mut honest = ScramConversation::new(mech, &username, &password);
        run_to_proof(&mut honest, &salt, iterations);
        let signature = expected_server_signature(mech, &salted, honest.auth_message());
        let reply = honest.next(format!("v={}", BASE64.encode(&signature)).as_bytes()).unwrap();
        prop_assert!(reply.is_empty());
        prop_assert_eq!(honest.step(), 3);

        let mut fooled = ScramConversation::new(mech, &username, &password);
        run_to_proof(&mut fooled, &salt, iterations);
        let mut forged = expected_server_signature(mech, &salted, fooled.auth_message());
        let at = flip.index(forged.len());
        forged[at] ^= 0x01;
        let err = fooled.next(format!("v={}", BASE64.encode(&forged)).as_bytes()).unwrap_err();
        prop_assert_eq!(err, ProxyError::SignatureMismatch);
    }

    #[test]
    fn test_username_escaping_in_first_message(username in "[a-z,=]{1,24}") {
        let mut conversation = ScramConversation::new(ScramMechanism::Sha1, &username, "pw");
        let start = conversation.first_message().unwrap();
        let payload = String::from_utf8(start.get_binary("payload").unwrap().to_vec()).unwrap();

        let expected = username.replace('=', "=3D").replace(',', "=2C");
        let prefix = format!("n,,n={expected},r=");
        prop_assert!(payload.starts_with(&prefix));
        let nonce = &payload[prefix.len()..];
        prop_assert!(!nonce.contains(','));
    }
}
