// src/core/auth/scram.rs

//! Implements the client side of the SCRAM challenge-response conversation.
//!
//! A conversation is single-shot: it is created for one authentication
//! attempt, walks forward through its steps exactly once and is discarded on
//! any failure.
//!
//! | step | call                | action                                   |
//! |------|---------------------|------------------------------------------|
//! | 0    | `first_message()`   | generate nonce, build `saslStart`        |
//! | 1    | `next(server-first)`| derive keys, answer with the client proof |
//! | 2    | `next(server-final)`| SHA-1 only: verify the server signature  |
//! | 3    | -                   | finished, every further call fails       |

use super::MechanismPreference;
use crate::core::ProxyError;
use crate::core::protocol::{Document, Value};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a client nonce, before base64 encoding.
const CLIENT_NONCE_LEN: usize = 18;

/// `base64("n,,")`: the GS2 header for "no channel binding".
const CHANNEL_BINDING: &str = "biws";

/// The hash function a conversation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramMechanism {
    Sha1,
    Sha256,
}

impl ScramMechanism {
    /// The mechanism name as it appears in `saslStart`.
    pub fn name(self) -> &'static str {
        match self {
            ScramMechanism::Sha1 => "SCRAM-SHA-1",
            ScramMechanism::Sha256 => "SCRAM-SHA-256",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SCRAM-SHA-1" => Some(ScramMechanism::Sha1),
            "SCRAM-SHA-256" => Some(ScramMechanism::Sha256),
            _ => None,
        }
    }

    /// Digest size of the underlying hash, which is also the derived key length.
    pub fn digest_len(self) -> usize {
        match self {
            ScramMechanism::Sha1 => 20,
            ScramMechanism::Sha256 => 32,
        }
    }

    /// Derives the salted secret.
    ///
    /// SHA-1 iterates over the legacy `hex(md5("<user>:mongo:<password>"))`
    /// digest; SHA-256 iterates over the raw password.
    pub fn salted_password(
        self,
        username: &str,
        password: &str,
        salt: &[u8],
        iterations: u32,
    ) -> Vec<u8> {
        let mut out = vec![0u8; self.digest_len()];
        match self {
            ScramMechanism::Sha1 => {
                let digest = Md5::digest(format!("{username}:mongo:{password}").as_bytes());
                let secret = hex::encode(digest);
                pbkdf2_hmac::<Sha1>(secret.as_bytes(), salt, iterations, &mut out);
            }
            ScramMechanism::Sha256 => {
                pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
            }
        }
        out
    }

    pub fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, ProxyError> {
        match self {
            ScramMechanism::Sha1 => {
                let mut mac = HmacSha1::new_from_slice(key)
                    .map_err(|_| ProxyError::Authentication("invalid HMAC key".into()))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            ScramMechanism::Sha256 => {
                let mut mac = HmacSha256::new_from_slice(key)
                    .map_err(|_| ProxyError::Authentication("invalid HMAC key".into()))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }

    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            ScramMechanism::Sha1 => Sha1::digest(data).to_vec(),
            ScramMechanism::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    /// Checks `HMAC(key, data) == expected` in constant time.
    fn verify(self, key: &[u8], data: &[u8], expected: &[u8]) -> Result<(), ProxyError> {
        let outcome = match self {
            ScramMechanism::Sha1 => {
                let mut mac = HmacSha1::new_from_slice(key)
                    .map_err(|_| ProxyError::Authentication("invalid HMAC key".into()))?;
                mac.update(data);
                mac.verify_slice(expected)
            }
            ScramMechanism::Sha256 => {
                let mut mac = HmacSha256::new_from_slice(key)
                    .map_err(|_| ProxyError::Authentication("invalid HMAC key".into()))?;
                mac.update(data);
                mac.verify_slice(expected)
            }
        };
        outcome.map_err(|_| ProxyError::SignatureMismatch)
    }
}

impl From<ScramMechanism> for MechanismPreference {
    fn from(mechanism: ScramMechanism) -> Self {
        match mechanism {
            ScramMechanism::Sha1 => MechanismPreference::ScramSha1,
            ScramMechanism::Sha256 => MechanismPreference::ScramSha256,
        }
    }
}

/// One authentication attempt.
#[derive(Debug)]
pub struct ScramConversation {
    mechanism: ScramMechanism,
    username: String,
    password: String,
    client_nonce: String,
    server_nonce: String,
    salt: Vec<u8>,
    iterations: u32,
    /// The running transcript the client and server signatures are computed over.
    auth_message: String,
    /// Retained for the SHA-1 server-signature check.
    server_key: Option<Vec<u8>>,
    step: u8,
}

impl ScramConversation {
    pub fn new(mechanism: ScramMechanism, username: &str, password: &str) -> Self {
        Self {
            mechanism,
            username: username.to_string(),
            password: password.to_string(),
            client_nonce: String::new(),
            server_nonce: String::new(),
            salt: Vec::new(),
            iterations: 0,
            auth_message: String::new(),
            server_key: None,
            step: 0,
        }
    }

    /// Uses `nonce` as the client nonce instead of a random one.
    pub fn with_client_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.client_nonce = nonce.into();
        self
    }

    pub fn mechanism(&self) -> ScramMechanism {
        self.mechanism
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn client_nonce(&self) -> &str {
        &self.client_nonce
    }

    /// The transcript accumulated so far.
    pub fn auth_message(&self) -> &str {
        &self.auth_message
    }

    /// Generates the client nonce, unless one was supplied, and returns the
    /// `saslStart` command document.
    pub fn first_message(&mut self) -> Result<Document, ProxyError> {
        if self.step != 0 {
            return Err(ProxyError::InvalidState(format!(
                "first message requested in step {}",
                self.step
            )));
        }

        if self.client_nonce.is_empty() {
            let mut raw = [0u8; CLIENT_NONCE_LEN];
            rand::thread_rng().fill_bytes(&mut raw);
            self.client_nonce = BASE64.encode(raw);
        }

        let payload = format!("n,,{}", self.client_first_bare());
        self.step = 1;

        Ok(Document::new()
            .with("saslStart", 1)
            .with("mechanism", self.mechanism.name())
            .with("payload", Value::binary(payload.into_bytes()))
            .with("autoAuthorize", 1))
    }

    /// Feeds one server challenge to the conversation and returns the payload to
    /// send back.
    pub fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>, ProxyError> {
        match (self.step, self.mechanism) {
            (1, _) => self.client_final(challenge),
            (2, ScramMechanism::Sha1) => self.verify_server_final(challenge),
            (step, mechanism) => Err(ProxyError::InvalidState(format!(
                "{} conversation cannot continue from step {step}",
                mechanism.name()
            ))),
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", escape_username(&self.username), self.client_nonce)
    }

    /// Step 1: parse the server-first message and produce the client proof.
    /// Malformed attributes leave their fields zero-valued; the server will
    /// reject the resulting proof.
    fn client_final(&mut self, challenge: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let attrs = parse_attributes(challenge);
        self.server_nonce = attrs.get("r").cloned().unwrap_or_default();
        self.salt = attrs
            .get("s")
            .and_then(|s| BASE64.decode(s).ok())
            .unwrap_or_default();
        self.iterations = attrs.get("i").and_then(|i| i.parse().ok()).unwrap_or(0);

        let without_proof = format!("c={CHANNEL_BINDING},r={}", self.server_nonce);
        self.auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            String::from_utf8_lossy(challenge),
            without_proof
        );

        let mech = self.mechanism;
        let salted =
            mech.salted_password(&self.username, &self.password, &self.salt, self.iterations);
        let client_key = mech.hmac(&salted, b"Client Key")?;
        let stored_key = mech.hash(&client_key);
        let client_signature = mech.hmac(&stored_key, self.auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        if mech == ScramMechanism::Sha1 {
            self.server_key = Some(mech.hmac(&salted, b"Server Key")?);
        }

        self.step = 2;
        Ok(format!("{without_proof},p={}", BASE64.encode(proof)).into_bytes())
    }

    /// Step 2 (SHA-1): check `v=` against `HMAC(ServerKey, AuthMessage)`.
    fn verify_server_final(&mut self, challenge: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let attrs = parse_attributes(challenge);
        if let Some(error) = attrs.get("e") {
            return Err(ProxyError::Authentication(format!(
                "server rejected the proof: {error}"
            )));
        }
        let Some(signature) = attrs.get("v").filter(|v| !v.is_empty()) else {
            return Err(ProxyError::Authentication(
                "server finished without signature".into(),
            ));
        };
        let signature = BASE64.decode(signature)?;

        let server_key = self
            .server_key
            .as_deref()
            .ok_or_else(|| ProxyError::InvalidState("server key was never derived".into()))?;
        self.mechanism
            .verify(server_key, self.auth_message.as_bytes(), &signature)?;

        self.step = 3;
        // Nothing left to say, but the server still expects one empty round.
        Ok(Vec::new())
    }
}

/// Escapes a SASL username: `=` becomes `=3D` and `,` becomes `=2C`.
pub fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// Splits a `k=v,k=v` SCRAM message into its attributes. Later duplicates win;
/// parts without `=` are ignored.
pub fn parse_attributes(message: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(message)
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
