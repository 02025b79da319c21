// src/core/auth/mod.rs

//! Authentication of the proxy against a backend: the SCRAM conversation and
//! the command exchange that drives it.

pub mod negotiator;
pub mod scram;

pub use negotiator::{
    SaslReply, authenticate, authenticate_with, choose_mechanism, parse_sasl_mechanisms,
    parse_sasl_reply,
};
pub use scram::{ScramConversation, ScramMechanism};

use serde::{Deserialize, Serialize};

/// Which SCRAM variant to authenticate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MechanismPreference {
    #[default]
    #[serde(rename = "scram-sha-1")]
    ScramSha1,
    #[serde(rename = "scram-sha-256")]
    ScramSha256,
    /// Ask the server which mechanisms the user has and pick the strongest.
    #[serde(rename = "auto")]
    Auto,
}

/// The identity the proxy presents to a backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// The database the user is defined in.
    pub auth_db: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            auth_db: "admin".to_string(),
        }
    }

    pub fn with_auth_db(mut self, auth_db: impl Into<String>) -> Self {
        self.auth_db = auth_db.into();
        self
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_db", &self.auth_db)
            .finish()
    }
}
