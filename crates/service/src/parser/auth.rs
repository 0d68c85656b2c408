use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginNonce {
    pub nonce: String,
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailOtp {
    pub email: String,
    pub code_hash: String,       // hex sha256 of the code
    pub attempts_left: u8,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Pending Twitter OAuth2 authorization, keyed by the `state` parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    pub address: String,
    pub code_verifier: String,
    pub expires_at: DateTime<Utc>,
}
