use alloy::primitives::{Address, Signature};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::network::Network;
use crate::ChainError;

/// Parses a 0x address (any casing) and returns it lowercased.
pub fn normalize_address(address: &str) -> Result<String, ChainError> {
    let parsed = address
        .trim()
        .parse::<Address>()
        .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", address, e)))?;
    Ok(format!("{:#x}", parsed))
}

/// The text a wallet signs to log in. The server rebuilds it from the stored
/// nonce, so any change here invalidates outstanding nonces.
pub fn login_message(
    address: &str,
    nonce: &str,
    issued_at: DateTime<Utc>,
    network: Network,
) -> String {
    format!(
        "Sign in to Voxen\n\nAddress: {}\nChain ID: {}\nNonce: {}\nIssued At: {}",
        address,
        network.chain_id(),
        nonce,
        issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

/// EIP-191 personal-sign verification. `Ok(false)` means the signature is
/// well formed but was produced by another key.
pub fn verify_wallet_signature(
    address: &str,
    message: &str,
    signature_hex: &str,
) -> Result<bool, ChainError> {
    let expected = address
        .trim()
        .parse::<Address>()
        .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", address, e)))?;

    let raw = signature_hex.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw).map_err(|e| ChainError::InvalidSignature(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(ChainError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let signature = Signature::from_raw(&bytes)
        .map_err(|e| ChainError::InvalidSignature(e.to_string()))?;
    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| ChainError::InvalidSignature(e.to_string()))?;

    Ok(recovered == expected)
}
