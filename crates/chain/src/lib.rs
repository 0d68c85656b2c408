//! Wallet and chain helpers: login message construction, EIP-191 signature
//! verification and the digests clients attest on-chain.

pub mod attest;
pub mod network;
pub mod wallet;

pub use alloy::primitives::B256;
pub use attest::{parse_tx_hash, proposal_digest, vote_digest};
pub use network::Network;
pub use wallet::{login_message, normalize_address, verify_wallet_signature};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid transaction hash: {0}")]
    InvalidTxHash(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}
