//! Digests submitted to the attestation contract. The database stays the
//! source of truth; the chain only carries these hashes.

use alloy::primitives::{keccak256, B256};

use crate::ChainError;

fn field(buffer: &mut Vec<u8>, value: &[u8]) {
    buffer.extend_from_slice(&(value.len() as u64).to_be_bytes());
    buffer.extend_from_slice(value);
}

pub fn proposal_digest(
    proposal_id: &str,
    space_id: &str,
    title: &str,
    options: &[String],
    end_timestamp: i64,
) -> B256 {
    let mut buffer = b"voxen:proposal".to_vec();
    field(&mut buffer, proposal_id.as_bytes());
    field(&mut buffer, space_id.as_bytes());
    field(&mut buffer, title.as_bytes());
    buffer.extend_from_slice(&(options.len() as u64).to_be_bytes());
    for option in options {
        field(&mut buffer, option.as_bytes());
    }
    buffer.extend_from_slice(&end_timestamp.to_be_bytes());
    keccak256(&buffer)
}

pub fn vote_digest(proposal_id: &str, voter: &str, choices: &[u32]) -> B256 {
    let mut buffer = b"voxen:vote".to_vec();
    field(&mut buffer, proposal_id.as_bytes());
    field(&mut buffer, voter.to_ascii_lowercase().as_bytes());
    buffer.extend_from_slice(&(choices.len() as u64).to_be_bytes());
    for choice in choices {
        buffer.extend_from_slice(&choice.to_be_bytes());
    }
    keccak256(&buffer)
}

/// Accepts a 0x-prefixed 32-byte hash and returns it lowercased.
pub fn parse_tx_hash(tx_hash: &str) -> Result<String, ChainError> {
    let hash = tx_hash
        .trim()
        .parse::<B256>()
        .map_err(|e| ChainError::InvalidTxHash(format!("{}: {}", tx_hash, e)))?;
    Ok(format!("{:#x}", hash))
}
